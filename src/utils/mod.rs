//! Shared utilities and error types

pub mod error;

pub use error::{PlatformError, Result, UfoError};

/// Truncate a description to `limit` characters, marking the cut with an ellipsis
pub fn truncate_description(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Render a caught panic payload for logging
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate_description("abc", 80), "abc");
    }

    #[test]
    fn test_truncate_long() {
        let long = "x".repeat(100);
        let out = truncate_description(&long, 80);
        assert_eq!(out.chars().count(), 81);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncate_exact_limit() {
        let exact = "y".repeat(80);
        assert_eq!(truncate_description(&exact, 80), exact);
    }

    #[test]
    fn test_panic_message() {
        let result: std::thread::Result<()> = std::panic::catch_unwind(|| panic!("boom"));
        let caught = result.unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom");
    }
}
