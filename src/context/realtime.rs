//! Realtime mode: forces batched work to run synchronously

use super::RuntimeContext;
use crate::dom::Document;

/// Class placed on the document element while realtime mode is on
pub const REALTIME_CLASS: &str = "ufo-realtime";

/// Switch realtime mode and mirror it on the document element
pub fn set_realtime(context: &RuntimeContext, document: &Document, on: bool) {
    context.set_realtime_flag(on);
    document.document_element().toggle_class(REALTIME_CLASS, on);
}

/// Turn realtime on when the page opted in through the class marker.
///
/// A manual toggle persists: this never switches realtime off.
pub fn refresh_realtime(context: &RuntimeContext, document: &Document) -> bool {
    let on = document.document_element().has_class(REALTIME_CLASS) || context.is_realtime();
    context.set_realtime_flag(on);
    on
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_realtime_toggles_class() {
        let context = RuntimeContext::new();
        let document = Document::new();
        set_realtime(&context, &document, true);
        assert!(context.is_realtime());
        assert!(document.document_element().has_class(REALTIME_CLASS));
        set_realtime(&context, &document, false);
        assert!(!context.is_realtime());
        assert!(!document.document_element().has_class(REALTIME_CLASS));
    }

    #[test]
    fn test_refresh_picks_up_page_marker() {
        let context = RuntimeContext::new();
        let document = Document::new();
        assert!(!refresh_realtime(&context, &document));
        document.document_element().toggle_class(REALTIME_CLASS, true);
        assert!(refresh_realtime(&context, &document));
        assert!(context.is_realtime());
    }

    #[test]
    fn test_refresh_keeps_manual_toggle() {
        let context = RuntimeContext::new();
        let document = Document::new();
        context.set_realtime_flag(true);
        assert!(refresh_realtime(&context, &document));
    }
}
