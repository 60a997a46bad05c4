//! Markup fragments handed to the ITERAS front-end widget.

use serde::Serialize;

/// Shown to editors in place of the paywall
pub const ADMIN_NOTICE_TITLE: &str = "This content is paywalled";
pub const ADMIN_NOTICE_BODY: &str =
    "You are seeing the content because you are logged into the site admin.";

/// Placeholder when samepage mode has no paywall box configured
pub const MISSING_BOX_PLACEHOLDER: &str =
    "<p>ITERAS plugin improperly configured. Paywall box content is missing</p>";

/// Truncation state exposed to stylesheets through the wrapper's classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationState {
    #[default]
    NotTruncated,
    /// Truncated and the request carried no pass cookie
    NoPass,
    /// Truncated although a pass cookie was present
    InvalidPass,
}

impl TruncationState {
    pub fn css_class(&self) -> &'static str {
        match self {
            TruncationState::NotTruncated => "",
            TruncationState::NoPass => "iteras-content-truncated iteras-no-pass",
            TruncationState::InvalidPass => "iteras-content-truncated iteras-invalid-pass",
        }
    }
}

/// Serialize for embedding inside a `<script>` block
pub fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

pub fn admin_notice() -> String {
    format!(
        "<div class=\"iteras-paywall-notice\"><b>{}</b><br>{}</div>",
        ADMIN_NOTICE_TITLE, ADMIN_NOTICE_BODY
    )
}

pub fn content_wrapper(content: &str, state: TruncationState) -> String {
    format!(
        "<div class=\"iteras-content-wrapper {}\">{}</div>",
        state.css_class(),
        content
    )
}

/// Script sending unauthorized readers to the subscribe page
pub fn redirect_script(subscribe_url: &str, paywall_ids: &[String]) -> String {
    format!(
        "<script>Iteras.wall({{ redirect: {}, paywallid: {} }});</script>",
        script_json(subscribe_url),
        script_json(paywall_ids)
    )
}

/// Script revealing the paywall box for unauthorized readers
pub fn samepage_script(paywall_ids: &[String]) -> String {
    format!(
        "<script>Iteras.wall({{ unauthorized: iterasPaywallContent, paywallid: {} }});</script>",
        script_json(paywall_ids)
    )
}

/// Hidden paywall box plus the `iterasPaywallContent` callback the widget invokes
pub fn paywall_box(snippet_size: usize, box_content: &str) -> String {
    format!(
        concat!(
            "<div class=\"iteras-paywall-box-wrapper\" style=\"display: none;\">",
            "<div class=\"iteras-paywall-box\">{box_content}</div></div>",
            "<script>function iterasPaywallContent() {{ ",
            "IterasBox.show({{ snippetSize: {size} }}); }}</script>"
        ),
        box_content = box_content,
        size = snippet_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_classes() {
        assert_eq!(TruncationState::NotTruncated.css_class(), "");
        assert_eq!(
            TruncationState::NoPass.css_class(),
            "iteras-content-truncated iteras-no-pass"
        );
        assert_eq!(
            TruncationState::InvalidPass.css_class(),
            "iteras-content-truncated iteras-invalid-pass"
        );
    }

    #[test]
    fn test_wrapper_keeps_trailing_space_when_not_truncated() {
        assert_eq!(
            content_wrapper("x", TruncationState::NotTruncated),
            "<div class=\"iteras-content-wrapper \">x</div>"
        );
    }

    #[test]
    fn test_redirect_script() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            redirect_script("https://example.com/subscribe", &ids),
            "<script>Iteras.wall({ redirect: \"https://example.com/subscribe\", paywallid: [\"a\",\"b\"] });</script>"
        );
    }

    #[test]
    fn test_script_json_escapes_closing_tags() {
        let ids = vec!["</script><b>".to_string()];
        let out = samepage_script(&ids);
        assert!(!out.contains("</script><b>"));
        assert!(out.contains("<\\/script><b>"));
    }

    #[test]
    fn test_paywall_box_embeds_size_and_content() {
        let out = paywall_box(50, "<p>Subscribe</p>");
        assert!(out.contains("<p>Subscribe</p>"));
        assert!(out.contains("snippetSize: 50"));
        assert!(out.contains("function iterasPaywallContent()"));
    }
}
