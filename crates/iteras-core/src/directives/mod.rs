//! ============================================================================
//! Directives - Embeddable placeholders in authored content
//! ============================================================================
//! Authors drop `[iteras-...]` directives into content; they expand to the
//! ITERAS widget scripts or to gated content:
//! - iteras-ordering / iteras-signup / iteras-selfservice: widget iframes
//! - iteras-paywall-login: login iframe for the configured paywalls
//! - iteras-return-to-page: url that brings the reader back after login
//! - iteras-if-logged-in-link / iteras-if-logged-in / iteras-if-not-logged-in:
//!   show or hide enclosed text by pass authorization
//! - iteras-paywall-content: run enclosed text through the content gate
//! ============================================================================

mod parser;

pub use parser::{parse, Attributes, Directive, DirectiveError, Segment};

use serde_json::{json, Value};

use crate::content::{
    script_json, ContentGate, ContentRef, RequestContext, ADMIN_NOTICE_BODY, ADMIN_NOTICE_TITLE,
};

pub const ORDERING: &str = "iteras-ordering";
pub const SIGNUP: &str = "iteras-signup";
pub const SELFSERVICE: &str = "iteras-selfservice";
pub const PAYWALL_LOGIN: &str = "iteras-paywall-login";
pub const RETURN_TO_PAGE: &str = "iteras-return-to-page";
pub const IF_LOGGED_IN_LINK: &str = "iteras-if-logged-in-link";
pub const IF_LOGGED_IN: &str = "iteras-if-logged-in";
pub const IF_NOT_LOGGED_IN: &str = "iteras-if-not-logged-in";
pub const PAYWALL_CONTENT: &str = "iteras-paywall-content";

pub const DIRECTIVES: [&str; 9] = [
    ORDERING,
    SIGNUP,
    SELFSERVICE,
    PAYWALL_LOGIN,
    RETURN_TO_PAGE,
    IF_LOGGED_IN_LINK,
    IF_LOGGED_IN,
    IF_NOT_LOGGED_IN,
    PAYWALL_CONTENT,
];

const DEFAULT_LOGIN_TEXT: &str = "You need to be logged in to see this content";
const SERVER_VALIDATION_NEEDED: &str =
    "<!-- ITERAS server validation needed to use this shortcode -->";
const PAYWALLS_NOT_CONFIGURED: &str =
    "<!-- ITERAS paywall enabled but not configured properly: missing paywalls, sync in settings -->";

/// What a directive can see while expanding
#[derive(Clone, Copy)]
pub struct DirectiveContext<'a> {
    gate: &'a ContentGate<'a>,
    request: &'a RequestContext,
    content: &'a ContentRef,
    allow_gating: bool,
}

impl<'a> DirectiveContext<'a> {
    pub fn new(gate: &'a ContentGate<'a>, request: &'a RequestContext, content: &'a ContentRef) -> Self {
        Self {
            gate,
            request,
            content,
            allow_gating: true,
        }
    }

    /// `iteras-paywall-content` passes its body through ungated
    pub fn without_gating(mut self) -> Self {
        self.allow_gating = false;
        self
    }
}

/// Expand every known directive in `text`
pub fn expand(text: &str, ctx: &DirectiveContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in parse(text, &DIRECTIVES) {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Directive(d) => out.push_str(&render(&d, ctx)),
        }
    }
    out
}

fn render(directive: &Directive<'_>, ctx: &DirectiveContext<'_>) -> String {
    let attrs = &directive.attrs;
    let body = directive.body.unwrap_or("");

    match directive.name {
        ORDERING => ordering(attrs, ctx),
        SIGNUP => widget_iframe("signupiframe", ctx, widget_attributes(attrs)),
        SELFSERVICE => widget_iframe("selfserviceiframe", ctx, widget_attributes(attrs)),
        PAYWALL_LOGIN => paywall_login(attrs, ctx),
        RETURN_TO_PAGE => return_to_page(attrs.get("url").unwrap_or(""), &ctx.request.request_uri),
        IF_LOGGED_IN_LINK => if_logged_in_link(attrs, body, ctx),
        IF_LOGGED_IN => by_login_status(true, attrs, body, ctx),
        IF_NOT_LOGGED_IN => by_login_status(false, attrs, body, ctx),
        PAYWALL_CONTENT if ctx.allow_gating => {
            let expanded = expand(body, ctx);
            ctx.gate.gate(&expanded, ctx.content, ctx.request)
        }
        PAYWALL_CONTENT => expand(body, ctx),
        _ => String::new(),
    }
}

/// Attribute value as passed on to the widget
fn widget_attributes(attrs: &Attributes) -> Vec<(String, Value)> {
    attrs
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}

/// `, "key": value` pairs appended after the profile; empty strings are dropped
pub fn combine_attributes(attrs: &[(String, Value)]) -> String {
    attrs
        .iter()
        .filter(|(_, value)| !matches!(value, Value::Null) && value.as_str() != Some(""))
        .map(|(key, value)| format!(", {}: {}", script_json(key), script_json(value)))
        .collect()
}

/// Split a comma-separated id list, tolerating whitespace around commas
pub fn parse_paywall_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn widget_iframe(kind: &str, ctx: &DirectiveContext<'_>, attrs: Vec<(String, Value)>) -> String {
    format!(
        "<script>\n      document.write(Iteras.{}({{\n        \"profile\": {}{}\n      }}));</script>",
        kind,
        script_json(&ctx.gate.settings().profile_name),
        combine_attributes(&attrs)
    )
}

fn ordering(attrs: &Attributes, ctx: &DirectiveContext<'_>) -> String {
    let mut combined = widget_attributes(attrs);
    let query = &ctx.request.query;

    if let Some(product) = query.get("orderproduct") {
        if !query.contains_key("prefill") && !attrs.contains("prefill") {
            combined.push(("prefill".to_string(), json!({ "products": product })));
        }
    }

    widget_iframe("orderingiframe", ctx, combined)
}

fn paywall_login(attrs: &Attributes, ctx: &DirectiveContext<'_>) -> String {
    let paywall_ids = requested_paywall_ids(attrs, ctx);
    if paywall_ids.is_empty() {
        return PAYWALLS_NOT_CONFIGURED.to_string();
    }

    let mut combined: Vec<(String, Value)> = widget_attributes(attrs)
        .into_iter()
        .filter(|(key, _)| key != "paywallid")
        .collect();
    combined.push(("paywallid".to_string(), json!(paywall_ids)));

    widget_iframe("paywalliframe", ctx, combined)
}

/// Append `iterasnext=<request uri>` to the query of `url`
pub fn return_to_page(url: &str, request_uri: &str) -> String {
    let next = format!("iterasnext={}", urlencoding::encode(request_uri));

    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };

    let mut out = match base.split_once('?') {
        Some((path, query)) if !query.is_empty() => format!("{}?{}&{}", path, query, next),
        Some((path, _)) => format!("{}?{}", path, next),
        None => format!("{}?{}", base, next),
    };

    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Ids from the `paywallid` attribute, else every configured paywall
fn requested_paywall_ids(attrs: &Attributes, ctx: &DirectiveContext<'_>) -> Vec<String> {
    match attrs.get("paywallid").map(parse_paywall_ids) {
        Some(ids) if !ids.is_empty() => ids,
        _ => ctx.gate.settings().paywall_ids(),
    }
}

fn if_logged_in_link(attrs: &Attributes, body: &str, ctx: &DirectiveContext<'_>) -> String {
    if !ctx.gate.settings().paywall_server_side_validation {
        return format!("{}{}", SERVER_VALIDATION_NEEDED, expand(body, ctx));
    }

    let paywall_ids = requested_paywall_ids(attrs, ctx);

    if ctx.request.editor {
        let mut notice = format!(
            "<div class=\"iteras-paywall-notice\"><strong>{}</strong>",
            ADMIN_NOTICE_TITLE
        );
        if paywall_ids.is_empty() {
            notice.push_str("<br><em>paywallid not declared</em>");
        }
        notice.push_str("<br>");
        notice.push_str(ADMIN_NOTICE_BODY);
        notice.push_str("</div>");
        return format!("{}{}", notice, expand(body, ctx));
    }

    if ctx.gate.is_authorized(ctx.request, &paywall_ids) {
        return expand(body, ctx);
    }

    let url = attrs
        .get("url")
        .unwrap_or(&ctx.gate.settings().subscribe_url);
    format!(
        "<a class=\"iteras-login-link\" href=\"{}\">{}</a>",
        return_to_page(url, &ctx.request.request_uri).replace('"', "%22"),
        attrs.get("login_text").unwrap_or(DEFAULT_LOGIN_TEXT)
    )
}

fn by_login_status(
    show_if_logged_in: bool,
    attrs: &Attributes,
    body: &str,
    ctx: &DirectiveContext<'_>,
) -> String {
    if !ctx.gate.settings().paywall_server_side_validation {
        return format!("{}{}", SERVER_VALIDATION_NEEDED, expand(body, ctx));
    }

    if ctx.request.editor {
        return format!("{}{}", ADMIN_NOTICE_BODY, expand(body, ctx));
    }

    let paywall_ids = requested_paywall_ids(attrs, ctx);
    if ctx.gate.is_authorized(ctx.request, &paywall_ids) == show_if_logged_in {
        expand(body, ctx)
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PaywallMeta;
    use crate::settings::{PaywallEntry, Settings};

    fn settings() -> Settings {
        Settings {
            profile_name: "myprofile".into(),
            subscribe_url: "/subscribe".into(),
            paywalls: vec![PaywallEntry::new("abc"), PaywallEntry::new("def")],
            ..Default::default()
        }
    }

    fn run(text: &str, settings: &Settings, request: &RequestContext) -> String {
        let gate = ContentGate::new(settings);
        let content = ContentRef::new("1");
        let ctx = DirectiveContext::new(&gate, request, &content);
        expand(text, &ctx)
    }

    #[test]
    fn test_parse_paywall_ids() {
        assert_eq!(parse_paywall_ids("abc123 ,  def456,ghi"), vec!["abc123", "def456", "ghi"]);
        assert!(parse_paywall_ids(" , ").is_empty());
    }

    #[test]
    fn test_combine_attributes() {
        let attrs = vec![
            ("orderingid".to_string(), json!("3for1")),
            ("empty".to_string(), json!("")),
            ("paywallid".to_string(), json!(["a", "b"])),
        ];
        assert_eq!(
            combine_attributes(&attrs),
            r#", "orderingid": "3for1", "paywallid": ["a","b"]"#
        );
        assert_eq!(combine_attributes(&[]), "");
    }

    #[test]
    fn test_return_to_page() {
        assert_eq!(return_to_page("/?p=1", "/post/2"), "/?p=1&iterasnext=%2Fpost%2F2");
        assert_eq!(return_to_page("/login", "/a b"), "/login?iterasnext=%2Fa%20b");
        assert_eq!(
            return_to_page("https://x.dk/login?#top", "/"),
            "https://x.dk/login?iterasnext=%2F#top"
        );
    }

    #[test]
    fn test_ordering_with_prefill() {
        let settings = settings();
        let request = RequestContext::new().with_query("orderproduct", "paper");
        let out = run("[iteras-ordering orderingid=\"3for1\"]", &settings, &request);
        assert_eq!(
            out,
            "<script>\n      document.write(Iteras.orderingiframe({\n        \"profile\": \"myprofile\", \"orderingid\": \"3for1\", \"prefill\": {\"products\":\"paper\"}\n      }));</script>"
        );

        let request = request.with_query("prefill", "no");
        let out = run("[iteras-ordering]", &settings, &request);
        assert!(!out.contains("prefill"));
    }

    #[test]
    fn test_signup_and_selfservice() {
        let settings = settings();
        let request = RequestContext::new();
        assert!(run("[iteras-signup signupid=x]", &settings, &request)
            .contains("Iteras.signupiframe({\n        \"profile\": \"myprofile\", \"signupid\": \"x\""));
        assert!(run("[iteras-selfservice]", &settings, &request).contains("Iteras.selfserviceiframe("));
    }

    #[test]
    fn test_paywall_login() {
        let settings = settings();
        let request = RequestContext::new();
        let out = run("[iteras-paywall-login]", &settings, &request);
        assert!(out.contains("\"paywallid\": [\"abc\",\"def\"]"));

        let out = run("[iteras-paywall-login paywallid=\"x, y\"]", &settings, &request);
        assert!(out.contains("\"paywallid\": [\"x\",\"y\"]"));

        let empty = Settings::default();
        assert_eq!(run("[iteras-paywall-login]", &empty, &request), PAYWALLS_NOT_CONFIGURED);
    }

    #[test]
    fn test_login_status_requires_server_validation() {
        let settings = Settings {
            paywall_server_side_validation: false,
            ..settings()
        };
        let request = RequestContext::new();
        assert_eq!(
            run("[iteras-if-logged-in]secret[/iteras-if-logged-in]", &settings, &request),
            format!("{}secret", SERVER_VALIDATION_NEEDED)
        );
    }

    #[test]
    fn test_login_status_without_pass() {
        let settings = settings();
        let request = RequestContext::new().with_request_uri("/post/1");
        assert_eq!(run("[iteras-if-logged-in]secret[/iteras-if-logged-in]", &settings, &request), "");
        assert_eq!(
            run("[iteras-if-not-logged-in]teaser[/iteras-if-not-logged-in]", &settings, &request),
            "teaser"
        );
        assert_eq!(
            run("[iteras-if-logged-in-link]secret[/iteras-if-logged-in-link]", &settings, &request),
            "<a class=\"iteras-login-link\" href=\"/subscribe?iterasnext=%2Fpost%2F1\">You need to be logged in to see this content</a>"
        );
    }

    #[test]
    fn test_editor_sees_everything() {
        let settings = settings();
        let request = RequestContext::new().as_editor();
        let out = run("[iteras-if-logged-in-link]secret[/iteras-if-logged-in-link]", &settings, &request);
        assert!(out.starts_with("<div class=\"iteras-paywall-notice\"><strong>This content is paywalled</strong><br>"));
        assert!(out.ends_with("</div>secret"));
        assert_eq!(
            run("[iteras-if-logged-in]secret[/iteras-if-logged-in]", &settings, &request),
            format!("{}secret", ADMIN_NOTICE_BODY)
        );
    }

    #[test]
    fn test_paywall_content_directive_gates_body() {
        let settings = settings();
        let gate = ContentGate::new(&settings);
        let content = ContentRef::new("1").with_paywall(PaywallMeta::ids(["abc"]));
        let request = RequestContext::new();
        let ctx = DirectiveContext::new(&gate, &request, &content);

        let out = expand("before [iteras-paywall-content]secret[/iteras-paywall-content]", &ctx);
        assert!(out.starts_with("before <script>Iteras.wall({ redirect: \"/subscribe\""));

        let out = expand(
            "[iteras-paywall-content]secret[/iteras-paywall-content]",
            &ctx.without_gating(),
        );
        assert_eq!(out, "secret");
    }

    #[test]
    fn test_nested_directives_expand() {
        let settings = settings();
        let request = RequestContext::new();
        let out = run(
            "[iteras-if-not-logged-in][iteras-paywall-login][/iteras-if-not-logged-in]",
            &settings,
            &request,
        );
        assert!(out.contains("Iteras.paywalliframe("));
    }
}
