//! ============================================================================
//! Content Gate - Decides how much of a piece of content to reveal
//! ============================================================================
//! Per request:
//! 1. Content without paywall ids passes through untouched
//! 2. The bearer's pass is checked against the declared ids
//! 3. The site's override policy may disable or replace the paywall
//! 4. Editors see everything, prefixed with a notice
//! 5. Everyone else gets the display mode's widget markup, and with
//!    server-side validation on, unauthorized readers get a truncated body
//!
//! Token failures never surface here; they have already been folded into
//! the authorization boolean by the access gate.
//! ============================================================================

mod markup;
mod meta;
mod policy;
mod truncate;

pub use markup::{
    admin_notice, content_wrapper, paywall_box, redirect_script, samepage_script, script_json,
    TruncationState, ADMIN_NOTICE_BODY, ADMIN_NOTICE_TITLE, MISSING_BOX_PLACEHOLDER,
};
pub use meta::{MetaUpgrade, PaywallMeta};
pub use policy::{HookError, NoOverride, OverrideContext, OverrideDecision, PaywallOverride};
pub use truncate::{truncate_html, visible_len};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::access::{AccessGate, PASS_COOKIE};
use crate::directives::{self, DirectiveContext};
use crate::settings::{DisplayType, IntegrationMethod, Settings};

/// Where the content is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputContext {
    /// A single post or page
    #[default]
    Singular,
    /// Syndication feed
    Feed,
    /// Archive, search or front page listing
    Listing,
}

/// Everything the gate needs to know about the inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw pass token from the `iteraspass` cookie
    pub pass: Option<String>,
    /// Principal may edit content
    pub editor: bool,
    pub output: OutputContext,
    /// Path and query of the current request
    pub request_uri: String,
    /// Decoded query parameters
    pub query: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, pass: impl Into<String>) -> Self {
        self.pass = Some(pass.into());
        self
    }

    /// Take the pass from a `Cookie:` header value
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        self.pass = pass_from_cookie_header(header);
        self
    }

    pub fn as_editor(mut self) -> Self {
        self.editor = true;
        self
    }

    pub fn with_output(mut self, output: OutputContext) -> Self {
        self.output = output;
        self
    }

    pub fn with_request_uri(mut self, uri: impl Into<String>) -> Self {
        self.request_uri = uri.into();
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// A pass cookie was sent, valid or not
    pub fn has_pass(&self) -> bool {
        self.pass.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Extract and decode the pass cookie from a `Cookie:` header
pub fn pass_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == PASS_COOKIE)
        .map(|(_, value)| {
            let value = value.trim().trim_matches('"');
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}

/// The piece of content being rendered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentRef {
    pub id: String,
    pub paywall: PaywallMeta,
}

impl ContentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            paywall: PaywallMeta::Absent,
        }
    }

    pub fn with_paywall(mut self, paywall: PaywallMeta) -> Self {
        self.paywall = paywall;
        self
    }
}

/// Content gate bound to one resolved settings snapshot
#[derive(Clone)]
pub struct ContentGate<'a> {
    settings: &'a Settings,
    access: AccessGate,
    policy: Arc<dyn PaywallOverride>,
}

impl<'a> ContentGate<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            access: AccessGate::new(),
            policy: Arc::new(NoOverride),
        }
    }

    pub fn with_access(mut self, access: AccessGate) -> Self {
        self.access = access;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PaywallOverride>) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    /// Whether the request's pass unlocks any of `paywall_ids`
    pub fn is_authorized(&self, request: &RequestContext, paywall_ids: &[String]) -> bool {
        self.access
            .authorize(
                request.pass.as_deref(),
                paywall_ids,
                &self.settings.signing_key(),
            )
            .authorized
    }

    /// Automatic filter applied to every rendered body
    pub fn filter_content(&self, body: &str, content: &ContentRef, request: &RequestContext) -> String {
        if self.settings.paywall_integration_method != IntegrationMethod::Auto {
            return body.to_string();
        }
        self.gate(body, content, request)
    }

    /// Render a stored body for display: directives are expanded first and
    /// the automatic filter runs on the result, so a cut never lands inside
    /// a directive and directive source is not counted as visible text.
    pub fn render_content(&self, body: &str, content: &ContentRef, request: &RequestContext) -> String {
        let ctx = DirectiveContext::new(self, request, content);
        // The automatic filter gates the whole body already
        let ctx = if self.settings.paywall_integration_method == IntegrationMethod::Auto {
            ctx.without_gating()
        } else {
            ctx
        };
        let expanded = directives::expand(body, &ctx);
        self.filter_content(&expanded, content, request)
    }

    /// Gate `body` according to the content's paywall declaration
    pub fn gate(&self, body: &str, content: &ContentRef, request: &RequestContext) -> String {
        if request.output == OutputContext::Listing {
            return body.to_string();
        }

        let declared = content.paywall.resolve(self.settings);
        if declared.is_empty() {
            return body.to_string();
        }

        let authorized = self.is_authorized(request, &declared);
        let decision = self.consult_policy(&declared, authorized, content, request);

        // Editors are told about the declared paywall whatever the hook says
        if request.editor {
            return format!("{}{}", admin_notice(), body);
        }

        let (paywall_ids, authorized) = match decision {
            OverrideDecision::Abstain => (declared, authorized),
            OverrideDecision::Disable => {
                debug!(content_id = %content.id, "Paywall disabled by override");
                return body.to_string();
            }
            OverrideDecision::Force(ids) => {
                debug!(content_id = %content.id, ?ids, "Paywall ids replaced by override");
                let authorized = self.is_authorized(request, &ids);
                (ids, authorized)
            }
        };

        self.render(body, &paywall_ids, authorized, content, request)
    }

    fn consult_policy(
        &self,
        paywall_ids: &[String],
        authorized: bool,
        content: &ContentRef,
        request: &RequestContext,
    ) -> OverrideDecision {
        let ctx = OverrideContext {
            paywall_ids,
            authorized,
            content,
            request,
            settings: self.settings,
        };

        match self.policy.override_paywall(&ctx) {
            Ok(decision) => decision.normalize(),
            Err(e) => {
                error!(content_id = %content.id, "Paywall override ignored: {}", e);
                OverrideDecision::Abstain
            }
        }
    }

    fn render(
        &self,
        body: &str,
        paywall_ids: &[String],
        authorized: bool,
        content: &ContentRef,
        request: &RequestContext,
    ) -> String {
        let truncation = if self.settings.paywall_server_side_validation && !authorized {
            if request.has_pass() {
                TruncationState::InvalidPass
            } else {
                TruncationState::NoPass
            }
        } else {
            TruncationState::NotTruncated
        };

        let body = match truncation {
            TruncationState::NotTruncated => body.to_string(),
            _ => truncate_html(body, self.settings.paywall_snippet_size),
        };

        debug!(
            content_id = %content.id,
            authorized,
            truncated = truncation != TruncationState::NotTruncated,
            "Content gated"
        );

        if request.output == OutputContext::Feed {
            return body;
        }

        match self.settings.paywall_display_type {
            DisplayType::Samepage => {
                let script = format!(
                    "{}{}",
                    self.paywall_box(content, request),
                    samepage_script(paywall_ids)
                );
                format!(
                    "{}{}",
                    content_wrapper(&body, truncation),
                    self.policy.prepare_samepage_script(script)
                )
            }
            DisplayType::Redirect => format!(
                "{}{}",
                redirect_script(&self.settings.subscribe_url, paywall_ids),
                content_wrapper(&body, truncation)
            ),
        }
    }

    fn paywall_box(&self, content: &ContentRef, request: &RequestContext) -> String {
        let template = self.settings.paywall_box.trim();
        let inner = if template.is_empty() {
            warn!("Samepage display selected but no paywall box is configured");
            MISSING_BOX_PLACEHOLDER.to_string()
        } else {
            // The box must not gate itself
            let ctx = DirectiveContext::new(self, request, content).without_gating();
            directives::expand(template, &ctx)
        };
        paywall_box(self.settings.paywall_snippet_size, &inner)
    }
}
