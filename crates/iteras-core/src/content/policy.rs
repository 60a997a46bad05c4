//! ============================================================================
//! Paywall Override - Site-level policy hooks
//! ============================================================================
//! Sites can plug in a policy to change gating per request:
//! - Abstain: keep the content's declared paywall ids
//! - Disable: serve the content without any paywall
//! - Force: gate by a different id set (empty means disable)
//!
//! A policy that fails is logged and treated as abstaining, so a broken hook
//! never serves content the declaration would have protected.
//! ============================================================================

use thiserror::Error;

use super::{ContentRef, RequestContext};
use crate::settings::Settings;

/// What a policy decided for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverrideDecision {
    #[default]
    Abstain,
    Disable,
    Force(Vec<String>),
}

impl OverrideDecision {
    /// Normalized form: forcing an empty set is the same as disabling
    pub fn normalize(self) -> Self {
        match self {
            OverrideDecision::Force(ids) if ids.is_empty() => OverrideDecision::Disable,
            other => other,
        }
    }
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Policy contract violation: {0}")]
    ContractViolation(String),

    #[error("Policy failed: {0}")]
    Failed(String),
}

/// Inputs visible to a policy
#[derive(Debug, Clone, Copy)]
pub struct OverrideContext<'a> {
    /// Paywall ids declared by the content
    pub paywall_ids: &'a [String],
    /// Whether the bearer's pass covers the declared ids
    pub authorized: bool,
    pub content: &'a ContentRef,
    pub request: &'a RequestContext,
    pub settings: &'a Settings,
}

/// Site hook into the gating pipeline
pub trait PaywallOverride: Send + Sync {
    fn override_paywall(&self, _ctx: &OverrideContext<'_>) -> Result<OverrideDecision, HookError> {
        Ok(OverrideDecision::Abstain)
    }

    /// Rewrite the samepage box and script before they are emitted
    fn prepare_samepage_script(&self, script: String) -> String {
        script
    }
}

/// Policy that never interferes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverride;

impl PaywallOverride for NoOverride {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_empty_normalizes_to_disable() {
        assert_eq!(OverrideDecision::Force(vec![]).normalize(), OverrideDecision::Disable);
        assert_eq!(
            OverrideDecision::Force(vec!["a".into()]).normalize(),
            OverrideDecision::Force(vec!["a".into()])
        );
        assert_eq!(OverrideDecision::Abstain.normalize(), OverrideDecision::Abstain);
    }

    #[test]
    fn test_no_override_abstains() {
        let settings = Settings::default();
        let content = ContentRef::new("post-1");
        let request = RequestContext::default();
        let ids = vec!["abc".to_string()];
        let ctx = OverrideContext {
            paywall_ids: &ids,
            authorized: false,
            content: &content,
            request: &request,
            settings: &settings,
        };
        assert_eq!(NoOverride.override_paywall(&ctx).unwrap(), OverrideDecision::Abstain);
        assert_eq!(NoOverride.prepare_samepage_script("x".into()), "x");
    }
}
