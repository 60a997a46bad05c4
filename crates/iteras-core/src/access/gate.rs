//! ============================================================================
//! Access Gate - Pass authorization against requested paywalls
//! ============================================================================
//! Runs parse → verify → access mapping and folds every failure into a plain
//! "unauthorized" decision. Nothing is cached: the pass is request-scoped.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::checker::PassChecker;
use super::token::parse_pass;
use super::types::{AccessDecision, PassError, PassToken, SigningKey, SUBSCRIBER_ACCESS};
use crate::clock::Clock;

/// Decides whether a pass unlocks any of the requested paywalls
#[derive(Clone, Default)]
pub struct AccessGate {
    checker: PassChecker,
}

impl AccessGate {
    /// Gate using the system clock
    pub fn new() -> Self {
        Self {
            checker: PassChecker::new(),
        }
    }

    /// Gate with a custom time source
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            checker: PassChecker::with_clock(clock),
        }
    }

    pub fn checker(&self) -> &PassChecker {
        &self.checker
    }

    /// Authorize an optional pass against the requested paywall ids.
    ///
    /// An empty request is never authorized; callers must treat that case as
    /// "gating not applicable" before acting on the decision.
    pub fn authorize(
        &self,
        pass: Option<&str>,
        requested: &[String],
        key: &SigningKey,
    ) -> AccessDecision {
        let Some(raw) = pass else {
            return AccessDecision::DENIED;
        };

        match self.check_pass(raw, requested, key) {
            Ok(authorized) => AccessDecision { authorized },
            Err(e) => {
                debug!("Pass rejected: {}", e.kind());
                AccessDecision::DENIED
            }
        }
    }

    /// Like `authorize`, but keeps the failure reason for diagnostics
    pub fn check_pass(
        &self,
        raw: &str,
        requested: &[String],
        key: &SigningKey,
    ) -> Result<bool, PassError> {
        if requested.is_empty() {
            return Ok(false);
        }

        let token = parse_pass(raw)?;
        self.checker.verify(&token, key)?;
        Ok(grants_access(&token, requested))
    }
}

/// True iff some requested paywall maps to subscriber access in the pass.
/// When a paywall id repeats inside the pass, its first level wins.
pub fn grants_access(token: &PassToken, requested: &[String]) -> bool {
    let mut levels: HashMap<&str, &str> = HashMap::with_capacity(token.paywall_ids.len());
    for (paywall_id, level) in token.grants() {
        levels.entry(paywall_id).or_insert(level);
    }

    requested
        .iter()
        .any(|id| levels.get(id.as_str()) == Some(&SUBSCRIBER_ACCESS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const KEY: &str = "gate-key";

    fn sign(data: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(KEY.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        format!("{}/sha256:{}", data, hex::encode(mac.finalize().into_bytes()))
    }

    fn gate() -> AccessGate {
        AccessGate::with_clock(Arc::new(FixedClock::at_timestamp(1_717_200_000)))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subscriber_access_granted() {
        let pass = sign("sub|abc123|2099-01-01T00:00:00Z");
        let decision = gate().authorize(Some(&pass), &ids(&["abc123"]), &KEY.into());
        assert!(decision.authorized);
    }

    #[test]
    fn test_other_paywall_denied() {
        let pass = sign("sub|abc123|2099-01-01T00:00:00Z");
        let decision = gate().authorize(Some(&pass), &ids(&["xyz789"]), &KEY.into());
        assert!(!decision.authorized);
    }

    #[test]
    fn test_any_requested_paywall_suffices() {
        let pass = sign("user,sub|abc,def|2099-01-01");
        assert!(gate().authorize(Some(&pass), &ids(&["abc", "def"]), &KEY.into()).authorized);
        assert!(!gate().authorize(Some(&pass), &ids(&["abc"]), &KEY.into()).authorized);
    }

    #[test]
    fn test_non_subscriber_level_denied() {
        let pass = sign("user|abc|2099-01-01");
        assert!(!gate().authorize(Some(&pass), &ids(&["abc"]), &KEY.into()).authorized);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let pass = sign("user,sub|abc,abc|2099-01-01");
        assert!(!gate().authorize(Some(&pass), &ids(&["abc"]), &KEY.into()).authorized);

        let pass = sign("sub,user|abc,abc|2099-01-01");
        assert!(gate().authorize(Some(&pass), &ids(&["abc"]), &KEY.into()).authorized);
    }

    #[test]
    fn test_empty_request_is_not_authorized() {
        let pass = sign("sub|abc|2099-01-01");
        assert_eq!(gate().check_pass(&pass, &[], &KEY.into()), Ok(false));
    }

    #[test]
    fn test_missing_pass_denied() {
        assert!(!gate().authorize(None, &ids(&["abc"]), &KEY.into()).authorized);
    }

    #[test]
    fn test_failures_fold_into_denied() {
        let gate = gate();
        let requested = ids(&["abc"]);
        for pass in ["garbage", "sub|abc|2099-01-01/rot13:00", "sub|abc|2099-01-01/sha256:00"] {
            assert!(!gate.authorize(Some(pass), &requested, &KEY.into()).authorized);
        }
        let pass = sign("sub|abc|2099-01-01");
        assert!(!gate.authorize(Some(&pass), &requested, &SigningKey::default()).authorized);
    }

    #[test]
    fn test_check_pass_reports_reason() {
        let pass = sign("sub|abc|2001-01-01");
        assert_eq!(
            gate().check_pass(&pass, &ids(&["abc"]), &KEY.into()),
            Err(PassError::Expired)
        );
    }
}
