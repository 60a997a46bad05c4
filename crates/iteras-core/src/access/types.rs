//! ============================================================================
//! Access Types - Pass tokens, signing keys and verification errors
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cookie carrying the pass token
pub const PASS_COOKIE: &str = "iteraspass";

/// Access level that unlocks content for a paywall
pub const SUBSCRIBER_ACCESS: &str = "sub";

/// A pass token split into its signed data and signature.
///
/// `access_levels[i]` is the bearer's level for `paywall_ids[i]`; the parser
/// guarantees both sequences have the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassToken {
    /// Everything before the last `/`, exactly as signed
    pub data: String,
    pub access_levels: Vec<String>,
    pub paywall_ids: Vec<String>,
    /// Raw expiry string, parsed by the verifier
    pub expiry: String,
    pub signature: PassSignature,
}

impl PassToken {
    /// Iterate `(paywall_id, access_level)` pairs in token order
    pub fn grants(&self) -> impl Iterator<Item = (&str, &str)> {
        self.paywall_ids
            .iter()
            .map(String::as_str)
            .zip(self.access_levels.iter().map(String::as_str))
    }
}

/// `<algo>:<hmac_hex>` suffix of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSignature {
    pub algorithm: String,
    pub hmac_hex: String,
}

/// HMAC digests accepted for pass signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = PassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(SignatureAlgorithm::Sha1),
            "sha256" => Ok(SignatureAlgorithm::Sha256),
            other => Err(PassError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// HMAC key shared with the ITERAS service. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SigningKey(<empty>)")
        } else {
            f.write_str("SigningKey(<redacted>)")
        }
    }
}

impl From<&str> for SigningKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Why a pass was rejected. All variants mean "unauthorized" to the gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    #[error("Malformed pass: {0}")]
    MalformedToken(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("No signing key configured")]
    MissingSigningKey,

    #[error("Pass signature mismatch")]
    SignatureMismatch,

    #[error("Pass expired or expiry unreadable")]
    Expired,
}

impl PassError {
    /// Short label for logs, free of token contents
    pub fn kind(&self) -> &'static str {
        match self {
            PassError::MalformedToken(_) => "malformed",
            PassError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            PassError::MissingSigningKey => "missing_signing_key",
            PassError::SignatureMismatch => "signature_mismatch",
            PassError::Expired => "expired",
        }
    }
}

/// Outcome of an authorization check. Computed per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessDecision {
    pub authorized: bool,
}

impl AccessDecision {
    pub const DENIED: AccessDecision = AccessDecision { authorized: false };
    pub const GRANTED: AccessDecision = AccessDecision { authorized: true };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha1".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha1));
        assert_eq!("sha256".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha256));
        assert_eq!(
            "md5".parse::<SignatureAlgorithm>(),
            Err(PassError::UnsupportedAlgorithm("md5".into()))
        );
        // Case matters, like the service's own algorithm names
        assert!("SHA256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_signing_key_debug_is_redacted() {
        let key = SigningKey::new("super-secret");
        let printed = format!("{:?}", key);
        assert!(!printed.contains("super-secret"));
        assert_eq!(format!("{:?}", SigningKey::default()), "SigningKey(<empty>)");
    }

    #[test]
    fn test_grants_pairs_positionally() {
        let token = PassToken {
            data: "sub,user|a,b|2099-01-01".into(),
            access_levels: vec!["sub".into(), "user".into()],
            paywall_ids: vec!["a".into(), "b".into()],
            expiry: "2099-01-01".into(),
            signature: PassSignature {
                algorithm: "sha256".into(),
                hmac_hex: String::new(),
            },
        };
        let grants: Vec<_> = token.grants().collect();
        assert_eq!(grants, vec![("a", "sub"), ("b", "user")]);
    }
}
