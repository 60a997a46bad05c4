//! ============================================================================
//! Pass Checker - HMAC signature and expiry verification
//! ============================================================================
//! Verifies that a parsed pass was signed with the configured key and has not
//! expired. Time comes from an injected `Clock`.
//! ============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::sync::Arc;

use super::types::{PassError, PassToken, SignatureAlgorithm, SigningKey};
use crate::clock::{Clock, SystemClock};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Verifies pass signatures and expiry
#[derive(Clone)]
pub struct PassChecker {
    clock: Arc<dyn Clock>,
}

impl PassChecker {
    /// Checker backed by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Checker with a custom time source
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Verify signature, then expiry. An empty key always fails.
    pub fn verify(&self, token: &PassToken, key: &SigningKey) -> Result<(), PassError> {
        let algorithm: SignatureAlgorithm = token.signature.algorithm.parse()?;

        if key.is_empty() {
            return Err(PassError::MissingSigningKey);
        }

        let expected =
            hex::decode(&token.signature.hmac_hex).map_err(|_| PassError::SignatureMismatch)?;
        if !hmac_matches(algorithm, key, token.data.as_bytes(), &expected) {
            return Err(PassError::SignatureMismatch);
        }

        let expiry = parse_expiry(&token.expiry).ok_or(PassError::Expired)?;
        if expiry < self.clock.now() {
            return Err(PassError::Expired);
        }

        Ok(())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for PassChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Constant-time HMAC comparison
fn hmac_matches(algorithm: SignatureAlgorithm, key: &SigningKey, data: &[u8], expected: &[u8]) -> bool {
    match algorithm {
        SignatureAlgorithm::Sha1 => match HmacSha1::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
            Err(_) => false,
        },
        SignatureAlgorithm::Sha256 => match HmacSha256::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Parse the expiry field of a pass.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS` (UTC), bare dates
/// (midnight UTC) and `@<unix seconds>`.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(secs) = raw.strip_prefix('@') {
        return secs
            .parse::<i64>()
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::token::parse_pass;
    use crate::clock::FixedClock;

    const KEY: &str = "s3cret";

    fn sign(algorithm: &str, data: &str, key: &str) -> String {
        let digest = match algorithm {
            "sha1" => {
                let mut mac = HmacSha1::new_from_slice(key.as_bytes()).unwrap();
                mac.update(data.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            _ => {
                let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
                mac.update(data.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };
        format!("{}/{}:{}", data, algorithm, hex::encode(digest))
    }

    fn checker_at(rfc3339: &str) -> PassChecker {
        let now = DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
        PassChecker::with_clock(Arc::new(FixedClock(now)))
    }

    #[test]
    fn test_valid_sha256_pass() {
        let pass = sign("sha256", "sub|abc123|2099-01-01T00:00:00Z", KEY);
        let token = parse_pass(&pass).unwrap();
        assert_eq!(checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()), Ok(()));
    }

    #[test]
    fn test_valid_sha1_pass() {
        let pass = sign("sha1", "sub|abc123|2099-01-01", KEY);
        let token = parse_pass(&pass).unwrap();
        assert_eq!(checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()), Ok(()));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let pass = sign("sha256", "sub|abc123|2099-01-01", KEY);
        let token = parse_pass(&pass).unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &"other".into()),
            Err(PassError::SignatureMismatch)
        );
    }

    #[test]
    fn test_empty_key_fails_closed() {
        let pass = sign("sha256", "sub|abc123|2099-01-01", "");
        let token = parse_pass(&pass).unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &SigningKey::default()),
            Err(PassError::MissingSigningKey)
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let token = parse_pass("sub|abc|2099-01-01/md5:00").unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()),
            Err(PassError::UnsupportedAlgorithm("md5".into()))
        );
    }

    #[test]
    fn test_non_hex_signature_is_mismatch() {
        let token = parse_pass("sub|abc|2099-01-01/sha256:not-hex").unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()),
            Err(PassError::SignatureMismatch)
        );
    }

    #[test]
    fn test_expired_pass() {
        let pass = sign("sha256", "sub|abc|2020-01-01T00:00:00Z", KEY);
        let token = parse_pass(&pass).unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()),
            Err(PassError::Expired)
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let pass = sign("sha256", "sub|abc|2024-06-01T00:00:00Z", KEY);
        let token = parse_pass(&pass).unwrap();
        assert!(checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()).is_ok());
        assert_eq!(
            checker_at("2024-06-01T00:00:01Z").verify(&token, &KEY.into()),
            Err(PassError::Expired)
        );
    }

    #[test]
    fn test_unreadable_expiry() {
        let pass = sign("sha256", "sub|abc|next tuesday", KEY);
        let token = parse_pass(&pass).unwrap();
        assert_eq!(
            checker_at("2024-06-01T00:00:00Z").verify(&token, &KEY.into()),
            Err(PassError::Expired)
        );
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = DateTime::parse_from_rfc3339("2030-05-04T03:02:01Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_expiry("2030-05-04T03:02:01Z"), Some(expected));
        assert_eq!(parse_expiry("2030-05-04T05:02:01+02:00"), Some(expected));
        assert_eq!(parse_expiry("2030-05-04 03:02:01"), Some(expected));
        assert_eq!(parse_expiry("2030-05-04T03:02:01"), Some(expected));
        assert_eq!(
            parse_expiry("2030-05-04").map(|d| d.to_rfc3339()),
            Some("2030-05-04T00:00:00+00:00".to_string())
        );
        assert_eq!(parse_expiry("@0").map(|d| d.timestamp()), Some(0));
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("tomorrow"), None);
    }
}
