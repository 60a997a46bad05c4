//! ============================================================================
//! Pass Token Parser
//! ============================================================================
//! Wire format: `<levels_csv>|<paywall_ids_csv>|<expiry>/<algo>:<hmac_hex>`
//!
//! The signature starts after the *last* `/` so expiry strings may contain
//! slashes. Parsing is purely structural; nothing is verified here.
//! ============================================================================

use super::types::{PassError, PassSignature, PassToken};

/// Parse a raw pass string into its fields
pub fn parse_pass(raw: &str) -> Result<PassToken, PassError> {
    let (data, sig) = raw
        .rsplit_once('/')
        .ok_or_else(|| PassError::MalformedToken("missing signature delimiter '/'".into()))?;

    let (algorithm, hmac_hex) = sig
        .split_once(':')
        .ok_or_else(|| PassError::MalformedToken("missing ':' in signature".into()))?;

    let parts: Vec<&str> = data.split('|').collect();
    if parts.len() != 3 {
        return Err(PassError::MalformedToken(format!(
            "expected 3 '|'-separated fields, found {}",
            parts.len()
        )));
    }

    let access_levels = split_csv(parts[0]);
    let paywall_ids = split_csv(parts[1]);
    if access_levels.len() != paywall_ids.len() {
        return Err(PassError::MalformedToken(format!(
            "{} access levels for {} paywall ids",
            access_levels.len(),
            paywall_ids.len()
        )));
    }

    Ok(PassToken {
        data: data.to_string(),
        access_levels,
        paywall_ids,
        expiry: parts[2].to_string(),
        signature: PassSignature {
            algorithm: algorithm.to_string(),
            hmac_hex: hmac_hex.to_string(),
        },
    })
}

fn split_csv(field: &str) -> Vec<String> {
    field.split(',').map(str::to_string).collect()
}
