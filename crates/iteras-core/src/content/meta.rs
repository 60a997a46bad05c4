//! Per-content paywall declaration.
//!
//! Older content stores a single string ("user"/"sub" meaning "all configured
//! paywalls"); newer content stores an explicit list of ids.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Legacy markers meaning "apply every configured paywall"
const LEGACY_ALL_PAYWALLS: [&str; 2] = ["user", "sub"];

/// Paywall metadata attached to a piece of content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaywallMeta {
    /// Explicit paywall ids (may be empty: not paywalled)
    Ids(Vec<String>),
    /// Single-string form from before multi-paywall support
    Legacy(String),
    #[default]
    Absent,
}

impl PaywallMeta {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PaywallMeta::Ids(ids.into_iter().map(Into::into).collect())
    }

    /// Paywall ids this content is gated by
    pub fn resolve(&self, settings: &Settings) -> Vec<String> {
        match self {
            PaywallMeta::Ids(ids) => ids.clone(),
            PaywallMeta::Legacy(marker) if LEGACY_ALL_PAYWALLS.contains(&marker.as_str()) => {
                settings.paywall_ids()
            }
            PaywallMeta::Legacy(_) | PaywallMeta::Absent => Vec::new(),
        }
    }

    /// How this declaration converts to the multi-paywall form
    pub fn upgrade(&self, all_paywall_ids: &[String]) -> MetaUpgrade {
        match self {
            PaywallMeta::Absent | PaywallMeta::Ids(_) => MetaUpgrade::Keep,
            PaywallMeta::Legacy(marker) if LEGACY_ALL_PAYWALLS.contains(&marker.as_str()) => {
                MetaUpgrade::Set(all_paywall_ids.to_vec())
            }
            PaywallMeta::Legacy(marker) if marker.is_empty() => MetaUpgrade::Set(Vec::new()),
            PaywallMeta::Legacy(_) => MetaUpgrade::Remove,
        }
    }
}

/// Result of upgrading one content declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaUpgrade {
    Keep,
    Set(Vec<String>),
    Remove,
}
