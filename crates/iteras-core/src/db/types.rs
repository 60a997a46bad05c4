//! ============================================================================
//! Database Types - Summaries returned by IterasDb
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Overview of the database contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    /// Whether a settings record exists
    pub has_settings: bool,
    /// Schema version of the stored settings, if any
    pub settings_version: Option<String>,
    /// Content items with paywall metadata
    pub paywalled_content: usize,
    /// Content items still using the single-string form
    pub legacy_content: usize,
}

/// Outcome of converting stored content metadata to the multi-paywall form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaMigrationStats {
    pub kept: usize,
    pub updated: usize,
    pub removed: usize,
}
