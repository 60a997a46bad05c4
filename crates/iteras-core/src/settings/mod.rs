//! ============================================================================
//! Settings - Versioned paywall configuration
//! ============================================================================
//! Two shapes of the same data:
//! - `SettingsRecord`: what is persisted. Every field is optional because old
//!   records predate most of them; unknown fields ride along in `extra`.
//! - `Settings`: the resolved view with defaults filled in, read by the gate.
//!
//! Records are upgraded by the migrator before they are resolved, and every
//! save replaces the whole record and stamps the current version.
//! ============================================================================

mod migrate;
mod store;
mod version;

pub use migrate::{MigrationReport, SettingsMigrator};
pub use store::{MemorySettingsStore, SettingsStore};
pub use version::SchemaVersion;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::access::SigningKey;

/// Schema version written by this build
pub const CURRENT_VERSION: &str = "1.7.0";

/// Characters of content shown before the paywall
pub const DEFAULT_SNIPPET_SIZE: usize = 300;

/// Store key of the settings record
pub const SETTINGS_KEY: &str = "iteras_settings";

/// One paywall synced from ITERAS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaywallEntry {
    pub paywall_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaywallEntry {
    pub fn new(paywall_id: impl Into<String>) -> Self {
        Self {
            paywall_id: paywall_id.into(),
            extra: Map::new(),
        }
    }
}

/// How the paywall is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    /// Send unauthorized readers to the subscribe page
    #[default]
    Redirect,
    /// Truncate in place and show the paywall box
    Samepage,
}

impl DisplayType {
    /// Anything but "samepage" behaves as redirect
    pub fn from_setting(value: &str) -> Self {
        match value {
            "samepage" => DisplayType::Samepage,
            _ => DisplayType::Redirect,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayType::Redirect => "redirect",
            DisplayType::Samepage => "samepage",
        }
    }
}

/// Whether content is gated automatically or only through directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    #[default]
    Auto,
    Manual,
}

impl IntegrationMethod {
    pub fn from_setting(value: &str) -> Self {
        match value {
            "auto" => IntegrationMethod::Auto,
            _ => IntegrationMethod::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationMethod::Auto => "auto",
            IntegrationMethod::Manual => "manual",
        }
    }
}

// ============================================================================
// Persisted record
// ============================================================================

/// Settings as stored. Fields missing from old schema versions are `None`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    /// Single paywall id used before multi-paywall support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywalls: Option<Vec<PaywallEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_integration_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_server_side_validation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_display_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_box: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall_snippet_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Fields this build does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsRecord {
    /// Stored schema version; a record without one is version 0
    pub fn schema_version(&self) -> SchemaVersion {
        SchemaVersion::parse(self.version.as_deref().unwrap_or("0"))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl fmt::Debug for SettingsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsRecord")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("paywalls", &self.paywalls)
            .field("paywall_display_type", &self.paywall_display_type)
            .field("paywall_snippet_size", &self.paywall_snippet_size)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Settings with every default applied
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub signing_key: String,
    pub api_key: String,
    pub profile_name: String,
    pub paywall_id: String,
    pub subscribe_url: String,
    pub user_url: String,
    pub default_access: String,
    pub paywalls: Vec<PaywallEntry>,
    pub paywall_integration_method: IntegrationMethod,
    pub paywall_server_side_validation: bool,
    pub paywall_display_type: DisplayType,
    pub paywall_box: String,
    pub paywall_snippet_size: usize,
    pub version: String,
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            api_key: String::new(),
            profile_name: String::new(),
            paywall_id: String::new(),
            subscribe_url: String::new(),
            user_url: String::new(),
            default_access: String::new(),
            paywalls: Vec::new(),
            paywall_integration_method: IntegrationMethod::Auto,
            paywall_server_side_validation: true,
            paywall_display_type: DisplayType::Redirect,
            paywall_box: String::new(),
            paywall_snippet_size: DEFAULT_SNIPPET_SIZE,
            version: CURRENT_VERSION.to_string(),
            extra: Map::new(),
        }
    }
}

impl From<SettingsRecord> for Settings {
    fn from(record: SettingsRecord) -> Self {
        let defaults = Settings::default();
        Self {
            signing_key: record.signing_key.unwrap_or(defaults.signing_key),
            api_key: record.api_key.unwrap_or(defaults.api_key),
            profile_name: record.profile_name.unwrap_or(defaults.profile_name),
            paywall_id: record.paywall_id.unwrap_or(defaults.paywall_id),
            subscribe_url: record.subscribe_url.unwrap_or(defaults.subscribe_url),
            user_url: record.user_url.unwrap_or(defaults.user_url),
            default_access: record.default_access.unwrap_or(defaults.default_access),
            paywalls: record.paywalls.unwrap_or(defaults.paywalls),
            paywall_integration_method: record
                .paywall_integration_method
                .as_deref()
                .map(IntegrationMethod::from_setting)
                .unwrap_or(defaults.paywall_integration_method),
            paywall_server_side_validation: record
                .paywall_server_side_validation
                .unwrap_or(defaults.paywall_server_side_validation),
            paywall_display_type: record
                .paywall_display_type
                .as_deref()
                .map(DisplayType::from_setting)
                .unwrap_or(defaults.paywall_display_type),
            paywall_box: record.paywall_box.unwrap_or(defaults.paywall_box),
            paywall_snippet_size: record
                .paywall_snippet_size
                .unwrap_or(defaults.paywall_snippet_size),
            version: record.version.unwrap_or(defaults.version),
            extra: record.extra,
        }
    }
}

impl Settings {
    /// Full record for persistence
    pub fn to_record(&self) -> SettingsRecord {
        SettingsRecord {
            signing_key: Some(self.signing_key.clone()),
            api_key: Some(self.api_key.clone()),
            profile_name: Some(self.profile_name.clone()),
            paywall_id: Some(self.paywall_id.clone()),
            subscribe_url: Some(self.subscribe_url.clone()),
            user_url: Some(self.user_url.clone()),
            default_access: Some(self.default_access.clone()),
            paywalls: Some(self.paywalls.clone()),
            paywall_integration_method: Some(self.paywall_integration_method.as_str().to_string()),
            paywall_server_side_validation: Some(self.paywall_server_side_validation),
            paywall_display_type: Some(self.paywall_display_type.as_str().to_string()),
            paywall_box: Some(self.paywall_box.clone()),
            paywall_snippet_size: Some(self.paywall_snippet_size),
            version: Some(self.version.clone()),
            extra: self.extra.clone(),
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::new(self.signing_key.as_str())
    }

    /// Ids of all configured paywalls, falling back to the legacy single id
    pub fn paywall_ids(&self) -> Vec<String> {
        if self.paywalls.is_empty() {
            if self.paywall_id.is_empty() {
                Vec::new()
            } else {
                vec![self.paywall_id.clone()]
            }
        } else {
            self.paywalls.iter().map(|p| p.paywall_id.clone()).collect()
        }
    }

    /// Load the record, resolving to defaults when it is missing or unreadable.
    ///
    /// Defaults carry no signing key, so an unreadable store leaves every pass
    /// unauthorized while paywalls stay in force.
    pub fn load(store: &dyn SettingsStore) -> Settings {
        match store.load_record() {
            Ok(Some(record)) => record.into(),
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Failed to read settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Load the record, creating and persisting defaults on first activation
    pub fn load_or_init(store: &dyn SettingsStore) -> Result<Settings> {
        match store.load_record()? {
            Some(record) => Ok(record.into()),
            None => {
                let mut settings = Settings::default();
                settings.save(store)?;
                info!("Initialized default settings (v{})", CURRENT_VERSION);
                Ok(settings)
            }
        }
    }

    /// Stamp the current version and replace the stored record
    pub fn save(&mut self, store: &dyn SettingsStore) -> Result<()> {
        self.version = CURRENT_VERSION.to_string();
        store.invalidate_cache();
        store.save_record(&self.to_record())
    }

    /// Set a single field from its string form (admin edits)
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<()> {
        match field {
            "signing_key" => self.signing_key = value.to_string(),
            "api_key" => self.api_key = value.to_string(),
            "profile_name" => self.profile_name = value.to_string(),
            "paywall_id" => self.paywall_id = value.to_string(),
            "subscribe_url" => self.subscribe_url = value.to_string(),
            "user_url" => self.user_url = value.to_string(),
            "default_access" => self.default_access = value.to_string(),
            "paywalls" => {
                self.paywalls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(PaywallEntry::new)
                    .collect()
            }
            "paywall_integration_method" => {
                self.paywall_integration_method = IntegrationMethod::from_setting(value)
            }
            "paywall_server_side_validation" => {
                self.paywall_server_side_validation = parse_bool(value)?
            }
            "paywall_display_type" => self.paywall_display_type = DisplayType::from_setting(value),
            "paywall_box" => self.paywall_box = value.to_string(),
            "paywall_snippet_size" => {
                self.paywall_snippet_size = value
                    .trim()
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid snippet size '{}': {}", value, e))?
            }
            other => anyhow::bail!("Unknown settings field '{}'", other),
        }
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("signing_key", &self.signing_key())
            .field("paywalls", &self.paywalls)
            .field("paywall_integration_method", &self.paywall_integration_method)
            .field("paywall_server_side_validation", &self.paywall_server_side_validation)
            .field("paywall_display_type", &self.paywall_display_type)
            .field("paywall_snippet_size", &self.paywall_snippet_size)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid boolean '{}'", other),
    }
}
