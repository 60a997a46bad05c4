//! ============================================================================
//! ITERAS-CORE: Paywall gating for ITERAS subscriptions
//! ============================================================================
//! This crate handles the server side of the ITERAS paywall integration:
//! - Signed pass parsing and verification (HMAC sha1/sha256, expiry)
//! - Paywall access evaluation and content gating
//! - Versioned settings with an ordered migration chain
//! - Embedded redb storage for settings and per-content paywall metadata
//! - Authoring directives that expand to widget scripts
//! ============================================================================

pub mod access;
pub mod clock;
pub mod content;
pub mod db;
pub mod directives;
pub mod settings;

// Re-export main types for convenience
pub use access::{AccessDecision, AccessGate, PassChecker, PassError, PassToken, SigningKey};
pub use clock::{Clock, FixedClock, SystemClock};
pub use content::{
    ContentGate, ContentRef, HookError, NoOverride, OutputContext, OverrideDecision,
    PaywallMeta, PaywallOverride, RequestContext,
};
pub use db::IterasDb;
pub use directives::{expand, DirectiveContext};
pub use settings::{Settings, SettingsMigrator, SettingsRecord, SettingsStore};
