//! ============================================================================
//! Access Module - Signed pass authorization for paywalled content
//! ============================================================================
//! A pass is issued by ITERAS and stored client-side in the `iteraspass`
//! cookie. It names the paywalls the bearer has access to and is signed with
//! the site's signing key.
//!
//! ## Pipeline
//! - **token**: split the wire format into fields
//! - **checker**: HMAC signature and expiry
//! - **gate**: map paywall ids to access levels, look for `sub`
//!
//! ## Usage
//! ```rust,ignore
//! use iteras_core::access::AccessGate;
//!
//! let gate = AccessGate::new();
//! let decision = gate.authorize(cookie.as_deref(), &["abc123".into()], &settings.signing_key());
//! ```
//! ============================================================================

mod checker;
mod gate;
mod token;
mod types;

pub use checker::{parse_expiry, PassChecker};
pub use gate::{grants_access, AccessGate};
pub use token::parse_pass;
pub use types::{
    AccessDecision, PassError, PassSignature, PassToken, SignatureAlgorithm, SigningKey,
    PASS_COOKIE, SUBSCRIBER_ACCESS,
};
