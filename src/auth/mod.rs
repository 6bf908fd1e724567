//! User-interactive authentication (UIA).
//!
//! [`interactive_auth::InteractiveAuth`] drives the multi-stage negotiation;
//! [`sso`] handles the popup-based SSO and fallback-web stages; [`types`]
//! holds the wire payloads and error taxonomy.

pub mod interactive_auth;
pub mod sso;
pub mod types;
