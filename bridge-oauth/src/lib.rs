//! # Bridge OAuth
//!
//! The OAuth Token Manager (spec §4.4): authorization-server discovery via
//! well-known metadata documents, the refresh-grant flow, preemptive
//! refresh ahead of expiry, and persistence of renewed tokens back through
//! `bridge-secrets`.

pub mod discovery;
pub mod error;
pub mod manager;

pub use discovery::discover_token_endpoint;
pub use error::OAuthError;
pub use manager::{OAuthTokenManager, ProfileRefreshObserver, REFRESH_BUFFER_SEC};
