//! # Bridge Registry
//!
//! File-backed persistence for session and auth-profile records (spec §4.1),
//! shared across every CLI invocation and the bridge daemons themselves.
//! Every mutation takes an advisory whole-file lock and writes via
//! tempfile-then-rename, so a reader never observes a partial file.

pub mod auth_profiles;
pub mod error;
pub mod home;
pub mod lock;
pub mod sessions;

pub use auth_profiles::AuthProfileRegistry;
pub use error::RegistryError;
pub use home::{FixedHomeProvider, HomeProvider, OsHomeProvider};
pub use sessions::{ConsolidateReport, SessionPatch, SessionRegistry};
