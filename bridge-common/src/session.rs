//! Session and auth-profile record shapes (spec §3 "Data Model").
//!
//! These are the types persisted verbatim (as JSON) by `bridge-registry` and
//! passed across the IPC boundary. Nothing here ever carries secret material:
//! HTTP headers are represented only by a presence marker, the actual values
//! live in `bridge-secrets`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A transport descriptor: the tagged variant `{HTTP{...} | Stdio{...}}` from spec §4.3/§9.
///
/// Kept as a plain enum (not a trait object) per the "polymorphism" design
/// note in spec §9 — callers match on it, nothing here is dynamically
/// dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportDescriptor {
    Http {
        url: String,
        /// `true` if the session was configured with custom headers; the
        /// headers themselves live in the Secret Store, never here.
        #[serde(default)]
        headers_present: bool,
        #[serde(default = "crate::constants_default_timeout")]
        timeout_ms: u64,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl TransportDescriptor {
    /// A short label for logging (never includes the URL query or env values).
    pub fn label(&self) -> String {
        match self {
            TransportDescriptor::Http { url, .. } => format!("http({url})"),
            TransportDescriptor::Stdio { command, .. } => format!("stdio({command})"),
        }
    }
}

fn constants_default_timeout() -> u64 {
    crate::constants::DEFAULT_TIMEOUT_MS
}

/// Lifecycle status of a session record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Live,
    Crashed,
    Expired,
}

/// Per-kind `*/list_changed` notification timestamps (spec §3, §4.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChanged>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListChanged>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChanged>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListChanged {
    pub list_changed_at: DateTime<Utc>,
}

/// Host/port of an optional per-session proxy server (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub port: u16,
}

/// The recognized per-session configuration options (spec §6), held on the
/// record so the bridge daemon reads them without a separate config-file
/// layer (explicitly out of scope per spec §1/§10.3). Every field falls back
/// to its spec-mandated default when absent, so older records deserialize
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// List Cache TTL in milliseconds.
    pub ttl_ms: u64,
    /// Preemptive OAuth refresh window, in seconds before `expiresAt`.
    pub refresh_buffer_sec: u64,
    /// Total retry budget for the registry's advisory file lock.
    pub lock_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_ms: crate::constants::DEFAULT_TTL_MS,
            refresh_buffer_sec: crate::constants::DEFAULT_REFRESH_BUFFER_SEC,
            lock_timeout_ms: crate::constants::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// One record in `sessions.json`, keyed externally by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub transport: TransportDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub socket_path: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub notifications: NotificationTimestamps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_config: Option<ProxyConfig>,
    #[serde(default)]
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(name: impl Into<String>, transport: TransportDescriptor, socket_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            transport,
            profile_name: None,
            mcp_session_id: None,
            protocol_version: None,
            pid: None,
            socket_path: socket_path.into(),
            status: SessionStatus::Crashed,
            notifications: NotificationTimestamps::default(),
            proxy_config: None,
            config: SessionConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Invariant check from spec §3: `pid` set iff the bridge was alive as of
    /// the last consolidation.
    pub fn is_consistent(&self) -> bool {
        match (self.pid, self.status) {
            (Some(_), SessionStatus::Live) => true,
            (None, SessionStatus::Crashed | SessionStatus::Expired) => true,
            _ => false,
        }
    }
}

/// Authentication method for an auth profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Oauth,
    None,
}

/// Metadata for a named OAuth profile (spec §3). Tokens never live here —
/// only in `bridge-secrets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthProfileRecord {
    pub name: String,
    pub server_url: String,
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_issuer: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_record_round_trips_through_json() {
        let record = SessionRecord::new(
            "s1",
            TransportDescriptor::Http {
                url: "https://example.com/mcp".to_string(),
                headers_present: true,
                timeout_ms: 60_000,
            },
            "/tmp/bridges/s1.sock",
        );
        let json = serde_json::to_string(&record).unwrap();
        let parsed: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, record.name);
        assert_eq!(parsed.transport, record.transport);
    }

    #[test]
    fn consistency_invariant_catches_dangling_pid() {
        let mut record = SessionRecord::new(
            "s2",
            TransportDescriptor::Stdio {
                command: "true".into(),
                args: vec![],
                env: HashMap::new(),
            },
            "/tmp/bridges/s2.sock",
        );
        record.status = SessionStatus::Live;
        record.pid = None;
        assert!(!record.is_consistent());
        record.pid = Some(1234);
        assert!(record.is_consistent());
    }
}
