//! Default values for the recognized per-session configuration options (spec §6).

/// Default List Cache TTL in milliseconds (5 minutes).
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default preemptive token-refresh window, in seconds before `expiresAt`.
pub const DEFAULT_REFRESH_BUFFER_SEC: u64 = 60;

/// Default total retry budget for the registry's advisory file lock.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for a single IPC request/response round trip.
pub const DEFAULT_IPC_TIMEOUT_MS: u64 = 30_000;

/// Timeout the Bridge Manager allows a freshly spawned bridge to announce readiness.
pub const BRIDGE_SPAWN_READY_TIMEOUT_MS: u64 = 10_000;

/// Liveness probe timeout used by `ensureBridgeHealthy`'s ping.
pub const BRIDGE_PING_TIMEOUT_MS: u64 = 500;

/// Grace period `stopBridge` waits for an acknowledged `shutdown` before SIGTERM.
pub const STOP_GRACE_SIGTERM_MS: u64 = 2_000;

/// Grace period `stopBridge` waits after SIGTERM before SIGKILL.
pub const STOP_GRACE_SIGKILL_MS: u64 = 3_000;

/// Name of the session registry file, relative to the bridge home directory.
pub const SESSIONS_FILE: &str = "sessions.json";

/// Name of the auth profile registry file, relative to the bridge home directory.
pub const AUTH_PROFILES_FILE: &str = "auth-profiles.json";

/// Subdirectory under the bridge home directory holding IPC sockets.
pub const BRIDGES_DIR: &str = "bridges";

/// Subdirectory under `bridges/` holding spawned bridges' stdout/stderr logs.
pub const BRIDGE_LOGS_DIR: &str = "logs";
