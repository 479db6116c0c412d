//! Command-line surface for `mcp-bridge` (spec §1 "thin glue", §10.3).
//!
//! This is deliberately minimal: argument parsing, `key:=value`-style dynamic
//! tool arguments, and output formatting are named in spec §1/§9 as external
//! collaborators out of scope for the core. What's here exists only so the
//! session-bridge subsystem is exercisable end to end from a terminal —
//! every subcommand is a thin wrapper around one `bridge-manager` or
//! `bridge-ipc` call.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A CLI client for the Model Context Protocol: connects to MCP servers
/// over HTTP+SSE or stdio through a per-session bridge daemon, and routes
/// subsequent invocations to that daemon over a local IPC socket.
#[derive(Parser, Debug)]
#[command(name = "mcp-bridge")]
#[command(version, about)]
pub struct Cli {
    /// Bridge home directory holding `sessions.json`/`auth-profiles.json`/
    /// `bridges/`. Defaults to the OS config directory's `mcp-bridge`
    /// subdirectory.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Emit `{result: ...}` / `{error: {code, message}}` JSON to stdout
    /// instead of a human-readable line on stderr (spec §7).
    #[arg(long, global = true)]
    pub json: bool,

    /// On a human-mode error, also print the source chain.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a session and bring its bridge up (spec §4.1, §4.7).
    Connect {
        /// Session name; alphanumerics and `-` only (spec §3).
        name: String,

        /// HTTP+SSE transport: the server's MCP endpoint URL. Mutually
        /// exclusive with `--command`.
        #[arg(long)]
        url: Option<String>,

        /// Per-call timeout in milliseconds for the HTTP transport (spec §6 `timeoutMs`).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// HTTP header to send with every request, `Key: Value` (repeatable).
        /// Stored only in the Secret Store, never in `sessions.json` (spec §3).
        #[arg(long = "header")]
        headers: Vec<String>,

        /// stdio transport: the child command to spawn. Mutually exclusive
        /// with `--url`.
        #[arg(long)]
        command: Option<String>,

        /// Arguments passed to `--command`.
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Environment variable for the stdio child, `KEY=VALUE` (repeatable).
        #[arg(long = "env")]
        env: Vec<String>,

        /// Name of a previously registered OAuth auth profile to authenticate
        /// HTTP requests with (spec §3 `profileName`).
        #[arg(long)]
        profile: Option<String>,

        /// List Cache TTL in milliseconds (spec §6 `ttlMs`).
        #[arg(long)]
        ttl_ms: Option<u64>,

        /// Start a local proxy server re-exposing this session (spec §4.9).
        #[arg(long)]
        proxy_port: Option<u16>,

        /// Bearer token the proxy requires. If `--proxy-port` is set and this
        /// is omitted, a random token is generated and printed once.
        #[arg(long)]
        proxy_bearer: Option<String>,
    },

    /// Gracefully stop a session's bridge and remove it from the registry
    /// (spec §3 "removed by close").
    Close {
        name: String,
    },

    /// Stop a session's bridge and spawn a fresh one, clearing `expired`
    /// status (spec §8 scenario 3).
    Restart {
        name: String,
    },

    /// Sweep the registry: clear dangling `pid`s for dead bridges and
    /// remove `expired` sessions (spec §4.1 `consolidate(cleanExpired: true)`).
    Clean,

    /// Show one session's record, or every session if `name` is omitted.
    Status {
        name: Option<String>,
    },

    /// Round-trip an MCP `ping` through the session's bridge.
    Ping {
        name: String,
    },

    /// List the server's tools (cached; spec §4.6).
    ToolsList {
        name: String,
    },

    /// Call a tool. `arguments` is a raw JSON object string, e.g. `{"a":1}`.
    ToolsCall {
        name: String,
        tool: String,
        #[arg(long)]
        arguments: Option<String>,
    },

    /// List the server's resources (cached; spec §4.6).
    ResourcesList {
        name: String,
    },

    /// Read one resource by URI.
    ResourcesRead {
        name: String,
        uri: String,
    },

    /// List the server's resource templates (cached; spec §4.6).
    ResourceTemplatesList {
        name: String,
    },

    /// Subscribe to a resource's update notifications.
    ResourcesSubscribe {
        name: String,
        uri: String,
    },

    /// Unsubscribe from a resource's update notifications.
    ResourcesUnsubscribe {
        name: String,
        uri: String,
    },

    /// List the server's prompts (cached; spec §4.6).
    PromptsList {
        name: String,
    },

    /// Get a prompt. `arguments` is a raw JSON object string.
    PromptsGet {
        name: String,
        prompt: String,
        #[arg(long)]
        arguments: Option<String>,
    },

    /// Set the upstream server's logging verbosity.
    SetLoggingLevel {
        name: String,
        /// One of the MCP logging levels (e.g. `debug`, `info`, `warning`, `error`).
        level: String,
    },

    /// Print the negotiated protocol version, server capabilities, server
    /// version, and server instructions (spec §4.5 `initialize`).
    ServerInfo {
        name: String,
    },

    /// Register an already-issued OAuth token triple under a named profile
    /// (spec §4.4; the authorization-code+PKCE flow that issues a first
    /// token is an external collaborator's job, out of scope here — this
    /// just provisions the triple the token manager subsequently keeps
    /// warm).
    ProfileLogin {
        server_url: String,
        name: String,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: Option<String>,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Seconds until the access token expires.
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        oauth_issuer: Option<String>,
    },

    /// List auth profiles registered for a server URL.
    ProfileList {
        server_url: String,
    },

    /// Delete an auth profile's metadata and its Secret Store credentials.
    ProfileDelete {
        server_url: String,
        name: String,
    },
}

