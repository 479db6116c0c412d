//! `mcp-bridge`: a CLI client for the Model Context Protocol backed by a
//! per-session bridge daemon (spec §1). Every invocation resolves the
//! bridge home directory, runs a non-destructive consolidation pass, then
//! dispatches one subcommand and reports its result with the spec's exit
//! code taxonomy (spec §6/§7).

mod cli;
mod commands;
mod error;

use bridge_common::BridgeError;
use bridge_registry::{HomeProvider, OsHomeProvider};
use clap::Parser;
use cli::{Cli, Command};
use commands::Context;
use serde_json::Value;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let home = cli.home.clone().unwrap_or_else(|| OsHomeProvider.home_dir());
    let ctx = Context::new(home);
    ctx.startup_consolidate();

    let result = dispatch(&ctx, cli.command).await;
    report(result, cli.json, cli.verbose)
}

async fn dispatch(ctx: &Context, command: Command) -> Result<Value, BridgeError> {
    match command {
        Command::Connect {
            name,
            url,
            timeout_ms,
            headers,
            command,
            args,
            env,
            profile,
            ttl_ms,
            proxy_port,
            proxy_bearer,
        } => {
            commands::connect(
                ctx,
                commands::ConnectArgs {
                    name,
                    url,
                    timeout_ms,
                    headers,
                    command,
                    args,
                    env,
                    profile,
                    ttl_ms,
                    proxy_port,
                    proxy_bearer,
                },
            )
            .await
        }
        Command::Close { name } => commands::close(ctx, &name).await,
        Command::Restart { name } => commands::restart(ctx, &name).await,
        Command::Clean => commands::clean(ctx),
        Command::Status { name } => commands::status(ctx, name),
        Command::Ping { name } => commands::ping(ctx, &name).await,
        Command::ToolsList { name } => commands::tools_list(ctx, &name).await,
        Command::ToolsCall { name, tool, arguments } => commands::tools_call(ctx, &name, &tool, arguments).await,
        Command::ResourcesList { name } => commands::resources_list(ctx, &name).await,
        Command::ResourcesRead { name, uri } => commands::resources_read(ctx, &name, &uri).await,
        Command::ResourceTemplatesList { name } => commands::resource_templates_list(ctx, &name).await,
        Command::ResourcesSubscribe { name, uri } => commands::resources_subscribe(ctx, &name, &uri).await,
        Command::ResourcesUnsubscribe { name, uri } => commands::resources_unsubscribe(ctx, &name, &uri).await,
        Command::PromptsList { name } => commands::prompts_list(ctx, &name).await,
        Command::PromptsGet { name, prompt, arguments } => commands::prompts_get(ctx, &name, &prompt, arguments).await,
        Command::SetLoggingLevel { name, level } => commands::set_logging_level(ctx, &name, &level).await,
        Command::ServerInfo { name } => commands::server_info(ctx, &name).await,
        Command::ProfileLogin {
            server_url,
            name,
            client_id,
            client_secret,
            access_token,
            refresh_token,
            expires_in,
            scope,
            oauth_issuer,
        } => commands::profile_login(
            ctx,
            commands::ProfileLoginArgs {
                server_url,
                name,
                client_id,
                client_secret,
                access_token,
                refresh_token,
                expires_in,
                scope,
                oauth_issuer,
            },
        ),
        Command::ProfileList { server_url } => commands::profile_list(ctx, &server_url),
        Command::ProfileDelete { server_url, name } => commands::profile_delete(ctx, &server_url, &name),
    }
}

/// Renders the dispatch outcome and returns the spec's exit code (spec §6:
/// 0 success, 1 client error, 2 auth error, 3 network error, 4 session
/// expired). In `--json` mode both success and failure are one JSON line
/// on stdout so scripts never have to branch on the stream; in human mode
/// a failure goes to stderr with `error: <message>`.
fn report(result: Result<Value, BridgeError>, json: bool, verbose: bool) -> ExitCode {
    match result {
        Ok(value) => {
            if json {
                println!("{}", serde_json::json!({ "result": value }));
            } else {
                println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "error": { "kind": err.kind.to_string(), "message": err.message } })
                );
            } else {
                eprintln!("error: {}", err.message);
                if verbose {
                    eprintln!("  kind: {}", err.kind);
                }
            }
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Logs to stderr only (spec §10.1): unlike the bridge daemon, this process
/// has no per-session log file of its own to write to.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .try_init();
}
