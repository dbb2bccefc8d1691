//! # fanrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start two demo servers
//! fanrpc serve -b 127.0.0.1:9001
//! fanrpc serve -b 127.0.0.1:9002
//!
//! # Call one of them, round-robin (outputs raw JSON)
//! fanrpc call -s tcp@127.0.0.1:9001 -s tcp@127.0.0.1:9002 --mode round-robin Arith.Sum -a '{"a": 1, "b": 2}'
//!
//! # Call all of them, using a registry for discovery
//! FANRPC_REGISTRY=http://127.0.0.1:9999/_fanrpc_/registry fanrpc broadcast Echo.Echo -a '"hi"'
//! ```
//!
//! ## Address Format
//!
//! Server addresses are `protocol@host:port`:
//! - `tcp@127.0.0.1:9001` (a bare `127.0.0.1:9001` means the same)
//! - `http@127.0.0.1:8080` for JSON-RPC over HTTP

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use fanrpc_client::{
    DialOptions, Discovery, Dispatcher, RegistryConfig, RegistryDiscovery, SelectMode, StaticDiscovery,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Environment variable read when `--registry` is not given
const REGISTRY_ENV: &str = "FANRPC_REGISTRY";

#[derive(FromArgs)]
/// fanrpc - discovery-aware RPC client
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Broadcast(BroadcastArgs),
    Serve(ServeArgs),
}

/// Arguments for calling one server.
///
/// The server is picked by `--mode` among the servers given with `-s`, or
/// among those listed by the registry. The reply is printed as raw JSON so
/// it can be piped to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method on one server picked by discovery
struct CallArgs {
    /// server address (repeatable), e.g. tcp@127.0.0.1:9001
    #[argh(option, short = 's', long = "server")]
    servers: Vec<String>,

    /// registry URL to discover servers from (falls back to $FANRPC_REGISTRY)
    #[argh(option)]
    registry: Option<String>,

    /// selection mode: random or round-robin
    #[argh(option, default = "SelectMode::Random")]
    mode: SelectMode,

    /// name of the method to call, as Service.Method
    #[argh(positional)]
    method: String,

    /// arguments for the method, as JSON
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    /// connect timeout in milliseconds
    #[argh(option, long = "connect-timeout-ms", default = "10000")]
    connect_timeout_ms: u64,

    /// per-call timeout in milliseconds (none by default)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// how long a registry list stays fresh, in seconds
    #[argh(option, long = "registry-ttl-secs", default = "10")]
    registry_ttl_secs: u64,
}

/// Arguments for broadcasting to every server.
///
/// Every discovered server is called concurrently. One successful reply is
/// printed; the command fails only if every server failed.
#[derive(FromArgs)]
#[argh(subcommand, name = "broadcast")]
/// call a method on every discovered server
struct BroadcastArgs {
    /// server address (repeatable), e.g. tcp@127.0.0.1:9001
    #[argh(option, short = 's', long = "server")]
    servers: Vec<String>,

    /// registry URL to discover servers from (falls back to $FANRPC_REGISTRY)
    #[argh(option)]
    registry: Option<String>,

    /// name of the method to call, as Service.Method
    #[argh(positional)]
    method: String,

    /// arguments for the method, as JSON
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    /// connect timeout in milliseconds
    #[argh(option, long = "connect-timeout-ms", default = "10000")]
    connect_timeout_ms: u64,

    /// per-call timeout in milliseconds (none by default)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// how long a registry list stays fresh, in seconds
    #[argh(option, long = "registry-ttl-secs", default = "10")]
    registry_ttl_secs: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run the demo server (Echo.Echo, Arith.Sum, Arith.Sleep)
struct ServeArgs {
    /// address to bind to
    #[argh(option, short = 'b', default = "\"127.0.0.1:9001\".into()")]
    bind: String,
}

/// Where to find servers and how to reach them.
#[derive(Debug, PartialEq)]
struct Target {
    servers: Vec<String>,
    registry: Option<String>,
    connect_timeout_ms: u64,
    timeout_ms: Option<u64>,
    registry_ttl_secs: u64,
}

impl From<&CallArgs> for Target {
    fn from(args: &CallArgs) -> Self {
        Self {
            servers: args.servers.clone(),
            registry: args.registry.clone(),
            connect_timeout_ms: args.connect_timeout_ms,
            timeout_ms: args.timeout_ms,
            registry_ttl_secs: args.registry_ttl_secs,
        }
    }
}

impl From<&BroadcastArgs> for Target {
    fn from(args: &BroadcastArgs) -> Self {
        Self {
            servers: args.servers.clone(),
            registry: args.registry.clone(),
            connect_timeout_ms: args.connect_timeout_ms,
            timeout_ms: args.timeout_ms,
            registry_ttl_secs: args.registry_ttl_secs,
        }
    }
}

impl Target {
    /// Explicit servers win; otherwise the flag or environment registry.
    fn discovery(&self, env_registry: Option<String>) -> Result<Arc<dyn Discovery>> {
        if !self.servers.is_empty() {
            return Ok(Arc::new(StaticDiscovery::new(self.servers.clone())));
        }

        let url = self.registry.clone().or(env_registry).ok_or_else(|| {
            anyhow::anyhow!("No servers given: use -s <addr> or --registry <url> (or set {})", REGISTRY_ENV)
        })?;
        let config = RegistryConfig::new(url).with_ttl_ms(self.registry_ttl_secs.saturating_mul(1000));
        Ok(Arc::new(RegistryDiscovery::with_config(config)))
    }

    fn dial_options(&self) -> DialOptions {
        let options = DialOptions::default().with_connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        match self.timeout_ms {
            Some(ms) => options.with_call_timeout(Duration::from_millis(ms)),
            None => options,
        }
    }

    fn dispatcher(&self, mode: SelectMode) -> Result<Dispatcher> {
        let discovery = self.discovery(std::env::var(REGISTRY_ENV).ok())?;
        Ok(Dispatcher::new(discovery, mode, self.dial_options()))
    }
}

fn parse_args(args: &str) -> Result<Value> {
    serde_json::from_str(args).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call/broadcast keep stdout and stderr clean for piping
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Broadcast(args) => run_broadcast(args).await,
        Commands::Serve(args) => run_serve(args).await,
    }
}

async fn run_call(args: CallArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let dispatcher = Target::from(&args).dispatcher(args.mode)?;
    let token = CancellationToken::new();

    let result = dispatcher.call::<Value, _>(&token, &args.method, call_args).await;
    dispatcher.close().await?;

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

async fn run_broadcast(args: BroadcastArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let dispatcher = Target::from(&args).dispatcher(SelectMode::default())?;
    let token = CancellationToken::new();

    let result = dispatcher.broadcast::<Value, _>(&token, &args.method, call_args).await;
    dispatcher.close().await?;

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting fanrpc demo server on {}", args.bind);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            on_signal.cancel();
        }
    });

    fanrpc_cli::demo::serve(&args.bind, shutdown).await?;
    Ok(())
}
