//! wsbridge: WebSocket front for a stateful JSON-RPC handler.
//!
//! - Endpoint: `gateway.path` (default `/sqls`), one session per connection
//! - Config: YAML, `--config` or `<config_dir>/wsbridge/config.yml`
//! - `wsbridge config` opens the config file in `$EDITOR`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use wsbridge_core::error::{BridgeError, Result};
use wsbridge_gateway::{app_state::AppState, config, editor, logging, router, services::PingHandler};

#[derive(Parser)]
#[command(name = "wsbridge", version, about = "WebSocket bridge for a stateful JSON-RPC handler")]
struct Cli {
    /// Also log to this file (in addition to stderr)
    #[arg(short, long, global = true)]
    log: Option<PathBuf>,

    /// Alternative config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print all requests and responses
    #[arg(short, long)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Edit the config file
    #[command(alias = "c")]
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match real_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let path = match cli.config.clone().or_else(config::default_path) {
        Some(p) => p,
        None => {
            return Err(BridgeError::Internal(
                "no config directory on this platform; pass --config".into(),
            ))
        }
    };

    if let Some(Command::Config) = cli.command {
        return editor::open(&editor::editor_from_env(), &path);
    }

    logging::init(cli.log.as_deref())?;

    let mut cfg = if cli.config.is_some() {
        config::load_from_file(&path)?
    } else {
        config::load_or_default(&path)?
    };
    if cli.trace {
        cfg.session.trace = true;
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BridgeError::Internal(format!("start runtime failed: {e}")))?;
    runtime.block_on(serve(cfg))
}

async fn serve(cfg: config::BridgeConfig) -> Result<()> {
    let listen = cfg.gateway.listen_addr()?;
    let path = cfg.gateway.path.clone();

    let span = tracing::info_span!("bridge", %listen);
    let state = AppState::new(cfg, Arc::new(PingHandler::new), span)?;

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| BridgeError::Internal(format!("bind {listen} failed: {e}")))?;
    tracing::info!(%listen, %path, "wsbridge websocket server listening");

    let stopper = state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            stopper.shutdown();
        }
    });

    router::serve(listener, state)
        .await
        .map_err(|e| BridgeError::Internal(format!("server failed: {e}")))
}
