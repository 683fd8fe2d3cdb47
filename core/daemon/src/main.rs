//! historian-daemon entrypoint.
//!
//! Wires the telemetry connector, the historian core and the IPC server onto
//! one current-thread runtime and runs them until interrupted. On Ctrl-C the
//! socket file is removed before exiting.

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use historian_daemon::{
    load_config, remove_socket, score_keeper_factory, CommandTable, Historian, HistorianConfig,
    HistorianError, HistoryWriter, IpcServer, SharedState, TelemetryConnector,
};

#[derive(Parser)]
#[command(name = "historian-daemon")]
#[command(about = "Records Beat Saber sessions and serves live status over a Unix socket")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run(config)) {
        error!(error = %err, "Historian daemon failed");
        std::process::exit(1);
    }
}

fn init_logging() {
    let debug_enabled = env::var("HISTORIAN_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: HistorianConfig) -> Result<(), HistorianError> {
    let historian = Historian::new(
        HistoryWriter::new(&config.history_directory),
        score_keeper_factory(),
    );
    let state = Arc::new(SharedState::new(historian));

    let server = IpcServer::bind(
        &config.unix_socket,
        Arc::clone(&state),
        CommandTable::standard()?,
    )?;
    let connector = TelemetryConnector::new(
        config.beatsaber_websocket_uri.clone(),
        config.reconnect_delay,
        Arc::clone(&state),
    );

    if let Some(monitor) = &config.heartrate_monitor {
        warn!(endpoint = %monitor, "Heart rate monitor integration is not available; ignoring");
    }

    info!(
        socket = %config.unix_socket.display(),
        history = %config.history_directory.display(),
        beatsaber = %config.beatsaber_websocket_uri,
        "Historian daemon started"
    );

    tokio::select! {
        _ = server.serve() => {}
        _ = connector.run() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Interrupt received; shutting down"),
            Err(err) => warn!(error = %err, "Failed to listen for interrupt; shutting down"),
        },
    }

    remove_socket(&config.unix_socket).map_err(|err| {
        HistorianError::io(
            format!("removing socket {}", config.unix_socket.display()),
            err,
        )
    })
}
