//! Beat Saber historian daemon.
//!
//! Records every song played into a per-player history directory and serves
//! the live state to local clients over a Unix socket. The telemetry
//! connector feeds the [`historian::Historian`] core; the IPC server reads it
//! and pushes a status event to every client after each change.

pub mod commands;
pub mod config;
pub mod error;
pub mod historian;
pub mod history;
pub mod score;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod telemetry_event;

pub use commands::CommandTable;
pub use config::{load_config, HistorianConfig};
pub use error::{HistorianError, Result};
pub use historian::{EventOutcome, Historian, SharedState};
pub use history::HistoryWriter;
pub use score::{score_keeper_factory, ScoreKeeper, ScoreTracker};
pub use server::{remove_socket, IpcServer};
pub use telemetry::TelemetryConnector;
pub use telemetry_event::TelemetryEvent;
