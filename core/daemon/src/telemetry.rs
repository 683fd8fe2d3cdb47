//! Outbound WebSocket link to the Beat Saber status plugin.
//!
//! The link is expected to come and go for the lifetime of the process: the
//! connector retries forever with a fixed delay and is the only writer of the
//! `connected_to_beatsaber` flag.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{HistorianError, Result};
use crate::historian::SharedState;
use crate::telemetry_event::TelemetryEvent;

pub struct TelemetryConnector {
    uri: String,
    reconnect_delay: Duration,
    state: Arc<SharedState>,
}

impl TelemetryConnector {
    pub fn new(uri: impl Into<String>, reconnect_delay: Duration, state: Arc<SharedState>) -> Self {
        Self {
            uri: uri.into(),
            reconnect_delay,
            state,
        }
    }

    /// Connects, consumes events, and reconnects after every disconnect.
    pub async fn run(self) {
        loop {
            match self.connect_once().await {
                Ok(()) => info!(uri = %self.uri, "Beat Saber connection closed"),
                Err(err) => debug!(uri = %self.uri, error = %err, "Beat Saber connection failed"),
            }
            self.state.set_connected(false);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        debug!(uri = %self.uri, "Connecting to Beat Saber");
        let (mut stream, _response) = connect_async(self.uri.as_str())
            .await
            .map_err(|err| HistorianError::Telemetry(err.to_string()))?;

        info!(uri = %self.uri, "Connection to Beat Saber established");
        self.state.set_connected(true);

        while let Some(message) = stream.next().await {
            match message.map_err(|err| HistorianError::Telemetry(err.to_string()))? {
                Message::Text(text) => self.dispatch(&text),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.dispatch(text),
                    Err(err) => warn!(error = %err, "Dropping non UTF-8 telemetry payload"),
                },
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Beat Saber sent close frame");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        Ok(())
    }

    fn dispatch(&self, text: &str) {
        let event = match TelemetryEvent::parse(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "Dropping undecodable telemetry payload");
                return;
            }
        };

        if let Err(err) = self.state.handle_event(event) {
            error!(error = %err, "Failed to record Beat Saber session");
        }
    }
}
