use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::telemetry_event::TelemetryEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMeta {
    /// Unix time (seconds, fractional) at which the song started.
    #[serde(rename = "songStartLocal")]
    pub song_start_local: f64,
    pub player: Option<String>,
    /// Set when a new song started before this one reached a terminal event.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub abandoned: bool,
}

/// One play attempt, from `songStart` to `finished`/`failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub meta: SessionMeta,
    pub events: Vec<TelemetryEvent>,
}

impl Session {
    pub fn start(player: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            meta: SessionMeta {
                song_start_local: started_at.timestamp_millis() as f64 / 1000.0,
                player,
                abandoned: false,
            },
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: TelemetryEvent) {
        self.events.push(event);
    }

    pub fn mark_abandoned(&mut self) {
        self.meta.abandoned = true;
    }

    pub fn player(&self) -> Option<&str> {
        self.meta.player.as_deref()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
