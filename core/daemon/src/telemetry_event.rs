//! Raw events received from the Beat Saber telemetry link.
//!
//! Events are kept as the JSON objects the game sent so sessions can be
//! persisted verbatim. Only the `event` discriminator and the song descriptor
//! of `songStart` are interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SongStart,
    Finished,
    Failed,
    Other,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Finished | EventKind::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryEvent(Value);

/// Song descriptor carried in `status.beatmap` of a `songStart` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BeatmapInfo {
    pub song_author_name: Option<String>,
    pub song_name: Option<String>,
    pub difficulty: Option<String>,
}

impl TelemetryEvent {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("event").and_then(Value::as_str)
    }

    pub fn kind(&self) -> EventKind {
        match self.name() {
            Some("songStart") => EventKind::SongStart,
            Some("finished") => EventKind::Finished,
            Some("failed") => EventKind::Failed,
            _ => EventKind::Other,
        }
    }

    pub fn status(&self) -> Option<&Value> {
        self.0.get("status")
    }

    pub fn beatmap(&self) -> Option<BeatmapInfo> {
        let beatmap = self.status()?.get("beatmap")?;
        let field = |key: &str| beatmap.get(key).and_then(Value::as_str).map(str::to_string);
        Some(BeatmapInfo {
            song_author_name: field("songAuthorName"),
            song_name: field("songName"),
            difficulty: field("difficulty"),
        })
    }
}
