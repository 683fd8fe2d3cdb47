//! Score accumulation for an in-progress song.
//!
//! The historian treats score snapshots as opaque JSON: it feeds every event of
//! an active session to a [`ScoreTracker`] and serializes whatever the tracker
//! reports. [`ScoreKeeper`] is the default tracker.

use serde::Serialize;
use serde_json::Value;

use crate::telemetry_event::{BeatmapInfo, TelemetryEvent};

pub trait ScoreTracker: Send {
    fn process(&mut self, event: &TelemetryEvent);
    fn snapshot(&self) -> Value;
}

/// Creates a fresh tracker at every song start.
pub type ScoreFactory = Box<dyn Fn() -> Box<dyn ScoreTracker> + Send + Sync>;

pub fn score_keeper_factory() -> ScoreFactory {
    Box::new(|| -> Box<dyn ScoreTracker> { Box::new(ScoreKeeper::default()) })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Playing,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreKeeper {
    song: Option<BeatmapInfo>,
    outcome: Outcome,
    score: u64,
    max_score: u64,
    rank: Option<String>,
    combo: u64,
    max_combo: u64,
    multiplier: u64,
    passed_notes: u64,
    hit_notes: u64,
    missed_notes: u64,
    notes_cut: u64,
    notes_missed: u64,
    bombs_cut: u64,
    obstacles_entered: u64,
    events: u64,
}

impl ScoreKeeper {
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    fn apply_performance(&mut self, performance: &Value) {
        let read = |key: &str| performance.get(key).and_then(Value::as_u64);

        if let Some(score) = read("score") {
            self.score = score;
        }
        if let Some(max_score) = read("currentMaxScore") {
            self.max_score = max_score;
        }
        if let Some(rank) = performance.get("rank").and_then(Value::as_str) {
            self.rank = Some(rank.to_string());
        }
        if let Some(combo) = read("combo") {
            self.combo = combo;
        }
        if let Some(multiplier) = read("multiplier") {
            self.multiplier = multiplier;
        }
        if let Some(passed) = read("passedNotes") {
            self.passed_notes = passed;
        }
        if let Some(hit) = read("hitNotes") {
            self.hit_notes = hit;
        }
        if let Some(missed) = read("missedNotes") {
            self.missed_notes = missed;
        }
        let reported_max_combo = read("maxCombo").unwrap_or(0);
        self.max_combo = self.max_combo.max(reported_max_combo).max(self.combo);
    }
}

impl ScoreTracker for ScoreKeeper {
    fn process(&mut self, event: &TelemetryEvent) {
        self.events += 1;

        match event.name() {
            Some("songStart") => self.song = event.beatmap(),
            Some("noteCut") => self.notes_cut += 1,
            Some("noteMissed") => self.notes_missed += 1,
            Some("bombCut") => self.bombs_cut += 1,
            Some("obstacleEnter") => self.obstacles_entered += 1,
            Some("finished") => self.outcome = Outcome::Finished,
            Some("failed") => self.outcome = Outcome::Failed,
            _ => {}
        }

        if let Some(performance) = event.status().and_then(|status| status.get("performance")) {
            self.apply_performance(performance);
        }
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
