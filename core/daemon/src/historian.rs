//! Session state machine and the shared handle around it.
//!
//! [`Historian`] is the single writer for all live state: player identity,
//! the in-progress session, the current and last score snapshots, and the
//! telemetry connection flag. [`SharedState`] wraps it for the connector and
//! the IPC server and raises the change signal after every applied mutation.
//! The signal is a `watch` channel carrying a generation counter, so waiters
//! are woken together and bursts of changes coalesce into one wakeup.

use chrono::Utc;
use historian_protocol::{ConnectionStatus, StatusPayload};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;
use crate::history::HistoryWriter;
use crate::score::{ScoreFactory, ScoreTracker};
use crate::session::Session;
use crate::telemetry_event::{EventKind, TelemetryEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// No session is active and the event does not start one.
    Ignored,
    /// Appended to the active session.
    Recorded,
    /// A new session started. Carries the file of the session it replaced.
    Started { abandoned: Option<PathBuf> },
    /// The session reached `finished`/`failed` and was written to disk.
    Completed { path: PathBuf },
}

pub struct Historian {
    history: HistoryWriter,
    score_factory: ScoreFactory,
    connected: bool,
    current_player: Option<String>,
    session: Option<Session>,
    current_score: Option<Box<dyn ScoreTracker>>,
    last_score: Option<Box<dyn ScoreTracker>>,
}

impl Historian {
    pub fn new(history: HistoryWriter, score_factory: ScoreFactory) -> Self {
        Self {
            history,
            score_factory,
            connected: false,
            current_player: None,
            session: None,
            current_score: None,
            last_score: None,
        }
    }

    pub fn in_game(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_player(&self) -> Option<&str> {
        self.current_player.as_deref()
    }

    pub fn status(&self) -> StatusPayload {
        StatusPayload {
            connection: ConnectionStatus {
                connected_to_beatsaber: self.connected,
                current_player: self.current_player.clone(),
                in_game: self.in_game(),
            },
            current_game: self.current_score.as_ref().map(|score| score.snapshot()),
            last_game: self.last_score.as_ref().map(|score| score.snapshot()),
        }
    }

    /// Returns true when the identity changed.
    pub fn set_player(&mut self, player: Option<String>) -> bool {
        if self.current_player == player {
            return false;
        }
        info!(player = ?player, "Current player changed");
        self.current_player = player;
        true
    }

    /// Returns true when the flag changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        if self.connected == connected {
            return false;
        }
        self.connected = connected;
        true
    }

    /// Applies one telemetry event. State is fully updated before any file
    /// is written, so a persistence error never leaves a half-applied
    /// transition behind.
    pub fn handle_event(&mut self, event: TelemetryEvent) -> Result<EventOutcome> {
        match event.kind() {
            EventKind::SongStart => self.start_song(event),
            kind if kind.is_terminal() && self.session.is_some() => self.finish_song(event),
            _ => Ok(self.record(event)),
        }
    }

    fn start_song(&mut self, event: TelemetryEvent) -> Result<EventOutcome> {
        let abandoned = self.session.take().map(|mut prior| {
            prior.mark_abandoned();
            prior
        });

        let beatmap = event.beatmap().unwrap_or_default();
        info!(
            player = ?self.current_player,
            author = ?beatmap.song_author_name,
            song = ?beatmap.song_name,
            difficulty = ?beatmap.difficulty,
            "Song started"
        );

        let mut score = (self.score_factory)();
        score.process(&event);
        self.current_score = Some(score);

        let mut session = Session::start(self.current_player.clone(), Utc::now());
        session.push(event);
        self.session = Some(session);

        let Some(prior) = abandoned else {
            return Ok(EventOutcome::Started { abandoned: None });
        };
        warn!(
            player = ?prior.player(),
            events = prior.event_count(),
            "Song restarted before finishing; saving previous attempt as abandoned"
        );
        let path = self.history.persist(&prior)?;
        Ok(EventOutcome::Started {
            abandoned: Some(path),
        })
    }

    fn finish_song(&mut self, event: TelemetryEvent) -> Result<EventOutcome> {
        let Some(mut session) = self.session.take() else {
            return Ok(EventOutcome::Ignored);
        };

        // The terminal event still carries the final performance block.
        if let Some(mut score) = self.current_score.take() {
            score.process(&event);
            self.last_score = Some(score);
        }
        session.push(event);

        let path = self.history.persist(&session)?;
        info!(
            player = ?session.player(),
            events = session.event_count(),
            path = %path.display(),
            "Session saved"
        );
        Ok(EventOutcome::Completed { path })
    }

    fn record(&mut self, event: TelemetryEvent) -> EventOutcome {
        let Some(session) = self.session.as_mut() else {
            return EventOutcome::Ignored;
        };
        if let Some(score) = self.current_score.as_mut() {
            score.process(&event);
        }
        session.push(event);
        EventOutcome::Recorded
    }
}

pub struct SharedState {
    historian: Mutex<Historian>,
    changes: watch::Sender<u64>,
}

impl SharedState {
    pub fn new(historian: Historian) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            historian: Mutex::new(historian),
            changes,
        }
    }

    fn historian(&self) -> MutexGuard<'_, Historian> {
        self.historian
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn handle_event(&self, event: TelemetryEvent) -> Result<EventOutcome> {
        let result = self.historian().handle_event(event);
        if !matches!(result, Ok(EventOutcome::Ignored)) {
            self.notify_change();
        }
        result
    }

    pub fn status(&self) -> StatusPayload {
        self.historian().status()
    }

    pub fn set_player(&self, player: Option<String>) {
        let changed = self.historian().set_player(player);
        if changed {
            self.notify_change();
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let changed = self.historian().set_connected(connected);
        if changed {
            self.notify_change();
        }
    }

    /// A receiver for the change signal. It starts out "seen"; callers that
    /// want an immediate wakeup mark it changed themselves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_change(&self) {
        self.changes
            .send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}
