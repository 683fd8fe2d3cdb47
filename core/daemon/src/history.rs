//! Persistence of completed sessions.
//!
//! Each session becomes one gzip-compressed JSON file at
//! `<root>/<player>/<YYYY_MM_DD_HH_MM_SS>.json.gz`. Existing files are never
//! overwritten; a numeric suffix is appended when the timestamp is taken.

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use fs_err as fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{HistorianError, Result};
use crate::session::Session;

pub const UNKNOWN_PLAYER_DIR: &str = "unknown_player";
const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
const FILE_SUFFIX: &str = ".json.gz";
const MAX_NAME_ATTEMPTS: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryWriter {
    root: PathBuf,
}

impl HistoryWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn player_dir(&self, player: Option<&str>) -> PathBuf {
        self.root.join(player_dir_name(player))
    }

    pub fn persist(&self, session: &Session) -> Result<PathBuf> {
        self.persist_at(session, Local::now())
    }

    pub fn persist_at(&self, session: &Session, now: DateTime<Local>) -> Result<PathBuf> {
        let dir = self.player_dir(session.player());
        fs::create_dir_all(&dir).map_err(|source| HistorianError::Persist {
            path: dir.clone(),
            source,
        })?;

        let mut payload =
            serde_json::to_vec(session).map_err(|source| HistorianError::Json {
                context: "serializing session".to_string(),
                source,
            })?;
        payload.push(b'\n');

        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let (path, file) = create_unique(&dir, &stamp)?;

        if let Err(source) = write_gzip(file, &payload) {
            return Err(HistorianError::Persist { path, source });
        }

        Ok(path)
    }
}

fn write_gzip(file: fs::File, payload: &[u8]) -> io::Result<()> {
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(payload)?;
    let mut file = encoder.finish()?;
    file.flush()
}

/// Directory name for a player. Path separators are replaced so a player
/// identity can never escape the history root.
pub fn player_dir_name(player: Option<&str>) -> String {
    match player {
        None | Some("") | Some(".") | Some("..") => UNKNOWN_PLAYER_DIR.to_string(),
        Some(name) => name.replace(['/', '\\', '\0'], "_"),
    }
}

fn create_unique(dir: &Path, stamp: &str) -> Result<(PathBuf, fs::File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}{}", stamp, FILE_SUFFIX)
        } else {
            format!("{}_{}{}", stamp, attempt, FILE_SUFFIX)
        };
        let path = dir.join(name);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(HistorianError::Persist { path, source }),
        }
    }

    Err(HistorianError::Persist {
        path: dir.join(format!("{}{}", stamp, FILE_SUFFIX)),
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free file name for this timestamp",
        ),
    })
}
