//! Durable "already voted here" markers kept on the viewer's side.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("marker file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("marker file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Key-value store of poll id -> viewer token used for that poll.
pub trait MarkerStore {
    fn get(&self, poll_id: Uuid) -> Option<String>;

    fn set(&mut self, poll_id: Uuid, token: &str) -> Result<(), MarkerError>;

    fn has_voted(&self, poll_id: Uuid) -> bool {
        self.get(poll_id).is_some()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryMarkerStore {
    markers: HashMap<Uuid, String>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn get(&self, poll_id: Uuid) -> Option<String> {
        self.markers.get(&poll_id).cloned()
    }

    fn set(&mut self, poll_id: Uuid, token: &str) -> Result<(), MarkerError> {
        self.markers.insert(poll_id, token.to_string());
        Ok(())
    }
}

/// Markers persisted as a JSON object in one file, rewritten on each set.
#[derive(Debug)]
pub struct FileMarkerStore {
    path: PathBuf,
    markers: HashMap<Uuid, String>,
}

impl FileMarkerStore {
    /// A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MarkerError> {
        let path = path.as_ref().to_path_buf();
        let markers = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(FileMarkerStore { path, markers })
    }

    fn flush(&self) -> Result<(), MarkerError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.markers)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MarkerStore for FileMarkerStore {
    fn get(&self, poll_id: Uuid) -> Option<String> {
        self.markers.get(&poll_id).cloned()
    }

    fn set(&mut self, poll_id: Uuid, token: &str) -> Result<(), MarkerError> {
        if self.markers.get(&poll_id).map(String::as_str) == Some(token) {
            return Ok(());
        }
        self.markers.insert(poll_id, token.to_string());
        self.flush()
    }
}
