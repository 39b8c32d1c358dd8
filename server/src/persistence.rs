//! Saved progress: coin balance and the highest level reached.

use crate::error::PersistenceError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub coins: u64,
    pub max_level: u32,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            coins: 0,
            max_level: 1,
        }
    }
}

/// Saves are blocking; the server runs them on the blocking pool.
pub trait ProgressStore: Send + Sync {
    fn load(&self) -> Result<Progress, PersistenceError>;
    fn save(&self, progress: &Progress) -> Result<(), PersistenceError>;
}

/// JSON file on disk. A missing file loads as fresh progress.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self) -> Result<Progress, PersistenceError> {
        if !self.path.exists() {
            info!("No save file at {}, starting fresh", self.path.display());
            return Ok(Progress::default());
        }
        let text = fs::read_to_string(&self.path)?;
        let mut progress: Progress = serde_json::from_str(&text)?;
        if progress.max_level == 0 {
            warn!("Save file has level 0, using level 1");
            progress.max_level = 1;
        }
        Ok(progress)
    }

    fn save(&self, progress: &Progress) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write then rename so a crash never leaves a half-written save.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(progress)?)?;
        fs::rename(&tmp, &self.path)?;
        info!("Saved progress to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, shareable so tests can inspect what was saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Progress>>,
}

impl MemoryStore {
    pub fn new(progress: Progress) -> Self {
        Self {
            inner: Arc::new(Mutex::new(progress)),
        }
    }

    pub fn current(&self) -> Progress {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self) -> Result<Progress, PersistenceError> {
        Ok(self.current())
    }

    fn save(&self, progress: &Progress) -> Result<(), PersistenceError> {
        match self.inner.lock() {
            Ok(mut guard) => *guard = progress.clone(),
            Err(poisoned) => *poisoned.into_inner() = progress.clone(),
        }
        Ok(())
    }
}
