//! Shared per-key bookkeeping for the payload cache.
//!
//! One JSON file covers every key. It is loaded once when the store opens and
//! rewritten after every mutation, with the whole read-modify-write cycle held
//! under a single lock so updates to different keys never clobber each other.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::write_atomic;
use super::StorageError;

/// Length of the rolling fetch-quota window.
pub const QUOTA_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Most recent successful fetch-and-store. `None` = never stored or cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    /// Successful fetches since the key was first seen. Informational only.
    #[serde(default)]
    pub fetch_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_count: u64,
}

impl KeyMetadata {
    fn window_open(&self, now: DateTime<Utc>) -> bool {
        match self.window_start {
            Some(start) => now - start <= Duration::hours(QUOTA_WINDOW_HOURS),
            None => false,
        }
    }

    /// Fetches counted against the quota at `now`. Once the window has run
    /// out this reads 0 even though the stored count is untouched.
    pub fn calls_in_window(&self, now: DateTime<Utc>) -> u64 {
        if self.window_open(now) {
            self.window_count
        } else {
            0
        }
    }

    pub fn record_fetch(&mut self, now: DateTime<Utc>) {
        if !self.window_open(now) {
            self.window_start = Some(now);
            self.window_count = 0;
        }
        self.window_count = self.window_count.saturating_add(1);
        self.fetch_count = self.fetch_count.saturating_add(1);
        self.last_update = Some(now);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    entries: BTreeMap<String, KeyMetadata>,
}

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, KeyMetadata>>,
}

impl MetadataStore {
    /// Load metadata from `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path).entries;
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load_from_disk(path: &Path) -> MetadataFile {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cache metadata is corrupt, starting empty");
                    MetadataFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataFile::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache metadata, starting empty");
                MetadataFile::default()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, KeyMetadata>> {
        // A panic mid-update leaves the map usable; the file is rewritten on the next mutation.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> KeyMetadata {
        self.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Apply `f` to the entry for `key` and persist, all under one lock.
    pub fn update<F>(&self, key: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut KeyMetadata),
    {
        let mut entries = self.lock();
        f(entries.entry(key.to_string()).or_default());
        self.persist(&entries)
    }

    pub fn record_fetch(&self, key: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.update(key, |meta| meta.record_fetch(now))
    }

    pub fn clear_last_update(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.lock();
        if let Some(meta) = entries.get_mut(key) {
            meta.last_update = None;
        }
        self.persist(&entries)
    }

    pub fn clear_all_last_updates(&self) -> Result<(), StorageError> {
        let mut entries = self.lock();
        for meta in entries.values_mut() {
            meta.last_update = None;
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &BTreeMap<String, KeyMetadata>) -> Result<(), StorageError> {
        let file = MetadataFile {
            entries: entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), keys = entries.len(), "Cache metadata saved");
        Ok(())
    }
}
