use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::metadata::{KeyMetadata, MetadataStore};
use super::StorageError;

/// Shared metadata file name in the cache directory
pub const METADATA_FILE: &str = "cache_metadata.json";

/// Cache files written by older releases, and the keys they map to.
const LEGACY_FILES: &[(&str, &str)] = &[
    ("current_drivers_standings.json", "driver_standings"),
    ("current_constructor_standings.json", "constructor_standings_current"),
    ("current_next_race.json", "next_race"),
    ("current_last_race.json", "last_race"),
];

/// Write `contents` next to `path` and rename it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// File-backed payload cache: one pretty-printed JSON file per key plus the
/// shared metadata record.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    metadata: MetadataStore,
}

impl CacheStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&cache_dir).map_err(|source| StorageError::Write {
            path: cache_dir.clone(),
            source,
        })?;
        let metadata = MetadataStore::open(cache_dir.join(METADATA_FILE));
        Ok(Self { cache_dir, metadata })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Keys become file names, so keep them to a safe alphabet.
    fn validate_key(key: &str) -> Result<(), StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && format!("{}.json", key) != METADATA_FILE
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(())
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }

    /// True only when the payload for `key` exists and parses. A corrupt file
    /// counts as no payload, so the key is treated as cold.
    pub fn has_payload(&self, key: &str) -> bool {
        Self::validate_key(key).is_ok() && self.cache_path(key).is_file() && self.load(key).is_some()
    }

    /// Load the payload for `key` regardless of age.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.load_fresh(key, None)
    }

    /// Load the payload for `key` if its file is no older than `max_age`.
    ///
    /// Missing, unreadable and corrupt files all read as `None`.
    pub fn load_fresh(&self, key: &str, max_age: Option<Duration>) -> Option<Value> {
        if Self::validate_key(key).is_err() {
            warn!(key = %key, "Refusing to load invalid cache key");
            return None;
        }
        let path = self.cache_path(key);

        if let Some(max_age) = max_age {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to stat cache file");
                    return None;
                }
            };
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > max_age {
                debug!(key = %key, age_secs = age.as_secs(), "Cache expired");
                return None;
            }
        }

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cache file");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => {
                debug!(key = %key, "Loaded cache");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache file is corrupt, ignoring");
                None
            }
        }
    }

    pub fn save(&self, key: &str, payload: &Value) -> Result<(), StorageError> {
        self.save_at(key, payload, Utc::now())
    }

    /// Write the payload, then record the fetch at `now`.
    ///
    /// A failed payload write is returned and leaves metadata alone. A failed
    /// metadata write is only logged: the payload on disk is already good.
    pub fn save_at(&self, key: &str, payload: &Value, now: DateTime<Utc>) -> Result<(), StorageError> {
        Self::validate_key(key)?;
        fs::create_dir_all(&self.cache_dir).map_err(|source| StorageError::Write {
            path: self.cache_dir.clone(),
            source,
        })?;

        let path = self.cache_path(key);
        let contents = serde_json::to_string_pretty(payload)?;
        write_atomic(&path, contents.as_bytes())
            .map_err(|source| StorageError::Write { path, source })?;

        if let Err(e) = self.metadata.record_fetch(key, now) {
            warn!(key = %key, error = %e, "Failed to save cache metadata");
        }
        info!(key = %key, "Cached data");
        Ok(())
    }

    /// Remove the payload for `key`, or every payload when `key` is `None`.
    ///
    /// Timestamps go with the payloads; fetch counters and quota windows stay.
    /// Returns the number of payload files removed.
    pub fn clear(&self, key: Option<&str>) -> Result<usize, StorageError> {
        let removed = match key {
            Some(key) => {
                Self::validate_key(key)?;
                let removed = self.remove_file(&self.cache_path(key))?;
                if let Err(e) = self.metadata.clear_last_update(key) {
                    warn!(key = %key, error = %e, "Failed to save cache metadata");
                }
                info!(key = %key, "Cleared cache");
                usize::from(removed)
            }
            None => {
                let mut removed = 0;
                for path in self.payload_paths()? {
                    if self.remove_file(&path)? {
                        removed += 1;
                    }
                }
                if let Err(e) = self.metadata.clear_all_last_updates() {
                    warn!(error = %e, "Failed to save cache metadata");
                }
                info!(removed, "Cleared all caches");
                removed
            }
        };
        Ok(removed)
    }

    fn remove_file(&self, path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn payload_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::ReadDir {
                    path: self.cache_dir.clone(),
                    source,
                })
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == "json")
                    && path.file_name().is_some_and(|name| name != METADATA_FILE)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Every key with either a payload on disk or a metadata record.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.metadata.keys();
        match self.payload_paths() {
            Ok(paths) => {
                keys.extend(
                    paths
                        .iter()
                        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string)),
                );
            }
            Err(e) => warn!(error = %e, "Failed to list cache directory"),
        }
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn metadata(&self, key: &str) -> KeyMetadata {
        self.metadata.get(key)
    }

    pub fn last_update(&self, key: &str) -> Option<DateTime<Utc>> {
        self.metadata.get(key).last_update
    }

    pub fn fetch_count(&self, key: &str) -> u64 {
        self.metadata.get(key).fetch_count
    }

    /// Copy cache files left by older releases into this store.
    ///
    /// Keys that already have a payload are skipped. Metadata is not touched,
    /// so migrated entries count as never fetched and refresh on first use.
    pub fn migrate_legacy(&self, from_dir: &Path) -> Result<usize, StorageError> {
        let mut migrated = 0;
        for (old_name, key) in LEGACY_FILES {
            let old_path = from_dir.join(old_name);
            if !old_path.is_file() || self.has_payload(key) {
                continue;
            }

            let payload: Value = match fs::read_to_string(&old_path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
            {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(file = %old_path.display(), error = %e, "Skipping unreadable legacy cache file");
                    continue;
                }
            };

            let path = self.cache_path(key);
            let contents = serde_json::to_string_pretty(&payload)?;
            write_atomic(&path, contents.as_bytes())
                .map_err(|source| StorageError::Write { path, source })?;
            info!(from = %old_name, key = %key, "Migrated legacy cache file");
            migrated += 1;
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::new(temp_dir.path().to_path_buf()).expect("Failed to open store");
        (store, temp_dir)
    }

    #[test]
    fn test_load_missing_key_is_none() {
        let (store, _dir) = create_test_store();
        assert!(store.load("driver_standings").is_none());
        assert!(!store.has_payload("driver_standings"));
    }

    #[test]
    fn test_save_then_load_returns_payload_unchanged() {
        let (store, _dir) = create_test_store();
        let payload = json!({"MRData": {"total": "20", "items": [1, 2, 3]}});

        store.save("driver_standings", &payload).expect("Save should succeed");

        assert_eq!(store.load("driver_standings"), Some(payload));
        assert_eq!(store.fetch_count("driver_standings"), 1);
        assert!(store.last_update("driver_standings").is_some());
    }

    #[test]
    fn test_save_writes_human_readable_file() {
        let (store, dir) = create_test_store();
        store.save("next_race", &json!({"raceName": "Monaco"})).expect("Save should succeed");

        let contents = fs::read_to_string(dir.path().join("next_race.json")).expect("Should read file");
        assert!(contents.contains("\"raceName\": \"Monaco\""));
        assert!(!dir.path().join("next_race.json.tmp").exists());
        assert!(dir.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn test_corrupt_payload_reads_as_none() {
        let (store, dir) = create_test_store();
        fs::write(dir.path().join("last_race.json"), "{ truncated").expect("write should succeed");

        assert!(store.load("last_race").is_none());
        assert!(!store.has_payload("last_race"));
    }

    #[test]
    fn test_failed_payload_write_is_returned_and_metadata_untouched() {
        let (store, dir) = create_test_store();
        // A directory where the payload file should go makes the rename fail
        fs::create_dir(dir.path().join("driver_standings.json")).expect("mkdir should succeed");

        let result = store.save("driver_standings", &json!({"a": 1}));

        assert!(matches!(result, Err(StorageError::Write { .. })));
        assert_eq!(store.fetch_count("driver_standings"), 0);
        assert!(store.last_update("driver_standings").is_none());
        assert!(!dir.path().join("driver_standings.json.tmp").exists());
    }

    #[test]
    fn test_failed_metadata_write_still_saves_payload() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(dir.path().join(METADATA_FILE)).expect("mkdir should succeed");
        let store = CacheStore::new(dir.path().to_path_buf()).expect("Failed to open store");

        store.save("next_race", &json!({"round": "8"})).expect("Save should succeed");

        assert_eq!(store.load("next_race"), Some(json!({"round": "8"})));
        assert!(dir.path().join(METADATA_FILE).is_dir());
    }

    #[test]
    fn test_load_fresh_respects_max_age() {
        let (store, _dir) = create_test_store();
        store.save("next_race", &json!({"a": 1})).expect("Save should succeed");

        assert!(store.load_fresh("next_race", Some(Duration::from_secs(3600))).is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.load_fresh("next_race", Some(Duration::ZERO)).is_none());
        // No max age means any age is fine
        assert!(store.load_fresh("next_race", None).is_some());
    }

    #[test]
    fn test_save_increments_fetch_count() {
        let (store, _dir) = create_test_store();
        for i in 0..3 {
            store.save("last_race", &json!({"round": i})).expect("Save should succeed");
        }
        assert_eq!(store.fetch_count("last_race"), 3);
        assert_eq!(store.load("last_race"), Some(json!({"round": 2})));
    }

    #[test]
    fn test_clear_key_removes_payload_but_keeps_fetch_count() {
        let (store, _dir) = create_test_store();
        store.save("driver_standings", &json!({"a": 1})).expect("Save should succeed");
        store.save("driver_standings", &json!({"a": 2})).expect("Save should succeed");

        let removed = store.clear(Some("driver_standings")).expect("Clear should succeed");

        assert_eq!(removed, 1);
        assert!(store.load("driver_standings").is_none());
        assert!(store.last_update("driver_standings").is_none());
        assert_eq!(store.fetch_count("driver_standings"), 2);
    }

    #[test]
    fn test_clear_all_keeps_metadata_file() {
        let (store, dir) = create_test_store();
        store.save("next_race", &json!({})).expect("Save should succeed");
        store.save("last_race", &json!({})).expect("Save should succeed");

        let removed = store.clear(None).expect("Clear should succeed");

        assert_eq!(removed, 2);
        assert!(store.load("next_race").is_none());
        assert!(store.load("last_race").is_none());
        assert!(dir.path().join(METADATA_FILE).exists());
        assert_eq!(store.fetch_count("next_race"), 1);
    }

    #[test]
    fn test_clear_missing_key_is_ok() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.clear(Some("never_saved")).expect("Clear should succeed"), 0);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.save("../escape", &json!({})),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.save("cache_metadata", &json!({})),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.load("").is_none());
    }

    #[test]
    fn test_payload_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        {
            let store = CacheStore::new(temp_dir.path().to_path_buf()).expect("Failed to open store");
            store.save("constructor_standings_2024", &json!({"season": "2024"})).expect("Save should succeed");
        }
        let store = CacheStore::new(temp_dir.path().to_path_buf()).expect("Failed to open store");
        assert_eq!(store.load("constructor_standings_2024"), Some(json!({"season": "2024"})));
        assert_eq!(store.fetch_count("constructor_standings_2024"), 1);
        assert_eq!(store.keys(), vec!["constructor_standings_2024"]);
    }

    #[test]
    fn test_new_creates_nested_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("a").join("b");
        let store = CacheStore::new(nested.clone()).expect("Failed to open store");
        store.save("next_race", &json!({})).expect("Save should succeed");
        assert!(nested.join("next_race.json").exists());
    }

    #[test]
    fn test_migrate_legacy_copies_known_files_once() {
        let (store, _dir) = create_test_store();
        let legacy = TempDir::new().expect("Failed to create temp directory");
        fs::write(legacy.path().join("current_drivers_standings.json"), r#"{"old": true}"#)
            .expect("write should succeed");
        fs::write(legacy.path().join("current_next_race.json"), "not json").expect("write should succeed");
        fs::write(legacy.path().join("unrelated.json"), "{}").expect("write should succeed");

        let migrated = store.migrate_legacy(legacy.path()).expect("Migration should succeed");

        assert_eq!(migrated, 1);
        assert_eq!(store.load("driver_standings"), Some(json!({"old": true})));
        assert!(store.last_update("driver_standings").is_none());
        assert!(store.load("next_race").is_none());

        // Second run finds the target already present
        assert_eq!(store.migrate_legacy(legacy.path()).expect("Migration should succeed"), 0);
    }
}
