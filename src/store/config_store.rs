//! Durable store for one configuration document
//!
//! Two live instances (machine-wide, per-user), each with its own directory,
//! debounce timer, and last-written snapshot. Writes go through a temp file
//! in the target directory followed by a rename, so readers never observe a
//! partial document. A flush whose serialized content matches the last
//! written snapshot is skipped entirely.
//!
//! I/O failures are logged and swallowed: the in-memory document stays
//! authoritative and the next debounce cycle retries.

use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::merge_into_defaults;
use crate::constants::SAVE_DEBOUNCE;
use crate::error::{ProtocolError, StoreError};
use crate::store::Debounce;

/// A configuration document the store can persist.
pub trait Document: Serialize + DeserializeOwned + Default + Clone {
    /// Wire name of the whole document (`savePersistent` / `saveUser` use it
    /// as the whole-document key).
    const NAME: &'static str;

    /// Top-level keys a client may overwrite individually.
    fn top_level_keys() -> &'static [&'static str];
}

impl Document for crate::config::PersistentConfig {
    const NAME: &'static str = "persistentData";

    fn top_level_keys() -> &'static [&'static str] {
        &["settings", "network", "devices", "favorites"]
    }
}

impl Document for crate::config::UserConfig {
    const NAME: &'static str = "userData";

    fn top_level_keys() -> &'static [&'static str] {
        &["settings"]
    }
}

/// Debounced atomic store for one document.
#[derive(Debug)]
pub struct ConfigStore<T: Document> {
    dir: PathBuf,
    path: PathBuf,
    doc: T,
    last_written: String,
    debounce: Debounce,
}

impl<T: Document> ConfigStore<T> {
    pub fn new(dir: PathBuf, path: PathBuf) -> Self {
        Self {
            dir,
            path,
            doc: T::default(),
            last_written: String::new(),
            debounce: Debounce::new(SAVE_DEBOUNCE),
        }
    }

    /// Load the document from disk.
    ///
    /// Whatever is found is deep-merged onto defaults so every field is
    /// present afterwards. The last-written snapshot is seeded with the
    /// merged result, so an immediately scheduled save with unchanged
    /// content is a no-op. A missing file yields defaults; a malformed file
    /// is logged and yields defaults too.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let defaults = serde_json::to_value(T::default())?;

        let merged = match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(loaded) => merge_into_defaults(defaults, &loaded),
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "malformed config, using defaults");
                    defaults
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => defaults,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "config unreadable, using defaults");
                defaults
            }
        };

        self.doc = match serde_json::from_value(merged.clone()) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "config has invalid field types, using defaults");
                T::default()
            }
        };
        self.last_written = serde_json::to_string_pretty(&self.doc)?;
        Ok(())
    }

    pub fn doc(&self) -> &T {
        &self.doc
    }

    /// Mutable access for the router. The caller is responsible for
    /// scheduling a save afterwards.
    pub fn doc_mut(&mut self) -> &mut T {
        &mut self.doc
    }

    /// Replace or overwrite part of the document from a client payload.
    ///
    /// `key == T::NAME` replaces the whole document (merged onto defaults so
    /// missing fields stay populated); a known top-level key overwrites just
    /// that field. Unknown keys are rejected without touching the document.
    pub fn apply_key(&mut self, key: &str, payload: &Value) -> Result<(), ProtocolError> {
        if key == T::NAME {
            let defaults =
                serde_json::to_value(T::default()).map_err(ProtocolError::InvalidJson)?;
            let merged = merge_into_defaults(defaults, payload);
            self.doc = serde_json::from_value(merged)?;
            return Ok(());
        }

        if !T::top_level_keys().contains(&key) {
            return Err(ProtocolError::UnknownKey(key.to_string()));
        }

        let mut value = serde_json::to_value(&self.doc).map_err(ProtocolError::InvalidJson)?;
        if let Value::Object(map) = &mut value {
            map.insert(key.to_string(), payload.clone());
        }
        self.doc = serde_json::from_value(value)?;
        Ok(())
    }

    /// Arm (or re-arm) this store's debounce timer.
    pub fn schedule_save(&mut self) {
        self.debounce.arm();
    }

    /// Deadline of the pending save, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Flush when the debounce deadline has passed.
    pub fn flush_if_due(&mut self, now: Instant) {
        if self.debounce.is_due(now) {
            self.debounce.cancel();
            self.flush();
        }
    }

    /// Cancel any pending timer and flush immediately. Used at shutdown;
    /// failure means losing at most the last debounce window.
    pub fn flush_now(&mut self) {
        self.debounce.cancel();
        self.flush();
    }

    fn flush(&mut self) {
        let json = match serde_json::to_string_pretty(&self.doc) {
            Ok(json) => json,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to serialize config");
                return;
            }
        };

        if json == self.last_written {
            debug!(path = %self.path.display(), "config unchanged, skipping write");
            return;
        }

        match self.write_atomic(&json) {
            Ok(()) => {
                debug!(path = %self.path.display(), bytes = json.len(), "config written");
                self.last_written = json;
            }
            Err(err) => {
                // Snapshot untouched: the next scheduled save retries.
                warn!(path = %self.path.display(), %err, "failed to write config");
            }
        }
    }

    fn write_atomic(&self, json: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PersistentConfig, UserConfig};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn store_in(dir: &std::path::Path) -> ConfigStore<PersistentConfig> {
        ConfigStore::new(dir.to_path_buf(), dir.join("config.json"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_saves_performs_one_write() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();

        for i in 0..10 {
            store.doc_mut().favorites = vec![format!("stream-{i}")];
            store.schedule_save();
            tokio::time::advance(Duration::from_millis(50)).await;
            // Not due yet: every arm pushed the deadline out again.
            store.flush_if_due(Instant::now());
            assert!(!tmp.path().join("config.json").exists());
        }

        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());

        let written: PersistentConfig =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("config.json")).unwrap())
                .unwrap();
        // Only the state at the last call is on disk.
        assert_eq!(written.favorites, vec!["stream-9".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_content_skips_write() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        store.doc_mut().favorites = vec!["a".into()];
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());

        let mtime = fs::metadata(tmp.path().join("config.json"))
            .unwrap()
            .modified()
            .unwrap();

        // A read-modify-write cycle that lands on identical content.
        store.doc_mut().favorites = vec!["a".into()];
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());

        let mtime_after = fs::metadata(tmp.path().join("config.json"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(mtime, mtime_after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_seeds_snapshot_no_rewrite() {
        let tmp = tempfile::tempdir().unwrap();

        // First run: a fresh load seeds the snapshot with defaults, so an
        // untouched save writes nothing at all.
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());
        assert!(!tmp.path().join("config.json").exists());

        // Persist something real.
        store.doc_mut().favorites = vec!["s1".into()];
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());
        assert!(tmp.path().join("config.json").exists());
        let mtime = fs::metadata(tmp.path().join("config.json"))
            .unwrap()
            .modified()
            .unwrap();

        // Second run: load then save without any mutation is a no-op.
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());
        let mtime_after = fs::metadata(tmp.path().join("config.json"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(mtime, mtime_after);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        assert_eq!(store.doc(), &PersistentConfig::default());
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.json"), "{not json").unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        assert_eq!(store.doc(), &PersistentConfig::default());
    }

    #[test]
    fn test_partial_file_merges_onto_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.json"),
            r#"{ "settings": { "bufferSize": 128 }, "favorites": ["s1"] }"#,
        )
        .unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        assert_eq!(store.doc().settings.buffer_size, 128);
        assert!(store.doc().settings.follow_system_audio);
        assert_eq!(store.doc().favorites, vec!["s1".to_string()]);
    }

    #[test]
    fn test_apply_unknown_key_rejected_without_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();
        let before = store.doc().clone();

        let err = store.apply_key("bogus", &json!({"x": 1})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKey(k) if k == "bogus"));
        assert_eq!(store.doc(), &before);
    }

    #[test]
    fn test_apply_known_key_overwrites_field() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.load().unwrap();

        store
            .apply_key("favorites", &json!(["one", "two"]))
            .unwrap();
        assert_eq!(
            store.doc().favorites,
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn test_apply_whole_document_merges_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store: ConfigStore<UserConfig> =
            ConfigStore::new(tmp.path().to_path_buf(), tmp.path().join("user.json"));
        store.load().unwrap();

        store
            .apply_key("userData", &json!({ "settings": { "sidebarCollapsed": true } }))
            .unwrap();
        assert!(store.doc().settings.sidebar_collapsed);
        assert_eq!(store.doc().settings.window.width, 1280);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_keeps_memory_and_retries() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("late");
        // Store pointed at a directory that does not exist yet and cannot be
        // created because a file sits where the directory should be.
        fs::write(&dir, "blocker").unwrap();
        let mut store: ConfigStore<PersistentConfig> =
            ConfigStore::new(dir.clone(), dir.join("config.json"));
        store.load().unwrap();

        store.doc_mut().favorites = vec!["kept".into()];
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());

        // Failed write: in-memory state still authoritative.
        assert_eq!(store.doc().favorites, vec!["kept".to_string()]);

        // Unblock the path; a later cycle succeeds with the same content.
        fs::remove_file(&dir).unwrap();
        store.schedule_save();
        tokio::time::advance(Duration::from_millis(300)).await;
        store.flush_if_due(Instant::now());
        let written: PersistentConfig =
            serde_json::from_str(&fs::read_to_string(dir.join("config.json")).unwrap()).unwrap();
        assert_eq!(written.favorites, vec!["kept".to_string()]);
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        // Merging a merged document onto defaults again changes nothing, so
        // a load/save cycle can never ping-pong the on-disk content.
        #[test]
        fn prop_merge_is_idempotent(loaded in json_value()) {
            let defaults = serde_json::to_value(PersistentConfig::default()).unwrap();
            let once = crate::config::merge_into_defaults(defaults.clone(), &loaded);
            let twice = crate::config::merge_into_defaults(defaults, &once);
            prop_assert_eq!(once, twice);
        }
    }
}
