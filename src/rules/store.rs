//! Shared owner of the current rule table.
//!
//! Readers take a snapshot (`Arc<RuleTable>`) and resolve against it
//! without holding anything. Writers parse a full replacement table first
//! and publish it with a single atomic pointer swap, so a resolution sees
//! either the whole old table or the whole new one. Reloads are serialized
//! among themselves so the last file read is the last table published.

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use tracing::{debug, info};

use super::error::ConfigError;
use super::resolver;
use super::table::RuleTable;

/// Current whitelist plus the file it is reloaded from.
pub struct RuleStore {
    current: ArcSwap<RuleTable>,
    source: Option<PathBuf>,
    reload_lock: Mutex<()>,
}

impl RuleStore {
    /// Create an empty store with no reload source. Everything is denied
    /// until a table is loaded.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RuleTable::default()),
            source: None,
            reload_lock: Mutex::new(()),
        }
    }

    /// Create an empty store that reloads from `path`.
    pub fn with_source(path: impl Into<PathBuf>) -> Self {
        Self {
            current: ArcSwap::from_pointee(RuleTable::default()),
            source: Some(path.into()),
            reload_lock: Mutex::new(()),
        }
    }

    /// Parse `text` and publish it as the current table.
    ///
    /// Returns the number of rules now in effect.
    pub fn load(&self, text: &str) -> usize {
        let table = RuleTable::parse(text);
        let count = table.len();
        self.publish(table);
        count
    }

    fn publish(&self, table: RuleTable) {
        self.current.store(Arc::new(table));
    }

    /// Re-read the source file and publish its rules.
    ///
    /// On failure the previously published table stays current.
    pub async fn reload(&self) -> Result<usize, ConfigError> {
        let path = self.source.as_ref().ok_or(ConfigError::NoSource)?;
        let _guard = self.reload_lock.lock().await;

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                source: e,
            })?;

        let count = self.load(&text);
        info!("Loaded {} whitelist rules from {:?}", count, path);
        Ok(count)
    }

    /// The table in effect right now.
    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.current.load_full()
    }

    /// Resolve `key` against the current snapshot.
    pub fn resolve(&self, key: &str) -> Option<String> {
        let table = self.current.load();
        let resolved = resolver::resolve(&table, key);
        debug!("Resolved {} -> {:?}", key.trim(), resolved);
        resolved
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_new_store_denies_everything() {
        let store = RuleStore::new();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.resolve("http://a.b:80"), None);
    }

    #[test]
    fn test_load_replaces_table() {
        let store = RuleStore::new();

        assert_eq!(store.load("http://a.b:80\n"), 1);
        assert!(store.resolve("http://a.b:80").is_some());

        assert_eq!(store.load("http://c.d:80\n"), 1);
        assert_eq!(store.resolve("http://a.b:80"), None);
        assert!(store.resolve("http://c.d:80").is_some());
    }

    #[test]
    fn test_old_snapshot_outlives_swap() {
        let store = RuleStore::new();
        store.load("http://old.b:80\n");

        let old = store.snapshot();
        store.load("http://new.b:80\n");

        assert_eq!(old.entries()[0].pattern(), "http://old.b:80");
        assert_eq!(store.snapshot().entries()[0].pattern(), "http://new.b:80");
        assert!(!Arc::ptr_eq(&old, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "conn://chain-x:30303\tlocalhost:30308").unwrap();

        let store = RuleStore::with_source(file.path());
        assert_eq!(store.reload().await.unwrap(), 1);
        assert_eq!(
            store.resolve("conn://chain-x:30303"),
            Some("localhost:30308".to_string())
        );
    }

    #[tokio::test]
    async fn test_reload_picks_up_appended_rule() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http://a.b:80").unwrap();

        let store = RuleStore::with_source(file.path());
        store.reload().await.unwrap();
        assert_eq!(store.resolve("http://c.d:80"), None);

        writeln!(file, "http://c.d:80").unwrap();
        file.flush().unwrap();

        // Appending alone changes nothing until the reload lands
        assert_eq!(store.resolve("http://c.d:80"), None);

        assert_eq!(store.reload().await.unwrap(), 2);
        assert_eq!(
            store.resolve("http://c.d:80"),
            Some("http://c.d:80".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_last_good_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.conf");
        std::fs::write(&path, "http://a.b:80\n").unwrap();

        let store = RuleStore::with_source(&path);
        store.reload().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let err = store.reload().await.unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));

        assert!(store.resolve("http://a.b:80").is_some());
    }

    #[tokio::test]
    async fn test_reload_waits_for_reload_in_progress() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http://a.b:80").unwrap();
        let store = Arc::new(RuleStore::with_source(file.path()));

        let guard = store.reload_lock.lock().await;
        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.reload().await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert!(store.snapshot().is_empty());

        drop(guard);
        assert_eq!(pending.await.unwrap().unwrap(), 1);
        assert!(store.resolve("http://a.b:80").is_some());
    }

    #[tokio::test]
    async fn test_reload_without_source() {
        let store = RuleStore::new();
        assert!(matches!(
            store.reload().await.unwrap_err(),
            ConfigError::NoSource
        ));
    }

    #[test]
    fn test_concurrent_readers_see_whole_tables() {
        use std::thread;

        let base = "http://base.b:80\n";
        let extended = "http://base.b:80\nhttp://new-1.b:80\nhttp://new-2.b:80\n";

        let store = Arc::new(RuleStore::new());
        store.load(base);

        let mut readers = vec![];
        for _ in 0..8 {
            let store = store.clone();
            readers.push(thread::spawn(move || {
                for _ in 0..2000 {
                    let table = store.snapshot();
                    let first = resolver::resolve(&table, "http://new-1.b:80").is_some();
                    let second = resolver::resolve(&table, "http://new-2.b:80").is_some();
                    // Both new lines or neither, never a half-built table
                    assert_eq!(first, second);
                    assert!(matches!(table.len(), 1 | 3));
                }
            }));
        }

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    store.load(if i % 2 == 0 { extended } else { base });
                }
            })
        };

        for reader in readers {
            reader.join().unwrap();
        }
        writer.join().unwrap();
    }
}
