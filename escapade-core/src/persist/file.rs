use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{KeyValueStore, StoreError};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed store: one JSON file per key.
///
/// Writes land in a temp file that is renamed over the target, so a reader in
/// another process sees either the old blob or the new one, never a torn
/// write. That is the only atomicity on offer; concurrent read-modify-write
/// sequences from different processes still race (last write wins).
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::Write {
            key: root.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_stem(key: &str) -> String {
        key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", Self::file_stem(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Read {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let target = self.path_for(key);
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .root
            .join(format!(".{}.{}.{seq}.tmp", Self::file_stem(key), std::process::id()));
        let to_err = |err: std::io::Error| StoreError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        };
        fs::write(&temp, value).map_err(to_err)?;
        if let Err(err) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(to_err(err));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Write {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "escapade-filestore-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn file_store_round_trips_and_removes() {
        let root = temp_root("basic");
        let store = FileStore::open(&root).unwrap();
        assert!(store.get("session.current").unwrap().is_none());
        store.set("session.current", "{\"a\":1}").unwrap();
        assert_eq!(
            store.get("session.current").unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        let other = FileStore::open(&root).unwrap();
        assert!(other.get("session.current").unwrap().is_some());

        store.remove("session.current").unwrap();
        store.remove("session.current").unwrap();
        assert!(other.get("session.current").unwrap().is_none());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn odd_keys_map_to_safe_file_names() {
        let root = temp_root("names");
        let store = FileStore::open(&root).unwrap();
        store.set("a/b:c", "1").unwrap();
        assert!(root.join("a_b_c.json").exists());
        let leftovers = fs::read_dir(&root)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        let _ = fs::remove_dir_all(root);
    }
}
