//! Persistence adapter: a synchronous key to JSON-blob surface shared by
//! every client on the machine.
//!
//! Single-key operations are atomic. Nothing here offers transactions or
//! locks, so read-modify-write sequences across keys (or on one key) can
//! interleave with other clients.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Failures raised by a [`KeyValueStore`] or the typed JSON helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("reading `{key}` failed: {reason}")]
    Read { key: String, reason: String },
    #[error("`{key}` holds malformed JSON: {reason}")]
    Malformed { key: String, reason: String },
    #[error("writing `{key}` failed: {reason}")]
    Write { key: String, reason: String },
    #[error("storage quota exceeded writing `{key}` ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
}

impl StoreError {
    /// Whether the failure happened while persisting rather than loading.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::QuotaExceeded { .. })
    }

    /// Key the failing operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. }
            | Self::Malformed { key, .. }
            | Self::Write { key, .. }
            | Self::QuotaExceeded { key, .. } => key,
        }
    }
}

/// A persistence failure that did not stop the operation that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWarning {
    pub operation: &'static str,
    pub error: StoreError,
}

/// Collects write failures so callers can tell the learner "not saved"
/// while in-memory state carries on. Clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct WarningSink {
    queue: Rc<RefCell<Vec<StorageWarning>>>,
}

impl WarningSink {
    /// Queue `result`'s error, if any. Returns `true` when the write succeeded.
    pub fn check(&self, operation: &'static str, result: Result<(), StoreError>) -> bool {
        match result {
            Ok(()) => true,
            Err(error) => {
                log::warn!("{operation}: {error}; continuing without persistence");
                self.queue
                    .borrow_mut()
                    .push(StorageWarning { operation, error });
                false
            }
        }
    }

    /// Take every queued warning.
    #[must_use]
    pub fn drain(&self) -> Vec<StorageWarning> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// Platform-specific key/value storage.
///
/// Methods take `&self`: the underlying surface is shared between every
/// handle and every client, the way browser storage is.
pub trait KeyValueStore {
    /// Fetch the raw blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage rejects the write.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage rejects the delete.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Load and decode the JSON value under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Read`] when storage fails and [`StoreError::Malformed`]
/// when the blob does not decode into `T`.
pub fn read_json<S, T>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Malformed {
            key: key.to_string(),
            reason: err.to_string(),
        })
}

/// Load `key`, degrading missing or unreadable data to `T::default()`.
///
/// Read failures are never fatal; they are logged and treated as absent.
pub fn read_json_or_default<S, T>(store: &S, key: &str) -> T
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned + Default,
{
    match read_json(store, key) {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            log::warn!("{err}; treating as empty");
            T::default()
        }
    }
}

/// Encode `value` as JSON and store it under `key`.
///
/// # Errors
///
/// Returns an error if encoding fails or the store rejects the write.
pub fn write_json<S, T>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|err| StoreError::Write {
        key: key.to_string(),
        reason: err.to_string(),
    })?;
    store.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_key_reads_as_none() {
        let store = MemoryStore::new();
        let value: Option<Vec<u32>> = read_json(&store, "absent").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn malformed_blob_degrades_to_default() {
        let store = MemoryStore::new();
        store.set("broken", "{not json").unwrap();
        let err = read_json::<_, Vec<u32>>(&store, "broken").unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
        assert_eq!(err.key(), "broken");

        let fallback: Vec<u32> = read_json_or_default(&store, "broken");
        assert!(fallback.is_empty());
    }

    #[test]
    fn shared_rc_handle_delegates() {
        let store = Rc::new(MemoryStore::new());
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1_u8);
        write_json(&store, "map", &map).unwrap();
        let back: BTreeMap<String, u8> = read_json(&*store, "map").unwrap().unwrap();
        assert_eq!(back, map);
        store.remove("map").unwrap();
        assert!(store.get("map").unwrap().is_none());
    }

    #[test]
    fn warning_sink_queues_failures_only() {
        let sink = WarningSink::default();
        assert!(sink.check("ok", Ok(())));
        let store = MemoryStore::with_quota(1);
        assert!(!sink.check("save", write_json(&store, "key", &[1, 2, 3])));
        let twin = sink.clone();
        let warnings = twin.drain();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].operation, "save");
        assert!(warnings[0].error.is_write());
        assert!(sink.is_empty());
    }

    #[test]
    fn write_errors_are_classified() {
        let quota = StoreError::QuotaExceeded {
            key: "k".into(),
            needed: 10,
            available: 2,
        };
        assert!(quota.is_write());
        let read = StoreError::Read {
            key: "k".into(),
            reason: "io".into(),
        };
        assert!(!read.is_write());
    }
}
