//! `localStorage` persistence. Every tab and window of one origin shares it,
//! which is what lets independent clients on a machine see each other.

use escapade_core::{KeyValueStore, StoreError};
use wasm_bindgen::JsValue;
use web_sys::Storage;

use crate::dom;

const QUOTA_ERROR_NAMES: [&str; 2] = ["QuotaExceededError", "NS_ERROR_DOM_QUOTA_REACHED"];

/// [`KeyValueStore`] over the origin's `localStorage`.
///
/// The handle is looked up per call, so a store built before storage became
/// available (or after it was disabled) degrades to read/write errors rather
/// than panicking.
#[derive(Debug, Clone, Default)]
pub struct LocalStorageStore {
    prefix: String,
}

impl LocalStorageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace every key, e.g. to run two classes side by side on one origin.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn storage(key: &str) -> Result<Storage, StoreError> {
        dom::local_storage().map_err(|err| StoreError::Read {
            key: key.to_string(),
            reason: dom::js_error_message(&err),
        })
    }
}

fn write_error(key: &str, value: &str, err: &JsValue) -> StoreError {
    let quota = dom::js_error_name(err)
        .is_some_and(|name| QUOTA_ERROR_NAMES.contains(&name.as_str()));
    if quota {
        StoreError::QuotaExceeded {
            key: key.to_string(),
            needed: key.len() + value.len(),
            available: 0,
        }
    } else {
        StoreError::Write {
            key: key.to_string(),
            reason: dom::js_error_message(err),
        }
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let full = self.full_key(key);
        Self::storage(key)?
            .get_item(&full)
            .map_err(|err| StoreError::Read {
                key: key.to_string(),
                reason: dom::js_error_message(&err),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let full = self.full_key(key);
        let storage = Self::storage(key).map_err(|err| StoreError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        storage
            .set_item(&full, value)
            .map_err(|err| write_error(key, value, &err))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let full = self.full_key(key);
        let storage = Self::storage(key).map_err(|err| StoreError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        storage.remove_item(&full).map_err(|err| StoreError::Write {
            key: key.to_string(),
            reason: dom::js_error_message(&err),
        })
    }
}
