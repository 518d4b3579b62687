use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{KeyValueStore, StoreError};

/// In-process store. Cloned handles share one map, which lets several
/// simulated clients observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryInner {
    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once keys plus values exceed `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let store = Self::default();
        store.set_quota(Some(bytes));
        store
    }

    /// Change (or lift) the byte quota for every handle.
    pub fn set_quota(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().quota_bytes = bytes;
    }

    /// Bytes currently held, counting keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.inner.borrow().used_bytes_excluding("")
    }

    /// Sorted list of keys present.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.borrow().entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.borrow().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(quota) = inner.quota_bytes {
            let available = quota.saturating_sub(inner.used_bytes_excluding(key));
            let needed = key.len() + value.len();
            if needed > available {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.borrow_mut().entries.remove(key);
        Ok(())
    }
}
