//! Aggregation Store: the class-wide record of which groups finished the
//! final stage and the symbol each contributed to the shared pool.
//!
//! Every client reads the whole list and merges client-side. There is no
//! coordination protocol beyond that.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::Millis;
use crate::constants::{KEY_COMPLETIONS, PLACEHOLDER_SYMBOLS};
use crate::persist::{KeyValueStore, StoreError, read_json, write_json};

/// Whether `symbol` is a single visible, non-placeholder character.
#[must_use]
pub fn is_valid_symbol(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return false;
    };
    !c.is_whitespace() && !c.is_control() && !PLACEHOLDER_SYMBOLS.contains(&symbol)
}

/// "Group N completed the final stage with symbol S."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub group_number: u32,
    pub symbol: String,
    #[serde(default)]
    pub contributor_name: String,
    #[serde(default)]
    pub recorded_at: Millis,
}

impl CompletionRecord {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.group_number > 0 && is_valid_symbol(&self.symbol)
    }

    /// Decode a stored entry, discarding partial, legacy or placeholder ones.
    fn from_stored(value: Value) -> Option<Self> {
        let record: Self = serde_json::from_value(value).ok()?;
        record.is_valid().then_some(record)
    }
}

fn stored_group(value: &Value) -> Option<u64> {
    value.get("groupNumber").and_then(Value::as_u64)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("group {group} cannot contribute symbol {symbol:?}")]
    InvalidRecord { group: u32, symbol: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The filtered pool as every client sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    /// Valid records in stored order.
    pub records: Vec<CompletionRecord>,
    /// One symbol per valid record, in the same order. Duplicates across
    /// groups are intentional and each counts.
    pub symbols: Vec<String>,
}

impl PoolSnapshot {
    fn from_records(records: Vec<CompletionRecord>) -> Self {
        let symbols = records.iter().map(|r| r.symbol.clone()).collect();
        Self { records, symbols }
    }

    #[must_use]
    pub fn has_group(&self, group: u32) -> bool {
        self.records.iter().any(|r| r.group_number == group)
    }

    #[must_use]
    pub fn record_for(&self, group: u32) -> Option<&CompletionRecord> {
        self.records.iter().find(|r| r.group_number == group)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads and writes the shared completion list.
#[derive(Debug, Clone)]
pub struct AggregationStore<S> {
    store: S,
}

impl<S: KeyValueStore> AggregationStore<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    fn raw_entries(&self) -> Vec<Value> {
        match read_json::<_, Vec<Value>>(&self.store, KEY_COMPLETIONS) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                log::warn!("{err}; treating completion pool as empty");
                Vec::new()
            }
        }
    }

    /// Record `record.group_number`'s completion, replacing any earlier entry
    /// for that group.
    ///
    /// This is an unlocked read-modify-write. Two clients of the *same* group
    /// publishing at nearly the same moment can lose one of the two writes
    /// (last write wins); the list itself stays well-formed because each
    /// write replaces the key whole. The sequence below is kept synchronous
    /// with no suspension point between the read and the write so that window
    /// stays as small as the store allows. Entries of other groups are carried
    /// over untouched, valid or not.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::InvalidRecord`] for an unusable record and
    /// [`PublishError::Store`] if the write fails.
    pub fn publish(&self, record: &CompletionRecord) -> Result<(), PublishError> {
        if !record.is_valid() {
            return Err(PublishError::InvalidRecord {
                group: record.group_number,
                symbol: record.symbol.clone(),
            });
        }
        let group = u64::from(record.group_number);
        let value = serde_json::to_value(record).map_err(|err| StoreError::Write {
            key: KEY_COMPLETIONS.to_string(),
            reason: err.to_string(),
        })?;

        let mut entries = self.raw_entries();
        entries.retain(|entry| stored_group(entry) != Some(group));
        entries.push(value);
        write_json(&self.store, KEY_COMPLETIONS, &entries)?;

        log::info!(
            "group {} contributed symbol {:?} to the shared pool",
            record.group_number,
            record.symbol
        );
        Ok(())
    }

    /// Every valid completion plus the derived symbol sequence.
    #[must_use]
    pub fn current_pool(&self) -> PoolSnapshot {
        let entries = self.raw_entries();
        let total = entries.len();
        let records: Vec<CompletionRecord> = entries
            .into_iter()
            .filter_map(CompletionRecord::from_stored)
            .collect();
        if records.len() != total {
            log::debug!(
                "completion pool: dropped {} unusable entries",
                total - records.len()
            );
        }
        PoolSnapshot::from_records(records)
    }

    /// Remove every completion record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_COMPLETIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;

    fn completion(group: u32, symbol: &str) -> CompletionRecord {
        CompletionRecord {
            group_number: group,
            symbol: symbol.into(),
            contributor_name: format!("learner {group}"),
            recorded_at: i64::from(group),
        }
    }

    #[test]
    fn symbol_validity() {
        assert!(is_valid_symbol("G"));
        assert!(is_valid_symbol("é"));
        assert!(!is_valid_symbol(""));
        assert!(!is_valid_symbol("GE"));
        assert!(!is_valid_symbol(" "));
        assert!(!is_valid_symbol("?"));
        assert!(!is_valid_symbol("_"));
    }

    #[test]
    fn republishing_replaces_own_entry_only() {
        let store = MemoryStore::new();
        let pool = AggregationStore::new(store);
        pool.publish(&completion(5, "G")).unwrap();
        pool.publish(&completion(2, "E")).unwrap();
        pool.publish(&completion(5, "G")).unwrap();

        let snapshot = pool.current_pool();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.records.iter().filter(|r| r.group_number == 5).count(),
            1
        );
        assert_eq!(snapshot.symbols, vec!["E".to_string(), "G".to_string()]);
    }

    #[test]
    fn duplicate_symbols_across_groups_all_count() {
        let pool = AggregationStore::new(MemoryStore::new());
        pool.publish(&completion(1, "N")).unwrap();
        pool.publish(&completion(2, "N")).unwrap();
        assert_eq!(pool.current_pool().symbols, vec!["N", "N"]);
    }

    #[test]
    fn invalid_and_partial_entries_are_filtered() {
        let store = MemoryStore::new();
        store
            .set(
                KEY_COMPLETIONS,
                r#"[
                    {"groupNumber": 1, "symbol": "T"},
                    {"groupNumber": 2, "symbol": "?"},
                    {"groupNumber": 3, "symbol": ""},
                    {"symbol": "X"},
                    {"groupNumber": 4},
                    {"groupNumber": 0, "symbol": "Z"},
                    "garbage",
                    {"groupNumber": 6, "symbol": "IC"}
                ]"#,
            )
            .unwrap();
        let pool = AggregationStore::new(store);
        let snapshot = pool.current_pool();
        assert_eq!(snapshot.symbols, vec!["T"]);
        assert!(snapshot.has_group(1));
        assert!(!snapshot.has_group(2));
        assert_eq!(snapshot.record_for(1).unwrap().contributor_name, "");
    }

    #[test]
    fn publish_rejects_placeholder_symbols() {
        let pool = AggregationStore::new(MemoryStore::new());
        let err = pool.publish(&completion(3, "?")).unwrap_err();
        assert!(matches!(err, PublishError::InvalidRecord { group: 3, .. }));
        assert!(pool.current_pool().is_empty());
    }

    #[test]
    fn malformed_blob_reads_empty_and_is_replaced_on_publish() {
        let store = MemoryStore::new();
        store.set(KEY_COMPLETIONS, "{oops").unwrap();
        let pool = AggregationStore::new(store);
        assert!(pool.current_pool().is_empty());
        pool.publish(&completion(8, "S")).unwrap();
        assert_eq!(pool.current_pool().symbols, vec!["S"]);
        pool.clear().unwrap();
        assert!(pool.current_pool().is_empty());
    }

    #[test]
    fn publish_failure_surfaces_store_error() {
        let pool = AggregationStore::new(MemoryStore::with_quota(4));
        let err = pool.publish(&completion(1, "G")).unwrap_err();
        assert!(matches!(
            err,
            PublishError::Store(StoreError::QuotaExceeded { .. })
        ));
    }
}
