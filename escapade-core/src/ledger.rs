//! Attempt Ledger: every answer check, correct or not, with ordinal and
//! timestamp.
//!
//! Each attempt lands in two places that are deliberately not transactional:
//! the session-local [`AttemptLog`] that drives stage unlocking, and the
//! shared class-wide log read by the instructor dashboard.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::clock::Millis;
use crate::constants::KEY_CLASSWIDE_LEDGER;
use crate::persist::{KeyValueStore, StoreError, WarningSink, read_json, write_json};
use crate::session::Session;
use crate::stage::StageId;

/// One evaluated answer submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub stage_id: StageId,
    pub question_id: String,
    pub submitted_answer: String,
    pub is_correct: bool,
    pub timestamp: Millis,
    /// 1-based, strictly increasing per (stage, question).
    pub attempt_ordinal: u32,
}

/// Map key for a (stage, question) pair, `"stage1:q2"`.
#[must_use]
pub fn attempt_key(stage: StageId, question_id: &str) -> String {
    format!("{stage}:{question_id}")
}

/// Session-local attempt history, keyed by [`attempt_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptLog {
    entries: BTreeMap<String, Vec<AttemptRecord>>,
}

impl AttemptLog {
    /// Append an attempt and return it with its ordinal assigned.
    pub fn append(
        &mut self,
        stage: StageId,
        question_id: &str,
        submitted_answer: &str,
        is_correct: bool,
        timestamp: Millis,
    ) -> AttemptRecord {
        let history = self
            .entries
            .entry(attempt_key(stage, question_id))
            .or_default();
        let attempt_ordinal = history
            .last()
            .map_or(1, |prev| prev.attempt_ordinal.saturating_add(1));
        let record = AttemptRecord {
            stage_id: stage,
            question_id: question_id.to_string(),
            submitted_answer: submitted_answer.to_string(),
            is_correct,
            timestamp,
            attempt_ordinal,
        };
        history.push(record.clone());
        record
    }

    /// Every attempt at one question, oldest first.
    #[must_use]
    pub fn history(&self, stage: StageId, question_id: &str) -> &[AttemptRecord] {
        self.entries
            .get(&attempt_key(stage, question_id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn latest(&self, stage: StageId, question_id: &str) -> Option<&AttemptRecord> {
        self.history(stage, question_id).last()
    }

    /// Total attempts recorded across every question.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Attempt enriched with who made it, as mirrored into the class-wide log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClasswideEntry {
    #[serde(flatten)]
    pub attempt: AttemptRecord,
    pub session_id: String,
    pub group_number: u32,
    pub display_name: String,
    pub cohort_label: String,
    pub cohort_year: i32,
}

impl ClasswideEntry {
    #[must_use]
    pub fn new(session: &Session, attempt: AttemptRecord) -> Self {
        Self {
            attempt,
            session_id: session.session_id.clone(),
            group_number: session.group_number,
            display_name: session.display_name.clone(),
            cohort_label: session.cohort_label.clone(),
            cohort_year: session.cohort_year,
        }
    }
}

/// A window onto the class-wide log, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPage {
    pub entries: Vec<ClasswideEntry>,
    pub offset: usize,
    pub total: usize,
}

/// Writes attempts to the local history and the class-wide mirror.
#[derive(Debug, Clone)]
pub struct AttemptLedger<S> {
    store: S,
    capacity: usize,
    warnings: WarningSink,
}

impl<S: KeyValueStore> AttemptLedger<S> {
    /// `capacity` bounds the class-wide log; the oldest entries are evicted first.
    pub fn new(store: S, capacity: usize, warnings: WarningSink) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            warnings,
        }
    }

    /// Record one attempt. Without an active session nothing is recorded.
    ///
    /// The local append always happens first and is never undone; a failed
    /// class-wide write only queues a warning.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        session: Option<&Session>,
        local: &mut AttemptLog,
        stage: StageId,
        question_id: &str,
        submitted_answer: &str,
        is_correct: bool,
        now: Millis,
    ) -> Option<AttemptRecord> {
        let Some(session) = session else {
            log::debug!("ignoring attempt on {stage}:{question_id} without a session");
            return None;
        };
        let record = local.append(stage, question_id, submitted_answer, is_correct, now);
        log::debug!(
            "attempt #{} on {stage}:{question_id} by group {} -> {}",
            record.attempt_ordinal,
            session.group_number,
            if is_correct { "correct" } else { "incorrect" }
        );
        let entry = ClasswideEntry::new(session, record.clone());
        self.warnings
            .check("mirror attempt", self.append_classwide(&entry));
        Some(record)
    }

    /// Append to the shared log, trimming it to capacity.
    ///
    /// Entries this build cannot decode are carried along untouched; only a
    /// blob that is not a list at all is replaced.
    fn append_classwide(&self, entry: &ClasswideEntry) -> Result<(), StoreError> {
        let mut entries = self.raw_entries();
        let value = serde_json::to_value(entry).map_err(|err| StoreError::Write {
            key: KEY_CLASSWIDE_LEDGER.to_string(),
            reason: err.to_string(),
        })?;
        entries.push(value);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        write_json(&self.store, KEY_CLASSWIDE_LEDGER, &entries)
    }

    fn raw_entries(&self) -> Vec<Value> {
        match read_json::<_, Vec<Value>>(&self.store, KEY_CLASSWIDE_LEDGER) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                log::warn!("{err}; starting a fresh class-wide log");
                Vec::new()
            }
        }
    }

    /// Decodable class-wide entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<ClasswideEntry> {
        self.raw_entries()
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    /// Up to `limit` decodable entries starting at `offset`.
    #[must_use]
    pub fn page(&self, offset: usize, limit: usize) -> LedgerPage {
        let all = self.entries();
        let total = all.len();
        let entries = all.into_iter().skip(offset).take(limit).collect();
        LedgerPage {
            entries,
            offset,
            total,
        }
    }

    /// Remove the shared log entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_CLASSWIDE_LEDGER)
    }
}
