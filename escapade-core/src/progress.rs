//! Progression State Machine: which stages are open, whether a stage may be
//! finalized, and the derived snapshot the UI renders.
//!
//! `NoSession -> Stage1 -> Stage2 -> Stage3 -> Stage4 -> Complete`. Unlocks
//! are cumulative; a learner may revisit any unlocked stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Millis;
use crate::constants::{KEY_PROGRESS, PERCENT_PER_STAGE};
use crate::content::QuestionSpec;
use crate::ledger::AttemptLog;
use crate::persist::{KeyValueStore, StoreError, read_json_or_default, write_json};
use crate::stage::{StageId, StageUnlockSet};
use crate::timer::{RoomTimer, RoomTiming};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("no active session")]
    NoSession,
    /// Another client sharing the store replaced the session this engine
    /// was working on. The engine has reloaded; the caller should re-render.
    #[error("session changed in another client; now on {current}")]
    SessionChanged { current: String },
    #[error("{0} is still locked")]
    StageLocked(StageId),
    #[error("{stage} has no question `{question_id}`")]
    UnknownQuestion { stage: StageId, question_id: String },
    #[error("not all locks attempted in {stage} (missing: {})", .missing.join(", "))]
    Incomplete { stage: StageId, missing: Vec<String> },
    #[error("not all locks correct in {stage} (still wrong: {})", .failing.join(", "))]
    Unsolved { stage: StageId, failing: Vec<String> },
}

impl ProgressError {
    /// Whether the learner can fix this by continuing to play.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Incomplete { .. } | Self::Unsolved { .. } | Self::SessionChanged { .. }
        )
    }
}

/// Where a client stands in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "camelCase")]
pub enum ProgressState {
    NoSession,
    Stage(StageId),
    Complete,
}

/// Session-scoped progress persisted under `session.progress`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Session this progress belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub stage_unlock: StageUnlockSet,
    #[serde(default)]
    pub room_timing: RoomTimer,
    #[serde(default)]
    pub attempts: AttemptLog,
    #[serde(default)]
    pub completed: bool,
}

/// Result of a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub stage: StageId,
    /// Stage opened by this finalize, `None` after the final stage.
    pub unlocked: Option<StageId>,
    /// `false` when the stage had already been finalized before.
    pub first_time: bool,
    pub completed: bool,
    pub timing: RoomTiming,
}

impl Progress {
    /// Empty progress owned by `session_id`.
    #[must_use]
    pub fn for_session(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Self::default()
        }
    }

    /// Load the progress stored for `session_id`. Unreadable progress, or
    /// progress written for another session, starts over.
    #[must_use]
    pub fn load<S: KeyValueStore + ?Sized>(store: &S, session_id: &str) -> Self {
        let stored: Self = read_json_or_default(store, KEY_PROGRESS);
        if stored.session_id.as_deref() == Some(session_id) {
            return stored;
        }
        if stored != Self::default() {
            log::warn!(
                "stored progress belongs to {:?}, not {session_id}; starting over",
                stored.session_id
            );
        }
        Self::for_session(session_id)
    }

    /// Persist the whole progress blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        write_json(store, KEY_PROGRESS, self)
    }

    /// Current state, derived from the unlock set rather than a stored pointer.
    #[must_use]
    pub fn state(&self, has_session: bool) -> ProgressState {
        if !has_session {
            return ProgressState::NoSession;
        }
        if self.completed {
            return ProgressState::Complete;
        }
        self.stage_unlock
            .highest_contiguous()
            .map_or(ProgressState::Stage(StageId::FIRST), ProgressState::Stage)
    }

    /// Whether `stage` has been finalized.
    #[must_use]
    pub fn is_cleared(&self, stage: StageId) -> bool {
        match stage.next() {
            Some(next) => self.stage_unlock.is_unlocked(next),
            None => self.completed,
        }
    }

    /// 25 points per finalized stage.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        let cleared = StageId::ALL
            .into_iter()
            .filter(|stage| self.is_cleared(*stage))
            .count();
        u8::try_from(cleared)
            .unwrap_or(u8::MAX)
            .saturating_mul(PERCENT_PER_STAGE)
            .min(100)
    }

    /// Evaluate the finalize precondition for `stage` against the attempt
    /// history as it stands now.
    ///
    /// Every question needs at least one attempt, and the most recent attempt
    /// at every question must be correct.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Incomplete`] when any question was never
    /// attempted, otherwise [`ProgressError::Unsolved`] when any latest
    /// attempt is wrong.
    pub fn check_stage(&self, stage: StageId, questions: &[QuestionSpec]) -> Result<(), ProgressError> {
        let mut missing = Vec::new();
        let mut failing = Vec::new();
        for question in questions {
            match self.attempts.latest(stage, &question.id) {
                None => missing.push(question.id.clone()),
                Some(latest) if !latest.is_correct => failing.push(question.id.clone()),
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            return Err(ProgressError::Incomplete { stage, missing });
        }
        if !failing.is_empty() {
            return Err(ProgressError::Unsolved { stage, failing });
        }
        Ok(())
    }

    /// Stamp the start of a visit to `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::StageLocked`] if `stage` is not unlocked.
    pub fn enter(&mut self, stage: StageId, now: Millis) -> Result<bool, ProgressError> {
        if !self.stage_unlock.is_unlocked(stage) {
            return Err(ProgressError::StageLocked(stage));
        }
        Ok(self.room_timing.enter(stage, now))
    }

    /// Try to close `stage`, unlocking the next one or completing the run.
    ///
    /// On any error the unlock set and timings are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::StageLocked`] for a locked stage and the
    /// [`Progress::check_stage`] errors when its questions are not all solved.
    pub fn finalize(
        &mut self,
        stage: StageId,
        questions: &[QuestionSpec],
        now: Millis,
    ) -> Result<StageTransition, ProgressError> {
        if !self.stage_unlock.is_unlocked(stage) {
            return Err(ProgressError::StageLocked(stage));
        }
        self.check_stage(stage, questions)?;

        let first_time = !self.is_cleared(stage);
        let unlocked = stage.next();
        match unlocked {
            Some(next) => {
                self.stage_unlock.unlock(next);
            }
            None => self.completed = true,
        }
        let timing = self.room_timing.complete(stage, now).clone();
        Ok(StageTransition {
            stage,
            unlocked,
            first_time,
            completed: self.completed,
            timing,
        })
    }
}

/// Per-stage counts for the stage view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub stage: StageId,
    pub unlocked: bool,
    pub cleared: bool,
    pub total_questions: usize,
    pub attempted: usize,
    pub solved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<RoomTiming>,
}

impl StageSummary {
    #[must_use]
    pub fn build(progress: &Progress, stage: StageId, questions: &[QuestionSpec]) -> Self {
        let latest: Vec<_> = questions
            .iter()
            .filter_map(|q| progress.attempts.latest(stage, &q.id))
            .collect();
        Self {
            stage,
            unlocked: progress.stage_unlock.is_unlocked(stage),
            cleared: progress.is_cleared(stage),
            total_questions: questions.len(),
            attempted: latest.len(),
            solved: latest.iter().filter(|r| r.is_correct).count(),
            timing: progress.room_timing.get(stage).cloned(),
        }
    }
}

/// Read-only snapshot of a client's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub state: ProgressState,
    pub stage_unlock: StageUnlockSet,
    pub percent_complete: u8,
    pub stages: Vec<StageSummary>,
    /// Symbol earned, once the run is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::QuestionKind;
    use crate::persist::MemoryStore;

    fn questions(ids: &[&str]) -> Vec<QuestionSpec> {
        ids.iter()
            .map(|id| QuestionSpec {
                id: (*id).to_string(),
                prompt: String::new(),
                kind: QuestionKind::Text,
                options: None,
                correct_answer: "x".into(),
                case_sensitive: false,
            })
            .collect()
    }

    fn solve_all(progress: &mut Progress, stage: StageId, qs: &[QuestionSpec]) {
        for q in qs {
            progress.attempts.append(stage, &q.id, "x", true, 1);
        }
    }

    #[test]
    fn fresh_progress_starts_at_stage_one() {
        let progress = Progress::default();
        assert_eq!(progress.state(false), ProgressState::NoSession);
        assert_eq!(progress.state(true), ProgressState::Stage(StageId::Stage1));
        assert_eq!(progress.percent_complete(), 0);
    }

    #[test]
    fn incomplete_beats_unsolved() {
        let qs = questions(&["q1", "q2", "q3"]);
        let mut progress = Progress::default();
        progress.attempts.append(StageId::Stage1, "q1", "bad", false, 1);
        progress.attempts.append(StageId::Stage1, "q2", "x", true, 1);
        let err = progress.finalize(StageId::Stage1, &qs, 5).unwrap_err();
        assert_eq!(
            err,
            ProgressError::Incomplete {
                stage: StageId::Stage1,
                missing: vec!["q3".into()],
            }
        );
        assert!(err.is_recoverable());
        assert!(!progress.stage_unlock.stage2);
        assert!(progress.room_timing.get(StageId::Stage1).is_none());
    }

    #[test]
    fn only_latest_attempt_counts() {
        let qs = questions(&["q1", "q2"]);
        let mut progress = Progress::default();
        solve_all(&mut progress, StageId::Stage1, &qs);
        progress.attempts.append(StageId::Stage1, "q2", "oops", false, 2);
        assert!(matches!(
            progress.finalize(StageId::Stage1, &qs, 3),
            Err(ProgressError::Unsolved { ref failing, .. }) if failing == &["q2".to_string()]
        ));
        progress.attempts.append(StageId::Stage1, "q2", "x", true, 4);
        let step = progress.finalize(StageId::Stage1, &qs, 5).unwrap();
        assert_eq!(step.unlocked, Some(StageId::Stage2));
        assert!(step.first_time);
        assert_eq!(progress.state(true), ProgressState::Stage(StageId::Stage2));
        assert_eq!(progress.percent_complete(), 25);
    }

    #[test]
    fn locked_stage_cannot_be_entered_or_finalized() {
        let qs = questions(&["q1"]);
        let mut progress = Progress::default();
        solve_all(&mut progress, StageId::Stage3, &qs);
        assert_eq!(
            progress.finalize(StageId::Stage3, &qs, 1),
            Err(ProgressError::StageLocked(StageId::Stage3))
        );
        assert_eq!(
            progress.enter(StageId::Stage2, 1),
            Err(ProgressError::StageLocked(StageId::Stage2))
        );
        assert_eq!(progress.enter(StageId::Stage1, 1), Ok(true));
        assert_eq!(progress.enter(StageId::Stage1, 2), Ok(false));
    }

    #[test]
    fn full_run_completes_and_refinalize_is_harmless() {
        let qs = questions(&["a", "b"]);
        let mut progress = Progress::default();
        for stage in StageId::ALL {
            progress.enter(stage, 10).unwrap();
            solve_all(&mut progress, stage, &qs);
            progress.finalize(stage, &qs, 70).unwrap();
        }
        assert_eq!(progress.state(true), ProgressState::Complete);
        assert_eq!(progress.percent_complete(), 100);
        assert_eq!(
            progress.room_timing.get(StageId::Stage4).unwrap().duration_ms,
            Some(60)
        );

        let again = progress.finalize(StageId::Stage2, &qs, 500).unwrap();
        assert!(!again.first_time);
        assert_eq!(again.timing.end_time, Some(70));
        assert!(progress.stage_unlock.stage4);
    }

    #[test]
    fn stage_summary_counts_latest_attempts() {
        let qs = questions(&["a", "b", "c"]);
        let mut progress = Progress::default();
        progress.attempts.append(StageId::Stage1, "a", "x", true, 1);
        progress.attempts.append(StageId::Stage1, "b", "no", false, 1);
        let summary = StageSummary::build(&progress, StageId::Stage1, &qs);
        assert_eq!(summary.total_questions, 3);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.solved, 1);
        assert!(!summary.cleared);
    }

    #[test]
    fn progress_round_trips_through_store() {
        let store = MemoryStore::new();
        let mut progress = Progress::for_session("s-1");
        progress.stage_unlock.unlock(StageId::Stage2);
        progress.attempts.append(StageId::Stage1, "q1", "x", true, 3);
        progress.save(&store).unwrap();
        assert_eq!(Progress::load(&store, "s-1"), progress);

        store.set(KEY_PROGRESS, "not json").unwrap();
        assert_eq!(Progress::load(&store, "s-1"), Progress::for_session("s-1"));
    }

    #[test]
    fn progress_of_another_session_is_not_loaded() {
        let store = MemoryStore::new();
        let mut theirs = Progress::for_session("s-1");
        theirs.stage_unlock.unlock(StageId::Stage2);
        theirs.save(&store).unwrap();

        let mine = Progress::load(&store, "s-2");
        assert_eq!(mine, Progress::for_session("s-2"));
        assert!(!mine.stage_unlock.stage2);

        store.set(KEY_PROGRESS, r#"{"stageUnlock": {"stage2": true}}"#).unwrap();
        assert!(!Progress::load(&store, "s-2").stage_unlock.stage2);
    }
}
