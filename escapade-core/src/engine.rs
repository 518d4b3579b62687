use serde::Serialize;
use thiserror::Error;

use crate::admin::{AdminConsole, AdminError};
use crate::aggregation::{AggregationStore, CompletionRecord, PoolSnapshot, PublishError};
use crate::clock::Clock;
use crate::config::{ConfigError, CourseConfig};
use crate::content::{ContentSource, PuzzleContent, QuestionSpec};
use crate::ledger::{AttemptLedger, AttemptRecord};
use crate::persist::{KeyValueStore, StorageWarning, WarningSink};
use crate::progress::{Progress, ProgressError, StageSummary, StageTransition, StageView};
use crate::puzzle::{GuessOutcome, PuzzleBoard, PuzzleSolvedFlag};
use crate::session::{Profile, ProfileForm, Session, SessionError, SessionManager};
use crate::stage::StageId;
use crate::sync::{Scheduler, SyncConfig, SyncSubscription, Synchronizer};

/// Why an engine could not be built.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("puzzle content unavailable: {0}")]
    Content(String),
}

/// Result of one answer check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub correct: bool,
    /// The attempt written to the ledger; `None` when there is no session.
    pub record: Option<AttemptRecord>,
}

/// One client's view of the escape room, wired to an injected store and clock.
///
/// The engine keeps the session and its progress in memory and writes every
/// change straight through to the store. Persistence failures never abort an
/// operation; they are queued and handed out by [`EscapeEngine::drain_warnings`].
pub struct EscapeEngine<S, C>
where
    S: KeyValueStore + Clone + 'static,
    C: Clock + Clone,
{
    store: S,
    clock: C,
    config: CourseConfig,
    content: PuzzleContent,
    sessions: SessionManager<S, C>,
    ledger: AttemptLedger<S>,
    pool: AggregationStore<S>,
    board: PuzzleBoard<S>,
    warnings: WarningSink,
    session: Option<Session>,
    progress: Progress,
}

impl<S, C> EscapeEngine<S, C>
where
    S: KeyValueStore + Clone + 'static,
    C: Clock + Clone,
{
    /// Build an engine and pick up whatever session this client left behind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` breaks an invariant; an invalid
    /// reward symbol would otherwise only surface when the final stage fails
    /// to publish.
    pub fn new(
        store: S,
        clock: C,
        config: CourseConfig,
        content: PuzzleContent,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let warnings = WarningSink::default();
        let sessions = SessionManager::new(store.clone(), clock.clone(), warnings.clone());
        let session = sessions.current();
        let progress = session.as_ref().map_or_else(Progress::default, |session| {
            Progress::load(&store, &session.session_id)
        });
        if let Some(session) = &session {
            log::debug!(
                "resuming session {} at {:?}",
                session.session_id,
                progress.state(true)
            );
        }
        Ok(Self {
            ledger: AttemptLedger::new(store.clone(), config.ledger_capacity, warnings.clone()),
            pool: AggregationStore::new(store.clone()),
            board: PuzzleBoard::new(store.clone(), warnings.clone()),
            store,
            clock,
            config,
            content,
            sessions,
            warnings,
            session,
            progress,
        })
    }

    /// Build an engine with content loaded from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Content`] if content cannot be loaded and
    /// [`EngineError::Config`] for an invalid config.
    pub fn with_source<Src: ContentSource>(
        store: S,
        clock: C,
        config: CourseConfig,
        source: &Src,
    ) -> Result<Self, EngineError> {
        let content = source
            .load_content()
            .map_err(|err| EngineError::Content(err.to_string()))?;
        Ok(Self::new(store, clock, config, content)?)
    }

    #[must_use]
    pub const fn config(&self) -> &CourseConfig {
        &self.config
    }

    #[must_use]
    pub const fn content(&self) -> &PuzzleContent {
        &self.content
    }

    #[must_use]
    pub const fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Start a fresh play-through, discarding this client's previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] listing every invalid field.
    pub fn start_session(&mut self, profile: &Profile) -> Result<Session, SessionError> {
        let session = self.sessions.start(profile, &self.config)?;
        self.progress = Progress::for_session(&session.session_id);
        self.persist_progress();
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Like [`EscapeEngine::start_session`] for raw form input, where any
    /// field may be missing or of the wrong type.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] listing every invalid field.
    pub fn start_session_from_form(&mut self, form: &ProfileForm) -> Result<Session, SessionError> {
        let profile = form.parse(&self.config)?;
        self.start_session(&profile)
    }

    /// Clear the session and its local progress. Class-wide records stay.
    ///
    /// If another client already replaced the session, only this engine's
    /// copy is dropped; the newer session is left alone.
    pub fn end_session(&mut self) {
        match self.sessions.current() {
            Some(stored) if !self.owns(&stored) => {
                log::info!(
                    "not ending {}: it was started by another client",
                    stored.session_id
                );
            }
            _ => self.sessions.end(),
        }
        self.session = None;
        self.progress = Progress::default();
    }

    fn owns(&self, stored: &Session) -> bool {
        self.session
            .as_ref()
            .is_some_and(|mine| mine.session_id == stored.session_id)
    }

    /// Re-read the shared session before a write. When another client has
    /// started a different one, adopt it with its own progress and refuse
    /// the write. A missing session is not adopted: the write that stored
    /// ours may have failed, and progress stays keyed by our id.
    fn ensure_current_session(&mut self) -> Result<(), ProgressError> {
        let Some(stored) = self.sessions.current() else {
            return Ok(());
        };
        if self.owns(&stored) {
            return Ok(());
        }
        log::warn!(
            "session {:?} replaced by {} in another client; reloading",
            self.session.as_ref().map(|s| s.session_id.as_str()),
            stored.session_id
        );
        self.progress = Progress::load(&self.store, &stored.session_id);
        let current = stored.session_id.clone();
        self.session = Some(stored);
        Err(ProgressError::SessionChanged { current })
    }

    #[must_use]
    pub const fn current_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn group(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.group_number)
    }

    /// Questions this client's group must solve in `stage`.
    #[must_use]
    pub fn questions_for(&self, stage: StageId) -> &[QuestionSpec] {
        self.content.questions_for(stage, self.group())
    }

    /// Mark `stage` as entered, starting its timer on the first visit.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::NoSession`], [`ProgressError::StageLocked`]
    /// or [`ProgressError::SessionChanged`].
    pub fn enter_stage(&mut self, stage: StageId) -> Result<bool, ProgressError> {
        self.ensure_current_session()?;
        if self.session.is_none() {
            return Err(ProgressError::NoSession);
        }
        let started = self.progress.enter(stage, self.clock.now_ms())?;
        if started {
            log::debug!("timer started for {stage}");
            self.persist_progress();
        }
        Ok(started)
    }

    /// Check `answer` against question `question_id` of `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::UnknownQuestion`] if the stage has no such
    /// question for this group, [`ProgressError::StageLocked`] if the
    /// session has not unlocked `stage`, or [`ProgressError::SessionChanged`].
    pub fn evaluate(
        &mut self,
        stage: StageId,
        question_id: &str,
        answer: &str,
    ) -> Result<Evaluation, ProgressError> {
        self.ensure_current_session()?;
        let spec = self
            .content
            .question(stage, self.group(), question_id)
            .cloned()
            .ok_or_else(|| ProgressError::UnknownQuestion {
                stage,
                question_id: question_id.to_string(),
            })?;
        self.record_evaluation(stage, &spec, answer)
    }

    /// Check `answer` against an explicit question definition.
    ///
    /// Every call with a session appends exactly one attempt, even for a
    /// question that is already solved. Without a session the answer is
    /// still checked but nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::StageLocked`] if the session has not unlocked
    /// `stage`, or [`ProgressError::SessionChanged`].
    pub fn evaluate_against(
        &mut self,
        stage: StageId,
        spec: &QuestionSpec,
        answer: &str,
    ) -> Result<Evaluation, ProgressError> {
        self.ensure_current_session()?;
        self.record_evaluation(stage, spec, answer)
    }

    fn record_evaluation(
        &mut self,
        stage: StageId,
        spec: &QuestionSpec,
        answer: &str,
    ) -> Result<Evaluation, ProgressError> {
        if self.session.is_some() && !self.progress.stage_unlock.is_unlocked(stage) {
            return Err(ProgressError::StageLocked(stage));
        }
        let correct = spec.accepts(answer);
        let record = self.ledger.record(
            self.session.as_ref(),
            &mut self.progress.attempts,
            stage,
            &spec.id,
            answer,
            correct,
            self.clock.now_ms(),
        );
        if record.is_some() {
            self.persist_progress();
        }
        Ok(Evaluation { correct, record })
    }

    /// Close `stage` if every question's latest attempt is correct.
    ///
    /// Finalizing the last stage publishes this group's completion to the
    /// shared pool.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::NoSession`], [`ProgressError::StageLocked`],
    /// [`ProgressError::Incomplete`], [`ProgressError::Unsolved`] or
    /// [`ProgressError::SessionChanged`]; the unlock set is unchanged in
    /// every case.
    pub fn attempt_finalize_stage(
        &mut self,
        stage: StageId,
    ) -> Result<StageTransition, ProgressError> {
        self.ensure_current_session()?;
        let Some(session) = self.session.clone() else {
            return Err(ProgressError::NoSession);
        };
        let now = self.clock.now_ms();
        let questions = self.content.questions_for(stage, Some(session.group_number));
        let transition = self.progress.finalize(stage, questions, now)?;
        self.persist_progress();

        match transition.unlocked {
            Some(next) => log::info!(
                "group {} cleared {stage}; {next} unlocked",
                session.group_number
            ),
            None => {
                log::info!("group {} completed the final stage", session.group_number);
                self.publish_completion(&session, now);
            }
        }
        Ok(transition)
    }

    fn publish_completion(&self, session: &Session, now: i64) {
        let record = CompletionRecord {
            group_number: session.group_number,
            symbol: self.config.reward_symbol_for(session.group_number).to_string(),
            contributor_name: session.display_name.clone(),
            recorded_at: now,
        };
        match self.pool.publish(&record) {
            Ok(()) => {}
            Err(PublishError::Store(err)) => {
                self.warnings.check("publish completion", Err(err));
            }
            Err(err) => log::warn!("completion not published: {err}"),
        }
    }

    /// Snapshot of this client's progress for rendering.
    #[must_use]
    pub fn current_stage_view(&self) -> StageView {
        let group = self.group();
        let stages = StageId::ALL
            .into_iter()
            .map(|stage| {
                StageSummary::build(&self.progress, stage, self.content.questions_for(stage, group))
            })
            .collect();
        let reward_symbol = group
            .filter(|_| self.progress.completed)
            .map(|g| self.config.reward_symbol_for(g).to_string());
        StageView {
            state: self.progress.state(self.session.is_some()),
            stage_unlock: self.progress.stage_unlock,
            percent_complete: self.progress.percent_complete(),
            stages,
            reward_symbol,
        }
    }

    /// Every attempt at one question, oldest first.
    #[must_use]
    pub fn attempts_for(&self, stage: StageId, question_id: &str) -> &[AttemptRecord] {
        self.progress.attempts.history(stage, question_id)
    }

    #[must_use]
    pub fn current_pool(&self) -> PoolSnapshot {
        self.pool.current_pool()
    }

    /// Guess the class solution word. The solver is recorded by display name.
    pub fn submit_puzzle_guess(&self, guess: &str) -> GuessOutcome {
        let solver = self.session.as_ref().map(|s| s.display_name.as_str());
        self.board
            .submit_guess(guess, &self.config.solution_word, solver, self.clock.now_ms())
    }

    #[must_use]
    pub fn is_puzzle_solved(&self) -> bool {
        self.board.is_solved()
    }

    #[must_use]
    pub fn puzzle_flag(&self) -> Option<PuzzleSolvedFlag> {
        self.board.flag()
    }

    #[must_use]
    pub fn synchronizer(&self) -> Synchronizer<S> {
        Synchronizer::new(self.store.clone(), SyncConfig::from(&self.config))
    }

    /// Start polling the shared pool and solved flag on `scheduler`.
    pub fn subscribe<Sch: Scheduler>(&self, scheduler: &Sch) -> SyncSubscription<Sch::Handle> {
        self.synchronizer().start(scheduler)
    }

    /// # Errors
    ///
    /// Returns [`AdminError::Denied`] for a wrong secret.
    pub fn admin(&self, secret: &str) -> Result<AdminConsole<S>, AdminError> {
        AdminConsole::unlock(self.store.clone(), &self.config, secret)
    }

    /// Persistence failures since the last call.
    pub fn drain_warnings(&self) -> Vec<StorageWarning> {
        self.warnings.drain()
    }

    fn persist_progress(&self) {
        self.warnings
            .check("persist progress", self.progress.save(&self.store));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persist::MemoryStore;
    use crate::progress::ProgressState;

    fn engine(store: &MemoryStore) -> EscapeEngine<MemoryStore, ManualClock> {
        EscapeEngine::new(
            store.clone(),
            ManualClock::starting_at(1_000),
            CourseConfig::default(),
            PuzzleContent::bundled().unwrap(),
        )
        .unwrap()
    }

    fn clear_stage_one(engine: &mut EscapeEngine<MemoryStore, ManualClock>) {
        for (id, answer) in [("q1", "DNA"), ("q2", "Thymine"), ("q3", "double helix")] {
            assert!(engine.evaluate(StageId::Stage1, id, answer).unwrap().correct);
        }
    }

    fn profile(group: i64) -> Profile {
        Profile {
            display_name: "Rosalind".into(),
            cohort_label: "Bio 101".into(),
            cohort_year: 2025,
            group_number: group,
        }
    }

    #[test]
    fn evaluation_without_session_records_nothing() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        let eval = engine.evaluate(StageId::Stage1, "q1", "DNA").unwrap();
        assert!(eval.correct);
        assert!(eval.record.is_none());
        assert!(engine.attempts_for(StageId::Stage1, "q1").is_empty());
        assert_eq!(engine.current_stage_view().state, ProgressState::NoSession);
        assert_eq!(
            engine.attempt_finalize_stage(StageId::Stage1),
            Err(ProgressError::NoSession)
        );
    }

    #[test]
    fn locked_stage_rejects_evaluation_and_entry() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.start_session(&profile(2)).unwrap();
        assert_eq!(
            engine.evaluate(StageId::Stage2, "q1", "TAC"),
            Err(ProgressError::StageLocked(StageId::Stage2))
        );
        assert_eq!(
            engine.enter_stage(StageId::Stage3),
            Err(ProgressError::StageLocked(StageId::Stage3))
        );
        assert_eq!(engine.enter_stage(StageId::Stage1), Ok(true));
        assert_eq!(engine.enter_stage(StageId::Stage1), Ok(false));
    }

    #[test]
    fn unknown_question_is_reported() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.start_session(&profile(2)).unwrap();
        assert!(matches!(
            engine.evaluate(StageId::Stage1, "q9", "x"),
            Err(ProgressError::UnknownQuestion { .. })
        ));
    }

    #[test]
    fn progress_survives_reload() {
        let store = MemoryStore::new();
        let mut first = engine(&store);
        first.start_session(&profile(4)).unwrap();
        clear_stage_one(&mut first);
        first.attempt_finalize_stage(StageId::Stage1).unwrap();

        let reloaded = engine(&store);
        assert_eq!(reloaded.current_session(), first.current_session());
        assert!(reloaded.current_stage_view().stage_unlock.stage2);
        assert_eq!(reloaded.attempts_for(StageId::Stage1, "q3").len(), 1);
    }

    #[test]
    fn write_failures_surface_as_warnings() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.start_session(&profile(1)).unwrap();
        assert!(engine.drain_warnings().is_empty());

        store.set_quota(Some(store.used_bytes()));
        let eval = engine.evaluate(StageId::Stage1, "q1", "RNA").unwrap();
        assert!(!eval.correct);
        assert_eq!(engine.attempts_for(StageId::Stage1, "q1").len(), 1);

        let warnings = engine.drain_warnings();
        assert!(!warnings.is_empty());
        assert!(warnings.iter().all(|w| w.error.is_write()));
        assert!(engine.drain_warnings().is_empty());
    }

    #[test]
    fn end_session_keeps_class_records() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.start_session(&profile(6)).unwrap();
        engine.evaluate(StageId::Stage1, "q1", "DNA").unwrap();
        engine.end_session();
        assert!(engine.current_session().is_none());
        assert!(engine.attempts_for(StageId::Stage1, "q1").is_empty());
        let admin = engine.admin("instructor").unwrap();
        assert_eq!(admin.ledger_page(0, 10).total, 1);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        for config in [
            CourseConfig {
                reward_symbol: "GE".into(),
                ..CourseConfig::default()
            },
            CourseConfig {
                reward_symbol: "?".into(),
                ..CourseConfig::default()
            },
            CourseConfig {
                group_min: 0,
                ..CourseConfig::default()
            },
        ] {
            let built = EscapeEngine::new(
                MemoryStore::new(),
                ManualClock::default(),
                config,
                PuzzleContent::bundled().unwrap(),
            );
            assert!(built.is_err());
        }

        let err = EscapeEngine::with_source(
            MemoryStore::new(),
            ManualClock::default(),
            CourseConfig {
                reward_symbol: "GE".into(),
                ..CourseConfig::default()
            },
            &crate::content::BundledContent,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::InvalidSymbol { .. })
        ));
    }

    #[test]
    fn replaced_session_is_never_written_over() {
        let store = MemoryStore::new();
        let mut ada = engine(&store);
        ada.start_session(&profile(1)).unwrap();
        clear_stage_one(&mut ada);

        let mut bob = engine(&store);
        let bobs = bob.start_session(&profile(2)).unwrap();

        let err = ada.attempt_finalize_stage(StageId::Stage1).unwrap_err();
        assert_eq!(
            err,
            ProgressError::SessionChanged {
                current: bobs.session_id.clone()
            }
        );
        assert!(err.is_recoverable());

        // Ada's engine now follows the stored session, with its own progress.
        assert_eq!(ada.current_session(), Some(&bobs));
        assert!(!ada.current_stage_view().stage_unlock.stage2);
        assert!(ada.attempts_for(StageId::Stage1, "q1").is_empty());

        let reloaded = engine(&store);
        assert_eq!(reloaded.current_session().map(|s| s.group_number), Some(2));
        assert!(!reloaded.current_stage_view().stage_unlock.stage2);
        assert!(reloaded.attempts_for(StageId::Stage1, "q1").is_empty());
        assert_eq!(
            reloaded.progress().session_id.as_deref(),
            Some(bobs.session_id.as_str())
        );

        // Stale writes through the other entry points are refused as well.
        let mut stale = engine(&store);
        bob.end_session();
        bob.start_session(&profile(3)).unwrap();
        assert!(matches!(
            stale.evaluate(StageId::Stage1, "q1", "DNA"),
            Err(ProgressError::SessionChanged { .. })
        ));
        assert_eq!(stale.current_session().map(|s| s.group_number), Some(3));
    }

    #[test]
    fn stale_end_session_leaves_newer_session() {
        let store = MemoryStore::new();
        let mut ada = engine(&store);
        ada.start_session(&profile(1)).unwrap();
        let mut bob = engine(&store);
        let bobs = bob.start_session(&profile(2)).unwrap();

        ada.end_session();
        assert!(ada.current_session().is_none());
        assert_eq!(engine(&store).current_session(), Some(&bobs));
    }
}
