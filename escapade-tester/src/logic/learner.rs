//! Seeded simulated learners that play through the stages the way a class
//! does: some wrong answers, the occasional premature "finish room" click.

use anyhow::{Result, bail, ensure};
use escapade_core::{
    Clock, EscapeEngine, KeyValueStore, ManualClock, Profile, ProgressError, QuestionKind,
    QuestionSpec, StageId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MAX_TRIES_PER_QUESTION: u32 = 12;

/// How one learner behaves.
#[derive(Debug, Clone, Copy)]
pub struct LearnerProfile {
    /// Probability that a given answer is wrong.
    pub error_rate: f64,
    /// Probability of trying to finalize a stage before answering everything.
    pub eager_rate: f64,
    /// Think time per answer, in milliseconds.
    pub think_ms: (i64, i64),
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self {
            error_rate: 0.3,
            eager_rate: 0.2,
            think_ms: (4_000, 45_000),
        }
    }
}

/// What happened during one learner's run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnerRun {
    pub attempts: u32,
    pub wrong_answers: u32,
    pub early_rejections: u32,
    pub stages_cleared: u32,
    pub elapsed_ms: i64,
}

pub struct SimLearner {
    pub name: String,
    pub group: u32,
    behavior: LearnerProfile,
    rng: ChaCha8Rng,
}

impl SimLearner {
    #[must_use]
    pub fn new(name: impl Into<String>, group: u32, seed: u64, behavior: LearnerProfile) -> Self {
        Self {
            name: name.into(),
            group,
            behavior,
            rng: ChaCha8Rng::seed_from_u64(seed ^ u64::from(group).rotate_left(32)),
        }
    }

    #[must_use]
    pub fn profile(&self) -> Profile {
        Profile {
            display_name: self.name.clone(),
            cohort_label: "Simulated Period".to_string(),
            cohort_year: 2026,
            group_number: i64::from(self.group),
        }
    }

    fn wrong_answer(&mut self, question: &QuestionSpec) -> String {
        if question.kind == QuestionKind::Choice
            && let Some(options) = &question.options
        {
            let wrong: Vec<&String> = options
                .iter()
                .filter(|o| **o != question.correct_answer)
                .collect();
            if !wrong.is_empty() {
                return wrong[self.rng.gen_range(0..wrong.len())].clone();
            }
        }
        format!("not {}", question.correct_answer)
    }

    fn think(&mut self, clock: &ManualClock) {
        let (lo, hi) = self.behavior.think_ms;
        clock.advance(self.rng.gen_range(lo..=hi.max(lo)));
    }

    /// Start a session and play every stage to completion, checking the
    /// engine's invariants along the way.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invariant the engine broke.
    pub fn play<S>(
        &mut self,
        engine: &mut EscapeEngine<S, ManualClock>,
        clock: &ManualClock,
    ) -> Result<LearnerRun>
    where
        S: KeyValueStore + Clone + 'static,
    {
        let started = clock.now_ms();
        engine
            .start_session(&self.profile())
            .map_err(|err| anyhow::anyhow!("session rejected: {err}"))?;
        let mut run = LearnerRun::default();

        for stage in StageId::ALL {
            engine.enter_stage(stage)?;
            let questions = engine.questions_for(stage).to_vec();
            ensure!(!questions.is_empty(), "{stage} has no questions");

            for (idx, question) in questions.iter().enumerate() {
                if idx > 0 && self.rng.gen_bool(self.behavior.eager_rate) {
                    match engine.attempt_finalize_stage(stage) {
                        Err(ProgressError::Incomplete { .. }) => run.early_rejections += 1,
                        other => bail!("premature finalize of {stage} returned {other:?}"),
                    }
                }
                self.answer_until_correct(engine, clock, stage, question, &mut run)?;
            }

            let before = engine.current_stage_view().stage_unlock;
            let transition = engine.attempt_finalize_stage(stage)?;
            let after = engine.current_stage_view().stage_unlock;
            for earlier in StageId::ALL {
                ensure!(
                    !before.is_unlocked(earlier) || after.is_unlocked(earlier),
                    "{earlier} relocked after finalizing {stage}"
                );
            }
            ensure!(
                transition.unlocked == stage.next(),
                "{stage} unlocked {:?}",
                transition.unlocked
            );
            run.stages_cleared += 1;
        }

        let view = engine.current_stage_view();
        ensure!(view.percent_complete == 100, "run ended at {}%", view.percent_complete);
        run.elapsed_ms = clock.now_ms() - started;
        Ok(run)
    }

    fn answer_until_correct<S>(
        &mut self,
        engine: &mut EscapeEngine<S, ManualClock>,
        clock: &ManualClock,
        stage: StageId,
        question: &QuestionSpec,
        run: &mut LearnerRun,
    ) -> Result<()>
    where
        S: KeyValueStore + Clone + 'static,
    {
        for _ in 0..MAX_TRIES_PER_QUESTION {
            self.think(clock);
            let answer = if self.rng.gen_bool(self.behavior.error_rate) {
                self.wrong_answer(question)
            } else {
                question.correct_answer.clone()
            };
            let eval = engine.evaluate(stage, &question.id, &answer)?;
            run.attempts += 1;

            let history = engine.attempts_for(stage, &question.id);
            let ordinals_ok = history
                .iter()
                .zip(1..)
                .all(|(record, expected)| record.attempt_ordinal == expected);
            ensure!(
                ordinals_ok,
                "ordinals for {stage}:{} are not 1..={}",
                question.id,
                history.len()
            );

            if eval.correct {
                return Ok(());
            }
            run.wrong_answers += 1;
        }
        // Give up guessing and type the right answer.
        let eval = engine.evaluate(stage, &question.id, &question.correct_answer)?;
        run.attempts += 1;
        ensure!(eval.correct, "{stage}:{} rejects its own answer", question.id);
        Ok(())
    }
}
