use anyhow::{Result, ensure};
use escapade_core::{CourseConfig, ManualClock, ManualScheduler, MemoryStore};
use std::rc::Rc;

use super::{Scenario, ScenarioCtx, ScenarioOutcome, StoreFixture, client_on};
use crate::logic::{LearnerProfile, SimLearner};

const TIGHT_QUOTA_BYTES: usize = 2_048;

/// Storage fills up mid-run; play continues and the failures surface as warnings.
pub struct QuotaPressure;

impl Scenario for QuotaPressure {
    fn name(&self) -> &'static str {
        "quota"
    }

    fn description(&self) -> &'static str {
        "A tiny storage quota: writes fail as warnings while the run still completes in memory"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let memory = MemoryStore::with_quota(TIGHT_QUOTA_BYTES);
        let clock = ManualClock::starting_at(0);
        let mut client = client_on(Rc::new(memory.clone()), &clock, CourseConfig::default())?;
        let mut sim = SimLearner::new("Quinn", 4, ctx.seed, LearnerProfile::default());

        let run = sim.play(&mut client, &clock)?;
        ensure!(run.stages_cleared == 4, "run stopped after {} stages", run.stages_cleared);

        let warnings = client.drain_warnings();
        ensure!(!warnings.is_empty(), "quota never hit at {TIGHT_QUOTA_BYTES} bytes");
        ensure!(
            warnings.iter().all(|w| w.error.is_write()),
            "non-write failure surfaced as a warning"
        );
        ensure!(
            memory.used_bytes() <= TIGHT_QUOTA_BYTES,
            "store grew past its quota"
        );

        let mut outcome = ScenarioOutcome::default();
        let mut operations: Vec<&str> = warnings.iter().map(|w| w.operation).collect();
        operations.sort_unstable();
        operations.dedup();
        outcome.note(format!(
            "{} warnings ({}) over {} attempts",
            warnings.len(),
            operations.join(", "),
            run.attempts
        ));
        Ok(outcome)
    }
}

/// After a view cancels its subscription nothing ticks, whatever changes.
pub struct CancelledSync;

impl Scenario for CancelledSync {
    fn name(&self) -> &'static str {
        "cancel"
    }

    fn description(&self) -> &'static str {
        "Cancelled and dropped subscriptions never tick again"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let fixture = StoreFixture::open(ctx, self.name())?;
        let clock = ManualClock::starting_at(0);
        let scheduler = ManualScheduler::new();
        let watcher = fixture.client(&clock)?;
        let config = watcher.config().clone();

        let mut subscription = watcher.subscribe(&scheduler);
        let dropped = watcher.subscribe(&scheduler);
        ensure!(scheduler.active_intervals() == 4, "expected two feeds per subscription");
        drop(dropped);
        ensure!(scheduler.active_intervals() == 2, "dropped subscription kept ticking");

        scheduler.advance(u64::from(config.pool_poll_ms) * 2);
        let before = subscription.view();
        ensure!(before.pool_ticks == 2, "pool ticked {} times", before.pool_ticks);
        subscription.cancel();

        let mut solver = fixture.client(&clock)?;
        SimLearner::new("Ida", 9, ctx.seed, LearnerProfile::default()).play(&mut solver, &clock)?;
        solver.submit_puzzle_guess(&config.solution_word);
        scheduler.advance(600_000);

        let after = subscription.view();
        ensure!(after == before, "view changed after cancel");
        ensure!(scheduler.active_intervals() == 0, "intervals left registered");

        let mut outcome = ScenarioOutcome::default();
        outcome.note(format!(
            "{} solved-flag ticks before cancel, none after",
            before.solved_ticks
        ));
        Ok(outcome)
    }
}
