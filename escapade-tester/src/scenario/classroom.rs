use anyhow::{Result, ensure};
use escapade_core::{GuessOutcome, ManualClock, ManualScheduler};

use super::{Scenario, ScenarioCtx, ScenarioOutcome, StoreFixture};
use crate::logic::{LearnerProfile, SimLearner};

const LEARNER_NAMES: [&str; 12] = [
    "Ada", "Barbara", "Carl", "Dorothy", "Erwin", "Francis", "Gregor", "Hugo", "Ida", "James",
    "Katalin", "Lynn",
];

fn learner(ctx: &ScenarioCtx, group: u32) -> SimLearner {
    let idx = usize::try_from(group.saturating_sub(1)).unwrap_or_default() % LEARNER_NAMES.len();
    SimLearner::new(LEARNER_NAMES[idx], group, ctx.seed, LearnerProfile::default())
}

/// One learner, all four stages.
pub struct Progression;

impl Scenario for Progression {
    fn name(&self) -> &'static str {
        "progression"
    }

    fn description(&self) -> &'static str {
        "Single learner plays every stage with mistakes and early finalize attempts"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let fixture = StoreFixture::open(ctx, self.name())?;
        let clock = ManualClock::starting_at(0);
        let mut client = fixture.client(&clock)?;
        let run = learner(ctx, 3).play(&mut client, &clock)?;

        let pool = client.current_pool();
        ensure!(pool.has_group(3), "completion for group 3 missing from pool");
        ensure!(
            client.drain_warnings().is_empty(),
            "unexpected storage warnings"
        );

        let mut outcome = ScenarioOutcome::default();
        outcome.note(format!(
            "{} attempts ({} wrong), {} early finalize rejections, {}s played",
            run.attempts,
            run.wrong_answers,
            run.early_rejections,
            run.elapsed_ms / 1_000
        ));
        Ok(outcome)
    }
}

/// A whole class on one shared store, watched by a subscribed client.
pub struct Classroom;

impl Scenario for Classroom {
    fn name(&self) -> &'static str {
        "classroom"
    }

    fn description(&self) -> &'static str {
        "Every group completes on a shared store; a watcher converges on the pool and the solve"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let fixture = StoreFixture::open(ctx, self.name())?;
        let clock = ManualClock::starting_at(0);
        let scheduler = ManualScheduler::new();
        let watcher = fixture.client(&clock)?;
        let config = watcher.config().clone();
        let subscription = watcher.subscribe(&scheduler);

        let groups = config.group_min..=config.group_max.min(config.group_min + ctx.learners.max(1) - 1);
        let mut total_attempts = 0;
        for group in groups.clone() {
            let mut client = fixture.client(&clock)?;
            let run = learner(ctx, group).play(&mut client, &clock)?;
            total_attempts += run.attempts;
        }
        let expected = groups.clone().count();

        scheduler.advance(u64::from(config.pool_poll_ms));
        let view = subscription.view();
        ensure!(
            view.pool.len() == expected,
            "watcher sees {} completions, expected {expected}",
            view.pool.len()
        );
        for group in groups {
            ensure!(view.pool.has_group(group), "group {group} missing from pool");
        }
        ensure!(
            view.pool.symbols.len() == expected,
            "symbol count does not match completions"
        );

        let solver = fixture.client(&clock)?;
        let outcome = solver.submit_puzzle_guess(&config.solution_word.to_lowercase());
        ensure!(
            matches!(outcome, GuessOutcome::Solved(_)),
            "solution word rejected: {outcome:?}"
        );
        ensure!(!subscription.view().is_solved(), "solve visible before a tick");
        scheduler.advance(u64::from(config.solved_poll_ms));
        ensure!(
            subscription.view().is_solved(),
            "solve not visible within one poll interval"
        );

        let admin = watcher.admin("instructor")?;
        let ledger_total = admin.ledger_page(0, 0).total;
        ensure!(
            ledger_total == usize::try_from(total_attempts)?.min(config.ledger_capacity),
            "class ledger holds {ledger_total} entries for {total_attempts} attempts"
        );

        let mut outcome = ScenarioOutcome::default();
        outcome.note(format!(
            "{expected} groups, {total_attempts} attempts, pool `{}`",
            view.pool.symbols.concat()
        ));
        Ok(outcome)
    }
}

/// A group that resets and finishes again still owns exactly one entry.
pub struct Regroup;

impl Scenario for Regroup {
    fn name(&self) -> &'static str {
        "regroup"
    }

    fn description(&self) -> &'static str {
        "Group 5 completes, resets and completes again; the pool keeps one entry"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let fixture = StoreFixture::open(ctx, self.name())?;
        let clock = ManualClock::starting_at(0);
        let mut client = fixture.client(&clock)?;
        let mut sim = learner(ctx, 5);

        let first = sim.play(&mut client, &clock)?;
        client.end_session();
        ensure!(client.current_session().is_none(), "session survived reset");
        ensure!(
            client.current_pool().has_group(5),
            "reset removed the class-wide completion"
        );
        let second = sim.play(&mut client, &clock)?;

        let pool = client.current_pool();
        let entries = pool.records.iter().filter(|r| r.group_number == 5).count();
        ensure!(entries == 1, "group 5 has {entries} pool entries");

        let ledger = client.admin("instructor")?.ledger_page(0, 0).total;
        let attempts = usize::try_from(first.attempts + second.attempts)?;
        ensure!(
            ledger == attempts,
            "class ledger lost attempts across the reset ({ledger} of {attempts})"
        );

        let mut outcome = ScenarioOutcome::default();
        outcome.note(format!("{attempts} attempts over two runs"));
        Ok(outcome)
    }
}
