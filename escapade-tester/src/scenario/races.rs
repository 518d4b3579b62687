use anyhow::{Context, Result, anyhow, ensure};
use escapade_core::{
    AggregationStore, CompletionRecord, FileStore, GuessOutcome, KeyValueStore, ManualClock,
    constants::KEY_COMPLETIONS,
};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Barrier;

use super::{Scenario, ScenarioCtx, ScenarioOutcome, StoreFixture, StoreKind};

/// Several clients submit the solution in a random order.
pub struct PuzzleRace;

impl Scenario for PuzzleRace {
    fn name(&self) -> &'static str {
        "puzzle-race"
    }

    fn description(&self) -> &'static str {
        "Many clients guess the word; exactly one publishes the solve and it is never rewritten"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let fixture = StoreFixture::open(ctx, self.name())?;
        let clock = ManualClock::starting_at(1_000);
        let mut rng = ChaCha8Rng::seed_from_u64(ctx.seed);
        let solution = fixture.client(&clock)?.config().solution_word.clone();

        let mut guesses: Vec<String> = vec![
            solution.to_lowercase(),
            format!("  {solution} "),
            solution.clone(),
            "GENOMICS".to_string(),
            String::new(),
        ];
        for _ in 0..ctx.learners {
            guesses.push(solution.to_lowercase());
        }
        guesses.shuffle(&mut rng);

        let mut solved = 0;
        let mut repeated = 0;
        let mut first_flag = None;
        for guess in &guesses {
            clock.advance(250);
            let client = fixture.client(&clock)?;
            match client.submit_puzzle_guess(guess) {
                GuessOutcome::Solved(flag) => {
                    solved += 1;
                    first_flag = Some(flag);
                }
                GuessOutcome::AlreadySolved(flag) => {
                    repeated += 1;
                    ensure!(
                        Some(&flag) == first_flag.as_ref(),
                        "solved flag was rewritten by {guess:?}"
                    );
                }
                GuessOutcome::Incorrect => {
                    let normalized = guess.trim().to_uppercase();
                    ensure!(
                        normalized != solution,
                        "correct guess {guess:?} was rejected"
                    );
                }
            }
        }
        ensure!(solved == 1, "{solved} clients published the solve");

        let checker = fixture.client(&clock)?;
        ensure!(checker.is_puzzle_solved(), "flag not visible to a new client");
        checker.admin("instructor")?.clear_puzzle()?;
        ensure!(!checker.is_puzzle_solved(), "admin clear did not retract the flag");

        let mut outcome = ScenarioOutcome::default();
        outcome.note(format!(
            "{} guesses: 1 solve, {repeated} already-solved",
            guesses.len()
        ));
        Ok(outcome)
    }
}

/// Concurrent read-modify-write publishes from separate OS threads, each with
/// its own file handle, released together by a barrier.
pub struct PublishRace;

impl PublishRace {
    fn race(dir: &Path, records: &[CompletionRecord]) -> Result<()> {
        let barrier = Barrier::new(records.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .iter()
                .map(|record| {
                    let barrier = &barrier;
                    scope.spawn(move || -> Result<()> {
                        let store = FileStore::open(dir)?;
                        barrier.wait();
                        AggregationStore::new(store).publish(record)?;
                        Ok(())
                    })
                })
                .collect();
            handles.into_iter().try_for_each(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("publisher thread panicked"))?
            })
        })
    }

    fn check_list(dir: &Path) -> Result<BTreeMap<u32, CompletionRecord>> {
        let store = FileStore::open(dir)?;
        let raw = store
            .get(KEY_COMPLETIONS)?
            .context("completion list missing after publishes")?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).context("completion list corrupted by race")?;
        let pool = AggregationStore::new(store).current_pool();
        ensure!(
            pool.len() == values.len(),
            "race left {} unusable entries",
            values.len() - pool.len()
        );
        let mut by_group = BTreeMap::new();
        for record in pool.records {
            let group = record.group_number;
            ensure!(
                by_group.insert(group, record).is_none(),
                "group {group} duplicated by race"
            );
        }
        Ok(by_group)
    }
}

impl Scenario for PublishRace {
    fn name(&self) -> &'static str {
        "publish-race"
    }

    fn description(&self) -> &'static str {
        "Threads publish completions at once; the list never corrupts or duplicates a group"
    }

    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome> {
        let file_ctx = ScenarioCtx {
            store: StoreKind::File,
            ..ctx.clone()
        };
        let fixture = StoreFixture::open(&file_ctx, self.name())?;
        let dir = fixture.dir().context("file store has no directory")?;
        let mut outcome = ScenarioOutcome::default();

        let groups = ctx.learners.clamp(2, 12);
        let distinct: Vec<_> = (1..=groups)
            .map(|group| CompletionRecord {
                group_number: group,
                symbol: "G".to_string(),
                contributor_name: format!("thread {group}"),
                recorded_at: i64::from(group),
            })
            .collect();
        Self::race(dir, &distinct)?;
        let survived = Self::check_list(dir)?;
        let lost = distinct.len() - survived.len();
        outcome.note(format!(
            "{} concurrent groups: {} survived, {lost} lost to last-write-wins",
            distinct.len(),
            survived.len()
        ));

        // Fill in whatever the race dropped, one at a time.
        for record in &distinct {
            if !survived.contains_key(&record.group_number) {
                AggregationStore::new(FileStore::open(dir)?).publish(record)?;
            }
        }
        ensure!(
            Self::check_list(dir)?.len() == distinct.len(),
            "sequential republish did not restore every group"
        );

        let same_group: Vec<_> = ["tab A", "tab B"]
            .into_iter()
            .map(|tab| CompletionRecord {
                group_number: 1,
                symbol: "G".to_string(),
                contributor_name: tab.to_string(),
                recorded_at: 100,
            })
            .collect();
        Self::race(dir, &same_group)?;
        let after = Self::check_list(dir)?;
        let winner = after
            .get(&1)
            .map(|r| r.contributor_name.clone())
            .unwrap_or_default();
        outcome.note(format!("same-group race kept `{winner}`"));
        Ok(outcome)
    }
}
