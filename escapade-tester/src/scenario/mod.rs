//! Named classroom scenarios the tester can run.

use anyhow::{Context, Result};
use escapade_core::{
    CourseConfig, EscapeEngine, FileStore, KeyValueStore, ManualClock, MemoryStore, PuzzleContent,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::common::temp_store_dir;

mod classroom;
mod races;
mod resilience;

pub use classroom::{Classroom, Progression, Regroup};
pub use races::{PublishRace, PuzzleRace};
pub use resilience::{CancelledSync, QuotaPressure};

/// Which shared surface the simulated clients use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// In-process map shared by handle
    Memory,
    /// One JSON file per key in a temp directory
    File,
}

#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub seed: u64,
    pub learners: u32,
    pub store: StoreKind,
    pub store_root: Option<PathBuf>,
    pub verbose: bool,
}

/// Observations worth reporting even when a scenario passes.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOutcome {
    pub notes: Vec<String>,
}

impl ScenarioOutcome {
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

pub trait Scenario: Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns an error describing the first broken expectation.
    fn run(&self, ctx: &ScenarioCtx) -> Result<ScenarioOutcome>;
}

static CATALOG: &[&dyn Scenario] = &[
    &Progression,
    &Classroom,
    &Regroup,
    &PuzzleRace,
    &PublishRace,
    &QuotaPressure,
    &CancelledSync,
];

#[must_use]
pub fn get_scenario(name: &str) -> Option<&'static dyn Scenario> {
    CATALOG.iter().copied().find(|s| s.name() == name)
}

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG.iter().map(|s| (s.name(), s.description())).collect()
}

#[must_use]
pub fn all_scenario_names() -> Vec<String> {
    CATALOG.iter().map(|s| s.name().to_string()).collect()
}

pub type SharedStore = Rc<dyn KeyValueStore>;
pub type Client = EscapeEngine<SharedStore, ManualClock>;

/// A shared store for one scenario run. File-backed stores are removed on drop.
pub struct StoreFixture {
    pub store: SharedStore,
    dir: Option<PathBuf>,
}

impl StoreFixture {
    /// # Errors
    ///
    /// Returns an error if the file store directory cannot be created.
    pub fn open(ctx: &ScenarioCtx, scenario: &str) -> Result<Self> {
        match ctx.store {
            StoreKind::Memory => Ok(Self {
                store: Rc::new(MemoryStore::new()),
                dir: None,
            }),
            StoreKind::File => {
                let dir = temp_store_dir(ctx.store_root.as_ref(), scenario, ctx.seed);
                let store = FileStore::open(&dir)
                    .with_context(|| format!("opening store at {}", dir.display()))?;
                Ok(Self {
                    store: Rc::new(store),
                    dir: Some(dir),
                })
            }
        }
    }

    /// Directory backing a file store.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// A second, independent handle onto the same surface, as another
    /// browser tab would have.
    ///
    /// # Errors
    ///
    /// Returns an error if the file store cannot be reopened.
    pub fn reopen(&self) -> Result<SharedStore> {
        match &self.dir {
            Some(dir) => Ok(Rc::new(FileStore::open(dir)?)),
            None => Ok(Rc::clone(&self.store)),
        }
    }

    /// # Errors
    ///
    /// Returns an error if bundled content is unusable or the store cannot be reopened.
    pub fn client(&self, clock: &ManualClock) -> Result<Client> {
        client_on(self.reopen()?, clock, CourseConfig::default())
    }
}

impl Drop for StoreFixture {
    fn drop(&mut self) {
        if let Some(dir) = &self.dir
            && let Err(err) = std::fs::remove_dir_all(dir)
        {
            log::debug!("leaving {}: {err}", dir.display());
        }
    }
}

/// # Errors
///
/// Returns an error if the bundled content is unusable or `config` is invalid.
pub fn client_on(store: SharedStore, clock: &ManualClock, config: CourseConfig) -> Result<Client> {
    let content = PuzzleContent::bundled().context("bundled puzzle content")?;
    Ok(EscapeEngine::new(store, clock.clone(), config, content)?)
}
