//! The class-wide word puzzle built from the shared symbol pool, and its
//! monotonic solved flag.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::constants::KEY_PUZZLE_SOLVED;
use crate::persist::{KeyValueStore, StoreError, WarningSink, read_json, write_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleSolvedFlag {
    pub solved: bool,
    pub solved_at: Millis,
    pub solution_word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "flag", rename_all = "camelCase")]
pub enum GuessOutcome {
    Incorrect,
    /// This guess published the flag.
    Solved(PuzzleSolvedFlag),
    /// Someone had already solved it; nothing was written.
    AlreadySolved(PuzzleSolvedFlag),
}

impl GuessOutcome {
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        !matches!(self, Self::Incorrect)
    }
}

/// Guesses compare after trimming and uppercasing.
#[must_use]
pub fn normalize_guess(guess: &str) -> String {
    guess.trim().to_uppercase()
}

/// Reads and publishes [`PuzzleSolvedFlag`].
#[derive(Debug, Clone)]
pub struct PuzzleBoard<S> {
    store: S,
    warnings: WarningSink,
}

impl<S: KeyValueStore> PuzzleBoard<S> {
    pub const fn new(store: S, warnings: WarningSink) -> Self {
        Self { store, warnings }
    }

    /// The published flag, if any. Unreadable data counts as unsolved.
    #[must_use]
    pub fn flag(&self) -> Option<PuzzleSolvedFlag> {
        match read_json::<_, PuzzleSolvedFlag>(&self.store, KEY_PUZZLE_SOLVED) {
            Ok(flag) => flag,
            Err(err) => {
                log::warn!("{err}; treating puzzle as unsolved");
                None
            }
        }
    }

    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.flag().is_some_and(|flag| flag.solved)
    }

    /// Check `guess` against `solution` and publish the flag on a match.
    ///
    /// The flag only ever moves to `true`, so two clients racing to publish
    /// the same solve write equivalent values and neither is harmed. A failed
    /// write still reports the solve; the failure is queued as a warning.
    pub fn submit_guess(
        &self,
        guess: &str,
        solution: &str,
        solver: Option<&str>,
        now: Millis,
    ) -> GuessOutcome {
        let normalized = normalize_guess(guess);
        if normalized.is_empty() || normalized != normalize_guess(solution) {
            log::debug!("puzzle guess {normalized:?} rejected");
            return GuessOutcome::Incorrect;
        }
        if let Some(existing) = self.flag().filter(|flag| flag.solved) {
            return GuessOutcome::AlreadySolved(existing);
        }
        let flag = PuzzleSolvedFlag {
            solved: true,
            solved_at: now,
            solution_word: normalized,
            solved_by: solver.map(str::to_string),
        };
        if self.warnings.check(
            "publish puzzle solve",
            write_json(&self.store, KEY_PUZZLE_SOLVED, &flag),
        ) {
            log::info!("class puzzle solved with {:?}", flag.solution_word);
        }
        GuessOutcome::Solved(flag)
    }

    /// Retract the flag. Administrative use only.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_PUZZLE_SOLVED)
    }
}
