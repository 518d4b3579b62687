//! Centralized keys and defaults for Escapade core logic.
//!
//! Store keys are shared by every client on the machine, so they must stay
//! stable across releases; changing one orphans data written by older builds.

// Store keys ---------------------------------------------------------------
pub const KEY_SESSION: &str = "session.current";
pub const KEY_PROGRESS: &str = "session.progress";
pub const KEY_CLASSWIDE_LEDGER: &str = "ledger.classwide";
pub const KEY_COMPLETIONS: &str = "aggregation.completions";
pub const KEY_PUZZLE_SOLVED: &str = "puzzle.solved";
pub const KEY_PUZZLE_CONTENT: &str = "config.puzzleContent";
pub const KEY_COURSE_CONFIG: &str = "config.course";

// Course defaults ----------------------------------------------------------
pub(crate) const DEFAULT_COHORT_YEAR_MIN: i32 = 2000;
pub(crate) const DEFAULT_COHORT_YEAR_MAX: i32 = 2100;
pub(crate) const DEFAULT_GROUP_MIN: u32 = 1;
pub(crate) const DEFAULT_GROUP_MAX: u32 = 12;
pub(crate) const DEFAULT_REWARD_SYMBOL: &str = "G";
pub(crate) const DEFAULT_SOLUTION_WORD: &str = "GENETICS";
pub(crate) const DEFAULT_POOL_POLL_MS: u32 = 5_000;
pub(crate) const DEFAULT_SOLVED_POLL_MS: u32 = 1_000;
pub(crate) const DEFAULT_LEDGER_CAPACITY: usize = 5_000;
/// SHA-256 of `"instructor"`.
pub(crate) const DEFAULT_ADMIN_SECRET_SHA256: &str =
    "cf2eb894cc40f5c6e781910063859278a3b214a3a14fedb9ca336ca39962b856";

// Validation limits --------------------------------------------------------
pub(crate) const MAX_DISPLAY_NAME_CHARS: usize = 60;
pub(crate) const MAX_COHORT_LABEL_CHARS: usize = 40;

/// Symbols that stand in for "no letter yet" in legacy or partial records.
pub(crate) const PLACEHOLDER_SYMBOLS: &[&str] = &["?", "_", "-", "*", "·"];

// Progress -----------------------------------------------------------------
pub(crate) const PERCENT_PER_STAGE: u8 = 25;
