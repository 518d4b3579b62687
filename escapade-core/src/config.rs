//! Course-wide configuration: validation ranges, reward symbols, the shared
//! solution word, poll periods and ledger retention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use thiserror::Error;

use crate::aggregation::is_valid_symbol;
use crate::constants::{
    DEFAULT_ADMIN_SECRET_SHA256, DEFAULT_COHORT_YEAR_MAX, DEFAULT_COHORT_YEAR_MIN,
    DEFAULT_GROUP_MAX, DEFAULT_GROUP_MIN, DEFAULT_LEDGER_CAPACITY, DEFAULT_POOL_POLL_MS,
    DEFAULT_REWARD_SYMBOL, DEFAULT_SOLUTION_WORD, DEFAULT_SOLVED_POLL_MS, KEY_COURSE_CONFIG,
};
use crate::persist::{KeyValueStore, read_json};

/// Errors raised when course configuration invariants are violated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("course config JSON invalid: {0}")]
    Parse(String),
    #[error("{field} range is empty (min {min} > max {max})")]
    EmptyRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
    #[error("group numbers must start at 1 or above (got {0})")]
    NonPositiveGroup(u32),
    #[error("reward symbol {symbol:?} is not a single visible character")]
    InvalidSymbol { symbol: String },
    #[error("solution word must not be blank")]
    EmptySolution,
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("admin secret digest must be 64 hex characters")]
    SecretDigest,
}

/// Tunables for one class run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CourseConfig {
    pub cohort_year_min: i32,
    pub cohort_year_max: i32,
    pub group_min: u32,
    pub group_max: u32,
    /// Symbol a group contributes to the shared pool on final completion.
    pub reward_symbol: String,
    /// Per-group overrides for `reward_symbol`.
    pub reward_symbols: BTreeMap<u32, String>,
    pub solution_word: String,
    pub pool_poll_ms: u32,
    pub solved_poll_ms: u32,
    /// Maximum entries retained in the class-wide attempt log.
    pub ledger_capacity: usize,
    /// Hex SHA-256 of the instructor's shared secret.
    pub admin_secret_sha256: String,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            cohort_year_min: DEFAULT_COHORT_YEAR_MIN,
            cohort_year_max: DEFAULT_COHORT_YEAR_MAX,
            group_min: DEFAULT_GROUP_MIN,
            group_max: DEFAULT_GROUP_MAX,
            reward_symbol: DEFAULT_REWARD_SYMBOL.to_string(),
            reward_symbols: BTreeMap::new(),
            solution_word: DEFAULT_SOLUTION_WORD.to_string(),
            pool_poll_ms: DEFAULT_POOL_POLL_MS,
            solved_poll_ms: DEFAULT_SOLVED_POLL_MS,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            admin_secret_sha256: DEFAULT_ADMIN_SECRET_SHA256.to_string(),
        }
    }
}

impl CourseConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the JSON is malformed or violates an invariant.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read the config published under `config.course`, falling back to the
    /// defaults when it is absent, unreadable or invalid.
    #[must_use]
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        match read_json::<_, Self>(store, KEY_COURSE_CONFIG) {
            Ok(Some(cfg)) => match cfg.validate() {
                Ok(()) => cfg,
                Err(err) => {
                    log::warn!("stored course config rejected: {err}; using defaults");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(err) => {
                log::warn!("{err}; using default course config");
                Self::default()
            }
        }
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any field violates the documented bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cohort_year_min > self.cohort_year_max {
            return Err(ConfigError::EmptyRange {
                field: "cohortYear",
                min: i64::from(self.cohort_year_min),
                max: i64::from(self.cohort_year_max),
            });
        }
        if self.group_min == 0 {
            return Err(ConfigError::NonPositiveGroup(self.group_min));
        }
        if self.group_min > self.group_max {
            return Err(ConfigError::EmptyRange {
                field: "group",
                min: i64::from(self.group_min),
                max: i64::from(self.group_max),
            });
        }
        for symbol in std::iter::once(&self.reward_symbol).chain(self.reward_symbols.values()) {
            if !is_valid_symbol(symbol) {
                return Err(ConfigError::InvalidSymbol {
                    symbol: symbol.clone(),
                });
            }
        }
        if self.solution_word.trim().is_empty() {
            return Err(ConfigError::EmptySolution);
        }
        if self.pool_poll_ms == 0 {
            return Err(ConfigError::ZeroValue("poolPollMs"));
        }
        if self.solved_poll_ms == 0 {
            return Err(ConfigError::ZeroValue("solvedPollMs"));
        }
        if self.ledger_capacity == 0 {
            return Err(ConfigError::ZeroValue("ledgerCapacity"));
        }
        if self.admin_secret_sha256.len() != 64
            || !self.admin_secret_sha256.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ConfigError::SecretDigest);
        }
        Ok(())
    }

    #[must_use]
    pub const fn cohort_years(&self) -> RangeInclusive<i32> {
        self.cohort_year_min..=self.cohort_year_max
    }

    #[must_use]
    pub const fn groups(&self) -> RangeInclusive<u32> {
        self.group_min..=self.group_max
    }

    /// Symbol `group` contributes when it finishes the final stage.
    #[must_use]
    pub fn reward_symbol_for(&self, group: u32) -> &str {
        self.reward_symbols
            .get(&group)
            .map_or(self.reward_symbol.as_str(), String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{KeyValueStore, MemoryStore};

    #[test]
    fn defaults_validate() {
        let cfg = CourseConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.reward_symbol_for(3), "G");
        assert!(cfg.groups().contains(&12));
        assert!(!cfg.groups().contains(&0));
    }

    #[test]
    fn partial_json_fills_defaults_and_overrides() {
        let cfg = CourseConfig::from_json(
            r#"{"groupMax": 8, "rewardSymbols": {"2": "E"}, "solutionWord": "helix"}"#,
        )
        .unwrap();
        assert_eq!(cfg.group_max, 8);
        assert_eq!(cfg.reward_symbol_for(2), "E");
        assert_eq!(cfg.reward_symbol_for(4), "G");
        assert_eq!(cfg.pool_poll_ms, 5_000);

        let stored = serde_json::to_value(&cfg).unwrap();
        assert_eq!(stored["groupMax"], 8);
        assert!(stored.get("adminSecretSha256").is_some());
        assert!(stored.get("group_max").is_none());
    }

    #[test]
    fn invariants_are_enforced() {
        let mut cfg = CourseConfig {
            reward_symbol: "?".into(),
            ..CourseConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSymbol { .. })));

        cfg.reward_symbol = "G".into();
        cfg.group_min = 5;
        cfg.group_max = 2;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::EmptyRange { field: "group", .. })
        ));

        cfg.group_max = 9;
        cfg.solved_poll_ms = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroValue("solvedPollMs")));

        cfg.solved_poll_ms = 10;
        cfg.admin_secret_sha256 = "nothex".into();
        assert_eq!(cfg.validate(), Err(ConfigError::SecretDigest));
    }

    #[test]
    fn load_falls_back_on_invalid_stored_config() {
        let store = MemoryStore::new();
        assert_eq!(CourseConfig::load(&store), CourseConfig::default());

        store
            .set(KEY_COURSE_CONFIG, r#"{"poolPollMs": 0}"#)
            .unwrap();
        assert_eq!(CourseConfig::load(&store), CourseConfig::default());

        store
            .set(KEY_COURSE_CONFIG, r#"{"poolPollMs": 750}"#)
            .unwrap();
        assert_eq!(CourseConfig::load(&store).pool_poll_ms, 750);
    }
}
