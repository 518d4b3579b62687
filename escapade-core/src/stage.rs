//! Stage identifiers and the monotonic unlock set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One gated unit of the challenge sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Stage1,
    Stage2,
    Stage3,
    Stage4,
}

impl StageId {
    pub const ALL: [Self; 4] = [Self::Stage1, Self::Stage2, Self::Stage3, Self::Stage4];
    pub const FIRST: Self = Self::Stage1;
    pub const FINAL: Self = Self::Stage4;

    /// One-based position in the sequence.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Stage1 => 1,
            Self::Stage2 => 2,
            Self::Stage3 => 3,
            Self::Stage4 => 4,
        }
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Stage1 => Some(Self::Stage2),
            Self::Stage2 => Some(Self::Stage3),
            Self::Stage3 => Some(Self::Stage4),
            Self::Stage4 => None,
        }
    }

    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Stage4)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
            Self::Stage4 => "stage4",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage `{0}`")]
pub struct UnknownStage(pub String);

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Which stages the learner may enter. Flags only ever go from `false` to
/// `true`; a full reset replaces the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageUnlockSet {
    pub stage1: bool,
    pub stage2: bool,
    pub stage3: bool,
    pub stage4: bool,
}

impl Default for StageUnlockSet {
    fn default() -> Self {
        Self {
            stage1: true,
            stage2: false,
            stage3: false,
            stage4: false,
        }
    }
}

impl StageUnlockSet {
    #[must_use]
    pub const fn is_unlocked(&self, stage: StageId) -> bool {
        match stage {
            StageId::Stage1 => self.stage1,
            StageId::Stage2 => self.stage2,
            StageId::Stage3 => self.stage3,
            StageId::Stage4 => self.stage4,
        }
    }

    /// Grant access to `stage`. Returns `true` if this call changed the set.
    pub const fn unlock(&mut self, stage: StageId) -> bool {
        let flag = match stage {
            StageId::Stage1 => &mut self.stage1,
            StageId::Stage2 => &mut self.stage2,
            StageId::Stage3 => &mut self.stage3,
            StageId::Stage4 => &mut self.stage4,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    /// Furthest stage reachable through an unbroken run of unlocks from the
    /// first stage.
    #[must_use]
    pub fn highest_contiguous(&self) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .take_while(|stage| self.is_unlocked(*stage))
            .last()
    }

    /// Stages the learner may currently visit, in order.
    #[must_use]
    pub fn reachable(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .take_while(|stage| self.is_unlocked(*stage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ids_serialize_lowercase_and_parse() {
        assert_eq!(serde_json::to_string(&StageId::Stage3).unwrap(), "\"stage3\"");
        assert_eq!("Stage2".parse::<StageId>(), Ok(StageId::Stage2));
        assert!("stage9".parse::<StageId>().is_err());
        assert_eq!(StageId::Stage4.next(), None);
        assert!(StageId::FINAL.is_final());
    }

    #[test]
    fn unlock_is_monotonic_and_reports_change() {
        let mut set = StageUnlockSet::default();
        assert!(set.is_unlocked(StageId::Stage1));
        assert!(set.unlock(StageId::Stage2));
        assert!(!set.unlock(StageId::Stage2));
        assert!(set.is_unlocked(StageId::Stage2));
        assert_eq!(set.highest_contiguous(), Some(StageId::Stage2));
    }

    #[test]
    fn gaps_stop_the_reachable_prefix() {
        let set = StageUnlockSet {
            stage1: true,
            stage2: false,
            stage3: true,
            stage4: false,
        };
        assert_eq!(set.highest_contiguous(), Some(StageId::Stage1));
        assert_eq!(set.reachable(), vec![StageId::Stage1]);

        let none = StageUnlockSet {
            stage1: false,
            ..StageUnlockSet::default()
        };
        assert_eq!(none.highest_contiguous(), None);
    }
}
