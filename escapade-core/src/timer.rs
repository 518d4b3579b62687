//! Room Timer: wall-clock start/end per stage. Purely observational; nothing
//! in the progression rules reads it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::Millis;
use crate::stage::StageId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTiming {
    pub stage_id: StageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Millis>,
    /// Set at completion, and only when a start time exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl RoomTiming {
    const fn empty(stage_id: StageId) -> Self {
        Self {
            stage_id,
            start_time: None,
            end_time: None,
            duration_ms: None,
        }
    }

    /// Duration for display; a stage finished without a start counts as 0.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.duration_ms.unwrap_or(0)
    }
}

/// Timings for every visited stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomTimer {
    rooms: BTreeMap<StageId, RoomTiming>,
}

impl RoomTimer {
    /// Stamp the start of `stage`. Re-entering keeps the first stamp.
    /// Returns `true` if this call set it.
    pub fn enter(&mut self, stage: StageId, now: Millis) -> bool {
        let timing = self
            .rooms
            .entry(stage)
            .or_insert_with(|| RoomTiming::empty(stage));
        if timing.start_time.is_some() {
            return false;
        }
        timing.start_time = Some(now);
        true
    }

    /// Stamp the end of `stage` and derive its duration. The first
    /// completion wins.
    pub fn complete(&mut self, stage: StageId, now: Millis) -> &RoomTiming {
        let timing = self
            .rooms
            .entry(stage)
            .or_insert_with(|| RoomTiming::empty(stage));
        if timing.end_time.is_none() {
            timing.end_time = Some(now);
            timing.duration_ms = timing.start_time.map(|start| now.saturating_sub(start));
        }
        timing
    }

    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&RoomTiming> {
        self.rooms.get(&stage)
    }

    /// Timings in stage order.
    pub fn iter(&self) -> impl Iterator<Item = &RoomTiming> {
        self.rooms.values()
    }

    /// Sum of finished stage durations.
    #[must_use]
    pub fn total_elapsed_ms(&self) -> i64 {
        self.rooms.values().map(RoomTiming::elapsed_ms).sum()
    }
}
