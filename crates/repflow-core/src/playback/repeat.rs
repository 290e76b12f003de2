use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schedule::{Schedule, StepId};

/// Planned repeat count per step, editable during a session.
///
/// Every count is at least 1; ids that were never set read as 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatConfig {
    counts: HashMap<StepId, u32>,
}

impl RepeatConfig {
    /// One repeat for every step of `schedule`.
    pub fn for_schedule(schedule: &Schedule) -> Self {
        Self {
            counts: schedule.steps.iter().map(|s| (s.id.clone(), 1)).collect(),
        }
    }

    pub fn get(&self, id: &StepId) -> u32 {
        self.counts.get(id).copied().unwrap_or(1)
    }

    /// Store `count` clamped to `>= 1` and return the stored value.
    pub fn set(&mut self, id: StepId, count: i64) -> u32 {
        let clamped = count.clamp(1, u32::MAX as i64) as u32;
        self.counts.insert(id, clamped);
        clamped
    }
}
