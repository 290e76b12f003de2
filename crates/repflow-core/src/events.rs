use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playback::Phase;
use crate::schedule::StepId;

/// Every playback state change produces an Event.
/// The CLI prints them; the session fans them out over a broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        schedule_id: String,
        step_count: usize,
        at: DateTime<Utc>,
    },
    /// The engine moved between phases, steps or repeats.
    PhaseChanged {
        /// Set when the transition came from `skip` rather than the timer.
        skipped: bool,
        from: Phase,
        to: Phase,
        step_index: usize,
        repeat_index: u32,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        schedule_id: String,
        at: DateTime<Utc>,
    },
    Paused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    MuteChanged {
        muted: bool,
        at: DateTime<Utc>,
    },
    RestExtended {
        added_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    RepeatCountChanged {
        step_id: StepId,
        count: u32,
        at: DateTime<Utc>,
    },
    /// Last seconds of a step with a voice countdown configured.
    CountdownCue {
        step_index: usize,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
}
