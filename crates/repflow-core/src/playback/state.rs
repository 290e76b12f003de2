use serde::{Deserialize, Serialize};

use crate::schedule::{MediaAttachment, StepId};

/// Why a rest interval was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestContext {
    BetweenRepeats,
    BetweenSteps,
}

/// Top-level playback phase. `RestContext` only exists while resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "context", rename_all = "snake_case")]
pub enum Phase {
    Step,
    Rest(RestContext),
    Complete,
}

impl Phase {
    pub fn is_rest(&self) -> bool {
        matches!(self, Phase::Rest(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Phase::Complete)
    }
}

/// The engine's only mutable entity.
///
/// `step_index` and `repeat_index` are meaningless once `phase` is
/// [`Phase::Complete`]. The timer only ever touches `remaining_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub phase: Phase,
    pub step_index: usize,
    /// 1-based.
    pub repeat_index: u32,
    pub remaining_secs: u64,
    pub is_paused: bool,
    pub is_muted: bool,
}

impl PlaybackState {
    pub fn complete() -> Self {
        Self {
            phase: Phase::Complete,
            step_index: 0,
            repeat_index: 1,
            remaining_secs: 0,
            is_paused: false,
            is_muted: false,
        }
    }

    pub(crate) fn step(step_index: usize, repeat_index: u32, remaining_secs: u64) -> Self {
        Self {
            phase: Phase::Step,
            step_index,
            repeat_index,
            remaining_secs,
            is_paused: false,
            is_muted: false,
        }
    }

    pub(crate) fn rest(
        context: RestContext,
        step_index: usize,
        repeat_index: u32,
        remaining_secs: u64,
    ) -> Self {
        Self {
            phase: Phase::Rest(context),
            step_index,
            repeat_index,
            remaining_secs,
            is_paused: false,
            is_muted: false,
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::complete()
    }
}

/// What subscribers see: the engine state plus enough of the current step to
/// render it and drive media without holding the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Bumped every time a session is (re)initialized.
    pub epoch: u64,
    pub schedule_id: Option<String>,
    pub state: PlaybackState,
    pub step_id: Option<StepId>,
    pub step_name: Option<String>,
    pub planned_repeats: u32,
    pub media: Option<MediaAttachment>,
    pub mute_background: bool,
}

impl PlaybackSnapshot {
    pub fn idle() -> Self {
        Self {
            epoch: 0,
            schedule_id: None,
            state: PlaybackState::complete(),
            step_id: None,
            step_name: None,
            planned_repeats: 1,
            media: None,
            mute_background: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}
