//! Playback engine implementation.
//!
//! The engine is a pure state machine over one [`PlaybackState`]. It does not
//! own a timer - the caller invokes `tick()` once per second.
//!
//! ## State Transitions
//!
//! ```text
//! Step --(more repeats, rest > 0)--> Rest(BetweenRepeats) --> Step (repeat + 1)
//! Step --(more repeats, rest <= 0)--> Step (repeat + 1)
//! Step --(last repeat, rest > 0)--> Rest(BetweenSteps) --> next Step | Complete
//! Step --(last repeat, rest <= 0)--> next Step | Complete
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = PlaybackEngine::new();
//! engine.initialize(Arc::new(schedule), 10);
//! // Once per second:
//! engine.tick(); // Returns Some(Event) on transitions and countdown cues
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::repeat::RepeatConfig;
use super::state::{Phase, PlaybackSnapshot, PlaybackState, RestContext};
use crate::events::Event;
use crate::schedule::{Schedule, ScheduleStep, StepId};

#[derive(Debug, Clone, Default)]
pub struct PlaybackEngine {
    schedule: Option<Arc<Schedule>>,
    /// Session rest setting in seconds; `<= 0` disables rest phases.
    rest_secs: i64,
    repeats: RepeatConfig,
    state: PlaybackState,
    epoch: u64,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Incremented on every effective `initialize` and on `end_session`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn schedule(&self) -> Option<&Arc<Schedule>> {
        self.schedule.as_ref()
    }

    pub fn rest_secs(&self) -> i64 {
        self.rest_secs
    }

    pub fn repeat_config(&self) -> &RepeatConfig {
        &self.repeats
    }

    /// The active step, or `None` once complete.
    pub fn current_step(&self) -> Option<&ScheduleStep> {
        if self.state.phase.is_complete() {
            return None;
        }
        self.schedule.as_ref()?.steps.get(self.state.step_index)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let step = self.current_step();
        PlaybackSnapshot {
            epoch: self.epoch,
            schedule_id: self.schedule.as_ref().map(|s| s.id.clone()),
            state: self.state,
            step_id: step.map(|s| s.id.clone()),
            step_name: step.map(|s| s.name.clone()),
            planned_repeats: step.map(|s| self.repeats.get(&s.id)).unwrap_or(1),
            media: step.and_then(|s| s.media.clone()),
            mute_background: step.map(|s| s.mute_background).unwrap_or(false),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session for `schedule`.
    ///
    /// Re-initializing with the same `Arc` (pointer identity) is a no-op while
    /// the session is still running, so progress survives redundant calls.
    pub fn initialize(&mut self, schedule: Arc<Schedule>, rest_secs: i64) -> PlaybackState {
        if let Some(active) = &self.schedule {
            if Arc::ptr_eq(active, &schedule) && !self.state.phase.is_complete() {
                debug!(schedule_id = %schedule.id, "initialize ignored for active schedule");
                return self.state;
            }
        }

        self.epoch += 1;
        self.rest_secs = rest_secs;
        self.repeats = RepeatConfig::for_schedule(&schedule);
        self.state = match schedule.steps.first() {
            Some(first) => PlaybackState::step(0, 1, first.effective_duration_secs()),
            None => PlaybackState::complete(),
        };
        debug!(
            schedule_id = %schedule.id,
            steps = schedule.steps.len(),
            epoch = self.epoch,
            "playback initialized"
        );
        self.schedule = Some(schedule);
        self.state
    }

    /// Drop the active schedule. Pending ticks from the old epoch become stale.
    pub fn end_session(&mut self) {
        self.schedule = None;
        self.repeats = RepeatConfig::default();
        self.state = PlaybackState::complete();
        self.epoch += 1;
    }

    /// Call once per second.
    ///
    /// Returns `Some(Event::PhaseChanged)` on the zero crossing and
    /// `Some(Event::CountdownCue)` during a step's voiced countdown.
    pub fn tick(&mut self) -> Option<Event> {
        if self.state.is_paused || self.state.phase.is_complete() {
            return None;
        }
        if self.state.remaining_secs > 0 {
            self.state.remaining_secs -= 1;
            if self.state.remaining_secs > 0 {
                return self.countdown_cue();
            }
        }
        Some(self.advance_phase(false))
    }

    /// Behave as if the countdown had just reached zero.
    pub fn skip(&mut self) -> Option<Event> {
        if self.state.phase.is_complete() {
            return None;
        }
        self.state.is_paused = false;
        Some(self.advance_phase(true))
    }

    /// Set the planned repeats for `step_id`, clamped to at least 1.
    ///
    /// Editing the active step restarts it at repeat 1; while in `Step` the
    /// countdown is also reset to the full duration.
    pub fn set_repeat_count(&mut self, step_id: &StepId, count: i64) -> Option<Event> {
        if self.state.phase.is_complete() {
            return None;
        }
        let schedule = self.schedule.clone()?;
        if schedule.position(step_id).is_none() {
            warn!(step_id = %step_id, "repeat count for unknown step ignored");
            return None;
        }

        let count = self.repeats.set(step_id.clone(), count);
        if let Some(current) = schedule.steps.get(self.state.step_index) {
            if &current.id == step_id {
                self.state.repeat_index = 1;
                if self.state.phase == Phase::Step {
                    self.state.remaining_secs = current.effective_duration_secs();
                }
            }
        }

        Some(Event::RepeatCountChanged {
            step_id: step_id.clone(),
            count,
            at: Utc::now(),
        })
    }

    /// Copy every step's authored `sprint_count` into the repeat config.
    pub fn apply_sprint_hints(&mut self) -> Vec<Event> {
        let Some(schedule) = self.schedule.clone() else {
            return Vec::new();
        };
        schedule
            .steps
            .iter()
            .filter_map(|s| {
                let hint = s.sprint_count?;
                self.set_repeat_count(&s.id, i64::from(hint))
            })
            .collect()
    }

    /// Lengthen the current rest. No-op outside `Rest`.
    pub fn extend_rest(&mut self, delta_secs: u64) -> Option<Event> {
        if !self.state.phase.is_rest() {
            return None;
        }
        self.state.remaining_secs = self.state.remaining_secs.saturating_add(delta_secs);
        Some(Event::RestExtended {
            added_secs: delta_secs,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.state.phase.is_complete() || self.state.is_paused {
            return None;
        }
        self.state.is_paused = true;
        Some(Event::Paused {
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn resume(&mut self) -> Option<Event> {
        if self.state.phase.is_complete() || !self.state.is_paused {
            return None;
        }
        self.state.is_paused = false;
        Some(Event::Resumed {
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn toggle_pause(&mut self) -> Option<Event> {
        if self.state.is_paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn set_muted(&mut self, muted: bool) -> Option<Event> {
        if self.state.phase.is_complete() || self.state.is_muted == muted {
            return None;
        }
        self.state.is_muted = muted;
        Some(Event::MuteChanged {
            muted,
            at: Utc::now(),
        })
    }

    /// Change the rest setting for rests that start from now on.
    pub fn set_rest_duration(&mut self, rest_secs: i64) {
        self.rest_secs = rest_secs;
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn countdown_cue(&self) -> Option<Event> {
        if self.state.phase != Phase::Step {
            return None;
        }
        let voice = self.current_step()?.countdown_voice_secs?;
        (self.state.remaining_secs <= u64::from(voice)).then(|| Event::CountdownCue {
            step_index: self.state.step_index,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        })
    }

    /// The transition table. Every phase change goes through here, and every
    /// new state starts unpaused and unmuted.
    fn advance_phase(&mut self, skipped: bool) -> Event {
        let from = self.state;
        self.state = match self.schedule.clone() {
            Some(schedule) => self.next_state(&schedule, from),
            None => PlaybackState::complete(),
        };
        debug!(
            from = ?from.phase,
            to = ?self.state.phase,
            step_index = self.state.step_index,
            repeat_index = self.state.repeat_index,
            skipped,
            "phase advanced"
        );
        Event::PhaseChanged {
            skipped,
            from: from.phase,
            to: self.state.phase,
            step_index: self.state.step_index,
            repeat_index: self.state.repeat_index,
            remaining_secs: self.state.remaining_secs,
            at: Utc::now(),
        }
    }

    fn next_state(&self, schedule: &Schedule, from: PlaybackState) -> PlaybackState {
        let index = from.step_index;
        let Some(step) = schedule.steps.get(index) else {
            return PlaybackState::complete();
        };
        let planned = self.repeats.get(&step.id);
        let rest = (self.rest_secs > 0).then_some(self.rest_secs as u64);

        match from.phase {
            Phase::Step if from.repeat_index < planned => match rest {
                Some(secs) => {
                    PlaybackState::rest(RestContext::BetweenRepeats, index, from.repeat_index, secs)
                }
                None => PlaybackState::step(
                    index,
                    from.repeat_index + 1,
                    step.effective_duration_secs(),
                ),
            },
            Phase::Step => match rest {
                Some(secs) => {
                    PlaybackState::rest(RestContext::BetweenSteps, index, from.repeat_index, secs)
                }
                None => next_step(schedule, index),
            },
            // A repeat edit during the rest can lower `planned` below the next repeat.
            Phase::Rest(RestContext::BetweenRepeats) => PlaybackState::step(
                index,
                (from.repeat_index + 1).min(planned),
                step.effective_duration_secs(),
            ),
            Phase::Rest(RestContext::BetweenSteps) => next_step(schedule, index),
            Phase::Complete => PlaybackState::complete(),
        }
    }
}

/// The single exit to `Complete`.
fn next_step(schedule: &Schedule, index: usize) -> PlaybackState {
    match schedule.steps.get(index + 1) {
        Some(next) => PlaybackState::step(index + 1, 1, next.effective_duration_secs()),
        None => PlaybackState::complete(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleStep;

    fn schedule(durations: &[i64]) -> Arc<Schedule> {
        let steps = durations
            .iter()
            .enumerate()
            .map(|(i, d)| ScheduleStep::new(format!("s{i}"), format!("Step {i}"), *d))
            .collect();
        Arc::new(Schedule::new("test", steps))
    }

    fn engine(durations: &[i64], rest: i64) -> PlaybackEngine {
        let mut engine = PlaybackEngine::new();
        engine.initialize(schedule(durations), rest);
        engine
    }

    #[test]
    fn initialize_starts_first_step() {
        let engine = engine(&[10, 20], 5);
        let state = engine.state();
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.step_index, 0);
        assert_eq!(state.repeat_index, 1);
        assert_eq!(state.remaining_secs, 10);
        assert!(!state.is_paused);
        assert!(!state.is_muted);
    }

    #[test]
    fn empty_schedule_is_complete() {
        let mut engine = engine(&[], 5);
        assert_eq!(engine.phase(), Phase::Complete);
        assert!(engine.tick().is_none());
        assert!(engine.skip().is_none());
    }

    #[test]
    fn reinitialize_same_arc_keeps_progress() {
        let s = schedule(&[10]);
        let mut engine = PlaybackEngine::new();
        engine.initialize(s.clone(), 0);
        engine.tick();
        engine.tick();
        let epoch = engine.epoch();

        let state = engine.initialize(s, 0);
        assert_eq!(state.remaining_secs, 8);
        assert_eq!(engine.epoch(), epoch);
    }

    #[test]
    fn reinitialize_equal_but_distinct_schedule_resets() {
        let s = schedule(&[10]);
        let mut engine = PlaybackEngine::new();
        engine.initialize(s.clone(), 0);
        engine.tick();

        let copy = Arc::new((*s).clone());
        let state = engine.initialize(copy, 0);
        assert_eq!(state.remaining_secs, 10);
    }

    #[test]
    fn reinitialize_after_complete_restarts() {
        let s = schedule(&[1]);
        let mut engine = PlaybackEngine::new();
        engine.initialize(s.clone(), 0);
        engine.tick();
        assert_eq!(engine.phase(), Phase::Complete);

        let state = engine.initialize(s, 0);
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.remaining_secs, 1);
    }

    #[test]
    fn step_with_more_repeats_and_rest_enters_rest_between_repeats() {
        let mut engine = engine(&[3], 4);
        engine.set_repeat_count(&"s0".into(), 2);
        engine.skip();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Rest(RestContext::BetweenRepeats));
        assert_eq!(state.remaining_secs, 4);
        assert_eq!(state.repeat_index, 1);

        engine.skip();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.repeat_index, 2);
        assert_eq!(state.remaining_secs, 3);
    }

    #[test]
    fn step_with_more_repeats_without_rest_repeats_directly() {
        let mut engine = engine(&[3], 0);
        engine.set_repeat_count(&"s0".into(), 2);
        engine.skip();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.repeat_index, 2);
        assert_eq!(state.remaining_secs, 3);
    }

    #[test]
    fn last_repeat_with_rest_enters_rest_between_steps() {
        let mut engine = engine(&[3, 6], 2);
        engine.skip();
        assert_eq!(engine.phase(), Phase::Rest(RestContext::BetweenSteps));
        engine.skip();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.step_index, 1);
        assert_eq!(state.repeat_index, 1);
        assert_eq!(state.remaining_secs, 6);
    }

    #[test]
    fn negative_rest_setting_disables_rest() {
        let mut engine = engine(&[3, 6], -1);
        engine.skip();
        assert_eq!(engine.phase(), Phase::Step);
        assert_eq!(engine.state().step_index, 1);
    }

    #[test]
    fn tick_decrements_then_advances_at_zero() {
        let mut engine = engine(&[2, 2], 0);
        assert!(engine.tick().is_none());
        assert_eq!(engine.state().remaining_secs, 1);
        let event = engine.tick();
        assert!(matches!(event, Some(Event::PhaseChanged { skipped: false, .. })));
        assert_eq!(engine.state().step_index, 1);
        assert_eq!(engine.state().remaining_secs, 2);
    }

    #[test]
    fn zero_duration_step_advances_on_first_tick() {
        let mut engine = engine(&[0, -4, 5], 0);
        assert_eq!(engine.state().remaining_secs, 0);
        engine.tick();
        assert_eq!(engine.state().step_index, 1);
        assert_eq!(engine.state().remaining_secs, 0);
        engine.tick();
        assert_eq!(engine.state().step_index, 2);
        assert_eq!(engine.state().remaining_secs, 5);
    }

    #[test]
    fn paused_engine_ignores_ticks() {
        let mut engine = engine(&[5], 0);
        engine.pause();
        for _ in 0..10 {
            assert!(engine.tick().is_none());
        }
        assert_eq!(engine.state().remaining_secs, 5);
        engine.resume();
        engine.tick();
        assert_eq!(engine.state().remaining_secs, 4);
    }

    #[test]
    fn skip_clears_pause() {
        let mut engine = engine(&[5, 5], 0);
        engine.pause();
        let event = engine.skip();
        assert!(matches!(event, Some(Event::PhaseChanged { skipped: true, .. })));
        assert!(!engine.state().is_paused);
    }

    #[test]
    fn transitions_reset_mute() {
        let mut engine = engine(&[5, 5], 3);
        engine.set_muted(true);
        assert!(engine.state().is_muted);
        engine.skip();
        assert!(!engine.state().is_muted);
    }

    #[test]
    fn set_muted_same_value_is_noop() {
        let mut engine = engine(&[5], 0);
        assert!(engine.set_muted(false).is_none());
        assert!(engine.set_muted(true).is_some());
        assert!(engine.set_muted(true).is_none());
    }

    #[test]
    fn extend_rest_only_in_rest() {
        let mut engine = engine(&[5, 5], 5);
        assert!(engine.extend_rest(15).is_none());
        assert_eq!(engine.state().remaining_secs, 5);

        engine.skip();
        assert!(engine.phase().is_rest());
        engine.extend_rest(15);
        assert_eq!(engine.state().remaining_secs, 20);
        assert!(engine.phase().is_rest());
    }

    #[test]
    fn set_repeat_count_on_current_step_resets_countdown() {
        let mut engine = engine(&[10], 0);
        engine.tick();
        engine.tick();
        engine.set_repeat_count(&"s0".into(), 5);
        let state = engine.state();
        assert_eq!(state.remaining_secs, 10);
        assert_eq!(state.repeat_index, 1);
        assert_eq!(engine.repeat_config().get(&"s0".into()), 5);
    }

    #[test]
    fn set_repeat_count_on_other_step_leaves_state() {
        let mut engine = engine(&[10, 10], 0);
        engine.tick();
        let before = engine.state();
        engine.set_repeat_count(&"s1".into(), 3);
        assert_eq!(engine.state(), before);
        assert_eq!(engine.repeat_config().get(&"s1".into()), 3);
    }

    #[test]
    fn set_repeat_count_unknown_step_ignored() {
        let mut engine = engine(&[10], 0);
        assert!(engine.set_repeat_count(&"nope".into(), 3).is_none());
    }

    #[test]
    fn lowering_repeats_during_rest_keeps_repeat_in_range() {
        let mut engine = engine(&[4], 2);
        engine.set_repeat_count(&"s0".into(), 3);
        engine.skip();
        assert_eq!(engine.phase(), Phase::Rest(RestContext::BetweenRepeats));
        engine.set_repeat_count(&"s0".into(), 1);
        engine.skip();
        let state = engine.state();
        assert_eq!(state.phase, Phase::Step);
        assert_eq!(state.repeat_index, 1);
    }

    #[test]
    fn countdown_cue_in_last_seconds() {
        let mut s = Schedule::new("cue", vec![ScheduleStep::new("a", "A", 4)]);
        s.steps[0].countdown_voice_secs = Some(2);
        let mut engine = PlaybackEngine::new();
        engine.initialize(Arc::new(s), 0);

        assert!(engine.tick().is_none()); // 3 left
        assert!(matches!(
            engine.tick(),
            Some(Event::CountdownCue { remaining_secs: 2, .. })
        ));
        assert!(matches!(
            engine.tick(),
            Some(Event::CountdownCue { remaining_secs: 1, .. })
        ));
        assert!(matches!(engine.tick(), Some(Event::PhaseChanged { .. })));
    }

    #[test]
    fn sprint_hints_update_repeat_config() {
        let mut s = Schedule::new(
            "hints",
            vec![ScheduleStep::new("a", "A", 4), ScheduleStep::new("b", "B", 4)],
        );
        s.steps[1].sprint_count = Some(3);
        let mut engine = PlaybackEngine::new();
        engine.initialize(Arc::new(s), 0);

        let events = engine.apply_sprint_hints();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.repeat_config().get(&"a".into()), 1);
        assert_eq!(engine.repeat_config().get(&"b".into()), 3);
    }

    #[test]
    fn commands_are_noops_when_complete() {
        let mut engine = engine(&[1], 0);
        engine.tick();
        assert_eq!(engine.phase(), Phase::Complete);
        assert!(engine.pause().is_none());
        assert!(engine.resume().is_none());
        assert!(engine.skip().is_none());
        assert!(engine.extend_rest(5).is_none());
        assert!(engine.set_muted(true).is_none());
        assert!(engine.set_repeat_count(&"s0".into(), 2).is_none());
    }

    #[test]
    fn rest_setting_change_does_not_alter_running_rest() {
        let mut engine = engine(&[1, 1], 5);
        engine.skip();
        engine.set_rest_duration(30);
        assert_eq!(engine.state().remaining_secs, 5);
        engine.skip();
        engine.skip();
        assert_eq!(engine.state().remaining_secs, 30);
    }

    #[test]
    fn snapshot_carries_current_step() {
        let engine = engine(&[7], 0);
        let snap = engine.snapshot();
        assert_eq!(snap.step_id, Some(StepId::from("s0")));
        assert_eq!(snap.step_name.as_deref(), Some("Step 0"));
        assert_eq!(snap.planned_repeats, 1);
        assert_eq!(snap.epoch, 1);
    }
}
