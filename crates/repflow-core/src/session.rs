//! Live playback session: engine + timer + subscriptions.
//!
//! All commands run synchronously against the engine and publish a new
//! snapshot before the engine lock is released, so subscribers never see a
//! snapshot older than the engine. Each tick stream carries a stream id; any
//! command that restarts or stops ticking bumps the id under the same lock,
//! and a tick holding an old id is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::events::Event;
use crate::playback::{PlaybackEngine, PlaybackSnapshot};
use crate::schedule::{Schedule, StepId};
use crate::timer::{TickFlow, TimerSource};

const EVENT_CAPACITY: usize = 64;

/// State guarded by the session lock.
#[derive(Debug, Default)]
struct Shared {
    engine: PlaybackEngine,
    /// Id of the only tick stream allowed to drive the engine.
    stream: u64,
}

/// What a command does to the tick stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retime {
    Keep,
    Stop,
    /// Restart with a full first period, or stop once complete.
    Restart,
}

pub struct PlaybackSession {
    shared: Arc<Mutex<Shared>>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    events: broadcast::Sender<Event>,
    timer: TimerSource,
}

impl PlaybackSession {
    pub fn new(tick_period: Duration) -> Self {
        let (snapshots, _) = watch::channel(PlaybackSnapshot::idle());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            snapshots,
            events,
            timer: TimerSource::new(tick_period),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot stream for the presentation layer and media coordinator.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_ticking(&self) -> bool {
        self.timer.is_running()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start playing `schedule`. Passing the `Arc` of the running session is
    /// a no-op.
    pub fn initialize(&mut self, schedule: Arc<Schedule>, rest_secs: i64) -> PlaybackSnapshot {
        let (snapshot, restart) = {
            let mut shared = lock(&self.shared);
            let before = shared.engine.epoch();
            shared.engine.initialize(schedule.clone(), rest_secs);
            let snapshot = shared.engine.snapshot();
            if shared.engine.epoch() == before {
                return snapshot;
            }

            shared.stream += 1;
            info!(
                schedule_id = %schedule.id,
                steps = schedule.steps.len(),
                rest_secs,
                "session started"
            );
            let _ = self.events.send(Event::SessionStarted {
                schedule_id: schedule.id.clone(),
                step_count: schedule.steps.len(),
                at: Utc::now(),
            });
            self.snapshots.send_replace(snapshot.clone());
            let complete = snapshot.phase().is_complete();
            if complete {
                let _ = self.events.send(completed_event(&snapshot));
            }
            (snapshot, (!complete).then_some(shared.stream))
        };
        self.retime(restart);
        snapshot
    }

    pub fn pause(&mut self) -> PlaybackSnapshot {
        self.run(Retime::Stop, PlaybackEngine::pause)
    }

    pub fn resume(&mut self) -> PlaybackSnapshot {
        self.run(Retime::Restart, PlaybackEngine::resume)
    }

    pub fn toggle_pause(&mut self) -> PlaybackSnapshot {
        let paused = lock(&self.shared).engine.state().is_paused;
        if paused {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Jump to the next phase. The new phase gets a full first period.
    pub fn skip(&mut self) -> PlaybackSnapshot {
        self.run(Retime::Restart, PlaybackEngine::skip)
    }

    pub fn extend_rest(&mut self, delta_secs: u64) -> PlaybackSnapshot {
        self.run(Retime::Keep, |e| e.extend_rest(delta_secs))
    }

    pub fn set_repeat_count(&mut self, step_id: &StepId, count: i64) -> PlaybackSnapshot {
        self.run(Retime::Keep, |e| e.set_repeat_count(step_id, count))
    }

    /// Apply every step's authored sprint count as its repeat count.
    pub fn apply_sprint_hints(&mut self) -> PlaybackSnapshot {
        let mut shared = lock(&self.shared);
        let events = shared.engine.apply_sprint_hints();
        let snapshot = shared.engine.snapshot();
        if !events.is_empty() {
            for event in events {
                let _ = self.events.send(event);
            }
            self.snapshots.send_replace(snapshot.clone());
        }
        snapshot
    }

    pub fn set_muted(&mut self, muted: bool) -> PlaybackSnapshot {
        self.run(Retime::Keep, |e| e.set_muted(muted))
    }

    /// New rest setting for rests that start from now on.
    pub fn set_rest_duration(&mut self, rest_secs: i64) {
        lock(&self.shared).engine.set_rest_duration(rest_secs);
    }

    /// Stop ticking and drop the schedule. Subscribers see an idle snapshot
    /// from a new epoch, which unloads any media.
    pub fn shutdown(&mut self) {
        {
            let mut shared = lock(&self.shared);
            shared.engine.end_session();
            shared.stream += 1;
            self.snapshots.send_replace(shared.engine.snapshot());
        }
        self.timer.cancel();
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Run `command` and, if it changed anything, publish the result and
    /// retire the current tick stream without releasing the lock.
    fn run<F>(&mut self, retime: Retime, command: F) -> PlaybackSnapshot
    where
        F: FnOnce(&mut PlaybackEngine) -> Option<Event>,
    {
        let (snapshot, restart) = {
            let mut shared = lock(&self.shared);
            let event = command(&mut shared.engine);
            let snapshot = shared.engine.snapshot();
            let Some(event) = event else {
                return snapshot;
            };

            if retime != Retime::Keep {
                shared.stream += 1;
            }
            broadcast_change(&self.snapshots, &self.events, Some(event), &snapshot);
            let restart = (retime == Retime::Restart && !snapshot.phase().is_complete())
                .then_some(shared.stream);
            if retime == Retime::Keep {
                return snapshot;
            }
            (snapshot, restart)
        };
        self.retime(restart);
        snapshot
    }

    fn retime(&mut self, restart: Option<u64>) {
        match restart {
            Some(stream) => self.start_timer(stream),
            None => self.timer.cancel(),
        }
    }

    fn start_timer(&mut self, stream: u64) {
        let state = self.shared.clone();
        let snapshots = self.snapshots.clone();
        let events = self.events.clone();

        self.timer.start(move || {
            let mut shared = lock(&state);
            if shared.stream != stream {
                debug!(stream, current = shared.stream, "dropping stale tick");
                return TickFlow::Stop;
            }
            let event = shared.engine.tick();
            let snapshot = shared.engine.snapshot();
            if broadcast_change(&snapshots, &events, event, &snapshot) {
                info!(epoch = snapshot.epoch, "session complete");
                TickFlow::Stop
            } else {
                TickFlow::Continue
            }
        });
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Emit `event`, publish `snapshot`, and follow a transition into `Complete`
/// with `SessionCompleted`. Returns whether the session just completed.
///
/// Callers hold the session lock.
fn broadcast_change(
    snapshots: &watch::Sender<PlaybackSnapshot>,
    events: &broadcast::Sender<Event>,
    event: Option<Event>,
    snapshot: &PlaybackSnapshot,
) -> bool {
    let completed = matches!(&event, Some(Event::PhaseChanged { to, .. }) if to.is_complete());
    // No receivers is fine.
    if let Some(event) = event {
        let _ = events.send(event);
    }
    snapshots.send_replace(snapshot.clone());
    if completed {
        let _ = events.send(completed_event(snapshot));
    }
    completed
}

fn completed_event(snapshot: &PlaybackSnapshot) -> Event {
    Event::SessionCompleted {
        schedule_id: snapshot.schedule_id.clone().unwrap_or_default(),
        at: Utc::now(),
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
