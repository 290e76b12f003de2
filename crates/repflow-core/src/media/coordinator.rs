//! Keeps at most one media resource in line with playback snapshots.
//!
//! The coordinator reads snapshots and never writes engine state. Loads run
//! on the blocking pool and report back tagged with a generation number; a
//! completion whose generation is no longer current is unloaded and dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{LoadedMedia, MediaBackend, MediaHandle};
use super::effects::{derive_media_effects, MediaEffect};
use crate::error::MediaError;
use crate::playback::PlaybackSnapshot;
use crate::schedule::MediaAttachment;

/// What the presentation layer should show for media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaStatus {
    /// Nothing attached (or the load failed and was downgraded).
    None,
    Loading { url: String },
    Ready { url: String, duration_secs: Option<u64> },
    /// The last load failed; shown as "no media".
    Unavailable { url: String },
}

/// A load the caller must perform and report via `complete_load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub media: MediaAttachment,
}

#[derive(Debug)]
enum Slot {
    Empty,
    Loading {
        generation: u64,
        media: MediaAttachment,
    },
    Loaded {
        media: MediaAttachment,
        handle: MediaHandle,
    },
}

type LoadOutcome = (u64, Result<LoadedMedia, MediaError>);

pub struct MediaCoordinator<B: MediaBackend> {
    backend: Arc<B>,
    slot: Slot,
    generation: u64,
    playing: bool,
    muted: bool,
    last: Option<PlaybackSnapshot>,
    status: watch::Sender<MediaStatus>,
}

impl<B: MediaBackend + 'static> MediaCoordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (status, _) = watch::channel(MediaStatus::None);
        Self {
            backend,
            slot: Slot::Empty,
            generation: 0,
            playing: false,
            muted: false,
            last: None,
            status,
        }
    }

    pub fn status(&self) -> MediaStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MediaStatus> {
        self.status.subscribe()
    }

    /// Handle of the resource currently loaded, if any.
    pub fn loaded_handle(&self) -> Option<MediaHandle> {
        match self.slot {
            Slot::Loaded { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// URL of the resource currently held, if a load has completed.
    pub fn loaded_url(&self) -> Option<&str> {
        match &self.slot {
            Slot::Loaded { media, .. } => Some(&media.url),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.slot, Slot::Loading { .. })
    }

    /// Apply the effects between the last seen snapshot and `next`.
    ///
    /// Returns the load the caller has to start, if the new snapshot needs one.
    pub fn reconcile(&mut self, next: &PlaybackSnapshot) -> Option<LoadTicket> {
        let effects = derive_media_effects(self.last.as_ref(), next);
        self.last = Some(next.clone());

        let mut ticket = None;
        for effect in effects {
            if let Some(t) = self.apply(effect) {
                ticket = Some(t);
            }
        }
        ticket
    }

    /// Report the outcome of the load for `generation`.
    pub fn complete_load(&mut self, generation: u64, result: Result<LoadedMedia, MediaError>) {
        let current = matches!(
            &self.slot,
            Slot::Loading { generation: g, .. } if *g == generation
        );
        if !current {
            if let Ok(loaded) = result {
                debug!(generation, handle = loaded.handle.0, "discarding stale media load");
                self.release(loaded.handle);
            }
            return;
        }

        let Slot::Loading { media, .. } = std::mem::replace(&mut self.slot, Slot::Empty) else {
            return;
        };
        match result {
            Ok(loaded) => {
                self.log_failure(self.backend.set_muted(loaded.handle, self.muted));
                self.log_failure(if self.playing {
                    self.backend.play(loaded.handle)
                } else {
                    self.backend.pause(loaded.handle)
                });
                self.status.send_replace(MediaStatus::Ready {
                    url: media.url.clone(),
                    duration_secs: loaded.duration_secs,
                });
                self.slot = Slot::Loaded {
                    media,
                    handle: loaded.handle,
                };
            }
            Err(err) => {
                warn!(url = %media.url, error = %err, "media load failed");
                self.status
                    .send_replace(MediaStatus::Unavailable { url: media.url });
            }
        }
    }

    /// Unload everything and invalidate in-flight loads.
    pub fn shutdown(&mut self) {
        self.apply(MediaEffect::Unload);
        self.last = None;
    }

    /// Drive the coordinator from a snapshot channel until `cancel` fires or
    /// the sender is dropped.
    pub async fn run(
        mut self,
        mut snapshots: watch::Receiver<PlaybackSnapshot>,
        cancel: CancellationToken,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<LoadOutcome>();

        let initial = snapshots.borrow_and_update().clone();
        if let Some(ticket) = self.reconcile(&initial) {
            self.spawn_load(ticket, &done_tx);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = snapshots.borrow_and_update().clone();
                    if let Some(ticket) = self.reconcile(&next) {
                        self.spawn_load(ticket, &done_tx);
                    }
                }
                Some((generation, result)) = done_rx.recv() => {
                    self.complete_load(generation, result);
                }
            }
        }

        self.shutdown();
        debug!("media coordinator stopped");
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply(&mut self, effect: MediaEffect) -> Option<LoadTicket> {
        match effect {
            MediaEffect::Unload => {
                self.generation += 1;
                self.release_slot();
                self.status.send_replace(MediaStatus::None);
                None
            }
            MediaEffect::Load(media) => {
                self.generation += 1;
                self.release_slot();
                self.status.send_replace(MediaStatus::Loading {
                    url: media.url.clone(),
                });
                self.slot = Slot::Loading {
                    generation: self.generation,
                    media: media.clone(),
                };
                Some(LoadTicket {
                    generation: self.generation,
                    media,
                })
            }
            MediaEffect::Play => {
                self.playing = true;
                if let Some(handle) = self.loaded_handle() {
                    self.log_failure(self.backend.play(handle));
                }
                None
            }
            MediaEffect::Pause => {
                self.playing = false;
                if let Some(handle) = self.loaded_handle() {
                    self.log_failure(self.backend.pause(handle));
                }
                None
            }
            MediaEffect::SetMuted(muted) => {
                self.muted = muted;
                if let Some(handle) = self.loaded_handle() {
                    self.log_failure(self.backend.set_muted(handle, muted));
                }
                None
            }
            MediaEffect::SetBackgroundMuted(muted) => {
                self.log_failure(self.backend.set_background_muted(muted));
                None
            }
        }
    }

    fn spawn_load(&self, ticket: LoadTicket, done_tx: &mpsc::UnboundedSender<LoadOutcome>) {
        let backend = self.backend.clone();
        let done_tx = done_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = backend.load(&ticket.media);
            if let Err(mpsc::error::SendError((_, Ok(loaded)))) =
                done_tx.send((ticket.generation, result))
            {
                // Coordinator is gone; nobody will ever use this resource.
                let _ = backend.unload(loaded.handle);
            }
        });
    }

    fn release(&self, handle: MediaHandle) {
        self.log_failure(self.backend.unload(handle));
    }

    fn release_slot(&mut self) {
        if let Slot::Loaded { media, handle } = std::mem::replace(&mut self.slot, Slot::Empty) {
            debug!(url = %media.url, handle = handle.0, "unloading media");
            self.release(handle);
        }
    }

    fn log_failure(&self, result: Result<(), MediaError>) {
        if let Err(err) = result {
            warn!(error = %err, "media control failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{Phase, PlaybackState};
    use crate::schedule::MediaKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail_urls: Vec<String>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MediaBackend for RecordingBackend {
        fn load(&self, media: &MediaAttachment) -> Result<LoadedMedia, MediaError> {
            self.record(format!("load {}", media.url));
            if self.fail_urls.contains(&media.url) {
                return Err(MediaError::LoadFailed {
                    url: media.url.clone(),
                    message: "404".into(),
                });
            }
            Ok(LoadedMedia {
                handle: MediaHandle(media.url.len() as u64),
                duration_secs: Some(30),
            })
        }

        fn unload(&self, handle: MediaHandle) -> Result<(), MediaError> {
            self.record(format!("unload {}", handle.0));
            Ok(())
        }

        fn play(&self, handle: MediaHandle) -> Result<(), MediaError> {
            self.record(format!("play {}", handle.0));
            Ok(())
        }

        fn pause(&self, handle: MediaHandle) -> Result<(), MediaError> {
            self.record(format!("pause {}", handle.0));
            Ok(())
        }

        fn set_muted(&self, handle: MediaHandle, muted: bool) -> Result<(), MediaError> {
            self.record(format!("mute {} {}", handle.0, muted));
            Ok(())
        }
    }

    fn snap(step_index: usize, url: Option<&str>) -> PlaybackSnapshot {
        PlaybackSnapshot {
            epoch: 1,
            schedule_id: Some("s".into()),
            state: PlaybackState {
                phase: Phase::Step,
                step_index,
                repeat_index: 1,
                remaining_secs: 10,
                is_paused: false,
                is_muted: false,
            },
            step_id: Some(format!("step{step_index}").into()),
            step_name: None,
            planned_repeats: 1,
            media: url.map(|u| MediaAttachment {
                kind: MediaKind::Video,
                url: u.into(),
                hint: None,
            }),
            mute_background: false,
        }
    }

    fn load_now(backend: &RecordingBackend, ticket: &LoadTicket) -> Result<LoadedMedia, MediaError> {
        backend.load(&ticket.media)
    }

    #[test]
    fn load_completion_applies_desired_state() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());

        let ticket = coordinator.reconcile(&snap(0, Some("aaa"))).unwrap();
        assert!(coordinator.is_loading());
        assert!(matches!(coordinator.status(), MediaStatus::Loading { .. }));

        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);
        assert_eq!(coordinator.loaded_handle(), Some(MediaHandle(3)));
        assert_eq!(
            coordinator.status(),
            MediaStatus::Ready {
                url: "aaa".into(),
                duration_secs: Some(30)
            }
        );
        assert_eq!(backend.calls(), vec!["load aaa", "mute 3 false", "play 3"]);
    }

    #[test]
    fn late_load_after_step_change_is_discarded() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());

        let first = coordinator.reconcile(&snap(0, Some("aaa"))).unwrap();
        let second = coordinator.reconcile(&snap(1, Some("bbbbb"))).unwrap();

        // First load resolves after the step already moved on.
        let late = load_now(&backend, &first);
        coordinator.complete_load(first.generation, late);
        assert!(coordinator.is_loading());
        assert!(backend.calls().contains(&"unload 3".to_string()));

        let result = load_now(&backend, &second);
        coordinator.complete_load(second.generation, result);
        assert_eq!(coordinator.loaded_handle(), Some(MediaHandle(5)));
    }

    #[test]
    fn step_change_releases_loaded_resource() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());

        let ticket = coordinator.reconcile(&snap(0, Some("aaa"))).unwrap();
        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);
        assert_eq!(coordinator.loaded_url(), Some("aaa"));

        assert!(coordinator.reconcile(&snap(1, Some("bbbbb"))).is_some());
        assert_eq!(coordinator.loaded_url(), None);
        assert!(backend.calls().contains(&"unload 3".to_string()));

        coordinator.reconcile(&snap(2, None));
        assert_eq!(coordinator.loaded_url(), None);
        assert_eq!(coordinator.status(), MediaStatus::None);
    }

    #[test]
    fn late_load_after_shutdown_is_discarded() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());

        let ticket = coordinator.reconcile(&snap(0, Some("aaa"))).unwrap();
        coordinator.shutdown();
        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);
        assert_eq!(coordinator.loaded_handle(), None);
        assert_eq!(coordinator.status(), MediaStatus::None);
    }

    #[test]
    fn failed_load_downgrades_to_unavailable() {
        let backend = Arc::new(RecordingBackend {
            fail_urls: vec!["bad".into()],
            ..Default::default()
        });
        let mut coordinator = MediaCoordinator::new(backend.clone());

        let ticket = coordinator.reconcile(&snap(0, Some("bad"))).unwrap();
        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);
        assert_eq!(coordinator.loaded_handle(), None);
        assert_eq!(
            coordinator.status(),
            MediaStatus::Unavailable { url: "bad".into() }
        );
    }

    #[test]
    fn mute_and_pause_reach_loaded_resource_without_reload() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());
        let first = snap(0, Some("aaa"));
        let ticket = coordinator.reconcile(&first).unwrap();
        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);

        let mut muted = first.clone();
        muted.state.is_muted = true;
        assert!(coordinator.reconcile(&muted).is_none());

        let mut paused = muted.clone();
        paused.state.is_paused = true;
        assert!(coordinator.reconcile(&paused).is_none());

        let calls = backend.calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("load")).count(), 1);
        assert!(calls.contains(&"mute 3 true".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("pause 3"));
    }

    #[test]
    fn pause_before_load_completes_is_honoured() {
        let backend = Arc::new(RecordingBackend::default());
        let mut coordinator = MediaCoordinator::new(backend.clone());
        let first = snap(0, Some("aaa"));
        let ticket = coordinator.reconcile(&first).unwrap();

        let mut paused = first.clone();
        paused.state.is_paused = true;
        coordinator.reconcile(&paused);

        let result = load_now(&backend, &ticket);
        coordinator.complete_load(ticket.generation, result);
        assert_eq!(backend.calls().last().map(String::as_str), Some("pause 3"));
    }

    #[tokio::test]
    async fn run_loop_loads_and_stops_on_cancel() {
        let backend = Arc::new(RecordingBackend::default());
        let coordinator = MediaCoordinator::new(backend.clone());
        let mut status = coordinator.subscribe_status();
        let (tx, rx) = watch::channel(snap(0, Some("aaa")));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(rx, cancel.clone()));

        while !matches!(*status.borrow_and_update(), MediaStatus::Ready { .. }) {
            status.changed().await.unwrap();
        }

        tx.send(snap(1, None)).unwrap();
        while *status.borrow_and_update() != MediaStatus::None {
            status.changed().await.unwrap();
        }

        cancel.cancel();
        task.await.unwrap();
        assert!(backend.calls().contains(&"unload 3".to_string()));
    }
}
