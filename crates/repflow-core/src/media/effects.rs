use crate::playback::{Phase, PlaybackSnapshot};
use crate::schedule::MediaAttachment;

/// A single instruction for the media layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEffect {
    /// Release whatever is loaded. Safe to issue when nothing is.
    Unload,
    Load(MediaAttachment),
    Play,
    Pause,
    SetMuted(bool),
    SetBackgroundMuted(bool),
}

/// Media plays only during an unpaused step.
pub fn should_play(snapshot: &PlaybackSnapshot) -> bool {
    snapshot.state.phase == Phase::Step && !snapshot.state.is_paused
}

fn background_muted(snapshot: &PlaybackSnapshot) -> bool {
    snapshot.mute_background && snapshot.state.phase == Phase::Step
}

/// Whether `next` shows a different step than `prev`.
///
/// Reaching `Complete` keeps the last step's identity so its media is paused
/// rather than unloaded.
fn step_changed(prev: &PlaybackSnapshot, next: &PlaybackSnapshot) -> bool {
    if prev.epoch != next.epoch {
        return true;
    }
    !next.phase().is_complete()
        && (prev.phase().is_complete() || prev.state.step_index != next.state.step_index)
}

/// Effects that move the media layer from `prev` to `next`.
///
/// `prev` is `None` before the first snapshot has been applied.
pub fn derive_media_effects(
    prev: Option<&PlaybackSnapshot>,
    next: &PlaybackSnapshot,
) -> Vec<MediaEffect> {
    let mut effects = Vec::new();
    let playing = should_play(next);

    let reload = match prev {
        None => true,
        Some(prev) => step_changed(prev, next),
    };

    if reload {
        // A completed session keeps its last media loaded, so always unload.
        if prev.is_some() {
            effects.push(MediaEffect::Unload);
        }
        if let (Some(media), false) = (&next.media, next.phase().is_complete()) {
            effects.push(MediaEffect::Load(media.clone()));
            effects.push(MediaEffect::SetMuted(next.state.is_muted));
            effects.push(if playing {
                MediaEffect::Play
            } else {
                MediaEffect::Pause
            });
        }
    } else if let Some(prev) = prev {
        let has_media = prev.media.is_some();
        if has_media && prev.state.is_muted != next.state.is_muted {
            effects.push(MediaEffect::SetMuted(next.state.is_muted));
        }
        if has_media && should_play(prev) != playing {
            effects.push(if playing {
                MediaEffect::Play
            } else {
                MediaEffect::Pause
            });
        }
    }

    let was_background_muted = prev.map(background_muted).unwrap_or(false);
    if background_muted(next) != was_background_muted {
        effects.push(MediaEffect::SetBackgroundMuted(background_muted(next)));
    }

    effects
}
