use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MediaError;
use crate::schedule::MediaAttachment;

/// Opaque id for a resource held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(pub u64);

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMedia {
    pub handle: MediaHandle,
    /// Reported length for video/audio. May exceed the step duration.
    pub duration_secs: Option<u64>,
}

/// Something that can actually show or play media.
///
/// `load` may block (network fetch, decoding); the coordinator calls it off
/// the async runtime. All other calls must be cheap.
pub trait MediaBackend: Send + Sync {
    fn load(&self, media: &MediaAttachment) -> Result<LoadedMedia, MediaError>;

    /// Release a handle. Unknown handles must be tolerated.
    fn unload(&self, handle: MediaHandle) -> Result<(), MediaError>;

    fn play(&self, handle: MediaHandle) -> Result<(), MediaError>;

    fn pause(&self, handle: MediaHandle) -> Result<(), MediaError>;

    fn set_muted(&self, handle: MediaHandle, muted: bool) -> Result<(), MediaError>;

    /// Duck any background audio outside the loaded resource.
    fn set_background_muted(&self, _muted: bool) -> Result<(), MediaError> {
        Ok(()) // default no-op
    }
}

/// Backend that only logs. Used when no real output is attached.
///
/// It still tracks which handles are live so control calls against an
/// unloaded handle fail the way a real player would.
#[derive(Debug, Default)]
pub struct NullBackend {
    next_handle: AtomicU64,
    live: Mutex<HashSet<MediaHandle>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> MutexGuard<'_, HashSet<MediaHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, handle: MediaHandle) -> Result<(), MediaError> {
        if self.live().contains(&handle) {
            Ok(())
        } else {
            Err(MediaError::NotLoaded(handle.0))
        }
    }
}

impl MediaBackend for NullBackend {
    fn load(&self, media: &MediaAttachment) -> Result<LoadedMedia, MediaError> {
        if media.url.trim().is_empty() {
            return Err(MediaError::Unsupported("empty media url".into()));
        }
        let handle = MediaHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.live().insert(handle);
        info!(kind = ?media.kind, url = %media.url, handle = handle.0, "media loaded");
        Ok(LoadedMedia {
            handle,
            duration_secs: None,
        })
    }

    fn unload(&self, handle: MediaHandle) -> Result<(), MediaError> {
        if self.live().remove(&handle) {
            info!(handle = handle.0, "media unloaded");
        }
        Ok(())
    }

    fn play(&self, handle: MediaHandle) -> Result<(), MediaError> {
        self.check(handle)?;
        info!(handle = handle.0, "media play");
        Ok(())
    }

    fn pause(&self, handle: MediaHandle) -> Result<(), MediaError> {
        self.check(handle)?;
        info!(handle = handle.0, "media pause");
        Ok(())
    }

    fn set_muted(&self, handle: MediaHandle, muted: bool) -> Result<(), MediaError> {
        self.check(handle)?;
        info!(handle = handle.0, muted, "media mute");
        Ok(())
    }

    fn set_background_muted(&self, muted: bool) -> Result<(), MediaError> {
        info!(muted, "background mute");
        Ok(())
    }
}
