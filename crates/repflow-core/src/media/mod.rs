//! Media coordination for the active step.
//!
//! [`derive_media_effects`] turns a pair of snapshots into effects;
//! [`MediaCoordinator`] applies them to a [`MediaBackend`].

mod backend;
mod coordinator;
mod effects;

pub use backend::{LoadedMedia, MediaBackend, MediaHandle, NullBackend};
pub use coordinator::{LoadTicket, MediaCoordinator, MediaStatus};
pub use effects::{derive_media_effects, should_play, MediaEffect};
