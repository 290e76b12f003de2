//! # Repflow Core Library
//!
//! Playback engine for interval workouts. A schedule is an ordered list of
//! timed steps; the engine walks it step by step, repeats each step as many
//! times as configured, and inserts rest periods between repeats and steps.
//! The CLI binary and any other front-end are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Playback Engine**: A tick-driven state machine. The caller (or a
//!   [`PlaybackSession`]) invokes `tick()` once per second
//! - **Timer Source**: Cancellable one-second tick stream on tokio
//! - **Media Coordinator**: Keeps one media player in step with the engine's
//!   snapshots and discards stale asynchronous loads
//! - **Storage**: SQLite schedule store and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`PlaybackEngine`]: Core playback state machine
//! - [`PlaybackSession`]: Engine plus timer, publishing snapshots and events
//! - [`MediaCoordinator`]: Media side-effects driven by snapshots
//! - [`Database`]: Schedule persistence
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod media;
pub mod playback;
pub mod schedule;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, MediaError, ValidationError};
pub use events::Event;
pub use media::{
    derive_media_effects, MediaBackend, MediaCoordinator, MediaEffect, MediaHandle, MediaStatus,
    NullBackend,
};
pub use playback::{
    Phase, PlaybackEngine, PlaybackSnapshot, PlaybackState, RepeatConfig, RestContext,
};
pub use schedule::{MediaAttachment, MediaKind, Schedule, ScheduleStep, StepId};
pub use session::PlaybackSession;
pub use storage::{Config, Database, ScheduleSummary};
pub use timer::{TickFlow, TimerSource};
