mod engine;
mod repeat;
mod state;

pub use engine::PlaybackEngine;
pub use repeat::RepeatConfig;
pub use state::{Phase, PlaybackSnapshot, PlaybackState, RestContext};
