mod source;

pub use source::{TickFlow, TimerSource};
