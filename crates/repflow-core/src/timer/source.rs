//! One-second tick source.
//!
//! Each iteration sleeps for a full period and then runs the tick callback to
//! completion before sleeping again. There is no free-running interval, so a
//! `cancel()` between ticks guarantees the next tick never fires, and two
//! ticks can never overlap.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Returned by the tick callback to keep or stop the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

pub struct TimerSource {
    period: Duration,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl TimerSource {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cancel_token: None,
            handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start a new tick stream, cancelling any previous one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> TickFlow + Send + 'static,
    {
        self.cancel();

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
                if on_tick() == TickFlow::Stop {
                    trace!("tick stream finished");
                    break;
                }
            }
        });

        self.cancel_token = Some(cancel_token);
        self.handle = Some(handle);
    }

    /// Stop the current stream. Safe to call when nothing is running.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TimerSource {
    fn drop(&mut self) {
        self.cancel();
    }
}
