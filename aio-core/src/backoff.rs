//! A small reusable exponential-backoff sequence, shared by the
//! self-registration loop's reconnect path and the `HeartbeatStream`
//! client reconnect path.
//!
//! A plain, steppable sequence rather than a future-returning
//! combinator, so callers can drive it from their own select loop.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Backoff {
            initial,
            cap,
            current: initial,
        }
    }

    /// The standard default: 1s initial, 30s cap.
    pub fn default_stream_backoff() -> Self {
        Backoff::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// The delay to wait before the next attempt, then doubles for the
    /// following call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Resets to the initial delay; call after a successful attempt.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
