//! Event debouncing for live reload.
//!
//! Coalesces a burst of filesystem events into a single reload. The window
//! opens at the first event of the burst; later events inside the window do
//! not extend it.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Sleep, sleep};

/// Debounce state: either idle or waiting on exactly one timer.
enum State {
    Idle,
    Pending(Pin<Box<Sleep>>),
}

/// Single-timer debouncer.
///
/// Not thread-safe by itself; owned by the watcher task.
pub(crate) struct Debouncer {
    state: State,
    duration: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the specified debounce duration.
    pub fn new(duration: Duration) -> Self {
        Self {
            state: State::Idle,
            duration,
        }
    }

    /// Record a qualifying event.
    ///
    /// Arms the timer if idle and returns `true`. Returns `false` when a
    /// reload is already queued.
    pub fn trigger(&mut self) -> bool {
        match self.state {
            State::Idle => {
                self.state = State::Pending(Box::pin(sleep(self.duration)));
                true
            }
            State::Pending(_) => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    /// Wait for the pending timer to fire.
    ///
    /// Never completes while idle. Does not change state; call
    /// [`reset`](Self::reset) once the fire has been handled.
    pub async fn fired(&mut self) {
        match &mut self.state {
            State::Pending(timer) => timer.as_mut().await,
            State::Idle => std::future::pending().await,
        }
    }

    /// Return to idle, dropping any pending timer.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_first_trigger_arms_timer() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));

        assert!(!debouncer.is_pending());
        assert!(debouncer.trigger());
        assert!(debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_while_pending_coalesce() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));

        assert!(debouncer.trigger());
        assert!(!debouncer.trigger());
        assert!(!debouncer.trigger());
        assert!(debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_duration_from_first_trigger() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));
        let start = Instant::now();

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Second event inside the window does not push the deadline
        debouncer.trigger();

        debouncer.fired().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));

        let result = timeout(Duration::from_secs(1), debouncer.fired()).await;

        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_to_idle() {
        let mut debouncer = Debouncer::new(Duration::from_millis(30));

        debouncer.trigger();
        debouncer.fired().await;
        debouncer.reset();

        assert!(!debouncer.is_pending());
        assert!(debouncer.trigger());
    }
}
