//! Trailing-edge debouncer.
//!
//! The controller forwards "step entered" notifications through a
//! [`Debouncer`]: a burst of transitions inside the window collapses into the
//! last one, while transitions spaced wider than the window are all
//! forwarded.

use std::future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Holds the latest value until the window elapses without a newer one.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Store `value` and restart the window.
    pub fn call(&mut self, value: T) {
        self.pending = Some((value, Instant::now() + self.window));
    }

    /// Drop the pending value, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolve with the pending value once its window has elapsed.
    ///
    /// Pends forever when nothing is pending. Cancel safe: dropping the
    /// future before it resolves keeps the value pending.
    pub async fn fired(&mut self) -> T {
        let Some(deadline) = self.pending.as_ref().map(|(_, deadline)| *deadline) else {
            return future::pending().await;
        };

        sleep_until(deadline).await;
        match self.pending.take() {
            Some((value, _)) => value,
            None => future::pending().await,
        }
    }
}
