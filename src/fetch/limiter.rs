//! Fixed-window call quota
//!
//! At most `calls` acquisitions per `window`. Callers over quota are
//! suspended until the window rolls over, never rejected.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Quota limiter shared by every clone
#[derive(Debug, Clone)]
pub struct QuotaLimiter {
    calls: u32,
    window: Duration,
    state: Arc<Mutex<Window>>,
}

impl QuotaLimiter {
    /// # Arguments
    /// * `calls` - Calls allowed per window (at least one)
    /// * `window` - Window length
    pub fn new(calls: u32, window: Duration) -> Self {
        QuotaLimiter {
            calls: calls.max(1),
            window,
            state: Arc::new(Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            })),
        }
    }

    /// Take a slot, or report how long until the window rolls over.
    async fn reserve(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }

        if state.used < self.calls {
            state.used += 1;
            None
        } else {
            Some((state.started + self.window).saturating_duration_since(now))
        }
    }

    /// Try to take a slot without waiting
    pub async fn try_acquire(&self) -> bool {
        self.reserve().await.is_none()
    }

    /// Take a slot, suspending until one is free
    pub async fn acquire(&self) {
        while let Some(wait) = self.reserve().await {
            debug!(?wait, "call quota exhausted, waiting for the next window");
            tokio::time::sleep(wait).await;
        }
    }

    /// Slots left in the current window
    pub async fn remaining(&self) -> u32 {
        let state = self.state.lock().await;
        if Instant::now().duration_since(state.started) >= self.window {
            self.calls
        } else {
            self.calls - state.used
        }
    }
}
