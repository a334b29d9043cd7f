//! Fixed-window request budget.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Allows at most `budget` acquisitions per `window`.
///
/// The check and the increment happen under one lock, so concurrent callers
/// can never overshoot the budget.
#[derive(Debug)]
pub struct RateLimiter {
    budget: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            budget,
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    pub fn per_minute(budget: u32) -> Self {
        Self::new(budget, Duration::from_secs(60))
    }

    /// Reserve one request slot. Returns `false` when the window is spent.
    pub fn try_acquire(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.started.elapsed() >= self.window {
            state.started = Instant::now();
            state.used = 0;
        }

        if state.used >= self.budget {
            return false;
        }
        state.used += 1;
        true
    }

    /// Slots left in the current window.
    pub fn remaining(&self) -> u32 {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.started.elapsed() >= self.window {
            self.budget
        } else {
            self.budget.saturating_sub(state.used)
        }
    }
}
