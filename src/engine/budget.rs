//! Bounded error recovery for a source pipeline.

use std::time::{Duration, Instant};

/// Default ceiling on consecutive conversion failures.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Default cooldown once the ceiling is reached.
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(30);

/// Tracks consecutive failures and gates further attempts while a cooldown
/// window is open.
///
/// Any success clears the count. Each failure past the ceiling re-arms the
/// window, so a persistently broken input stays quiet instead of logging at
/// callback rate.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    consecutive_errors: u32,
    last_error: Option<Instant>,
    max_consecutive: u32,
    cooldown: Duration,
}

impl Default for ErrorBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_ERROR_COOLDOWN)
    }
}

impl ErrorBudget {
    pub fn new(max_consecutive: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_errors: 0,
            last_error: None,
            max_consecutive,
            cooldown,
        }
    }

    /// True while attempts should be skipped: the ceiling was reached and
    /// the cooldown since the last failure has not elapsed.
    pub fn should_skip(&self) -> bool {
        self.consecutive_errors >= self.max_consecutive
            && self
                .last_error
                .is_some_and(|at| at.elapsed() < self.cooldown)
    }

    pub fn record_failure(&mut self) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(Instant::now());
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
