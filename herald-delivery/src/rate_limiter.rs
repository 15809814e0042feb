//! Fixed-window send-rate limiting.
//!
//! The operator configures a "max sends per hour" budget; the limiter divides
//! it evenly across one-minute windows and answers "how many of the requested
//! sends may go out right now". The window counter resets at fixed wall-clock
//! intervals from construction — unused budget never carries over, so the
//! limiter can under-admit near a window boundary. That edge behavior is
//! intentional.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(60);
const WINDOWS_PER_HOUR: u32 = 60;

#[derive(Debug)]
struct RateWindow {
    window_started_at: Instant,
    sent_in_window: u32,
}

impl RateWindow {
    /// Roll forward past any fully elapsed windows, resetting the counter.
    /// Boundaries stay phase-aligned to the first window.
    fn roll(&mut self, window: Duration) {
        let elapsed = self.window_started_at.elapsed();
        if !window.is_zero() && elapsed >= window {
            let whole_windows = elapsed.as_millis() / window.as_millis();
            self.window_started_at += window * u32::try_from(whole_windows).unwrap_or(u32::MAX);
            self.sent_in_window = 0;
        }
    }
}

/// Admission control for outbound sends.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Build a limiter from the operator's hourly budget.
    ///
    /// The per-window cap is at least 1 so a tiny budget still makes
    /// progress.
    #[must_use]
    pub fn new(max_emails_per_hour: u32) -> Self {
        Self::with_window((max_emails_per_hour / WINDOWS_PER_HOUR).max(1), WINDOW)
    }

    /// Build a limiter with an explicit per-window cap and window length.
    #[must_use]
    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(RateWindow {
                window_started_at: Instant::now(),
                sent_in_window: 0,
            }),
        }
    }

    /// How many of `requested` sends the current window can still take:
    /// `min(requested, cap − sent in window)`, never negative.
    pub fn admit(&self, requested: u32) -> u32 {
        let mut state = self.state.lock();
        state.roll(self.window);
        requested.min(self.max_per_window.saturating_sub(state.sent_in_window))
    }

    /// Count sends against the current window.
    ///
    /// Called with the number of items actually claimed for an attempt; a
    /// failed attempt spends provider rate the same as a successful one.
    pub fn record(&self, count: u32) {
        let mut state = self.state.lock();
        state.roll(self.window);
        state.sent_in_window = state.sent_in_window.saturating_add(count);
    }

    /// The per-window cap.
    #[must_use]
    pub const fn max_per_window(&self) -> u32 {
        self.max_per_window
    }
}
