//! Sliding-window rate limiting
//!
//! Admission is granted only when fewer than `max_requests` admissions fall
//! inside the trailing window. When the window is full the caller sleeps
//! until the oldest admission expires, plus a small safety margin.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Extra wait added on top of the computed expiry time
pub const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Sliding-window request limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`
    ///
    /// A `max_requests` of zero is treated as one.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            admissions: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Maximum admissions per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a request may be issued, then record it
    ///
    /// Returns the total time spent waiting. This never fails.
    pub async fn admit(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let mut admissions = self.admissions.lock().await;
                let now = Instant::now();
                Self::evict_expired(&mut admissions, now, self.window);

                if admissions.len() < self.max_requests {
                    admissions.push_back(now);
                    let waited = now.duration_since(started);
                    crate::metrics::record_rate_limit_wait(waited);
                    return waited;
                }

                // Full window: wait for the oldest admission to age out.
                let oldest = admissions[0];
                self.window.saturating_sub(now.duration_since(oldest)) + SAFETY_MARGIN
            };

            info!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                window_secs = self.window.as_secs(),
                "Rate limit reached. Waiting {:.1} seconds...",
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window
    pub async fn in_flight(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        Self::evict_expired(&mut admissions, Instant::now(), self.window);
        admissions.len()
    }

    fn evict_expired(admissions: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = admissions.front() {
            if now.duration_since(*oldest) >= window {
                admissions.pop_front();
            } else {
                break;
            }
        }
        debug!(in_window = admissions.len(), "Rate limiter window refreshed");
    }
}
