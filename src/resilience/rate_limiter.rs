//! Per-platform request pacing
//!
//! Each platform owns one limiter holding a moving window of recent request
//! departures. A request is admitted only when both the one-second and the
//! one-minute windows have room; otherwise the caller sleeps for exactly the
//! time until the tightest window frees a slot.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Request ceilings for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            requests_per_minute: 60,
        }
    }
}

/// Sliding-window bookkeeping of recent request departures
#[derive(Debug, Clone)]
pub struct RequestWindow {
    config: RateLimitConfig,
    /// Departure times within the last minute, oldest first
    recent: VecDeque<Instant>,
}

impl RequestWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            recent: VecDeque::new(),
        }
    }

    /// Checks if a request may depart at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_available(now).is_none()
    }

    /// Records a request departing at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.prune(now);
        self.recent.push_back(now);
    }

    /// Number of departures within `window` before `now`
    pub fn requests_within(&self, window: Duration, now: Instant) -> usize {
        self.recent
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }

    /// Calculates the time until the next request can depart
    ///
    /// Returns None if a request can depart now, or the minimum wait that
    /// satisfies both windows otherwise.
    pub fn time_until_available(&self, now: Instant) -> Option<Duration> {
        let per_second = self.wait_for_window(SECOND, self.config.requests_per_second, now);
        let per_minute = self.wait_for_window(MINUTE, self.config.requests_per_minute, now);

        match (per_second, per_minute) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or_default().max(b.unwrap_or_default())),
        }
    }

    fn wait_for_window(&self, window: Duration, limit: u32, now: Instant) -> Option<Duration> {
        let limit = limit.max(1) as usize;
        let in_window: Vec<Instant> = self
            .recent
            .iter()
            .copied()
            .filter(|t| now.saturating_duration_since(*t) < window)
            .collect();

        if in_window.len() < limit {
            return None;
        }

        // The slot frees once enough of the oldest departures leave the window
        let blocking = in_window[in_window.len() - limit];
        let frees_at = blocking + window;
        Some(frees_at.saturating_duration_since(now))
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.recent.front() {
            if now.saturating_duration_since(*oldest) >= MINUTE {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Shared rate limiter consulted before every outbound call of a platform
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    window: Mutex<RequestWindow>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            window: Mutex::new(RequestWindow::new(config)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Suspends until both windows admit one more request, then records it
    ///
    /// Returns the total time spent waiting.
    pub async fn wait_if_needed(&self) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                match window.time_until_available(now) {
                    None => {
                        window.record_request(now);
                        return waited;
                    }
                    Some(wait) => wait,
                }
            };

            tracing::debug!(
                limiter = %self.name,
                delay_ms = wait.as_millis() as u64,
                "Rate limit reached, delaying request"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}
