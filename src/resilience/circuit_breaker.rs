//! Circuit breaker state machine
//!
//! Stops issuing calls to a resource that keeps failing, then lets a bounded
//! number of probe calls through once a cool-down period has elapsed.
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                         │ now - last_failure >= timeout
//!     │ successes >= success_threshold          ▼ (checked lazily)
//!     └──────────────────────────────────── HALF_OPEN ──(any failure)──▶ OPEN
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: u32,
    /// Cool-down before an open circuit admits probes
    pub timeout: Duration,
    /// Probe calls allowed in flight while half-open
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_attempts: 3,
        }
    }
}

/// Gate state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Point-in-time snapshot of a breaker, for observability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerState {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

/// Circuit breaker for one named resource
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_in_flight: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_in_flight: 0,
            last_failure: None,
            last_failure_time: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Checks whether a call may be attempted now
    ///
    /// An OPEN circuit whose timeout has elapsed moves to HALF_OPEN here. While
    /// HALF_OPEN, a `true` answer reserves one probe slot, released by the next
    /// `record_success`/`record_failure`.
    pub fn can_execute(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.time_until_half_open(now).is_some() {
                    return false;
                }
                self.transition(CircuitState::HalfOpen);
                self.half_open_in_flight = 1;
                true
            }
            CircuitState::HalfOpen => {
                if self.half_open_in_flight < self.config.half_open_max_attempts {
                    self.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Time left before an OPEN circuit admits probes
    pub fn time_until_half_open(&self, now: Instant) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let last = self.last_failure?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.config.timeout {
            None
        } else {
            Some(self.config.timeout - elapsed)
        }
    }

    /// Records a successful call
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened; it proves nothing
            CircuitState::Open => {}
        }
    }

    /// Records a failed call
    pub fn record_failure(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.last_failure_time = Some(Utc::now());

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.consecutive_failures += 1;
                self.transition(CircuitState::Open);
            }
            CircuitState::Open => {
                self.consecutive_failures += 1;
            }
        }
    }

    /// Forces the breaker back to CLOSED
    pub fn reset(&mut self) {
        self.transition(CircuitState::Closed);
        self.last_failure = None;
        self.last_failure_time = None;
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            name: self.name.clone(),
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_failure_time: self.last_failure_time,
        }
    }

    fn transition(&mut self, to: CircuitState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;

        match to {
            CircuitState::Open => {
                self.consecutive_successes = 0;
                self.half_open_in_flight = 0;
                tracing::warn!(
                    breaker = %self.name,
                    %from,
                    failures = self.consecutive_failures,
                    "Circuit opened, refusing calls for {:?}",
                    self.config.timeout
                );
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes = 0;
                self.half_open_in_flight = 0;
                tracing::info!(breaker = %self.name, %from, "Circuit half-open, probing");
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.half_open_in_flight = 0;
                tracing::info!(breaker = %self.name, %from, "Circuit closed");
            }
        }
    }
}
