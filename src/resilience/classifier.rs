//! Failure taxonomy and classification
//!
//! Maps any `HarvestError` onto an `ErrorCode` and decides whether the retry
//! executor may attempt the call again.

use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Taxonomy tag of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Timeout, connection reset, transient 5xx
    Network,
    /// HTTP 429 or an equivalent upstream throttle
    RateLimit,
    /// Failed or expired credentials
    Auth,
    /// Malformed caller input
    Validation,
    /// Absent resource
    NotFound,
    /// Non-retryable 4xx, undecodable payloads, exhausted budgets
    Permanent,
    /// Call refused by an open circuit breaker
    CircuitOpen,
    /// Operation stopped by the abort signal
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::RateLimit => "RATE_LIMIT",
            Self::Auth => "AUTH",
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Permanent => "PERMANENT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "NETWORK" => Some(Self::Network),
            "RATE_LIMIT" => Some(Self::RateLimit),
            "AUTH" => Some(Self::Auth),
            "VALIDATION" => Some(Self::Validation),
            "NOT_FOUND" => Some(Self::NotFound),
            "PERMANENT" => Some(Self::Permanent),
            "CIRCUIT_OPEN" => Some(Self::CircuitOpen),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the retry executor may attempt the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit)
    }

    /// Whether the failure says something about upstream health
    ///
    /// Only these failures move a circuit breaker towards OPEN; a 404 or a
    /// rejected input is a healthy answer from the upstream.
    pub fn counts_against_circuit(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Permanent)
    }
}

/// Outcome of classifying a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub code: ErrorCode,
    pub retryable: bool,
    /// Upstream-provided delay before the next attempt
    pub retry_after: Option<Duration>,
}

impl Classification {
    fn of(code: ErrorCode) -> Self {
        Self {
            code,
            retryable: code.is_retryable(),
            retry_after: None,
        }
    }
}

/// Classifies a failure into the taxonomy
///
/// | Failure | Code | Retryable |
/// |---------|------|-----------|
/// | Timeout, connect/transport error | NETWORK | yes |
/// | HTTP 408, 5xx | NETWORK | yes |
/// | HTTP 429 | RATE_LIMIT | yes (honors `retry_after`) |
/// | HTTP 401/403, token failure | AUTH | no |
/// | Malformed input | VALIDATION | no |
/// | HTTP 404 / null item | NOT_FOUND | no |
/// | Other 4xx, decode failure | PERMANENT | no |
pub fn classify(error: &HarvestError) -> Classification {
    match error {
        HarvestError::Timeout { .. } => Classification::of(ErrorCode::Network),
        HarvestError::Http { source, .. } | HarvestError::Reqwest(source) => {
            if source.is_decode() || source.is_builder() {
                Classification::of(ErrorCode::Permanent)
            } else {
                Classification::of(ErrorCode::Network)
            }
        }
        HarvestError::Io(_) => Classification::of(ErrorCode::Network),
        HarvestError::RateLimited { retry_after, .. } => Classification {
            code: ErrorCode::RateLimit,
            retryable: true,
            retry_after: *retry_after,
        },
        HarvestError::Auth { .. } => Classification::of(ErrorCode::Auth),
        HarvestError::Validation(_) | HarvestError::UrlParse(_) | HarvestError::Config(_) => {
            Classification::of(ErrorCode::Validation)
        }
        HarvestError::NotFound { .. } => Classification::of(ErrorCode::NotFound),
        HarvestError::Status { status, .. } => match *status {
            401 | 403 => Classification::of(ErrorCode::Auth),
            404 | 410 => Classification::of(ErrorCode::NotFound),
            429 => Classification::of(ErrorCode::RateLimit),
            408 | 500..=599 => Classification::of(ErrorCode::Network),
            _ => Classification::of(ErrorCode::Permanent),
        },
        HarvestError::CircuitOpen { .. } => Classification::of(ErrorCode::CircuitOpen),
        HarvestError::Cancelled => Classification::of(ErrorCode::Cancelled),
        HarvestError::Decode { .. } | HarvestError::Database(_) | HarvestError::Storage(_) => {
            Classification::of(ErrorCode::Permanent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> HarvestError {
        HarvestError::Status {
            url: "https://example.com".to_string(),
            status,
        }
    }

    #[test]
    fn test_timeout_is_retryable_network() {
        let c = classify(&HarvestError::Timeout {
            url: "https://example.com".to_string(),
        });
        assert_eq!(c.code, ErrorCode::Network);
        assert!(c.retryable);
    }

    #[test]
    fn test_rate_limit_carries_hint() {
        let c = classify(&HarvestError::RateLimited {
            url: "https://example.com".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        });
        assert_eq!(c.code, ErrorCode::RateLimit);
        assert!(c.retryable);
        assert_eq!(c.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_server_errors_retryable() {
        for code in [408, 500, 502, 503, 504] {
            let c = classify(&status(code));
            assert_eq!(c.code, ErrorCode::Network, "status {}", code);
            assert!(c.retryable);
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert_eq!(classify(&status(400)).code, ErrorCode::Permanent);
        assert!(!classify(&status(400)).retryable);
        assert_eq!(classify(&status(409)).code, ErrorCode::Permanent);
        assert_eq!(classify(&status(401)).code, ErrorCode::Auth);
        assert_eq!(classify(&status(403)).code, ErrorCode::Auth);
        assert_eq!(classify(&status(404)).code, ErrorCode::NotFound);
        assert!(!classify(&status(404)).retryable);
    }

    #[test]
    fn test_validation_and_decode() {
        let v = classify(&HarvestError::Validation("abc".to_string()));
        assert_eq!(v.code, ErrorCode::Validation);
        assert!(!v.retryable);

        let d = classify(&HarvestError::Decode {
            url: "https://example.com".to_string(),
            message: "expected value".to_string(),
        });
        assert_eq!(d.code, ErrorCode::Permanent);
        assert!(!d.retryable);
    }

    #[test]
    fn test_circuit_accounting() {
        assert!(ErrorCode::Network.counts_against_circuit());
        assert!(ErrorCode::Permanent.counts_against_circuit());
        assert!(!ErrorCode::NotFound.counts_against_circuit());
        assert!(!ErrorCode::Validation.counts_against_circuit());
        assert!(!ErrorCode::Auth.counts_against_circuit());
    }

    #[test]
    fn test_code_db_string_roundtrip() {
        for code in [
            ErrorCode::Network,
            ErrorCode::RateLimit,
            ErrorCode::Auth,
            ErrorCode::Validation,
            ErrorCode::NotFound,
            ErrorCode::Permanent,
            ErrorCode::CircuitOpen,
            ErrorCode::Cancelled,
        ] {
            assert_eq!(ErrorCode::from_db_string(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::from_db_string("nope"), None);
    }
}
