//! Error taxonomy for venue operations.
//!
//! Adapters surface structured errors with enough context (venue, symbol,
//! status code, server message) for the executor to classify. Transient
//! transport failures are the only retryable class.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur when talking to a venue.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Transport-level failure (connect, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Venue returned 429.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Venue returned a non-success HTTP status.
    #[error("venue API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body or server message.
        message: String,
    },

    /// Authentication failed (401, bad signature, expired token).
    #[error("authentication error: {0}")]
    Auth(String),

    /// Request signing failed locally.
    #[error("signing error: {0}")]
    Signing(String),

    /// The venue does not list the requested market.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Malformed request input.
    #[error("invalid input for {field}: {message}")]
    InvalidInput {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Not enough balance to place the order.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Quantity required.
        required: Decimal,
        /// Quantity available.
        available: Decimal,
    },

    /// Business rejection from the venue's matching engine.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// The venue does not know the order id.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The id that was not found.
        order_id: String,
    },

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VenueError {
    /// Creates an API error from a status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Creates an order-not-found error.
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound {
            order_id: order_id.into(),
        }
    }

    /// Returns true for failures worth retrying with backoff: network,
    /// timeout, 429, and 5xx. Auth errors, malformed input, and business
    /// rejections are not retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Returns true if the failure should feed the venue connectivity
    /// breaker (network and authentication failures).
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Auth(_))
    }

    /// Suggested retry delay in seconds, when one applies.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::Network(_) | Self::Timeout(_) => Some(1),
            Self::Api { status_code, .. } if *status_code >= 500 => Some(2),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for venue operations.
pub type VenueResult<T> = Result<T, VenueError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transient_classification() {
        assert!(VenueError::Network("reset".into()).is_transient());
        assert!(VenueError::Timeout("deadline".into()).is_transient());
        assert!(VenueError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(VenueError::api(502, "bad gateway").is_transient());

        assert!(!VenueError::api(400, "bad request").is_transient());
        assert!(!VenueError::Auth("bad signature".into()).is_transient());
        assert!(!VenueError::OrderRejected("crossed".into()).is_transient());
        assert!(!VenueError::invalid_input("quantity", "zero").is_transient());
        assert!(!VenueError::InsufficientBalance {
            required: dec!(10),
            available: dec!(1),
        }
        .is_transient());
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(VenueError::Network("down".into()).is_connectivity());
        assert!(VenueError::Auth("expired".into()).is_connectivity());
        assert!(!VenueError::OrderRejected("crossed".into()).is_connectivity());
        assert!(!VenueError::api(500, "boom").is_connectivity());
    }

    #[test]
    fn test_retry_delays() {
        assert_eq!(
            VenueError::RateLimited { retry_after_secs: 30 }.retry_delay_secs(),
            Some(30)
        );
        assert_eq!(VenueError::Network("x".into()).retry_delay_secs(), Some(1));
        assert_eq!(VenueError::api(503, "x").retry_delay_secs(), Some(2));
        assert_eq!(VenueError::api(404, "x").retry_delay_secs(), None);
        assert_eq!(VenueError::Auth("x".into()).retry_delay_secs(), None);
    }

    #[test]
    fn test_display_carries_context() {
        let err = VenueError::api(503, "maintenance window");
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("maintenance window"));

        let err = VenueError::order_not_found("abc-123");
        assert!(err.to_string().contains("abc-123"));
    }
}
