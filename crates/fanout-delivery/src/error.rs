//! Error types for webhook delivery operations.
//!
//! Transport-level failures (no HTTP response at all) are retryable; they
//! surface back to the queue as retries. Non-2xx responses are not errors
//! here, they are classified by the worker from the response itself.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while dispatching a webhook.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection-level failure: DNS, TCP, or TLS.
    #[error("network connection failed: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The total-request timeout elapsed.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// The timeout that was exceeded, in seconds.
        timeout_seconds: u64,
    },

    /// The HTTP client could not be built or the URL is unusable.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// Configuration error description.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true when another attempt could succeed.
    ///
    /// Transport failures are transient by assumption; configuration
    /// failures are deterministic and retrying them is wasted work.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(DeliveryError::network("connection refused").is_retryable());
        assert!(DeliveryError::timeout(30).is_retryable());
        assert!(!DeliveryError::configuration("bad url").is_retryable());
    }

    #[test]
    fn error_display_format() {
        assert_eq!(
            DeliveryError::timeout(30).to_string(),
            "request timeout after 30s"
        );
        assert_eq!(
            DeliveryError::network("dns failure").to_string(),
            "network connection failed: dns failure"
        );
    }
}
