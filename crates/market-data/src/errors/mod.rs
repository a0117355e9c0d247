//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all provider operations
//! - [`ErrorKind`]: Classification used by the caching layer to decide between
//!   fallback, soft failure, and failing fast

mod kind;

pub use kind::ErrorKind;

use thiserror::Error;

/// Errors that can occur while talking to an upstream data provider.
///
/// Each variant is classified into an [`ErrorKind`] via [`kind`](Self::kind).
/// Callers branch on the kind rather than on individual variants.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider does not know the requested symbol.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider answered, but with a placeholder or unusable payload
    /// (for example a zero price for an unknown ticker).
    #[error("Invalid data from {provider}: {message}")]
    InvalidData {
        /// The provider that returned the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// The request parameters were rejected (HTTP 400/422 or provider error code).
    #[error("Invalid parameters for {provider}: {message}")]
    InvalidParameters {
        /// The provider that rejected the request
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The symbol exists but there is no data for the requested window.
    #[error("No data for range")]
    NoDataForRange,

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The credential is valid but the plan does not cover this endpoint
    /// (HTTP 401/403, "premium" responses).
    #[error("Access restricted by {provider}: {message}")]
    AccessRestricted {
        /// The provider that refused access
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred (5xx, unexpected status, unparsable body).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// No credential is configured for the key scope (usually a tab id).
    #[error("Missing {provider} API key for scope \"{scope}\"")]
    MissingApiKey {
        /// The provider that needs the key
        provider: String,
        /// The key scope that was looked up
        scope: String,
    },

    /// The provider does not implement the requested operation.
    #[error("{operation} is not supported by {provider}")]
    NotSupported {
        /// The operation that was requested
        operation: String,
        /// The provider that was asked
        provider: String,
    },

    /// The request was cancelled through its cancellation token.
    #[error("Request cancelled")]
    Cancelled,

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the failure classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use macrodash_market_data::errors::{ErrorKind, MarketDataError};
    ///
    /// let error = MarketDataError::RateLimited { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.kind(), ErrorKind::Transient);
    ///
    /// let error = MarketDataError::SymbolNotFound("BADSYM".to_string());
    /// assert_eq!(error.kind(), ErrorKind::InvalidData);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::ProviderError { .. }
            | Self::Network(_) => ErrorKind::Transient,

            Self::SymbolNotFound(_)
            | Self::InvalidData { .. }
            | Self::InvalidParameters { .. }
            | Self::NoDataForRange => ErrorKind::InvalidData,

            Self::AccessRestricted { .. } => ErrorKind::AccessRestricted,
            Self::MissingApiKey { .. } => ErrorKind::Configuration,
            Self::NotSupported { .. } => ErrorKind::Unsupported,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for "rate limited / forbidden" conditions, as opposed to
    /// "not found / malformed parameters".
    pub fn is_access_restricted(&self) -> bool {
        matches!(self, Self::AccessRestricted { .. })
    }

    /// True when the provider throttled the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub(crate) fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_transient() {
        let error = MarketDataError::RateLimited {
            provider: "FINNHUB".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_rate_limited());
        assert!(!error.is_access_restricted());
    }

    #[test]
    fn test_forbidden_is_distinct_from_not_found() {
        let forbidden = MarketDataError::AccessRestricted {
            provider: "FINNHUB".to_string(),
            message: "You don't have access to this resource.".to_string(),
        };
        let missing = MarketDataError::SymbolNotFound("BADSYM".to_string());

        assert_eq!(forbidden.kind(), ErrorKind::AccessRestricted);
        assert!(forbidden.is_access_restricted());
        assert_eq!(missing.kind(), ErrorKind::InvalidData);
        assert!(!missing.is_access_restricted());
    }

    #[test]
    fn test_invalid_parameters_is_invalid_data() {
        let error = MarketDataError::InvalidParameters {
            provider: "TWELVE_DATA".to_string(),
            message: "**symbol** not found".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_missing_key_is_configuration() {
        let error = MarketDataError::MissingApiKey {
            provider: "FINNHUB".to_string(),
            scope: "global".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.kind().is_fatal());
    }

    #[test]
    fn test_cancelled_kind() {
        assert_eq!(MarketDataError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::SymbolNotFound("BADSYM".to_string());
        assert_eq!(format!("{}", error), "Symbol not found: BADSYM");

        let error = MarketDataError::MissingApiKey {
            provider: "FINNHUB".to_string(),
            scope: "rates".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Missing FINNHUB API key for scope \"rates\""
        );

        let error = MarketDataError::ProviderError {
            provider: "TWELVE_DATA".to_string(),
            message: "HTTP 500".to_string(),
        };
        assert_eq!(format!("{}", error), "Provider error: TWELVE_DATA - HTTP 500");
    }
}
