//! HTTP status classification shared by the provider adapters.

use crate::errors::MarketDataError;

/// Maps a non-success HTTP status (or a provider's in-body error code) to an error.
///
/// Throttling and plan restrictions stay distinguishable from bad symbols and
/// malformed parameters.
pub(crate) fn error_for_status(provider: &str, status: u16, message: String) -> MarketDataError {
    match status {
        429 => MarketDataError::RateLimited {
            provider: provider.to_string(),
        },
        401 | 403 => MarketDataError::AccessRestricted {
            provider: provider.to_string(),
            message,
        },
        400 | 422 => MarketDataError::InvalidParameters {
            provider: provider.to_string(),
            message,
        },
        404 => MarketDataError::SymbolNotFound(message),
        _ => MarketDataError::provider(provider, format!("HTTP {} - {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_status_mapping() {
        let kind = |status| error_for_status("FINNHUB", status, "msg".to_string()).kind();
        assert_eq!(kind(429), ErrorKind::Transient);
        assert_eq!(kind(401), ErrorKind::AccessRestricted);
        assert_eq!(kind(403), ErrorKind::AccessRestricted);
        assert_eq!(kind(400), ErrorKind::InvalidData);
        assert_eq!(kind(422), ErrorKind::InvalidData);
        assert_eq!(kind(404), ErrorKind::InvalidData);
        assert_eq!(kind(502), ErrorKind::Transient);
    }

    #[test]
    fn test_forbidden_keeps_message() {
        let err = error_for_status(
            "FINNHUB",
            403,
            "You don't have access to this resource.".to_string(),
        );
        assert!(err.is_access_restricted());
        assert!(err.to_string().contains("don't have access"));
    }
}
