//! Ordered fallback evaluation.

use std::future::Future;

use log::debug;
use macrodash_market_data::MarketDataError;

/// Every candidate that was tried, with the error it produced.
pub type Attempts<C> = Vec<(C, MarketDataError)>;

/// Tries `candidates` in order and returns the first success.
///
/// Stops early on errors whose kind does not allow fallback (missing
/// credentials, cancellation). On total failure returns every attempt.
pub async fn first_success<C, T, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: F,
) -> Result<(C, T), Attempts<C>>
where
    C: Clone + std::fmt::Debug,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => return Ok((candidate, value)),
            Err(err) => {
                debug!("Candidate {:?} failed: {}", candidate, err);
                let stop = !err.kind().allows_fallback();
                failures.push((candidate, err));
                if stop {
                    break;
                }
            }
        }
    }
    Err(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(symbol: &str) -> MarketDataError {
        MarketDataError::SymbolNotFound(symbol.to_string())
    }

    #[tokio::test]
    async fn test_returns_first_success_in_order() {
        let result = first_success(vec!["DXY", "UUP", "USDX"], |sym| async move {
            if sym == "DXY" {
                Err(not_found(sym))
            } else {
                Ok(sym.len())
            }
        })
        .await;
        assert_eq!(result.unwrap(), ("UUP", 3));
    }

    #[tokio::test]
    async fn test_collects_every_failure() {
        let result: Result<(&str, ()), _> =
            first_success(vec!["A", "B"], |sym| async move { Err(not_found(sym)) }).await;
        let failures = result.unwrap_err();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[1].0, "B");
    }

    #[tokio::test]
    async fn test_stops_on_cancellation() {
        let mut calls = 0;
        let result: Result<(&str, ()), _> = first_success(vec!["A", "B"], |_| {
            calls += 1;
            async { Err(MarketDataError::Cancelled) }
        })
        .await;
        assert_eq!(result.unwrap_err().len(), 1);
        assert_eq!(calls, 1);
    }
}
