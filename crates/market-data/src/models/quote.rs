use serde::{Deserialize, Serialize};

/// Normalized last-quote payload.
///
/// Kept verbatim in the quote cache so the 1-day change can be derived later
/// from `percent_change` or `previous_close`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuote {
    /// Current price
    pub price: f64,

    /// Absolute change since previous close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,

    /// Percent change since previous close, as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,

    /// Provider timestamp (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Provider that produced the quote (FINNHUB, ...)
    pub source: String,
}

impl ProviderQuote {
    /// Create a quote with only a price.
    pub fn new(price: f64, source: impl Into<String>) -> Self {
        Self {
            price,
            change: None,
            percent_change: None,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            timestamp: None,
            source: source.into(),
        }
    }

    pub fn with_previous_close(mut self, previous_close: f64) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    pub fn with_percent_change(mut self, percent_change: f64) -> Self {
        self.percent_change = Some(percent_change);
        self
    }

    /// Providers answer unknown symbols with a zero placeholder; only a finite,
    /// non-zero price counts as a real quote.
    pub fn has_usable_price(&self) -> bool {
        self.price.is_finite() && self.price != 0.0
    }
}
