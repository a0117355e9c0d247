use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How an instrument is looked up upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Exchange-traded stock or ETF, used as-is.
    #[default]
    Equity,
    /// Metal/currency pair whose provider identifier must be discovered.
    SyntheticFx,
}

impl InstrumentKind {
    /// Short tag used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "stock",
            Self::SyntheticFx => "forex",
        }
    }
}

/// A tradable instrument as declared in a tab's static configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentSpec {
    pub kind: InstrumentKind,

    /// Canonical ticker (e.g. "SPY", "XAUUSD")
    pub symbol: Arc<str>,

    /// Used when the primary symbol cannot be fetched (e.g. "DXY" -> "UUP")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_symbol: Option<Arc<str>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Overrides the default local icon path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl InstrumentSpec {
    fn new(kind: InstrumentKind, symbol: &str) -> Self {
        Self {
            kind,
            symbol: Arc::from(symbol.trim().to_uppercase()),
            fallback_symbol: None,
            display_name: None,
            logo_url: None,
        }
    }

    /// Stock or ETF spec.
    pub fn equity(symbol: &str) -> Self {
        Self::new(InstrumentKind::Equity, symbol)
    }

    /// Synthetic FX/metal pair spec.
    pub fn synthetic_fx(symbol: &str) -> Self {
        Self::new(InstrumentKind::SyntheticFx, symbol)
    }

    pub fn with_fallback(mut self, symbol: &str) -> Self {
        self.fallback_symbol = Some(Arc::from(symbol.trim().to_uppercase()));
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_logo_url(mut self, url: impl Into<String>) -> Self {
        self.logo_url = Some(url.into());
        self
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == InstrumentKind::SyntheticFx
    }

    /// Stable per-tab key, e.g. `stock:SPY`.
    pub fn symbol_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.symbol)
    }

    /// Symbol with punctuation stripped, e.g. `XAU/USD` -> `XAUUSD`.
    pub fn compact_code(&self) -> String {
        compact(&self.symbol)
    }

    /// Primary symbol followed by the fallback, if any.
    pub fn candidates(&self) -> Vec<Arc<str>> {
        let mut out = vec![self.symbol.clone()];
        if let Some(fallback) = &self.fallback_symbol {
            if fallback != &self.symbol {
                out.push(fallback.clone());
            }
        }
        out
    }

    /// Label for display: the configured name or the ticker.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.symbol)
    }

    /// Configured logo or the local icon path for the ticker.
    pub fn logo_ref(&self) -> Option<String> {
        if let Some(url) = &self.logo_url {
            return Some(url.clone());
        }
        if self.symbol.is_empty() {
            None
        } else {
            Some(format!("/icons/symbols/{}.png", self.symbol))
        }
    }
}

/// Upper-cases and strips every non-alphanumeric character.
pub(crate) fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
