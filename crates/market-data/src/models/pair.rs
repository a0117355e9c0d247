use serde::{Deserialize, Serialize};

use super::instrument::compact;

/// One row of a provider's synthetic pair listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticPair {
    /// Human-facing code, e.g. "XAU/USD"
    pub display_code: String,

    /// Provider-native identifier, e.g. "OANDA:XAU_USD"
    pub native_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SyntheticPair {
    pub fn new(display_code: impl Into<String>, native_id: impl Into<String>) -> Self {
        Self {
            display_code: display_code.into(),
            native_id: native_id.into(),
            description: None,
        }
    }

    /// Lookup key with punctuation stripped, e.g. "XAUUSD".
    pub fn compact_code(&self) -> String {
        compact(&self.display_code)
    }
}
