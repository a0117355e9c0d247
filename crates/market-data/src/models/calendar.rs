use serde::{Deserialize, Serialize};

/// One economic calendar release as reported by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicEvent {
    #[serde(default)]
    pub country: String,

    #[serde(default)]
    pub event: String,

    /// "low" | "medium" | "high" when the provider rates the release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,

    /// Release time as sent by the provider ("2024-01-05 08:30:00")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}
