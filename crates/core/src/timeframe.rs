use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Tile/chart range selected in the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Self::OneDay, Self::OneWeek, Self::OneMonth];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(Self::OneDay),
            "1W" => Ok(Self::OneWeek),
            "1M" => Ok(Self::OneMonth),
            other => Err(Error::InvalidConfigValue(format!(
                "unknown timeframe '{}'",
                other
            ))),
        }
    }
}
