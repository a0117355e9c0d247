use std::collections::BTreeSet;
use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use chrono_tz::Tz;
use macrodash_core::constants::{AUTO_REFRESH_SECS, CALENDAR_SCOPE, DISCOVERY_SCOPE};
use macrodash_core::DashboardConfig;
use macrodash_market_data::ApiKeyring;

const FINNHUB_KEY_VAR: &str = "MD_FINNHUB_KEY";
const TWELVEDATA_KEY_VAR: &str = "MD_TWELVEDATA_KEY";

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub auto_refresh_interval: Duration,
    pub stale_after_activation: Option<Duration>,
    pub market_tz: Option<Tz>,
    pub finnhub_keys: ApiKeyring,
    pub twelvedata_keys: ApiKeyring,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Builds the config from `(name, value)` pairs.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let var = |name: &str| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr: SocketAddr = var("MD_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid MD_LISTEN_ADDR")?;
        let db_path = var("MD_DB_PATH").unwrap_or_else(|| "./db/macrodash.db".into());
        let cors_allow = var("MD_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = var("MD_REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30000);
        let refresh_secs: u64 = var("MD_AUTO_REFRESH_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(AUTO_REFRESH_SECS);
        let stale_after_activation = var("MD_STALE_AFTER_ACTIVATION_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        let market_tz = match var("MD_MARKET_TZ") {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("Invalid MD_MARKET_TZ: {}", e))?,
            ),
            None => None,
        };

        Ok(Self {
            listen_addr,
            db_path,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            auto_refresh_interval: Duration::from_secs(refresh_secs),
            stale_after_activation,
            market_tz,
            finnhub_keys: keyring_from_vars(&vars, FINNHUB_KEY_VAR),
            twelvedata_keys: keyring_from_vars(&vars, TWELVEDATA_KEY_VAR),
        })
    }

    /// Dashboard configuration with the host overrides applied.
    pub fn dashboard(&self) -> DashboardConfig {
        let mut config = DashboardConfig::default();
        if let Some(tz) = self.market_tz {
            config.market_tz = tz;
        }
        config.orchestrator.auto_refresh_interval = self.auto_refresh_interval;
        config.orchestrator.stale_after_activation = self.stale_after_activation;
        config
    }
}

/// Collects `{base}_{SCOPE}` variables into a keyring.
///
/// A bare `{base}` variable is a default token for every scope the stock
/// dashboard uses that has no dedicated key.
fn keyring_from_vars(vars: &[(String, String)], base: &str) -> ApiKeyring {
    let prefix = format!("{}_", base);
    let mut keyring = ApiKeyring::new();
    let mut default_token = None;

    for (name, value) in vars {
        if name == base {
            default_token = Some(value.as_str());
        } else if let Some(scope) = name.strip_prefix(&prefix) {
            keyring.insert(&scope.to_lowercase(), value);
        }
    }

    if let Some(token) = default_token {
        let mut scopes: BTreeSet<String> = DashboardConfig::default()
            .tabs
            .iter()
            .map(|t| t.id.clone())
            .collect();
        scopes.insert(DISCOVERY_SCOPE.to_string());
        scopes.insert(CALENDAR_SCOPE.to_string());
        for scope in scopes {
            if keyring.get(&scope).is_none() {
                keyring.insert(&scope, token);
            }
        }
    }
    keyring
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.db_path, "./db/macrodash.db");
        assert_eq!(config.auto_refresh_interval, Duration::from_secs(300));
        assert!(config.stale_after_activation.is_none());
        assert!(config.finnhub_keys.is_empty());
        assert_eq!(config.cors_allow, vec!["*"]);
    }

    #[test]
    fn test_scoped_keys() {
        let config = Config::from_vars(vars(&[
            ("MD_FINNHUB_KEY_GLOBAL", "g-token"),
            ("MD_FINNHUB_KEY_RATES", " r-token "),
            ("MD_TWELVEDATA_KEY_METALS", "m-token"),
            ("MD_FINNHUB_KEY_COMMO", "   "),
        ]))
        .unwrap();
        assert_eq!(config.finnhub_keys.get("global").as_deref(), Some("g-token"));
        assert_eq!(config.finnhub_keys.get("rates").as_deref(), Some("r-token"));
        assert!(config.finnhub_keys.get("commo").is_none());
        assert_eq!(config.twelvedata_keys.get("metals").as_deref(), Some("m-token"));
        assert!(config.twelvedata_keys.get("global").is_none());
    }

    #[test]
    fn test_default_key_fills_missing_scopes() {
        let config = Config::from_vars(vars(&[
            ("MD_FINNHUB_KEY", "shared"),
            ("MD_FINNHUB_KEY_GLOBAL", "own"),
        ]))
        .unwrap();
        let keys = &config.finnhub_keys;
        assert_eq!(keys.get("global").as_deref(), Some("own"));
        assert_eq!(keys.get("metals").as_deref(), Some("shared"));
        assert_eq!(keys.get("calendar").as_deref(), Some("shared"));
        assert_eq!(keys.get("rates").as_deref(), Some("shared"));
    }

    #[test]
    fn test_overrides_reach_dashboard_config() {
        let config = Config::from_vars(vars(&[
            ("MD_AUTO_REFRESH_SECS", "60"),
            ("MD_STALE_AFTER_ACTIVATION_SECS", "30"),
            ("MD_MARKET_TZ", "Europe/London"),
        ]))
        .unwrap();
        let dashboard = config.dashboard();
        assert_eq!(
            dashboard.orchestrator.auto_refresh_interval,
            Duration::from_secs(60)
        );
        assert_eq!(
            dashboard.orchestrator.stale_after_activation,
            Some(Duration::from_secs(30))
        );
        assert_eq!(dashboard.market_tz, chrono_tz::Europe::London);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_vars(vars(&[("MD_LISTEN_ADDR", "nope")])).is_err());
        assert!(Config::from_vars(vars(&[("MD_MARKET_TZ", "Mars/Base")])).is_err());
        let config = Config::from_vars(vars(&[("MD_AUTO_REFRESH_SECS", "0")])).unwrap();
        assert_eq!(config.auto_refresh_interval, Duration::from_secs(300));
    }
}
