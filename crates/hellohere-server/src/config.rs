use std::time::Duration;

use anyhow::{Context, Result};

use hellohere_gateway::{GatewayConfig, LeavePolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    /// `:memory:` runs on the in-process store instead of SQLite.
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let defaults = GatewayConfig::default();

        let port: u16 = var("HELLOHERE_PORT", "3000")
            .parse()
            .context("HELLOHERE_PORT")?;
        let ping_secs: u64 = var(
            "HELLOHERE_LOCATION_PING_SECS",
            &defaults.location_ping_interval.as_secs().to_string(),
        )
        .parse()
        .context("HELLOHERE_LOCATION_PING_SECS")?;
        let timeout_secs: u64 = var(
            "HELLOHERE_HANDLER_TIMEOUT_SECS",
            &defaults.handler_timeout.as_secs().to_string(),
        )
        .parse()
        .context("HELLOHERE_HANDLER_TIMEOUT_SECS")?;
        let history_max_limit: u32 = var(
            "HELLOHERE_HISTORY_MAX_LIMIT",
            &defaults.history_max_limit.to_string(),
        )
        .parse()
        .context("HELLOHERE_HISTORY_MAX_LIMIT")?;
        let leave_policy: LeavePolicy = var("HELLOHERE_LEAVE_POLICY", "delete")
            .parse()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            jwt_secret: var("HELLOHERE_JWT_SECRET", "dev-secret-change-me"),
            db_path: var("HELLOHERE_DB_PATH", "hellohere.db"),
            host: var("HELLOHERE_HOST", "0.0.0.0"),
            port,
            gateway: GatewayConfig {
                handler_timeout: Duration::from_secs(timeout_secs),
                leave_policy,
                history_default_limit: defaults.history_default_limit.min(history_max_limit),
                history_max_limit,
                location_ping_interval: Duration::from_secs(ping_secs.max(1)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, "hellohere.db");
        assert_eq!(config.gateway.leave_policy, LeavePolicy::Delete);
        assert_eq!(config.gateway.location_ping_interval, Duration::from_secs(30));
        assert_eq!(config.gateway.history_max_limit, 200);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = Config::from_lookup(lookup(&[
            ("HELLOHERE_PORT", "8080"),
            ("HELLOHERE_LEAVE_POLICY", "retain"),
            ("HELLOHERE_HISTORY_MAX_LIMIT", "20"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway.leave_policy, LeavePolicy::Retain);
        assert_eq!(config.gateway.history_default_limit, 20);

        assert!(Config::from_lookup(lookup(&[("HELLOHERE_PORT", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("HELLOHERE_LEAVE_POLICY", "vanish")])).is_err());
    }
}
