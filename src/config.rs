//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub trade_api: TradeApiConfig,
    #[serde(default)]
    pub feeds: FeedConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub events: EventConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeApiConfig {
    #[serde(default = "default_trade_api_url")]
    pub url: String,
    /// Fallback Lightning API key for wallets connected without one
    #[serde(default)]
    pub default_api_key: Option<String>,
}

impl Default for TradeApiConfig {
    fn default() -> Self {
        Self {
            url: default_trade_api_url(),
            default_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_dexscreener_endpoint")]
    pub dexscreener_endpoint: String,
    #[serde(default = "default_pumpapi_endpoint")]
    pub pumpapi_endpoint: String,
    #[serde(default = "default_pumpfun_endpoint")]
    pub pumpfun_endpoint: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            dexscreener_endpoint: default_dexscreener_endpoint(),
            pumpapi_endpoint: default_pumpapi_endpoint(),
            pumpfun_endpoint: default_pumpfun_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_trade_api_url() -> String {
    crate::trading::PUMPPORTAL_API_URL.to_string()
}

fn default_dexscreener_endpoint() -> String {
    "https://api.dexscreener.com".into()
}

fn default_pumpapi_endpoint() -> String {
    "https://pumpapi.fun".into()
}

fn default_pumpfun_endpoint() -> String {
    "https://frontend-api.pump.fun".into()
}

fn default_state_path() -> String {
    "state.json".into()
}

fn default_event_capacity() -> usize {
    1024
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SOULSPARK_)
            .add_source(
                config::Environment::with_prefix("SOULSPARK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }
        if self.rpc.endpoint.is_empty() {
            anyhow::bail!("rpc.endpoint must not be empty");
        }
        if self.trade_api.url.is_empty() {
            anyhow::bail!("trade_api.url must not be empty");
        }
        if self.state.path.is_empty() {
            anyhow::bail!("state.path must not be empty");
        }
        if self.events.capacity == 0 {
            anyhow::bail!("events.capacity must be positive");
        }
        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Trade API:
    url: {}
    default_api_key: {}
  Feeds:
    dexscreener: {}
    pumpapi: {}
    pumpfun: {}
  State:
    path: {}
  Events:
    capacity: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.trade_api.url,
            match &self.trade_api.default_api_key {
                Some(_) => "***",
                None => "(not set)",
            },
            self.feeds.dexscreener_endpoint,
            self.feeds.pumpapi_endpoint,
            self.feeds.pumpfun_endpoint,
            self.state.path,
            self.events.capacity,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            trade_api: TradeApiConfig::default(),
            feeds: FeedConfig::default(),
            state: StateConfig::default(),
            events: EventConfig::default(),
        }
    }
}

/// Mask any query string, which is where RPC providers put API keys
fn mask_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?***", base),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.state.path, "state.json");
        assert_eq!(config.events.capacity, 1024);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("definitely-does-not-exist.toml").unwrap();
        assert!(config.rpc.endpoint.contains("://"));
    }

    #[test]
    fn test_empty_state_path_rejected() {
        let mut config = Config::default();
        config.state.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url_hides_query() {
        assert_eq!(
            mask_url("https://rpc.example.com/?api-key=secret"),
            "https://rpc.example.com/?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }

    #[test]
    fn test_masked_display_hides_api_key() {
        let mut config = Config::default();
        config.trade_api.default_api_key = Some("secret".to_string());
        let display = config.masked_display();
        assert!(!display.contains("secret"));
        assert!(display.contains("***"));
    }
}
