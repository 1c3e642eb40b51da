//! Runtime strategy and safety settings
//!
//! These are the mutable knobs exposed to the external dashboard layer.
//! Updates arrive as partial patches, are merged shallowly, validated, and
//! persisted as part of the engine state snapshot. Validation happens here
//! rather than trusting callers: out-of-range values are rejected with a
//! typed error, never clamped.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Buy-sizing and exit-strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Use random buy sizing in [buy_min, buy_max] instead of fixed_buy
    #[serde(default = "default_true")]
    pub random_buy: bool,
    #[serde(default = "default_buy_min")]
    pub buy_min: f64,
    #[serde(default = "default_buy_max")]
    pub buy_max: f64,
    #[serde(default = "default_fixed_buy")]
    pub fixed_buy: f64,
    /// First take-profit threshold (percent gain, sells half)
    #[serde(default = "default_profit1")]
    pub profit1: f64,
    /// Second take-profit threshold (percent gain, sells remainder)
    #[serde(default = "default_profit2")]
    pub profit2: f64,
    /// Stop-loss threshold (percent decline, sells everything)
    #[serde(default = "default_stop")]
    pub stop: f64,
    /// Minimum pair liquidity in USD for the pre-buy rug check
    #[serde(default = "default_liquidity")]
    pub liquidity: f64,
    /// Position monitor price poll interval
    #[serde(default = "default_interval_ms")]
    pub price_interval_ms: u64,
    /// Discovery loop sleep between iterations
    #[serde(default = "default_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Hard deadline for an open position
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

fn default_buy_min() -> f64 {
    0.1
}
fn default_buy_max() -> f64 {
    0.2
}
fn default_fixed_buy() -> f64 {
    0.1
}
fn default_profit1() -> f64 {
    25.0
}
fn default_profit2() -> f64 {
    50.0
}
fn default_stop() -> f64 {
    10.0
}
fn default_liquidity() -> f64 {
    1000.0
}
fn default_interval_ms() -> u64 {
    5000
}
fn default_timeout_minutes() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            random_buy: true,
            buy_min: default_buy_min(),
            buy_max: default_buy_max(),
            fixed_buy: default_fixed_buy(),
            profit1: default_profit1(),
            profit2: default_profit2(),
            stop: default_stop(),
            liquidity: default_liquidity(),
            price_interval_ms: default_interval_ms(),
            monitor_interval_ms: default_interval_ms(),
            timeout_minutes: default_timeout_minutes(),
        }
    }
}

/// Partial patch for [`StrategySettings`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyUpdate {
    pub random_buy: Option<bool>,
    pub buy_min: Option<f64>,
    pub buy_max: Option<f64>,
    pub fixed_buy: Option<f64>,
    pub profit1: Option<f64>,
    pub profit2: Option<f64>,
    pub stop: Option<f64>,
    pub liquidity: Option<f64>,
    pub price_interval_ms: Option<u64>,
    pub monitor_interval_ms: Option<u64>,
    pub timeout_minutes: Option<u64>,
}

impl StrategySettings {
    /// Apply a partial update, returning the validated merged settings
    pub fn merged(&self, update: &StrategyUpdate) -> Result<Self> {
        let next = Self {
            random_buy: update.random_buy.unwrap_or(self.random_buy),
            buy_min: update.buy_min.unwrap_or(self.buy_min),
            buy_max: update.buy_max.unwrap_or(self.buy_max),
            fixed_buy: update.fixed_buy.unwrap_or(self.fixed_buy),
            profit1: update.profit1.unwrap_or(self.profit1),
            profit2: update.profit2.unwrap_or(self.profit2),
            stop: update.stop.unwrap_or(self.stop),
            liquidity: update.liquidity.unwrap_or(self.liquidity),
            price_interval_ms: update.price_interval_ms.unwrap_or(self.price_interval_ms),
            monitor_interval_ms: update
                .monitor_interval_ms
                .unwrap_or(self.monitor_interval_ms),
            timeout_minutes: update.timeout_minutes.unwrap_or(self.timeout_minutes),
        };
        next.validate()?;
        Ok(next)
    }

    /// Validate numeric ranges
    pub fn validate(&self) -> Result<()> {
        if self.fixed_buy <= 0.0 {
            return Err(Error::validation("fixed_buy", "must be positive"));
        }
        if self.buy_min <= 0.0 {
            return Err(Error::validation("buy_min", "must be positive"));
        }
        if self.buy_max < self.buy_min {
            return Err(Error::validation("buy_max", "must be >= buy_min"));
        }
        let percentages: [(&'static str, f64); 3] = [
            ("profit1", self.profit1),
            ("profit2", self.profit2),
            ("stop", self.stop),
        ];
        for (field, pct) in percentages {
            if !(0.0..=100.0).contains(&pct) {
                return Err(Error::validation(
                    field,
                    format!("percentage {} out of range [0, 100]", pct),
                ));
            }
        }
        if self.liquidity < 0.0 {
            return Err(Error::validation("liquidity", "must not be negative"));
        }
        if self.price_interval_ms == 0 {
            return Err(Error::validation("price_interval_ms", "must be positive"));
        }
        if self.monitor_interval_ms == 0 {
            return Err(Error::validation("monitor_interval_ms", "must be positive"));
        }
        if self.timeout_minutes == 0 {
            return Err(Error::validation("timeout_minutes", "must be positive"));
        }
        Ok(())
    }
}

/// Scope of the same-block buy-rate counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCounterScope {
    /// One shared counter across all mints (a true global rate limit)
    Global,
    /// Independent counter per mint
    PerMint,
}

impl Default for BlockCounterScope {
    fn default() -> Self {
        Self::Global
    }
}

/// Pre-buy safety gate parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySettings {
    /// Maximum combined share of the top 10 holders (percent)
    #[serde(default = "default_top10_max")]
    pub top10_holders_max_pct: f64,
    /// Maximum combined share of suspected bundled wallets (percent)
    #[serde(default = "default_bundled_max")]
    pub bundled_max_pct: f64,
    /// Maximum buys allowed inside one block-time window
    #[serde(default = "default_max_same_block_buys")]
    pub max_same_block_buys: u32,
    /// Cooldown between full safety evaluations of the same mint
    #[serde(default = "default_check_period")]
    pub safety_check_period_secs: u64,
    #[serde(default = "default_true")]
    pub require_socials: bool,
    #[serde(default = "default_true")]
    pub require_liquidity_burnt: bool,
    #[serde(default = "default_true")]
    pub require_immutable_metadata: bool,
    #[serde(default = "default_true")]
    pub require_mint_authority_renounced: bool,
    #[serde(default = "default_true")]
    pub require_freeze_authority_renounced: bool,
    #[serde(default = "default_true")]
    pub only_pumpfun_migrated: bool,
    /// Minimum pool size in USD
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: f64,
    #[serde(default)]
    pub block_counter_scope: BlockCounterScope,
}

fn default_top10_max() -> f64 {
    50.0
}
fn default_bundled_max() -> f64 {
    20.0
}
fn default_max_same_block_buys() -> u32 {
    3
}
fn default_check_period() -> u64 {
    30
}
fn default_min_pool_size() -> f64 {
    5000.0
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            top10_holders_max_pct: default_top10_max(),
            bundled_max_pct: default_bundled_max(),
            max_same_block_buys: default_max_same_block_buys(),
            safety_check_period_secs: default_check_period(),
            require_socials: true,
            require_liquidity_burnt: true,
            require_immutable_metadata: true,
            require_mint_authority_renounced: true,
            require_freeze_authority_renounced: true,
            only_pumpfun_migrated: true,
            min_pool_size: default_min_pool_size(),
            block_counter_scope: BlockCounterScope::Global,
        }
    }
}

/// Partial patch for [`SafetySettings`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyUpdate {
    pub top10_holders_max_pct: Option<f64>,
    pub bundled_max_pct: Option<f64>,
    pub max_same_block_buys: Option<u32>,
    pub safety_check_period_secs: Option<u64>,
    pub require_socials: Option<bool>,
    pub require_liquidity_burnt: Option<bool>,
    pub require_immutable_metadata: Option<bool>,
    pub require_mint_authority_renounced: Option<bool>,
    pub require_freeze_authority_renounced: Option<bool>,
    pub only_pumpfun_migrated: Option<bool>,
    pub min_pool_size: Option<f64>,
    pub block_counter_scope: Option<BlockCounterScope>,
}

impl SafetySettings {
    /// Apply a partial update, returning the validated merged settings
    pub fn merged(&self, update: &SafetyUpdate) -> Result<Self> {
        let next = Self {
            top10_holders_max_pct: update
                .top10_holders_max_pct
                .unwrap_or(self.top10_holders_max_pct),
            bundled_max_pct: update.bundled_max_pct.unwrap_or(self.bundled_max_pct),
            max_same_block_buys: update
                .max_same_block_buys
                .unwrap_or(self.max_same_block_buys),
            safety_check_period_secs: update
                .safety_check_period_secs
                .unwrap_or(self.safety_check_period_secs),
            require_socials: update.require_socials.unwrap_or(self.require_socials),
            require_liquidity_burnt: update
                .require_liquidity_burnt
                .unwrap_or(self.require_liquidity_burnt),
            require_immutable_metadata: update
                .require_immutable_metadata
                .unwrap_or(self.require_immutable_metadata),
            require_mint_authority_renounced: update
                .require_mint_authority_renounced
                .unwrap_or(self.require_mint_authority_renounced),
            require_freeze_authority_renounced: update
                .require_freeze_authority_renounced
                .unwrap_or(self.require_freeze_authority_renounced),
            only_pumpfun_migrated: update
                .only_pumpfun_migrated
                .unwrap_or(self.only_pumpfun_migrated),
            min_pool_size: update.min_pool_size.unwrap_or(self.min_pool_size),
            block_counter_scope: update
                .block_counter_scope
                .unwrap_or(self.block_counter_scope),
        };
        next.validate()?;
        Ok(next)
    }

    /// Validate numeric ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.top10_holders_max_pct) {
            return Err(Error::validation(
                "top10_holders_max_pct",
                "percentage out of range [0, 100]",
            ));
        }
        if !(0.0..=100.0).contains(&self.bundled_max_pct) {
            return Err(Error::validation(
                "bundled_max_pct",
                "percentage out of range [0, 100]",
            ));
        }
        if self.max_same_block_buys == 0 {
            return Err(Error::validation("max_same_block_buys", "must be positive"));
        }
        if self.safety_check_period_secs == 0 {
            return Err(Error::validation(
                "safety_check_period_secs",
                "must be positive",
            ));
        }
        if self.min_pool_size < 0.0 {
            return Err(Error::validation("min_pool_size", "must not be negative"));
        }
        Ok(())
    }
}

/// Full settings bundle persisted in the engine state snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub safety: SafetySettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = StrategySettings::default();
        assert!(s.random_buy);
        assert_eq!(s.profit1, 25.0);
        assert_eq!(s.profit2, 50.0);
        assert_eq!(s.stop, 10.0);
        assert_eq!(s.timeout_minutes, 5);

        let f = SafetySettings::default();
        assert_eq!(f.top10_holders_max_pct, 50.0);
        assert_eq!(f.min_pool_size, 5000.0);
        assert_eq!(f.block_counter_scope, BlockCounterScope::Global);
    }

    #[test]
    fn test_merge_is_shallow_and_partial() {
        let base = StrategySettings::default();
        let update = StrategyUpdate {
            profit1: Some(30.0),
            stop: Some(15.0),
            ..Default::default()
        };

        let merged = base.merged(&update).unwrap();
        assert_eq!(merged.profit1, 30.0);
        assert_eq!(merged.stop, 15.0);
        // Untouched fields survive
        assert_eq!(merged.profit2, base.profit2);
        assert_eq!(merged.buy_min, base.buy_min);
    }

    #[test]
    fn test_merge_rejects_out_of_range() {
        let base = StrategySettings::default();

        let err = base
            .merged(&StrategyUpdate {
                profit1: Some(150.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Validation { field: "profit1", .. }
        ));

        let err = base
            .merged(&StrategyUpdate {
                fixed_buy: Some(0.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Validation { field: "fixed_buy", .. }
        ));

        let err = base
            .merged(&StrategyUpdate {
                price_interval_ms: Some(0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Validation { field: "price_interval_ms", .. }
        ));
    }

    #[test]
    fn test_safety_merge_validates() {
        let base = SafetySettings::default();

        let merged = base
            .merged(&SafetyUpdate {
                bundled_max_pct: Some(35.0),
                require_socials: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(merged.bundled_max_pct, 35.0);
        assert!(!merged.require_socials);

        assert!(base
            .merged(&SafetyUpdate {
                max_same_block_buys: Some(0),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_settings_roundtrip_json() {
        let settings = BotSettings {
            strategy: StrategySettings {
                profit1: 33.0,
                ..Default::default()
            },
            safety: SafetySettings {
                min_pool_size: 7500.0,
                ..Default::default()
            },
        };

        let json = serde_json::to_string(&settings).unwrap();
        let restored: BotSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, settings);
    }
}
