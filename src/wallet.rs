//! Connected wallet registry
//!
//! Tracks the wallets the engine trades with, keyed by user id. Every buy
//! pass fans out across the current snapshot, so connecting or dropping a
//! wallet takes effect on the next iteration without any locking in the
//! engine loop.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::trading::{TradeAction, TradeCredentials};

/// Per-user trade history is capped at this many entries, newest first
pub const TRADE_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    Phantom,
    Solflare,
    Backpack,
    Other,
}

/// A wallet the engine can trade with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConnection {
    pub user_id: String,
    pub wallet_type: WalletType,
    pub public_key: String,
    /// Lightning API key for this wallet; never serialized outward
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl WalletConnection {
    pub fn new(
        user_id: &str,
        wallet_type: WalletType,
        public_key: &str,
        api_key: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            wallet_type,
            public_key: public_key.to_string(),
            api_key,
            connected_at: Utc::now(),
        }
    }

    pub fn credentials(&self) -> TradeCredentials {
        TradeCredentials {
            public_key: self.public_key.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

/// What kind of trade a history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Buy,
    Sell,
    /// Manual liquidation of every holding at once
    SellAll,
}

impl From<TradeAction> for TradeKind {
    fn from(action: TradeAction) -> Self {
        match action {
            TradeAction::Buy => TradeKind::Buy,
            TradeAction::Sell => TradeKind::Sell,
        }
    }
}

/// One executed trade, as shown to the wallet's owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub kind: TradeKind,
    pub mint: String,
    pub symbol: String,
    /// SOL committed by this trade: spent on buys, liquidated share of the
    /// entry on sells
    pub amount_sol: f64,
    /// Token price in USD at execution (0.0 when unknown)
    pub price: f64,
    /// Percent change since entry; sells only
    pub profit_pct: Option<f64>,
    pub signature: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn now(
        kind: impl Into<TradeKind>,
        mint: &str,
        symbol: &str,
        amount_sol: f64,
        price: f64,
    ) -> Self {
        Self {
            kind: kind.into(),
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            amount_sol,
            price,
            profit_pct: None,
            signature: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_profit_pct(mut self, profit_pct: f64) -> Self {
        self.profit_pct = Some(profit_pct);
        self
    }

    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }
}

/// All connected wallets plus their trade history and realized profit
#[derive(Default)]
pub struct WalletRegistry {
    wallets: DashMap<String, WalletConnection>,
    history: DashMap<String, Vec<TradeRecord>>,
    profits: DashMap<String, f64>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet; returns the previous connection if the user
    /// reconnected.
    pub fn connect(&self, connection: WalletConnection) -> Option<WalletConnection> {
        info!(
            user_id = %connection.user_id,
            public_key = %connection.public_key,
            "Wallet connected"
        );
        self.wallets
            .insert(connection.user_id.clone(), connection)
    }

    /// Remove a wallet along with its trade history and profit counters
    pub fn disconnect(&self, user_id: &str) -> Option<WalletConnection> {
        let removed = self.wallets.remove(user_id).map(|(_, c)| c);
        if let Some(connection) = &removed {
            self.history.remove(user_id);
            self.profits.remove(user_id);
            info!(user_id = %user_id, public_key = %connection.public_key, "Wallet disconnected");
        }
        removed
    }

    pub fn get(&self, user_id: &str) -> Option<WalletConnection> {
        self.wallets.get(user_id).map(|c| c.clone())
    }

    /// All connected wallets at this instant
    pub fn snapshot(&self) -> Vec<WalletConnection> {
        self.wallets.iter().map(|c| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Append a trade to the user's history, newest first
    pub fn record_trade(&self, user_id: &str, record: TradeRecord) {
        let mut entry = self.history.entry(user_id.to_string()).or_default();
        entry.insert(0, record);
        entry.truncate(TRADE_HISTORY_LIMIT);
    }

    pub fn trade_history(&self, user_id: &str) -> Vec<TradeRecord> {
        self.history
            .get(user_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Accumulate realized SOL profit (negative for losses)
    pub fn add_profit(&self, user_id: &str, delta_sol: f64) {
        *self.profits.entry(user_id.to_string()).or_insert(0.0) += delta_sol;
    }

    pub fn profit(&self, user_id: &str) -> f64 {
        self.profits.get(user_id).map(|p| *p).unwrap_or(0.0)
    }

    /// Realized profit across all users
    pub fn total_profit(&self) -> f64 {
        self.profits.iter().map(|p| *p).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(user_id: &str) -> WalletConnection {
        WalletConnection::new(user_id, WalletType::Phantom, "PubKey111", Some("key".into()))
    }

    #[test]
    fn test_connect_disconnect_roundtrip() {
        let registry = WalletRegistry::new();
        assert!(registry.connect(wallet("u1")).is_none());
        assert!(registry.connect(wallet("u2")).is_none());
        assert_eq!(registry.len(), 2);

        // Reconnect replaces and hands back the old connection
        assert!(registry.connect(wallet("u1")).is_some());
        assert_eq!(registry.len(), 2);

        assert!(registry.disconnect("u1").is_some());
        assert!(registry.disconnect("u1").is_none());
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_history_capped_newest_first() {
        let registry = WalletRegistry::new();
        for i in 0..150 {
            registry.record_trade(
                "u1",
                TradeRecord::now(TradeAction::Buy, &format!("mint-{}", i), "TST", 0.1, 1.0),
            );
        }
        let history = registry.trade_history("u1");
        assert_eq!(history.len(), TRADE_HISTORY_LIMIT);
        assert_eq!(history[0].mint, "mint-149");
    }

    #[test]
    fn test_profit_accumulates() {
        let registry = WalletRegistry::new();
        registry.connect(wallet("u1"));
        registry.connect(wallet("u2"));
        registry.add_profit("u1", 0.5);
        registry.add_profit("u1", -0.2);
        registry.add_profit("u2", 1.0);

        assert!((registry.profit("u1") - 0.3).abs() < 1e-9);
        assert!((registry.total_profit() - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_disconnect_clears_history_and_profit() {
        let registry = WalletRegistry::new();
        registry.connect(wallet("u1"));
        registry.record_trade("u1", TradeRecord::now(TradeAction::Buy, "m1", "TST", 0.1, 1.0));
        registry.add_profit("u1", 0.5);

        registry.disconnect("u1");
        assert!(registry.get("u1").is_none());
        assert!(registry.trade_history("u1").is_empty());
        assert_eq!(registry.profit("u1"), 0.0);
    }

    #[test]
    fn test_record_kinds_and_sell_fields() {
        let buy = TradeRecord::now(TradeAction::Buy, "m1", "TST", 0.1, 1.0);
        assert_eq!(buy.kind, TradeKind::Buy);
        assert!(buy.profit_pct.is_none());

        let sell = TradeRecord::now(TradeAction::Sell, "m1", "TST", 0.05, 1.3)
            .with_profit_pct(30.0)
            .with_signature("sig-1");
        assert_eq!(sell.kind, TradeKind::Sell);
        assert_eq!(sell.price, 1.3);
        assert_eq!(sell.profit_pct, Some(30.0));

        let json = serde_json::to_value(TradeRecord::now(TradeKind::SellAll, "m1", "", 0.0, 0.0))
            .unwrap();
        assert_eq!(json["kind"], "sell_all");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let json = serde_json::to_value(wallet("u1")).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["public_key"], "PubKey111");
    }
}
