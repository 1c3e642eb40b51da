//! Trade execution
//!
//! All buys and sells go through the [`TradeApi`] trait so the engine and
//! position monitors never care whether orders hit the real PumpPortal
//! Lightning API or the in-process simulator used for dry runs.
//!
//! PumpPortal fee: 0.5% per trade. Rate limits apply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// PumpPortal Lightning API endpoint
pub const PUMPPORTAL_API_URL: &str = "https://pumpportal.fun/api/trade";

/// Slippage tolerance for sniper entries/exits, in percent
pub const DEFAULT_SLIPPAGE_PCT: u32 = 25;

/// Priority fee in SOL attached to every trade
pub const DEFAULT_PRIORITY_FEE: f64 = 0.0005;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Per-wallet credentials handed to the trade API
#[derive(Debug, Clone)]
pub struct TradeCredentials {
    pub public_key: String,
    /// Lightning API key; absent for read-only wallets
    pub api_key: Option<String>,
}

/// Trade request body for the Lightning API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub action: TradeAction,
    pub mint: String,
    /// SOL for buys, token amount or percentage ("100%") for sells
    pub amount: String,
    /// "true" if amount is in SOL
    pub denominated_in_sol: String,
    pub slippage: u32,
    pub priority_fee: f64,
    pub pool: String,
}

/// Trade response from the Lightning API
#[derive(Debug, Clone, Deserialize)]
pub struct TradeResponse {
    pub signature: Option<String>,
    pub error: Option<String>,
    pub errors: Option<Vec<String>>,
}

/// Order execution backend
#[async_trait]
pub trait TradeApi: Send + Sync {
    /// Spend `sol_amount` SOL on `mint`; returns the transaction signature
    async fn buy(&self, credentials: &TradeCredentials, mint: &str, sol_amount: f64)
        -> Result<String>;

    /// Sell `amount` of `mint`. `amount` is a token amount or a percentage
    /// string like "50%" / "100%".
    async fn sell(&self, credentials: &TradeCredentials, mint: &str, amount: &str)
        -> Result<String>;
}

/// PumpPortal Lightning API client
pub struct PumpPortalApi {
    client: Client,
    base_url: String,
    slippage_pct: u32,
    priority_fee: f64,
    default_api_key: Option<String>,
}

impl PumpPortalApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            slippage_pct: DEFAULT_SLIPPAGE_PCT,
            priority_fee: DEFAULT_PRIORITY_FEE,
            default_api_key: None,
        }
    }

    /// Fallback key used when a wallet carries no key of its own
    pub fn with_default_key(mut self, api_key: Option<String>) -> Self {
        self.default_api_key = api_key;
        self
    }

    async fn submit(&self, api_key: &str, request: &TradeRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}?api-key={}", self.base_url, api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::TradeExecution(format!("HTTP request failed: {}", e)))?;

        let trade_response: TradeResponse = response
            .json()
            .await
            .map_err(|e| Error::TradeExecution(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = trade_response.error {
            return Err(Error::TradeExecution(error));
        }
        if let Some(errors) = trade_response.errors {
            if !errors.is_empty() {
                return Err(Error::TradeExecution(errors.join(", ")));
            }
        }

        trade_response
            .signature
            .ok_or_else(|| Error::TradeExecution("No signature in response".to_string()))
    }

    fn require_key<'a>(&'a self, credentials: &'a TradeCredentials) -> Result<&'a str> {
        credentials
            .api_key
            .as_deref()
            .or(self.default_api_key.as_deref())
            .ok_or_else(|| Error::Config("Trade API key required for Lightning API".to_string()))
    }
}

impl Default for PumpPortalApi {
    fn default() -> Self {
        Self::new(PUMPPORTAL_API_URL)
    }
}

#[async_trait]
impl TradeApi for PumpPortalApi {
    async fn buy(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        sol_amount: f64,
    ) -> Result<String> {
        let api_key = self.require_key(credentials)?;

        let request = TradeRequest {
            action: TradeAction::Buy,
            mint: mint.to_string(),
            amount: sol_amount.to_string(),
            denominated_in_sol: "true".to_string(),
            slippage: self.slippage_pct,
            priority_fee: self.priority_fee,
            pool: "auto".to_string(),
        };

        info!(mint = %mint, sol = sol_amount, wallet = %credentials.public_key, "Executing buy");
        self.submit(api_key, &request).await
    }

    async fn sell(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        amount: &str,
    ) -> Result<String> {
        let api_key = self.require_key(credentials)?;

        let request = TradeRequest {
            action: TradeAction::Sell,
            mint: mint.to_string(),
            amount: amount.to_string(),
            denominated_in_sol: "false".to_string(),
            slippage: self.slippage_pct,
            priority_fee: self.priority_fee,
            pool: "auto".to_string(),
        };

        info!(mint = %mint, amount = %amount, wallet = %credentials.public_key, "Executing sell");
        self.submit(api_key, &request).await
    }
}

/// Recorded simulated order, for inspection in tests
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedOrder {
    pub action: TradeAction,
    pub public_key: String,
    pub mint: String,
    pub amount: String,
}

/// Dry-run backend: accepts every order and fabricates a signature
#[derive(Default)]
pub struct SimulatedTradeApi {
    counter: AtomicU64,
    orders: Mutex<Vec<SimulatedOrder>>,
}

impl SimulatedTradeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<SimulatedOrder> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }

    fn record(&self, order: SimulatedOrder) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = format!("sim-{}-{}", order.action, n);
        if let Ok(mut orders) = self.orders.lock() {
            orders.push(order);
        }
        signature
    }
}

#[async_trait]
impl TradeApi for SimulatedTradeApi {
    async fn buy(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        sol_amount: f64,
    ) -> Result<String> {
        info!(mint = %mint, sol = sol_amount, wallet = %credentials.public_key, "Simulated buy");
        Ok(self.record(SimulatedOrder {
            action: TradeAction::Buy,
            public_key: credentials.public_key.clone(),
            mint: mint.to_string(),
            amount: sol_amount.to_string(),
        }))
    }

    async fn sell(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        amount: &str,
    ) -> Result<String> {
        info!(mint = %mint, amount = %amount, wallet = %credentials.public_key, "Simulated sell");
        Ok(self.record(SimulatedOrder {
            action: TradeAction::Sell,
            public_key: credentials.public_key.clone(),
            mint: mint.to_string(),
            amount: amount.to_string(),
        }))
    }
}

/// Thin wrapper that converts trade failures into logged `None`s so one
/// rejected order never aborts a multi-wallet pass.
pub struct OrderExecutor {
    api: std::sync::Arc<dyn TradeApi>,
}

impl OrderExecutor {
    pub fn new(api: std::sync::Arc<dyn TradeApi>) -> Self {
        Self { api }
    }

    /// Buy and return the signature, or `None` after logging the failure
    pub async fn try_buy(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        sol_amount: f64,
    ) -> Option<String> {
        match self.api.buy(credentials, mint, sol_amount).await {
            Ok(signature) => Some(signature),
            Err(e) => {
                warn!(mint = %mint, wallet = %credentials.public_key, error = %e, "Buy failed");
                None
            }
        }
    }

    /// Sell and return the signature, or `None` after logging the failure
    pub async fn try_sell(
        &self,
        credentials: &TradeCredentials,
        mint: &str,
        amount: &str,
    ) -> Option<String> {
        match self.api.sell(credentials, mint, amount).await {
            Ok(signature) => Some(signature),
            Err(e) => {
                warn!(mint = %mint, wallet = %credentials.public_key, error = %e, "Sell failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn credentials() -> TradeCredentials {
        TradeCredentials {
            public_key: "WaLLet111".to_string(),
            api_key: Some("key".to_string()),
        }
    }

    #[test]
    fn test_trade_request_serializes_camel_case() {
        let request = TradeRequest {
            action: TradeAction::Buy,
            mint: "m1".to_string(),
            amount: "0.1".to_string(),
            denominated_in_sol: "true".to_string(),
            slippage: 25,
            priority_fee: 0.0005,
            pool: "auto".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "buy");
        assert_eq!(json["denominatedInSol"], "true");
        assert_eq!(json["priorityFee"], 0.0005);
    }

    #[tokio::test]
    async fn test_missing_api_key_rejected() {
        let api = PumpPortalApi::default();
        let creds = TradeCredentials {
            public_key: "WaLLet111".to_string(),
            api_key: None,
        };
        let result = api.buy(&creds, "m1", 0.1).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_simulated_api_records_orders() {
        let api = SimulatedTradeApi::new();
        let sig1 = api.buy(&credentials(), "m1", 0.15).await.unwrap();
        let sig2 = api.sell(&credentials(), "m1", "50%").await.unwrap();
        assert_ne!(sig1, sig2);

        let orders = api.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].action, TradeAction::Buy);
        assert_eq!(orders[1].amount, "50%");
    }

    #[tokio::test]
    async fn test_executor_swallows_failures() {
        struct FailingApi;

        #[async_trait]
        impl TradeApi for FailingApi {
            async fn buy(&self, _: &TradeCredentials, _: &str, _: f64) -> Result<String> {
                Err(Error::TradeExecution("insufficient funds".to_string()))
            }
            async fn sell(&self, _: &TradeCredentials, _: &str, _: &str) -> Result<String> {
                Err(Error::TradeExecution("insufficient funds".to_string()))
            }
        }

        let executor = OrderExecutor::new(Arc::new(FailingApi));
        assert!(executor.try_buy(&credentials(), "m1", 0.1).await.is_none());
        assert!(executor.try_sell(&credentials(), "m1", "100%").await.is_none());
    }
}
