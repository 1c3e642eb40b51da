//! Engine orchestration
//!
//! [`TradingEngine`] owns the discovery loop and exposes the control
//! surface the external dashboard layer calls: start/stop, settings
//! updates, wallet connect/disconnect, sell-all, and the event stream.
//!
//! The running flag is a `tokio::sync::watch` level. Stopping the engine
//! ends the discovery loop at the next iteration boundary and is observed
//! by every position monitor on its next tick; monitors are never
//! force-cancelled.

use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::discovery::{poll_feeds, DiscoveryFeed, TokenCandidate};
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventKind, EventSink};
use crate::monitor::{MonitorContext, Position, PositionMonitor, PriceFeed};
use crate::safety::SafetyGate;
use crate::settings::{BotSettings, SafetySettings, SafetyUpdate, StrategySettings, StrategyUpdate};
use crate::state::{EngineState, StateStore};
use crate::token_info::TokenInfoResolver;
use crate::trading::{OrderExecutor, TradeAction, TradeCredentials};
use crate::wallet::{TradeKind, TradeRecord, WalletConnection, WalletRegistry, WalletType};

/// Snapshot returned by [`TradingEngine::status`]
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub auto_restart: bool,
    pub settings: BotSettings,
    pub connected_users: usize,
    pub total_profit: f64,
}

/// Result of a sell-all pass; counts successful sells only
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SellAllOutcome {
    pub sold_count: usize,
}

/// Everything the engine is wired to
pub struct EngineDeps {
    pub store: StateStore,
    pub registry: Arc<WalletRegistry>,
    pub resolver: Arc<TokenInfoResolver>,
    pub gate: Arc<SafetyGate>,
    pub executor: Arc<OrderExecutor>,
    pub chain: Arc<dyn ChainClient>,
    pub prices: Arc<dyn PriceFeed>,
    pub feeds: Vec<Box<dyn DiscoveryFeed>>,
    pub events: EventSink,
}

pub struct TradingEngine {
    settings: RwLock<BotSettings>,
    store: StateStore,
    registry: Arc<WalletRegistry>,
    resolver: Arc<TokenInfoResolver>,
    gate: Arc<SafetyGate>,
    executor: Arc<OrderExecutor>,
    chain: Arc<dyn ChainClient>,
    prices: Arc<dyn PriceFeed>,
    feeds: Vec<Box<dyn DiscoveryFeed>>,
    events: EventSink,
    running_tx: watch::Sender<bool>,
    running_rx: watch::Receiver<bool>,
    auto_restart: AtomicBool,
    positions_opened: AtomicUsize,
}

impl TradingEngine {
    pub fn new(deps: EngineDeps) -> Arc<Self> {
        let (running_tx, running_rx) = watch::channel(false);
        Arc::new(Self {
            settings: RwLock::new(BotSettings::default()),
            store: deps.store,
            registry: deps.registry,
            resolver: deps.resolver,
            gate: deps.gate,
            executor: deps.executor,
            chain: deps.chain,
            prices: deps.prices,
            feeds: deps.feeds,
            events: deps.events,
            running_tx,
            running_rx,
            auto_restart: AtomicBool::new(false),
            positions_opened: AtomicUsize::new(0),
        })
    }

    /// Load persisted state and resume the loop if it was running with
    /// auto-restart enabled.
    pub async fn boot(self: &Arc<Self>) -> Result<()> {
        let state = self.store.load().await?;
        self.auto_restart.store(state.auto_restart, Ordering::SeqCst);
        *self.settings.write().await = state.settings;

        if state.auto_restart {
            info!("Auto-restart enabled, resuming engine");
            self.start().await;
        }
        Ok(())
    }

    /// Begin the discovery loop. Idempotent: a second call while running
    /// is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if *self.running_rx.borrow() {
            debug!("Engine already running");
            return;
        }
        let _ = self.running_tx.send(true);
        self.persist_best_effort().await;
        info!("Engine started");

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_loop().await;
        });
    }

    /// Request a cooperative stop. The loop exits at the next iteration
    /// boundary; open position monitors liquidate on their next tick.
    pub async fn stop(&self) {
        if !*self.running_rx.borrow() {
            debug!("Engine already stopped");
            return;
        }
        let _ = self.running_tx.send(false);
        self.persist_best_effort().await;
        info!("Engine stop requested");
    }

    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.is_running(),
            auto_restart: self.auto_restart.load(Ordering::SeqCst),
            settings: self.settings.read().await.clone(),
            connected_users: self.registry.len(),
            total_profit: self.registry.total_profit(),
        }
    }

    pub async fn settings(&self) -> StrategySettings {
        self.settings.read().await.strategy.clone()
    }

    pub async fn safety_settings(&self) -> SafetySettings {
        self.settings.read().await.safety.clone()
    }

    /// Merge a partial strategy update, validate, persist, return the
    /// merged result.
    pub async fn update_settings(&self, update: StrategyUpdate) -> Result<StrategySettings> {
        let merged = {
            let mut settings = self.settings.write().await;
            let merged = settings.strategy.merged(&update)?;
            settings.strategy = merged.clone();
            merged
        };
        self.persist().await?;
        info!("Strategy settings updated");
        Ok(merged)
    }

    pub async fn update_safety_settings(&self, update: SafetyUpdate) -> Result<SafetySettings> {
        let merged = {
            let mut settings = self.settings.write().await;
            let merged = settings.safety.merged(&update)?;
            settings.safety = merged.clone();
            merged
        };
        self.persist().await?;
        info!("Safety settings updated");
        Ok(merged)
    }

    pub async fn set_auto_restart(&self, enabled: bool) -> Result<()> {
        self.auto_restart.store(enabled, Ordering::SeqCst);
        self.persist().await
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart.load(Ordering::SeqCst)
    }

    pub fn connect_wallet(
        &self,
        user_id: &str,
        wallet_type: WalletType,
        public_key: &str,
        api_key: Option<String>,
    ) {
        self.registry.connect(WalletConnection::new(
            user_id,
            wallet_type,
            public_key,
            api_key,
        ));
        self.events.emit(
            EngineEvent::new(EventKind::WalletConnected, "").with_user(user_id),
        );
    }

    pub fn disconnect_wallet(&self, user_id: &str) -> Result<()> {
        if self.registry.disconnect(user_id).is_none() {
            return Err(Error::WalletNotFound(user_id.to_string()));
        }
        self.events.emit(
            EngineEvent::new(EventKind::WalletDisconnected, "").with_user(user_id),
        );
        Ok(())
    }

    pub fn user_wallet(&self, user_id: &str) -> Result<WalletConnection> {
        self.registry
            .get(user_id)
            .ok_or_else(|| Error::WalletNotFound(user_id.to_string()))
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Total number of position monitors ever spawned
    pub fn positions_opened(&self) -> usize {
        self.positions_opened.load(Ordering::SeqCst)
    }

    /// Sell every token the user's wallet holds. One failed sell does not
    /// stop the pass; the outcome counts successes only.
    pub async fn sell_all(&self, user_id: &str) -> Result<SellAllOutcome> {
        let wallet = self.user_wallet(user_id)?;
        let credentials = wallet.credentials();
        let holdings = self.chain.holdings(&wallet.public_key).await?;
        info!(user_id = %user_id, tokens = holdings.len(), "Selling all positions");

        let mut sold_count = 0;
        for holding in &holdings {
            self.events.emit(
                EngineEvent::new(EventKind::SellAttempt, &holding.mint).with_user(user_id),
            );
            match self
                .executor
                .try_sell(&credentials, &holding.mint, "100%")
                .await
            {
                Some(signature) => {
                    sold_count += 1;
                    self.registry.record_trade(
                        user_id,
                        TradeRecord::now(TradeKind::SellAll, &holding.mint, "", 0.0, 0.0)
                            .with_signature(&signature),
                    );
                    self.events.emit(
                        EngineEvent::new(EventKind::SellSuccess, &holding.mint)
                            .with_tx_ref(signature)
                            .with_user(user_id),
                    );
                }
                None => {
                    self.events.emit(
                        EngineEvent::new(EventKind::SellFailed, &holding.mint).with_user(user_id),
                    );
                }
            }
        }
        Ok(SellAllOutcome { sold_count })
    }

    async fn run_loop(self: Arc<Self>) {
        info!("Discovery loop started");
        let mut running = self.running_rx.clone();

        while *running.borrow() {
            self.run_iteration().await;

            let interval = {
                let settings = self.settings.read().await;
                Duration::from_millis(settings.strategy.monitor_interval_ms.max(1))
            };
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = running.changed() => {}
            }
        }
        info!("Discovery loop stopped");
    }

    /// One discovery pass: poll feeds, vet candidates, buy for every
    /// connected wallet, spawn monitors.
    pub async fn run_iteration(self: &Arc<Self>) {
        let candidates = poll_feeds(&self.feeds).await;
        if candidates.is_empty() {
            return;
        }
        debug!(count = candidates.len(), "Discovery candidates");

        for candidate in candidates {
            self.process_candidate(&candidate).await;
        }
    }

    async fn process_candidate(self: &Arc<Self>, candidate: &TokenCandidate) {
        let (strategy, safety) = {
            let settings = self.settings.read().await;
            (settings.strategy.clone(), settings.safety.clone())
        };

        let descriptor = self.resolver.resolve(&candidate.mint).await;
        self.events.emit(
            EngineEvent::new(EventKind::NewTokenDetected, &candidate.mint)
                .with_token(descriptor.clone()),
        );

        let verdict = self.gate.evaluate(&descriptor, &safety).await;
        if !verdict.pass {
            debug!(
                mint = %candidate.mint,
                check = ?verdict.failing_check,
                reason = ?verdict.reason,
                "Candidate rejected by safety gate"
            );
            return;
        }

        // Legacy rug check: no price or thin liquidity means no trade
        if descriptor.price_usd <= 0.0 || descriptor.liquidity_usd < strategy.liquidity {
            debug!(
                mint = %candidate.mint,
                price = descriptor.price_usd,
                liquidity = descriptor.liquidity_usd,
                "Candidate rejected by liquidity check"
            );
            return;
        }

        for wallet in self.registry.snapshot() {
            let amount = buy_size(&strategy);
            self.buy_for_wallet(&wallet.credentials(), &wallet.user_id, &descriptor, amount, &strategy, &safety)
                .await;
        }
    }

    async fn buy_for_wallet(
        self: &Arc<Self>,
        credentials: &TradeCredentials,
        user_id: &str,
        descriptor: &crate::token_info::TokenDescriptor,
        amount: f64,
        strategy: &StrategySettings,
        safety: &SafetySettings,
    ) {
        self.events.emit(
            EngineEvent::new(EventKind::BuyAttempt, &descriptor.mint)
                .with_amount(amount)
                .with_user(user_id),
        );

        match self
            .executor
            .try_buy(credentials, &descriptor.mint, amount)
            .await
        {
            Some(signature) => {
                self.gate.record_buy(&descriptor.mint, safety);
                self.registry.record_trade(
                    user_id,
                    TradeRecord::now(
                        TradeAction::Buy,
                        &descriptor.mint,
                        &descriptor.symbol,
                        amount,
                        descriptor.price_usd,
                    )
                    .with_signature(&signature),
                );
                self.events.emit(
                    EngineEvent::new(EventKind::BuySuccess, &descriptor.mint)
                        .with_token(descriptor.clone())
                        .with_amount(amount)
                        .with_tx_ref(signature)
                        .with_user(user_id),
                );
                self.spawn_monitor(credentials, user_id, descriptor, amount, strategy);
            }
            None => {
                self.events.emit(
                    EngineEvent::new(EventKind::BuyFailed, &descriptor.mint)
                        .with_amount(amount)
                        .with_user(user_id),
                );
            }
        }
    }

    fn spawn_monitor(
        self: &Arc<Self>,
        credentials: &TradeCredentials,
        user_id: &str,
        descriptor: &crate::token_info::TokenDescriptor,
        invested_sol: f64,
        strategy: &StrategySettings,
    ) {
        let monitor = PositionMonitor::new(
            Position {
                mint: descriptor.mint.clone(),
                user_id: user_id.to_string(),
                entry_price: descriptor.price_usd,
                invested_sol,
            },
            descriptor.clone(),
            credentials.clone(),
            strategy.clone(),
            MonitorContext {
                executor: self.executor.clone(),
                chain: self.chain.clone(),
                prices: self.prices.clone(),
                registry: self.registry.clone(),
                events: self.events.clone(),
                stop: self.running_rx.clone(),
            },
        );
        self.positions_opened.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(monitor.run());
    }

    async fn persist(&self) -> Result<()> {
        let state = EngineState {
            running: self.is_running(),
            auto_restart: self.auto_restart.load(Ordering::SeqCst),
            settings: self.settings.read().await.clone(),
        };
        self.store.save(&state).await
    }

    async fn persist_best_effort(&self) {
        if let Err(e) = self.persist().await {
            warn!(error = %e, "Failed to persist engine state");
        }
    }
}

/// Buy size per strategy: fixed, or uniform-random within [buy_min, buy_max]
fn buy_size(strategy: &StrategySettings) -> f64 {
    if strategy.random_buy && strategy.buy_max > strategy.buy_min {
        rand::thread_rng().gen_range(strategy.buy_min..=strategy.buy_max)
    } else if strategy.random_buy {
        strategy.buy_min
    } else {
        strategy.fixed_buy
    }
}
