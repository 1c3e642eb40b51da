//! Per-position monitoring and exit
//!
//! One [`PositionMonitor`] task runs for every (mint, user) pair the engine
//! bought into. Each tick it polls the price and drives a small exit state
//! machine: partial take-profit, full take-profit, stop-loss, timeout. The
//! engine's stop signal is observed per tick and routes through the same
//! final-sell path as the deadline, so stopping the engine liquidates open
//! positions instead of abandoning them.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::error::Result;
use crate::events::{EngineEvent, EventKind, EventSink};
use crate::settings::StrategySettings;
use crate::token_info::{DexScreenerSource, TokenDescriptor, TokenSource};
use crate::trading::{OrderExecutor, TradeAction, TradeCredentials};
use crate::wallet::{TradeRecord, WalletRegistry};

/// Exit state for one position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    /// Full position held; first take-profit sells half
    Holding50,
    /// Half already sold; second take-profit closes out
    Holding0,
    Closed,
}

/// What the state machine wants sold this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInstruction {
    /// Sell amount as the trade API expects it ("50%" or "100%")
    pub amount: &'static str,
    /// Fraction of the original position being sold
    pub fraction_of_entry: u8,
    pub next_state: PositionState,
    pub reason: &'static str,
}

const SELL_HALF: ExitInstruction = ExitInstruction {
    amount: "50%",
    fraction_of_entry: 50,
    next_state: PositionState::Holding0,
    reason: "take-profit 1",
};

/// Pure transition function: given the current state and the percent price
/// change since entry, decide whether to sell this tick.
pub fn next_exit(
    state: PositionState,
    change_pct: f64,
    strategy: &StrategySettings,
) -> Option<ExitInstruction> {
    if state == PositionState::Closed {
        return None;
    }

    if change_pct <= -strategy.stop {
        return Some(ExitInstruction {
            amount: "100%",
            fraction_of_entry: remaining_pct(state),
            next_state: PositionState::Closed,
            reason: "stop-loss",
        });
    }

    match state {
        PositionState::Holding50 if change_pct >= strategy.profit1 => Some(SELL_HALF),
        PositionState::Holding0 if change_pct >= strategy.profit2 => Some(ExitInstruction {
            amount: "100%",
            fraction_of_entry: 50,
            next_state: PositionState::Closed,
            reason: "take-profit 2",
        }),
        _ => None,
    }
}

fn remaining_pct(state: PositionState) -> u8 {
    match state {
        PositionState::Holding50 => 100,
        PositionState::Holding0 => 50,
        PositionState::Closed => 0,
    }
}

/// Price lookup used by monitor ticks. `Ok(0.0)` means "no data this tick".
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price_usd(&self, mint: &str) -> Result<f64>;
}

#[async_trait]
impl PriceFeed for DexScreenerSource {
    async fn price_usd(&self, mint: &str) -> Result<f64> {
        Ok(self
            .fetch(mint)
            .await?
            .map(|d| d.price_usd)
            .unwrap_or(0.0))
    }
}

/// Shared plumbing every monitor needs; one instance per engine
#[derive(Clone)]
pub struct MonitorContext {
    pub executor: Arc<OrderExecutor>,
    pub chain: Arc<dyn ChainClient>,
    pub prices: Arc<dyn PriceFeed>,
    pub registry: Arc<WalletRegistry>,
    pub events: EventSink,
    pub stop: watch::Receiver<bool>,
}

/// The position being watched
#[derive(Debug, Clone)]
pub struct Position {
    pub mint: String,
    pub user_id: String,
    pub entry_price: f64,
    pub invested_sol: f64,
}

pub struct PositionMonitor {
    position: Position,
    token: TokenDescriptor,
    credentials: TradeCredentials,
    strategy: StrategySettings,
    ctx: MonitorContext,
    state: PositionState,
    deadline: Instant,
}

impl PositionMonitor {
    pub fn new(
        position: Position,
        token: TokenDescriptor,
        credentials: TradeCredentials,
        strategy: StrategySettings,
        ctx: MonitorContext,
    ) -> Self {
        let deadline = Instant::now() + Duration::from_secs(strategy.timeout_minutes * 60);
        Self {
            position,
            token,
            credentials,
            strategy,
            ctx,
            state: PositionState::Holding50,
            deadline,
        }
    }

    /// Override the timeout deadline (tests use short ones)
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    /// Run until the position closes, the deadline/stop fires, or the
    /// balance disappears externally.
    pub async fn run(mut self) {
        let tick = Duration::from_millis(self.strategy.price_interval_ms.max(1));
        info!(
            mint = %self.position.mint,
            user_id = %self.position.user_id,
            entry_price = self.position.entry_price,
            "Position monitor started"
        );

        while self.state != PositionState::Closed {
            let stop_requested = *self.ctx.stop.borrow();
            if stop_requested || Instant::now() >= self.deadline {
                let reason = if stop_requested { "engine stop" } else { "timeout" };
                if self.final_sell(reason).await {
                    break;
                }
                // Sell failed; retry on the next tick
                tokio::time::sleep(tick).await;
                continue;
            }

            if !self.tick().await {
                break;
            }
            tokio::time::sleep(tick).await;
        }

        info!(
            mint = %self.position.mint,
            user_id = %self.position.user_id,
            "Position monitor finished"
        );
    }

    /// One poll. Returns false when the monitor should exit.
    async fn tick(&mut self) -> bool {
        // Balance gone means someone sold outside the bot
        match self
            .ctx
            .chain
            .token_balance(&self.credentials.public_key, &self.position.mint)
            .await
        {
            Ok(balance) if balance <= 0.0 => {
                info!(mint = %self.position.mint, "Balance gone, position closed externally");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(mint = %self.position.mint, error = %e, "Balance check failed, skipping tick");
                return true;
            }
        }

        let price = match self.ctx.prices.price_usd(&self.position.mint).await {
            Ok(price) if price > 0.0 => price,
            Ok(_) => return true,
            Err(e) => {
                debug!(mint = %self.position.mint, error = %e, "Price poll failed, skipping tick");
                return true;
            }
        };

        let change_pct = if self.position.entry_price > 0.0 {
            (price - self.position.entry_price) / self.position.entry_price * 100.0
        } else {
            0.0
        };

        self.ctx.events.emit(
            EngineEvent::new(EventKind::PriceUpdate, &self.position.mint)
                .with_amount(price)
                .with_user(&self.position.user_id),
        );

        if let Some(exit) = next_exit(self.state, change_pct, &self.strategy) {
            self.attempt_sell(&exit, price, change_pct).await;
        }
        true
    }

    /// Sell whatever remains; used for timeout and engine stop. Returns
    /// true when the position is closed.
    async fn final_sell(&mut self, reason: &'static str) -> bool {
        info!(mint = %self.position.mint, reason = %reason, "Selling remaining position");

        let price = match self.ctx.prices.price_usd(&self.position.mint).await {
            Ok(price) if price > 0.0 => price,
            _ => 0.0,
        };
        let change_pct = if price > 0.0 && self.position.entry_price > 0.0 {
            (price - self.position.entry_price) / self.position.entry_price * 100.0
        } else {
            0.0
        };

        let exit = ExitInstruction {
            amount: "100%",
            fraction_of_entry: remaining_pct(self.state),
            next_state: PositionState::Closed,
            reason,
        };
        self.attempt_sell(&exit, price, change_pct).await;
        self.state == PositionState::Closed
    }

    async fn attempt_sell(&mut self, exit: &ExitInstruction, price: f64, change_pct: f64) {
        self.ctx.events.emit(
            EngineEvent::new(EventKind::SellAttempt, &self.position.mint)
                .with_user(&self.position.user_id)
                .with_reason(exit.reason),
        );

        match self
            .ctx
            .executor
            .try_sell(&self.credentials, &self.position.mint, exit.amount)
            .await
        {
            Some(signature) => {
                let sold_fraction = exit.fraction_of_entry as f64 / 100.0;
                let pnl_sol = self.position.invested_sol * sold_fraction * change_pct / 100.0;

                info!(
                    mint = %self.position.mint,
                    reason = exit.reason,
                    change_pct = change_pct,
                    pnl_sol = pnl_sol,
                    "Sell executed"
                );

                self.ctx.registry.record_trade(
                    &self.position.user_id,
                    TradeRecord::now(
                        TradeAction::Sell,
                        &self.position.mint,
                        &self.token.symbol,
                        self.position.invested_sol * sold_fraction,
                        price,
                    )
                    .with_profit_pct(change_pct)
                    .with_signature(&signature),
                );
                self.ctx.registry.add_profit(&self.position.user_id, pnl_sol);

                self.ctx.events.emit(
                    EngineEvent::new(EventKind::SellSuccess, &self.position.mint)
                        .with_amount(pnl_sol)
                        .with_tx_ref(signature)
                        .with_user(&self.position.user_id)
                        .with_reason(exit.reason),
                );
                self.state = exit.next_state;
            }
            None => {
                warn!(mint = %self.position.mint, reason = exit.reason, "Sell failed, will retry");
                self.ctx.events.emit(
                    EngineEvent::new(EventKind::SellFailed, &self.position.mint)
                        .with_user(&self.position.user_id)
                        .with_reason(exit.reason),
                );
            }
        }
    }
}
