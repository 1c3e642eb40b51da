//! Pre-trade safety gate
//!
//! Runs every candidate token through a fixed sequence of checks before a
//! single lamport is spent. The sequence short-circuits at the first
//! failure, and the verdict for a mint is cached for the configured
//! cooldown so repeated discovery hits do not hammer the data sources.

pub mod checks;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::chain::ChainClient;
use crate::settings::{BlockCounterScope, SafetySettings};
use crate::token_info::TokenDescriptor;
use checks::{default_checks, CheckContext, SafetyCheck};

/// Window approximating one blockchain block for the buy-rate counter
pub const BLOCK_WINDOW: Duration = Duration::from_millis(400);

/// Outcome of one gate evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    pub pass: bool,
    pub failing_check: Option<&'static str>,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn pass() -> Self {
        Self {
            pass: true,
            failing_check: None,
            reason: None,
        }
    }

    fn fail(check: &'static str, reason: String) -> Self {
        Self {
            pass: false,
            failing_check: Some(check),
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCount {
    started: Instant,
    count: u32,
}

impl WindowCount {
    fn fresh() -> Self {
        Self {
            started: Instant::now(),
            count: 0,
        }
    }
}

/// Buys-per-block counter, scoped globally or per mint
struct BlockBuyCounter {
    global: Mutex<WindowCount>,
    per_mint: DashMap<String, WindowCount>,
}

impl BlockBuyCounter {
    fn new() -> Self {
        Self {
            global: Mutex::new(WindowCount::fresh()),
            per_mint: DashMap::new(),
        }
    }

    fn bump(window: &mut WindowCount) {
        if window.started.elapsed() > BLOCK_WINDOW {
            *window = WindowCount::fresh();
        }
        window.count += 1;
    }

    fn current(window: &WindowCount) -> u32 {
        if window.started.elapsed() > BLOCK_WINDOW {
            0
        } else {
            window.count
        }
    }

    fn record(&self, mint: &str, scope: BlockCounterScope) {
        match scope {
            BlockCounterScope::Global => {
                if let Ok(mut window) = self.global.lock() {
                    Self::bump(&mut window);
                }
            }
            BlockCounterScope::PerMint => {
                {
                    let mut window = self
                        .per_mint
                        .entry(mint.to_string())
                        .or_insert_with(WindowCount::fresh);
                    Self::bump(&mut window);
                }
                // Drop windows from dead blocks so the map tracks only
                // mints bought in the current window
                self.per_mint
                    .retain(|_, window| window.started.elapsed() <= BLOCK_WINDOW);
            }
        }
    }

    fn count(&self, mint: &str, scope: BlockCounterScope) -> u32 {
        match scope {
            BlockCounterScope::Global => self
                .global
                .lock()
                .map(|w| Self::current(&w))
                .unwrap_or(0),
            BlockCounterScope::PerMint => self
                .per_mint
                .get(mint)
                .map(|w| Self::current(&w))
                .unwrap_or(0),
        }
    }
}

struct CachedVerdict {
    verdict: SafetyVerdict,
    at: Instant,
}

/// The safety gate itself. One instance is shared by the whole engine.
pub struct SafetyGate {
    chain: Arc<dyn ChainClient>,
    checks: Vec<Box<dyn SafetyCheck>>,
    cache: DashMap<String, CachedVerdict>,
    counter: BlockBuyCounter,
}

impl SafetyGate {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self::with_checks(chain, default_checks())
    }

    /// Build a gate with a custom check sequence
    pub fn with_checks(chain: Arc<dyn ChainClient>, checks: Vec<Box<dyn SafetyCheck>>) -> Self {
        Self {
            chain,
            checks,
            cache: DashMap::new(),
            counter: BlockBuyCounter::new(),
        }
    }

    /// Evaluate a token. Within the cooldown window the cached verdict is
    /// returned without re-running any check.
    pub async fn evaluate(
        &self,
        descriptor: &TokenDescriptor,
        settings: &SafetySettings,
    ) -> SafetyVerdict {
        let cooldown = Duration::from_secs(settings.safety_check_period_secs);
        if let Some(cached) = self.cache.get(&descriptor.mint) {
            if cached.at.elapsed() < cooldown {
                debug!(mint = %descriptor.mint, "Returning cached safety verdict");
                return cached.verdict.clone();
            }
        }

        // One on-chain fetch shared by every authority check. A failure
        // leaves None and the affected checks fail closed.
        let mint_status = match self.chain.mint_status(&descriptor.mint).await {
            Ok(status) => Some(status),
            Err(e) => {
                debug!(mint = %descriptor.mint, error = %e, "Mint account fetch failed");
                None
            }
        };

        let ctx = CheckContext {
            descriptor,
            settings,
            mint_status,
            block_buys: self
                .counter
                .count(&descriptor.mint, settings.block_counter_scope),
        };

        let mut verdict = SafetyVerdict::pass();
        for check in &self.checks {
            if let Err(reason) = check.evaluate(&ctx) {
                info!(
                    mint = %descriptor.mint,
                    check = check.name(),
                    reason = %reason,
                    "Safety check failed"
                );
                verdict = SafetyVerdict::fail(check.name(), reason);
                break;
            }
        }

        // Evict verdicts whose cooldown has lapsed; a continuous stream of
        // fresh mints must not grow the cache without bound
        self.cache.retain(|_, cached| cached.at.elapsed() < cooldown);
        self.cache.insert(
            descriptor.mint.clone(),
            CachedVerdict {
                verdict: verdict.clone(),
                at: Instant::now(),
            },
        );
        verdict
    }

    /// Count an executed buy toward the block-rate limit
    pub fn record_buy(&self, mint: &str, settings: &SafetySettings) {
        self.counter.record(mint, settings.block_counter_scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MintStatus, TokenHolding};
    use crate::error::{Error, Result};
    use crate::token_info::HolderShare;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubChain {
        status: Option<MintStatus>,
    }

    #[async_trait]
    impl ChainClient for StubChain {
        async fn mint_status(&self, _mint: &str) -> Result<MintStatus> {
            self.status
                .clone()
                .ok_or_else(|| Error::Rpc("unavailable".into()))
        }
        async fn token_balance(&self, _owner: &str, _mint: &str) -> Result<f64> {
            Ok(0.0)
        }
        async fn holdings(&self, _owner: &str) -> Result<Vec<TokenHolding>> {
            Ok(Vec::new())
        }
        async fn holder_distribution(&self, _mint: &str) -> Result<Vec<HolderShare>> {
            Ok(Vec::new())
        }
    }

    fn renounced_chain() -> Arc<StubChain> {
        Arc::new(StubChain {
            status: Some(MintStatus {
                mint_authority_renounced: true,
                freeze_authority_renounced: true,
            }),
        })
    }

    fn safe_descriptor(mint: &str) -> TokenDescriptor {
        let mut d = TokenDescriptor::unknown(mint);
        d.name = "Test".to_string();
        d.liquidity_usd = 10_000.0;
        d.has_socials = true;
        d.holders = (0..5)
            .map(|i| HolderShare {
                address: format!("holder-{}", i),
                pct: 5.0 - i as f64,
            })
            .collect();
        d
    }

    struct CountingCheck {
        calls: Arc<AtomicU32>,
    }

    impl SafetyCheck for CountingCheck {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn evaluate(&self, _ctx: &CheckContext<'_>) -> checks::CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_safe_token_passes_all_checks() {
        let gate = SafetyGate::new(renounced_chain());
        let settings = SafetySettings::default();
        // pump-suffixed mint so the migration check holds
        let verdict = gate.evaluate(&safe_descriptor("m1pump"), &settings).await;
        assert!(verdict.pass, "{:?}", verdict);
    }

    #[tokio::test]
    async fn test_low_liquidity_fails_with_reason() {
        let gate = SafetyGate::new(renounced_chain());
        let settings = SafetySettings::default();
        let mut descriptor = safe_descriptor("m1pump");
        descriptor.liquidity_usd = 100.0;

        let verdict = gate.evaluate(&descriptor, &settings).await;
        assert!(!verdict.pass);
        // Burn-proxy check fires first; both report the pool shortfall
        assert!(verdict.reason.unwrap().contains("minimum"));
    }

    #[tokio::test]
    async fn test_cooldown_returns_cached_verdict_without_rerunning() {
        let calls = Arc::new(AtomicU32::new(0));
        let gate = SafetyGate::with_checks(
            renounced_chain(),
            vec![Box::new(CountingCheck {
                calls: calls.clone(),
            })],
        );
        let settings = SafetySettings::default();
        let descriptor = safe_descriptor("m1pump");

        let first = gate.evaluate(&descriptor, &settings).await;
        let second = gate.evaluate(&descriptor, &settings).await;
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rpc_failure_fails_closed() {
        let gate = SafetyGate::new(Arc::new(StubChain { status: None }));
        let settings = SafetySettings::default();
        let verdict = gate.evaluate(&safe_descriptor("m1pump"), &settings).await;
        assert!(!verdict.pass);
        assert!(verdict.reason.unwrap().starts_with("error"));
    }

    #[tokio::test]
    async fn test_expired_verdicts_evicted_from_cache() {
        let gate = SafetyGate::new(renounced_chain());
        let settings = SafetySettings {
            safety_check_period_secs: 1,
            ..SafetySettings::default()
        };

        gate.evaluate(&safe_descriptor("aaapump"), &settings).await;
        assert!(gate.cache.contains_key("aaapump"));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        gate.evaluate(&safe_descriptor("bbbpump"), &settings).await;

        assert!(!gate.cache.contains_key("aaapump"));
        assert!(gate.cache.contains_key("bbbpump"));
    }

    #[tokio::test]
    async fn test_stale_per_mint_windows_pruned() {
        let gate = SafetyGate::new(renounced_chain());
        let settings = SafetySettings {
            block_counter_scope: BlockCounterScope::PerMint,
            ..SafetySettings::default()
        };

        gate.record_buy("aaapump", &settings);
        tokio::time::sleep(BLOCK_WINDOW + Duration::from_millis(50)).await;
        gate.record_buy("bbbpump", &settings);

        assert_eq!(gate.counter.per_mint.len(), 1);
        assert!(gate.counter.per_mint.contains_key("bbbpump"));
    }

    #[tokio::test]
    async fn test_block_counter_blocks_after_limit() {
        let gate = SafetyGate::new(renounced_chain());
        let settings = SafetySettings::default();
        for _ in 0..settings.max_same_block_buys {
            gate.record_buy("m1pump", &settings);
        }

        let verdict = gate.evaluate(&safe_descriptor("m1pump"), &settings).await;
        assert!(!verdict.pass);
        assert_eq!(verdict.failing_check, Some("block_buy_rate"));
    }
}
