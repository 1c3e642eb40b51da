//! Token metadata resolution
//!
//! Queries a ranked list of market-data sources and normalizes the first
//! usable answer into one [`TokenDescriptor`]. Discovery must not halt
//! because one data provider is down: every source call is bounded by a
//! short timeout, and if everything fails the resolver returns an
//! "unknown"-tagged descriptor with zero-valued fields. Callers must treat
//! zero price/liquidity as "no data", not a literal zero.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::error::Result;

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";
const PUMPFUN_API_BASE: &str = "https://frontend-api.pump.fun";

/// Per-source fetch timeout
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// One holder's share of supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderShare {
    pub address: String,
    pub pct: f64,
}

/// Immutable snapshot of everything we know about a token. Re-fetched,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    /// USD price; 0.0 means unknown
    pub price_usd: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub liquidity_usd: f64,
    /// Largest holders, ordered by share descending
    pub holders: Vec<HolderShare>,
    pub has_socials: bool,
    /// Which feed produced this descriptor
    pub source: String,
}

impl TokenDescriptor {
    /// Zero-valued descriptor for a mint no source could describe
    pub fn unknown(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            name: String::new(),
            symbol: String::new(),
            price_usd: 0.0,
            market_cap: 0.0,
            volume_24h: 0.0,
            liquidity_usd: 0.0,
            holders: Vec::new(),
            has_socials: false,
            source: "unknown".to_string(),
        }
    }

    /// Whether any source produced real data
    pub fn has_data(&self) -> bool {
        self.source != "unknown"
    }

    /// Check if this is a pump.fun token (mint ends with "pump")
    pub fn is_pumpfun(&self) -> bool {
        self.mint.ends_with("pump") || self.source == "pumpfun"
    }
}

/// A single external metadata source
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch a descriptor; `Ok(None)` means the source had nothing useful
    async fn fetch(&self, mint: &str) -> Result<Option<TokenDescriptor>>;
}

// ---------------------------------------------------------------------------
// DexScreener
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct TokenPairsResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Deserialize)]
struct DexPair {
    #[serde(rename = "dexId")]
    dex_id: String,
    #[serde(rename = "baseToken")]
    base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    volume: Option<Volume>,
    liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    info: Option<PairInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct BaseToken {
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Volume {
    h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairInfo {
    websites: Option<Vec<LinkEntry>>,
    socials: Option<Vec<LinkEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LinkEntry {
    #[allow(dead_code)]
    url: Option<String>,
}

/// DexScreener pair lookup
pub struct DexScreenerSource {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerSource {
    pub fn new() -> Self {
        Self::with_base_url(DEXSCREENER_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SOURCE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }

    fn pair_to_descriptor(mint: &str, pair: &DexPair) -> TokenDescriptor {
        let has_socials = pair
            .info
            .as_ref()
            .map(|info| {
                info.socials.as_ref().map_or(false, |s| !s.is_empty())
                    || info.websites.as_ref().map_or(false, |w| !w.is_empty())
            })
            .unwrap_or(false);

        TokenDescriptor {
            mint: mint.to_string(),
            name: pair.base_token.name.clone().unwrap_or_default(),
            symbol: pair.base_token.symbol.clone().unwrap_or_default(),
            price_usd: pair
                .price_usd
                .as_ref()
                .and_then(|p| p.parse::<f64>().ok())
                .unwrap_or(0.0),
            market_cap: pair.market_cap.unwrap_or(0.0),
            volume_24h: pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0),
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
            holders: Vec::new(),
            has_socials,
            source: "dexscreener".to_string(),
        }
    }
}

impl Default for DexScreenerSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for DexScreenerSource {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn fetch(&self, mint: &str) -> Result<Option<TokenDescriptor>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let resp = self.client.get(&url).send().await?;
        let data: TokenPairsResponse = resp.json().await?;

        let Some(pairs) = data.pairs else {
            return Ok(None);
        };

        // Prefer pumpswap/pumpfun pairs
        let pair = pairs
            .iter()
            .find(|p| p.dex_id == "pumpswap" || p.dex_id == "pumpfun")
            .or_else(|| pairs.first());

        Ok(pair.map(|p| Self::pair_to_descriptor(mint, p)))
    }
}

// ---------------------------------------------------------------------------
// Pump.fun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct PumpCoin {
    name: Option<String>,
    symbol: Option<String>,
    usd_market_cap: Option<f64>,
    twitter: Option<String>,
    telegram: Option<String>,
    website: Option<String>,
}

/// Pump.fun coin endpoint
pub struct PumpFunSource {
    client: reqwest::Client,
    base_url: String,
}

impl PumpFunSource {
    pub fn new() -> Self {
        Self::with_base_url(PUMPFUN_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SOURCE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for PumpFunSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for PumpFunSource {
    fn name(&self) -> &'static str {
        "pumpfun"
    }

    async fn fetch(&self, mint: &str) -> Result<Option<TokenDescriptor>> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        let resp = self.client.get(&url).send().await?;
        let coin: PumpCoin = resp.json().await?;

        let has_socials = coin.twitter.as_deref().map_or(false, |s| !s.is_empty())
            || coin.telegram.as_deref().map_or(false, |s| !s.is_empty())
            || coin.website.as_deref().map_or(false, |s| !s.is_empty());

        Ok(Some(TokenDescriptor {
            mint: mint.to_string(),
            name: coin.name.unwrap_or_default(),
            symbol: coin.symbol.unwrap_or_default(),
            price_usd: 0.0,
            market_cap: coin.usd_market_cap.unwrap_or(0.0),
            volume_24h: 0.0,
            liquidity_usd: 0.0,
            holders: Vec::new(),
            has_socials,
            source: "pumpfun".to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Walks the ranked source list and returns the first usable descriptor
pub struct TokenInfoResolver {
    sources: Vec<Box<dyn TokenSource>>,
    chain: Arc<dyn ChainClient>,
    source_timeout: Duration,
}

impl TokenInfoResolver {
    pub fn new(sources: Vec<Box<dyn TokenSource>>, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            sources,
            chain,
            source_timeout: SOURCE_TIMEOUT,
        }
    }

    /// Resolve a descriptor for `mint`. Never fails: all-sources failure
    /// yields [`TokenDescriptor::unknown`].
    pub async fn resolve(&self, mint: &str) -> TokenDescriptor {
        for source in &self.sources {
            match tokio::time::timeout(self.source_timeout, source.fetch(mint)).await {
                Ok(Ok(Some(descriptor))) if !descriptor.name.is_empty() => {
                    debug!(mint = %mint, source = source.name(), "Resolved token info");
                    return self.enrich_holders(descriptor).await;
                }
                Ok(Ok(_)) => {
                    debug!(mint = %mint, source = source.name(), "Source had no data");
                }
                Ok(Err(e)) => {
                    warn!(mint = %mint, source = source.name(), error = %e, "Source failed");
                }
                Err(_) => {
                    warn!(mint = %mint, source = source.name(), "Source timed out");
                }
            }
        }

        TokenDescriptor::unknown(mint)
    }

    /// Fill in the holder distribution best-effort from chain data. Holders
    /// the source already provided are kept when the chain has nothing.
    async fn enrich_holders(&self, mut descriptor: TokenDescriptor) -> TokenDescriptor {
        match self.chain.holder_distribution(&descriptor.mint).await {
            Ok(mut holders) if !holders.is_empty() => {
                holders.sort_by(|a, b| b.pct.partial_cmp(&a.pct).unwrap_or(std::cmp::Ordering::Equal));
                descriptor.holders = holders;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(mint = %descriptor.mint, error = %e, "Holder distribution unavailable");
            }
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MintStatus, TokenHolding};
    use crate::error::Error;

    struct NullChain;

    #[async_trait]
    impl ChainClient for NullChain {
        async fn mint_status(&self, _mint: &str) -> Result<MintStatus> {
            Err(Error::Rpc("offline".into()))
        }
        async fn token_balance(&self, _owner: &str, _mint: &str) -> Result<f64> {
            Ok(0.0)
        }
        async fn holdings(&self, _owner: &str) -> Result<Vec<TokenHolding>> {
            Ok(Vec::new())
        }
        async fn holder_distribution(&self, _mint: &str) -> Result<Vec<HolderShare>> {
            Err(Error::Rpc("offline".into()))
        }
    }

    struct FixedSource {
        name: &'static str,
        result: Option<TokenDescriptor>,
        fail: bool,
    }

    #[async_trait]
    impl TokenSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn fetch(&self, _mint: &str) -> Result<Option<TokenDescriptor>> {
            if self.fail {
                return Err(Error::MarketData("down".into()));
            }
            Ok(self.result.clone())
        }
    }

    fn named_descriptor(mint: &str, name: &str, source: &str) -> TokenDescriptor {
        TokenDescriptor {
            name: name.to_string(),
            symbol: "TST".to_string(),
            source: source.to_string(),
            ..TokenDescriptor::unknown(mint)
        }
    }

    #[tokio::test]
    async fn test_first_source_with_name_wins() {
        let resolver = TokenInfoResolver::new(
            vec![
                Box::new(FixedSource {
                    name: "a",
                    result: Some(named_descriptor("m1", "", "a")),
                    fail: false,
                }),
                Box::new(FixedSource {
                    name: "b",
                    result: Some(named_descriptor("m1", "Token B", "b")),
                    fail: false,
                }),
            ],
            Arc::new(NullChain),
        );

        let descriptor = resolver.resolve("m1").await;
        assert_eq!(descriptor.name, "Token B");
        assert_eq!(descriptor.source, "b");
    }

    #[tokio::test]
    async fn test_failing_sources_fall_through_to_unknown() {
        let resolver = TokenInfoResolver::new(
            vec![
                Box::new(FixedSource {
                    name: "a",
                    result: None,
                    fail: true,
                }),
                Box::new(FixedSource {
                    name: "b",
                    result: None,
                    fail: false,
                }),
            ],
            Arc::new(NullChain),
        );

        let descriptor = resolver.resolve("m1").await;
        assert!(!descriptor.has_data());
        assert_eq!(descriptor.source, "unknown");
        assert_eq!(descriptor.price_usd, 0.0);
        assert_eq!(descriptor.liquidity_usd, 0.0);
    }

    #[test]
    fn test_is_pumpfun_suffix() {
        let d = TokenDescriptor::unknown("AbCdpump");
        assert!(d.is_pumpfun());
        let d = TokenDescriptor::unknown("AbCd");
        assert!(!d.is_pumpfun());
    }

    #[test]
    fn test_pair_descriptor_mapping() {
        let pair = DexPair {
            dex_id: "pumpswap".to_string(),
            base_token: BaseToken {
                name: Some("Test Token".to_string()),
                symbol: Some("TEST".to_string()),
            },
            price_usd: Some("0.0042".to_string()),
            volume: Some(Volume { h24: Some(1234.0) }),
            liquidity: Some(Liquidity { usd: Some(9000.0) }),
            market_cap: Some(50_000.0),
            info: Some(PairInfo {
                websites: None,
                socials: Some(vec![LinkEntry { url: None }]),
            }),
        };

        let d = DexScreenerSource::pair_to_descriptor("m1", &pair);
        assert_eq!(d.name, "Test Token");
        assert_eq!(d.price_usd, 0.0042);
        assert_eq!(d.liquidity_usd, 9000.0);
        assert!(d.has_socials);
        assert_eq!(d.source, "dexscreener");
    }
}
