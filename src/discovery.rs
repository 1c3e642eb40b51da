//! Token discovery feeds
//!
//! Each feed is one external source of fresh mints. Feeds are polled
//! concurrently every engine iteration; a feed that errors contributes an
//! empty list and a warn line, never an aborted iteration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;

const DEXSCREENER_SEARCH_BASE: &str = "https://api.dexscreener.com";
const PUMPAPI_BASE: &str = "https://pumpapi.fun";

/// Feed HTTP timeout
pub const FEED_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Only pairs younger than this are worth sniping
pub const MAX_PAIR_AGE_SECS: i64 = 120;

/// How many fresh mints to take from the pump.fun feed per poll
pub const PUMPFUN_MINT_LIMIT: usize = 5;

/// A mint one of the feeds surfaced
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCandidate {
    pub mint: String,
    pub source: &'static str,
    pub discovered_at: DateTime<Utc>,
}

impl TokenCandidate {
    pub fn new(mint: &str, source: &'static str) -> Self {
        Self {
            mint: mint.to_string(),
            source,
            discovered_at: Utc::now(),
        }
    }
}

/// One external discovery source
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    fn name(&self) -> &'static str;
    async fn poll(&self) -> Result<Vec<TokenCandidate>>;
}

/// Poll all feeds concurrently and merge, de-duplicating by mint while
/// preserving feed order. Feed failures degrade to empty lists.
pub async fn poll_feeds(feeds: &[Box<dyn DiscoveryFeed>]) -> Vec<TokenCandidate> {
    let results = futures::future::join_all(feeds.iter().map(|feed| async move {
        match feed.poll().await {
            Ok(candidates) => {
                debug!(feed = feed.name(), count = candidates.len(), "Feed polled");
                candidates
            }
            Err(e) => {
                warn!(feed = feed.name(), error = %e, "Feed poll failed");
                Vec::new()
            }
        }
    }))
    .await;

    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for candidate in results.into_iter().flatten() {
        if seen.insert(candidate.mint.clone()) {
            merged.push(candidate);
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// DexScreener fresh pairs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    pairs: Option<Vec<SearchPair>>,
}

#[derive(Debug, Deserialize)]
struct SearchPair {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "baseToken")]
    base_token: SearchBaseToken,
    /// Milliseconds since epoch
    #[serde(rename = "pairCreatedAt")]
    pair_created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchBaseToken {
    address: String,
}

/// Fresh Solana pairs from the DexScreener search endpoint, filtered to
/// pairs created within the last two minutes
pub struct DexScreenerPairsFeed {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerPairsFeed {
    pub fn new() -> Self {
        Self::with_base_url(DEXSCREENER_SEARCH_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FEED_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }

    fn is_fresh(pair: &SearchPair, now_ms: i64) -> bool {
        pair.chain_id == "solana"
            && pair
                .pair_created_at
                .map(|created| (now_ms - created) / 1000 < MAX_PAIR_AGE_SECS)
                .unwrap_or(false)
    }
}

impl Default for DexScreenerPairsFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryFeed for DexScreenerPairsFeed {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn poll(&self) -> Result<Vec<TokenCandidate>> {
        let url = format!("{}/latest/dex/search?q=pump", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let data: SearchResponse = resp.json().await?;

        let now_ms = Utc::now().timestamp_millis();
        Ok(data
            .pairs
            .unwrap_or_default()
            .iter()
            .filter(|p| Self::is_fresh(p, now_ms))
            .map(|p| TokenCandidate::new(&p.base_token.address, "dexscreener"))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Pump.fun newest mints
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewerMintsResponse {
    mint: Option<Vec<String>>,
}

/// Newest pump.fun mints
pub struct PumpFunMintsFeed {
    client: reqwest::Client,
    base_url: String,
}

impl PumpFunMintsFeed {
    pub fn new() -> Self {
        Self::with_base_url(PUMPAPI_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FEED_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for PumpFunMintsFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryFeed for PumpFunMintsFeed {
    fn name(&self) -> &'static str {
        "pumpfun"
    }

    async fn poll(&self) -> Result<Vec<TokenCandidate>> {
        let url = format!(
            "{}/api/get_newer_mints?limit={}",
            self.base_url, PUMPFUN_MINT_LIMIT
        );
        let resp = self.client.get(&url).send().await?;
        let data: NewerMintsResponse = resp.json().await?;

        Ok(data
            .mint
            .unwrap_or_default()
            .iter()
            .take(PUMPFUN_MINT_LIMIT)
            .map(|mint| TokenCandidate::new(mint, "pumpfun"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct StubFeed {
        name: &'static str,
        mints: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl DiscoveryFeed for StubFeed {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn poll(&self) -> Result<Vec<TokenCandidate>> {
            if self.fail {
                return Err(Error::MarketData("feed down".into()));
            }
            Ok(self
                .mints
                .iter()
                .map(|m| TokenCandidate::new(m, self.name))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_poll_feeds_dedups_across_sources() {
        let feeds: Vec<Box<dyn DiscoveryFeed>> = vec![
            Box::new(StubFeed {
                name: "a",
                mints: vec!["m1", "m2"],
                fail: false,
            }),
            Box::new(StubFeed {
                name: "b",
                mints: vec!["m2", "m3"],
                fail: false,
            }),
        ];

        let merged = poll_feeds(&feeds).await;
        let mints: Vec<&str> = merged.iter().map(|c| c.mint.as_str()).collect();
        assert_eq!(mints, vec!["m1", "m2", "m3"]);
        assert_eq!(merged[1].source, "a");
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_abort_iteration() {
        let feeds: Vec<Box<dyn DiscoveryFeed>> = vec![
            Box::new(StubFeed {
                name: "a",
                mints: vec![],
                fail: true,
            }),
            Box::new(StubFeed {
                name: "b",
                mints: vec!["m1"],
                fail: false,
            }),
        ];

        let merged = poll_feeds(&feeds).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].mint, "m1");
    }

    #[test]
    fn test_pair_freshness_filter() {
        let now_ms = Utc::now().timestamp_millis();
        let fresh = SearchPair {
            chain_id: "solana".to_string(),
            base_token: SearchBaseToken {
                address: "m1".to_string(),
            },
            pair_created_at: Some(now_ms - 30_000),
        };
        let stale = SearchPair {
            chain_id: "solana".to_string(),
            base_token: SearchBaseToken {
                address: "m2".to_string(),
            },
            pair_created_at: Some(now_ms - 600_000),
        };
        let wrong_chain = SearchPair {
            chain_id: "base".to_string(),
            base_token: SearchBaseToken {
                address: "m3".to_string(),
            },
            pair_created_at: Some(now_ms - 30_000),
        };

        assert!(DexScreenerPairsFeed::is_fresh(&fresh, now_ms));
        assert!(!DexScreenerPairsFeed::is_fresh(&stale, now_ms));
        assert!(!DexScreenerPairsFeed::is_fresh(&wrong_chain, now_ms));
    }
}
