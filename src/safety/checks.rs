//! Individual safety checks
//!
//! Each check is an independent predicate over a [`CheckContext`]. The gate
//! runs them in a fixed order and stops at the first failure. A check that
//! cannot obtain the data it needs must fail with an "error" reason rather
//! than pass — inability to verify is unsafe.

use crate::chain::MintStatus;
use crate::settings::SafetySettings;
use crate::token_info::TokenDescriptor;

/// Holders whose shares differ by less than this are bundle candidates
pub const BUNDLE_EPSILON_PCT: f64 = 0.1;

/// Holders below this share are ignored by bundle detection
pub const BUNDLE_MIN_SHARE_PCT: f64 = 1.0;

/// `Err(reason)` is a failed check
pub type CheckResult = std::result::Result<(), String>;

/// Everything a check may consult. `mint_status` is `None` when the
/// on-chain fetch failed; checks that need it must fail closed.
pub struct CheckContext<'a> {
    pub descriptor: &'a TokenDescriptor,
    pub settings: &'a SafetySettings,
    pub mint_status: Option<MintStatus>,
    /// Buys already counted in the current block window
    pub block_buys: u32,
}

/// One predicate in the gate's sequence
pub trait SafetyCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult;
}

/// The gate's fixed check order
pub fn default_checks() -> Vec<Box<dyn SafetyCheck>> {
    vec![
        Box::new(TopHolderConcentration),
        Box::new(BundledWallets),
        Box::new(BlockBuyRate),
        Box::new(SocialsPresent),
        Box::new(LiquidityBurnt),
        Box::new(ImmutableMetadata),
        Box::new(MintAuthorityRenounced),
        Box::new(FreezeAuthorityRenounced),
        Box::new(PumpFunMigrated),
        Box::new(MinimumPoolSize),
    ]
}

/// Check 1: combined share of the ten largest holders
pub struct TopHolderConcentration;

impl SafetyCheck for TopHolderConcentration {
    fn name(&self) -> &'static str {
        "top_holder_concentration"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.descriptor.holders.is_empty() {
            return Err("error: holder data unavailable".to_string());
        }
        let top10: f64 = ctx.descriptor.holders.iter().take(10).map(|h| h.pct).sum();
        if top10 > ctx.settings.top10_holders_max_pct {
            return Err(format!(
                "top 10 holders own {:.1}% (max {:.1}%)",
                top10, ctx.settings.top10_holders_max_pct
            ));
        }
        Ok(())
    }
}

/// Check 2: similarly-sized holder balances suspected of common control.
/// Weak heuristic, kept as a placeholder for stronger clustering.
pub struct BundledWallets;

impl BundledWallets {
    /// Total share held by addresses that match at least one other
    /// address within [`BUNDLE_EPSILON_PCT`].
    fn bundled_pct(descriptor: &TokenDescriptor) -> f64 {
        let shares: Vec<f64> = descriptor
            .holders
            .iter()
            .map(|h| h.pct)
            .filter(|p| *p >= BUNDLE_MIN_SHARE_PCT)
            .collect();

        let mut bundled = vec![false; shares.len()];
        for i in 0..shares.len() {
            for j in (i + 1)..shares.len() {
                if (shares[i] - shares[j]).abs() < BUNDLE_EPSILON_PCT {
                    bundled[i] = true;
                    bundled[j] = true;
                }
            }
        }

        shares
            .iter()
            .zip(&bundled)
            .filter(|(_, b)| **b)
            .map(|(p, _)| *p)
            .sum()
    }
}

impl SafetyCheck for BundledWallets {
    fn name(&self) -> &'static str {
        "bundled_wallets"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let bundled = Self::bundled_pct(ctx.descriptor);
        if bundled > ctx.settings.bundled_max_pct {
            return Err(format!(
                "bundled wallets hold {:.1}% (max {:.1}%)",
                bundled, ctx.settings.bundled_max_pct
            ));
        }
        Ok(())
    }
}

/// Check 3: buys already executed in the current block window
pub struct BlockBuyRate;

impl SafetyCheck for BlockBuyRate {
    fn name(&self) -> &'static str {
        "block_buy_rate"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.block_buys >= ctx.settings.max_same_block_buys {
            return Err(format!(
                "{} buys already in current block (max {})",
                ctx.block_buys, ctx.settings.max_same_block_buys
            ));
        }
        Ok(())
    }
}

/// Check 4: social links present
pub struct SocialsPresent;

impl SafetyCheck for SocialsPresent {
    fn name(&self) -> &'static str {
        "socials_present"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.settings.require_socials && !ctx.descriptor.has_socials {
            return Err("no social links".to_string());
        }
        Ok(())
    }
}

/// Check 5: liquidity-burn proxy. No direct burn proof is available from
/// the feeds, so a pool at or above the configured minimum stands in.
pub struct LiquidityBurnt;

impl SafetyCheck for LiquidityBurnt {
    fn name(&self) -> &'static str {
        "liquidity_burnt"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if !ctx.settings.require_liquidity_burnt {
            return Ok(());
        }
        if ctx.descriptor.liquidity_usd <= 0.0 {
            return Err("error: liquidity unknown".to_string());
        }
        if ctx.descriptor.liquidity_usd < ctx.settings.min_pool_size {
            return Err(format!(
                "liquidity ${:.0} below burn-proxy minimum ${:.0}",
                ctx.descriptor.liquidity_usd, ctx.settings.min_pool_size
            ));
        }
        Ok(())
    }
}

/// Check 6: immutable-metadata flag. Best-effort: no metadata-account
/// query is wired up, so presence of the mint account is the only signal.
pub struct ImmutableMetadata;

impl SafetyCheck for ImmutableMetadata {
    fn name(&self) -> &'static str {
        "immutable_metadata"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.settings.require_immutable_metadata && ctx.mint_status.is_none() {
            return Err("error: mint account unavailable".to_string());
        }
        Ok(())
    }
}

/// Check 7: mint authority renounced on-chain
pub struct MintAuthorityRenounced;

impl SafetyCheck for MintAuthorityRenounced {
    fn name(&self) -> &'static str {
        "mint_authority_renounced"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if !ctx.settings.require_mint_authority_renounced {
            return Ok(());
        }
        match &ctx.mint_status {
            None => Err("error: mint account unavailable".to_string()),
            Some(status) if !status.mint_authority_renounced => {
                Err("mint authority still active".to_string())
            }
            Some(_) => Ok(()),
        }
    }
}

/// Check 8: freeze authority renounced on-chain
pub struct FreezeAuthorityRenounced;

impl SafetyCheck for FreezeAuthorityRenounced {
    fn name(&self) -> &'static str {
        "freeze_authority_renounced"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if !ctx.settings.require_freeze_authority_renounced {
            return Ok(());
        }
        match &ctx.mint_status {
            None => Err("error: mint account unavailable".to_string()),
            Some(status) if !status.freeze_authority_renounced => {
                Err("freeze authority still active".to_string())
            }
            Some(_) => Ok(()),
        }
    }
}

/// Check 9: token originated on pump.fun
pub struct PumpFunMigrated;

impl SafetyCheck for PumpFunMigrated {
    fn name(&self) -> &'static str {
        "pumpfun_migrated"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.settings.only_pumpfun_migrated && !ctx.descriptor.is_pumpfun() {
            return Err("not a pump.fun token".to_string());
        }
        Ok(())
    }
}

/// Check 10: absolute minimum pool size in USD
pub struct MinimumPoolSize;

impl SafetyCheck for MinimumPoolSize {
    fn name(&self) -> &'static str {
        "minimum_pool_size"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        if ctx.descriptor.liquidity_usd < ctx.settings.min_pool_size {
            return Err(format!(
                "pool ${:.0} below minimum ${:.0}",
                ctx.descriptor.liquidity_usd, ctx.settings.min_pool_size
            ));
        }
        Ok(())
    }
}
