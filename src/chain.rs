//! On-chain account access
//!
//! Thin wrapper over the Solana JSON-RPC surface the engine actually needs:
//! mint authority flags, token balances, and holder distribution. Behind a
//! trait so safety checks and monitors can run against a mock in tests.

use async_trait::async_trait;
use solana_account_decoder::{UiAccount, UiAccountData};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::token_info::HolderShare;

/// Authority flags read from a mint account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintStatus {
    pub mint_authority_renounced: bool,
    pub freeze_authority_renounced: bool,
}

/// A token held by a wallet
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolding {
    pub mint: String,
    pub amount: f64,
}

/// On-chain queries used by the safety gate and position monitors
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Read mint/freeze authority flags from the mint account
    async fn mint_status(&self, mint: &str) -> Result<MintStatus>;

    /// Current balance of `mint` held by `owner` (0.0 when no account exists)
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64>;

    /// All nonzero token holdings of `owner`
    async fn holdings(&self, owner: &str) -> Result<Vec<TokenHolding>>;

    /// Largest holders of `mint` as percentages of total supply
    async fn holder_distribution(&self, mint: &str) -> Result<Vec<HolderShare>>;
}

/// [`ChainClient`] backed by a Solana RPC endpoint
pub struct RpcChainClient {
    rpc: Arc<RpcClient>,
}

impl RpcChainClient {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new_with_timeout(
                endpoint.to_string(),
                Duration::from_millis(timeout_ms),
            )),
        }
    }

    fn parse_pubkey(value: &str) -> Result<Pubkey> {
        Pubkey::from_str(value).map_err(|_| Error::InvalidAddress(value.to_string()))
    }

    /// Extract (mint, ui amount) from a jsonParsed token account. The RPC
    /// always returns `getTokenAccountsByOwner` results jsonParsed, so this
    /// is the only shape we decode.
    fn parse_token_account(account: &UiAccount) -> Option<TokenHolding> {
        let UiAccountData::Json(parsed) = &account.data else {
            return None;
        };
        if parsed.program != "spl-token" {
            return None;
        }
        let info = parsed.parsed.get("info")?;
        let mint = info.get("mint")?.as_str()?.to_string();
        let token_amount = info.get("tokenAmount")?;
        // uiAmount is null for some tokens; fall back to the string form
        let amount = match token_amount.get("uiAmount").and_then(|v| v.as_f64()) {
            Some(amount) => amount,
            None => token_amount
                .get("uiAmountString")?
                .as_str()?
                .parse()
                .ok()?,
        };
        Some(TokenHolding { mint, amount })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn mint_status(&self, mint: &str) -> Result<MintStatus> {
        let mint_key = Self::parse_pubkey(mint)?;
        let account = self
            .rpc
            .get_account(&mint_key)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to fetch mint account: {}", e)))?;

        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|e| Error::Rpc(format!("Failed to decode mint account: {}", e)))?;

        Ok(MintStatus {
            mint_authority_renounced: state.mint_authority.is_none(),
            freeze_authority_renounced: state.freeze_authority.is_none(),
        })
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64> {
        let owner_key = Self::parse_pubkey(owner)?;
        let mint_key = Self::parse_pubkey(mint)?;

        let accounts = self
            .rpc
            .get_token_accounts_by_owner(&owner_key, TokenAccountsFilter::Mint(mint_key))
            .await
            .map_err(|e| Error::Rpc(format!("Failed to fetch token accounts: {}", e)))?;

        Ok(accounts
            .iter()
            .filter_map(|keyed| Self::parse_token_account(&keyed.account))
            .map(|holding| holding.amount)
            .sum())
    }

    async fn holdings(&self, owner: &str) -> Result<Vec<TokenHolding>> {
        let owner_key = Self::parse_pubkey(owner)?;

        let accounts = self
            .rpc
            .get_token_accounts_by_owner(&owner_key, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await
            .map_err(|e| Error::Rpc(format!("Failed to fetch token accounts: {}", e)))?;

        let holdings: Vec<TokenHolding> = accounts
            .iter()
            .filter_map(|keyed| Self::parse_token_account(&keyed.account))
            .filter(|holding| holding.amount > 0.0)
            .collect();

        debug!(owner = %owner, count = holdings.len(), "Fetched token holdings");
        Ok(holdings)
    }

    async fn holder_distribution(&self, mint: &str) -> Result<Vec<HolderShare>> {
        let mint_key = Self::parse_pubkey(mint)?;

        let supply = self
            .rpc
            .get_token_supply(&mint_key)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to fetch token supply: {}", e)))?;
        let supply_amount = supply.ui_amount.unwrap_or(0.0);
        if supply_amount <= 0.0 {
            return Ok(Vec::new());
        }

        let largest = self
            .rpc
            .get_token_largest_accounts(&mint_key)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to fetch largest accounts: {}", e)))?;

        Ok(largest
            .into_iter()
            .filter_map(|entry| {
                let amount = entry.amount.ui_amount?;
                Some(HolderShare {
                    address: entry.address,
                    pct: amount / supply_amount * 100.0,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use solana_account_decoder::parse_account_data::ParsedAccount;

    #[test]
    fn test_parse_pubkey_rejects_garbage() {
        let err = RpcChainClient::parse_pubkey("not-a-pubkey").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    fn json_token_account(mint: &str, ui_amount: serde_json::Value) -> UiAccount {
        UiAccount {
            lamports: 2_039_280,
            data: UiAccountData::Json(ParsedAccount {
                program: "spl-token".to_string(),
                parsed: json!({
                    "type": "account",
                    "info": {
                        "mint": mint,
                        "owner": "WaLLet111",
                        "tokenAmount": {
                            "amount": "2500000",
                            "decimals": 6,
                            "uiAmount": ui_amount,
                            "uiAmountString": "2.5",
                        },
                    },
                }),
                space: 165,
            }),
            owner: spl_token::id().to_string(),
            executable: false,
            rent_epoch: 0,
            space: Some(165),
        }
    }

    #[test]
    fn test_parses_json_encoded_token_account() {
        let account = json_token_account("m1pump", json!(2.5));
        let holding = RpcChainClient::parse_token_account(&account).unwrap();
        assert_eq!(holding.mint, "m1pump");
        assert_eq!(holding.amount, 2.5);
    }

    #[test]
    fn test_null_ui_amount_falls_back_to_string() {
        let account = json_token_account("m1pump", serde_json::Value::Null);
        let holding = RpcChainClient::parse_token_account(&account).unwrap();
        assert_eq!(holding.amount, 2.5);
    }

    #[test]
    fn test_non_token_program_account_skipped() {
        let mut account = json_token_account("m1pump", json!(2.5));
        if let UiAccountData::Json(parsed) = &mut account.data {
            parsed.program = "stake".to_string();
        }
        assert!(RpcChainClient::parse_token_account(&account).is_none());
    }
}
