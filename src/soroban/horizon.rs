//! Horizon REST client: account sequence numbers and balances.
//!
//! API docs: https://developers.stellar.org/docs/data/apis/horizon/api-reference

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Asset code the wallet view reports next to XLM.
pub const KALE_ASSET_CODE: &str = "KALE";

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    /// Current sequence number, as a decimal string.
    pub sequence: String,
    #[serde(default)]
    pub balances: Vec<BalanceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceLine {
    pub balance: String,
    /// "native", "credit_alphanum4", "credit_alphanum12", "liquidity_pool_shares"
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
}

impl AccountRecord {
    pub fn sequence(&self) -> Result<i64> {
        self.sequence
            .parse()
            .with_context(|| format!("Invalid account sequence: {}", self.sequence))
    }

    pub fn native_balance(&self) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset_type == "native")
            .and_then(|b| Decimal::from_str(&b.balance).ok())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn asset_balance(&self, code: &str) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|b| b.asset_code.as_deref() == Some(code))
            .and_then(|b| Decimal::from_str(&b.balance).ok())
    }
}

/// Balances shown for a connected wallet.
#[derive(Debug, Clone, Serialize)]
pub struct WalletBalance {
    pub address: String,
    pub xlm: Decimal,
    pub kale: Option<Decimal>,
}

impl From<&AccountRecord> for WalletBalance {
    fn from(account: &AccountRecord) -> Self {
        WalletBalance {
            address: account.account_id.clone(),
            xlm: account.native_balance(),
            kale: account.asset_balance(KALE_ASSET_CODE),
        }
    }
}

/// Horizon client.
pub struct HorizonClient {
    http: Client,
    base_url: String,
}

impl HorizonClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("kale-missions/0.1")
            .build()
            .context("Failed to build HTTP client for Horizon")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn account(&self, account_id: &str) -> Result<AccountRecord> {
        let url = format!(
            "{}/accounts/{}",
            self.base_url,
            urlencoding::encode(account_id)
        );
        debug!(account_id, "Fetching Horizon account");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Horizon account request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            bail!("Account {account_id} not found (is it funded?)");
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Horizon returned {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse Horizon account response")
    }

    pub async fn wallet_balance(&self, account_id: &str) -> Result<WalletBalance> {
        let account = self.account(account_id).await?;
        Ok(WalletBalance::from(&account))
    }
}
