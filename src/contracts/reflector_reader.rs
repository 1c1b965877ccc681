//! Reflector reader contract client.
//!
//! The reader wraps Reflector's price feeds. Prices carry the feed's own
//! decimals (see `get_oracle_decimals`); a zero price means the feed had
//! no data for the asset.

use anyhow::Result;
use std::sync::Arc;

use super::{ContractCall, ContractInvoker, InvokeReceipt};
use crate::soroban::keys::Keypair;
use crate::soroban::scval::{self, FromScVal};
use crate::types::ChainPrice;

pub struct ReflectorReaderClient {
    invoker: Arc<dyn ContractInvoker>,
    contract_id: String,
}

impl ReflectorReaderClient {
    pub fn new(invoker: Arc<dyn ContractInvoker>, contract_id: &str) -> Self {
        Self {
            invoker,
            contract_id: contract_id.to_string(),
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    async fn read<T: FromScVal>(&self, function: &str, args: Vec<stellar_xdr::curr::ScVal>) -> Result<T> {
        let v = self
            .invoker
            .simulate(&ContractCall::new(&self.contract_id, function, args))
            .await?;
        Ok(T::from_scval(&v)?)
    }

    pub async fn initialize(&self, signer: &Keypair, reflector_oracle: &str) -> Result<InvokeReceipt> {
        let call = ContractCall::new(
            &self.contract_id,
            "initialize",
            vec![scval::address(reflector_oracle)?],
        );
        self.invoker.invoke(&call, signer).await
    }

    pub async fn get_btc_price(&self) -> Result<ChainPrice> {
        self.read("get_btc_price", vec![]).await
    }

    pub async fn get_xlm_price(&self) -> Result<ChainPrice> {
        self.read("get_xlm_price", vec![]).await
    }

    pub async fn get_price(&self, symbol: &str) -> Result<ChainPrice> {
        self.read("get_price", vec![scval::symbol(symbol)?]).await
    }

    pub async fn check_price_drop_threshold(&self, symbol: &str, threshold_pct: u32) -> Result<bool> {
        self.read(
            "check_price_drop_threshold",
            vec![scval::symbol(symbol)?, scval::u32(threshold_pct)],
        )
        .await
    }

    pub async fn get_gbp_price(&self, forex_oracle: &str) -> Result<ChainPrice> {
        self.read("get_gbp_price", vec![scval::address(forex_oracle)?])
            .await
    }

    pub async fn get_cross_price(&self, base: &str, quote: &str) -> Result<ChainPrice> {
        self.read(
            "get_cross_price",
            vec![scval::symbol(base)?, scval::symbol(quote)?],
        )
        .await
    }

    /// Shorthand XLM drop check.
    pub async fn chk_drop(&self, threshold_pct: u32) -> Result<bool> {
        self.read("chk_drop", vec![scval::u32(threshold_pct)]).await
    }

    pub async fn get_oracle_decimals(&self) -> Result<u32> {
        self.read("get_oracle_decimals", vec![]).await
    }

    /// `(timestamp, price)` pairs between two ledger timestamps.
    pub async fn get_price_history(&self, from: u64, to: u64) -> Result<Vec<(u64, i128)>> {
        self.read("get_price_history", vec![scval::u64(from), scval::u64(to)])
            .await
    }
}
