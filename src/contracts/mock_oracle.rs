//! Mock oracle contract client.
//!
//! Prices are in micro units ($0.12 = 120_000). Writes are admin-only.

use anyhow::Result;
use std::sync::Arc;

use super::{ContractCall, ContractInvoker, InvokeReceipt};
use crate::soroban::keys::Keypair;
use crate::soroban::scval::{self, FromScVal};
use crate::types::{MissionError, OraclePrice};

pub struct MockOracleClient {
    invoker: Arc<dyn ContractInvoker>,
    contract_id: String,
}

impl MockOracleClient {
    pub fn new(invoker: Arc<dyn ContractInvoker>, contract_id: &str) -> Self {
        Self {
            invoker,
            contract_id: contract_id.to_string(),
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn update_price_call(&self, admin: &str, asset: &str, new_price: i128) -> Result<ContractCall> {
        if new_price <= 0 {
            return Err(MissionError::Validation(format!("price must be positive, got {new_price}")).into());
        }
        Ok(ContractCall::new(
            &self.contract_id,
            "update_price",
            vec![scval::address(admin)?, scval::string(asset)?, scval::i128(new_price)],
        ))
    }

    /// Drops above 100 % would drive the price negative; they are clamped.
    pub fn simulate_price_drop_call(
        &self,
        admin: &str,
        asset: &str,
        drop_pct: u32,
    ) -> Result<ContractCall> {
        Ok(ContractCall::new(
            &self.contract_id,
            "simulate_price_drop",
            vec![
                scval::address(admin)?,
                scval::string(asset)?,
                scval::u32(drop_pct.min(100)),
            ],
        ))
    }

    pub async fn initialize(&self, admin: &Keypair) -> Result<InvokeReceipt> {
        let call = ContractCall::new(
            &self.contract_id,
            "initialize",
            vec![scval::address(&admin.public_key())?],
        );
        self.invoker.invoke(&call, admin).await
    }

    pub async fn get_price(&self, asset: &str) -> Result<OraclePrice> {
        let call = ContractCall::new(&self.contract_id, "get_price", vec![scval::string(asset)?]);
        let v = self.invoker.simulate(&call).await?;
        Ok(OraclePrice::from_scval(&v)?)
    }

    pub async fn update_price(
        &self,
        admin: &Keypair,
        asset: &str,
        new_price: i128,
    ) -> Result<InvokeReceipt> {
        let call = self.update_price_call(&admin.public_key(), asset, new_price)?;
        self.invoker.invoke(&call, admin).await
    }

    /// Lower the stored price by `drop_pct` percent; returns the new price.
    pub async fn simulate_price_drop(&self, admin: &Keypair, asset: &str, drop_pct: u32) -> Result<i128> {
        let call = self.simulate_price_drop_call(&admin.public_key(), asset, drop_pct)?;
        let receipt = self.invoker.invoke(&call, admin).await?;
        receipt.decode("simulate_price_drop")
    }
}
