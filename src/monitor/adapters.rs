//! Contract-backed implementations of the monitor seams.

use anyhow::Result;
use async_trait::async_trait;

use super::{MissionLauncher, PriceSource};
use crate::contracts::{MissionControllerClient, MockOracleClient, ReflectorReaderClient};
use crate::soroban::keys::Keypair;
use crate::types::{ChainPrice, Mission, MissionParams, MICRO_DECIMALS};

/// Prices from the reflector reader contract.
pub struct ReflectorPriceSource {
    reader: ReflectorReaderClient,
    asset: String,
}

impl ReflectorPriceSource {
    pub fn new(reader: ReflectorReaderClient, asset: &str) -> Self {
        Self {
            reader,
            asset: asset.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for ReflectorPriceSource {
    async fn latest_price(&self) -> Result<ChainPrice> {
        self.reader.get_price(&self.asset).await
    }

    async fn decimals(&self) -> Result<u32> {
        self.reader.get_oracle_decimals().await
    }

    fn label(&self) -> String {
        format!("reflector_reader:{}", self.reader.contract_id())
    }
}

/// Prices from the mock oracle contract (micro units).
pub struct MockOraclePriceSource {
    oracle: MockOracleClient,
    asset: String,
}

impl MockOraclePriceSource {
    pub fn new(oracle: MockOracleClient, asset: &str) -> Self {
        Self {
            oracle,
            asset: asset.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for MockOraclePriceSource {
    async fn latest_price(&self) -> Result<ChainPrice> {
        Ok(self.oracle.get_price(&self.asset).await?.into())
    }

    async fn decimals(&self) -> Result<u32> {
        Ok(MICRO_DECIMALS)
    }

    fn label(&self) -> String {
        format!("mock_oracle:{}", self.oracle.contract_id())
    }
}

/// Launches missions on the mission controller, signed by the admin key.
pub struct ControllerLauncher {
    controller: MissionControllerClient,
    admin: Keypair,
    max_missions: u64,
}

impl ControllerLauncher {
    pub fn new(controller: MissionControllerClient, admin: Keypair, max_missions: u64) -> Self {
        Self {
            controller,
            admin,
            max_missions,
        }
    }
}

#[async_trait]
impl MissionLauncher for ControllerLauncher {
    async fn launch(&self, params: MissionParams) -> Result<u64> {
        self.controller.create_mission(&self.admin, &params).await
    }

    async fn latest_mission(&self) -> Result<Option<Mission>> {
        self.controller.latest_mission(self.max_missions).await
    }

    fn admin(&self) -> String {
        self.admin.public_key()
    }
}
