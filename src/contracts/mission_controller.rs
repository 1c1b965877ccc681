//! Mission controller contract client.

use anyhow::Result;
use std::sync::Arc;

use super::{ContractCall, ContractInvoker, InvokeReceipt};
use crate::soroban::keys::Keypair;
use crate::soroban::scval::{self, FromScVal};
use crate::types::{ChainPrice, ContractFailure, Mission, MissionError, MissionParams, UserStake};

pub struct MissionControllerClient {
    invoker: Arc<dyn ContractInvoker>,
    contract_id: String,
}

impl MissionControllerClient {
    pub fn new(invoker: Arc<dyn ContractInvoker>, contract_id: &str) -> Self {
        Self {
            invoker,
            contract_id: contract_id.to_string(),
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    fn call(&self, function: &str, args: Vec<stellar_xdr::curr::ScVal>) -> ContractCall {
        ContractCall::new(&self.contract_id, function, args)
    }

    // ----- Call builders -----

    pub fn initialize_call(
        &self,
        admin: &str,
        reflector_reader: &str,
        kale_token: &str,
    ) -> Result<ContractCall> {
        Ok(self.call(
            "initialize",
            vec![
                scval::address(admin)?,
                scval::address(reflector_reader)?,
                scval::address(kale_token)?,
            ],
        ))
    }

    pub fn check_and_create_mission_call(&self, caller: &str) -> Result<ContractCall> {
        Ok(self.call("check_and_create_mission", vec![scval::address(caller)?]))
    }

    pub fn create_mission_call(&self, caller: &str, params: &MissionParams) -> Result<ContractCall> {
        Ok(self.call(
            "create_mission",
            vec![
                scval::address(caller)?,
                scval::i128(params.target_liquidity),
                scval::i128(params.reward_pool),
                scval::u64(params.duration_hours),
                scval::i128(params.trigger_price),
            ],
        ))
    }

    pub fn enlist_call(&self, user: &str, mission_id: u64, kale_amount: i128) -> Result<ContractCall> {
        Ok(self.call(
            "enlist",
            vec![
                scval::address(user)?,
                scval::u64(mission_id),
                scval::i128(kale_amount),
            ],
        ))
    }

    pub fn add_contribution_call(
        &self,
        user: &str,
        mission_id: u64,
        amount: i128,
        proof: &[u8],
    ) -> Result<ContractCall> {
        Ok(self.call(
            "add_contribution",
            vec![
                scval::address(user)?,
                scval::u64(mission_id),
                scval::i128(amount),
                scval::bytes(proof)?,
            ],
        ))
    }

    // ----- Reads -----

    pub async fn get_mission(&self, mission_id: u64) -> Result<Mission> {
        let v = self
            .invoker
            .simulate(&self.call("get_mission", vec![scval::u64(mission_id)]))
            .await?;
        Ok(Mission::from_scval(&v)?)
    }

    pub async fn get_user_stake(&self, user: &str, mission_id: u64) -> Result<UserStake> {
        let call = self.call(
            "get_user_stake",
            vec![scval::address(user)?, scval::u64(mission_id)],
        );
        let v = self.invoker.simulate(&call).await?;
        Ok(UserStake::from_scval(&v)?)
    }

    pub async fn get_current_price(&self) -> Result<ChainPrice> {
        let v = self
            .invoker
            .simulate(&self.call("get_current_price", vec![]))
            .await?;
        Ok(ChainPrice::from_scval(&v)?)
    }

    // ----- Writes -----

    pub async fn initialize(
        &self,
        admin: &Keypair,
        reflector_reader: &str,
        kale_token: &str,
    ) -> Result<InvokeReceipt> {
        let call = self.initialize_call(&admin.public_key(), reflector_reader, kale_token)?;
        self.invoker.invoke(&call, admin).await
    }

    /// Ask the contract to compare the reader's price with its own
    /// threshold; returns the new mission id if one was created.
    pub async fn check_and_create_mission(&self, caller: &Keypair) -> Result<Option<u64>> {
        let call = self.check_and_create_mission_call(&caller.public_key())?;
        let receipt = self.invoker.invoke(&call, caller).await?;
        receipt.decode("check_and_create_mission")
    }

    /// Admin-only. Returns the new mission id.
    pub async fn create_mission(&self, admin: &Keypair, params: &MissionParams) -> Result<u64> {
        let call = self.create_mission_call(&admin.public_key(), params)?;
        let receipt = self.invoker.invoke(&call, admin).await?;
        receipt.decode("create_mission")
    }

    /// Dry-run `create_mission` for `caller` without signing. Used to check
    /// that non-admin callers are rejected.
    pub async fn simulate_create_mission(&self, caller: &str, params: &MissionParams) -> Result<u64> {
        let v = self
            .invoker
            .simulate(&self.create_mission_call(caller, params)?)
            .await?;
        Ok(u64::from_scval(&v)?)
    }

    pub async fn enlist(
        &self,
        user: &Keypair,
        mission_id: u64,
        kale_amount: i128,
    ) -> Result<InvokeReceipt> {
        let call = self.enlist_call(&user.public_key(), mission_id, kale_amount)?;
        self.invoker.invoke(&call, user).await
    }

    pub async fn add_contribution(
        &self,
        user: &Keypair,
        mission_id: u64,
        amount: i128,
        proof: &[u8],
    ) -> Result<InvokeReceipt> {
        let call = self.add_contribution_call(&user.public_key(), mission_id, amount, proof)?;
        self.invoker.invoke(&call, user).await
    }

    /// The highest existing mission, found by scanning ids upward from 1
    /// until the first missing one (at most `max_missions` lookups).
    pub async fn latest_mission(&self, max_missions: u64) -> Result<Option<Mission>> {
        Ok(self.list_missions(max_missions).await?.pop())
    }

    /// All missions with ids `1..` up to the first missing id. Any other
    /// failure (RPC, decode) aborts the scan.
    pub async fn list_missions(&self, max_missions: u64) -> Result<Vec<Mission>> {
        let mut missions = Vec::new();
        for id in 1..=max_missions {
            match self.get_mission(id).await {
                Ok(m) => missions.push(m),
                Err(e) if is_missing_mission(&e) => {
                    tracing::debug!(id, "Stopping mission scan at first missing id");
                    break;
                }
                Err(e) => return Err(e.context(format!("get_mission({id})"))),
            }
        }
        Ok(missions)
    }
}

fn is_missing_mission(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<MissionError>()
            .and_then(MissionError::contract_failure),
        Some(ContractFailure::NotFound)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MockContractInvoker;
    use stellar_xdr::curr::ScVal;

    const CONTROLLER: &str = "CAYN6HSE7E6MH2PYKQ6VPRLOUUQVX735UUMM45Y76IJETJUWU6K67IOA";

    fn mission_val(id: u64) -> ScVal {
        scval::record(vec![
            ("id", scval::u64(id)),
            ("target_liquidity", scval::i128(100_000_000_000)),
            ("current_progress", scval::i128(0)),
            ("reward_pool", scval::i128(50_000_000_000)),
            ("deadline", scval::u64(1_700_000_000)),
            ("active", ScVal::Bool(true)),
            ("trigger_price", scval::i128(1_000_000)),
            ("participants_count", scval::u32(0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_mission_call_args() {
        let client = MissionControllerClient::new(Arc::new(MockContractInvoker::new()), CONTROLLER);
        let admin = Keypair::random();
        let params = MissionParams {
            target_liquidity: 100_000_000_000,
            reward_pool: 50_000_000_000,
            duration_hours: 24,
            trigger_price: 1_000_000,
        };
        let call = client.create_mission_call(&admin.public_key(), &params).unwrap();
        assert_eq!(call.function, "create_mission");
        assert_eq!(call.contract_id, CONTROLLER);
        assert_eq!(call.args.len(), 5);
        assert_eq!(call.args[3], ScVal::U64(24));
        assert_eq!(i128::from_scval(&call.args[4]).unwrap(), 1_000_000);
    }

    #[test]
    fn test_add_contribution_carries_proof_bytes() {
        let client = MissionControllerClient::new(Arc::new(MockContractInvoker::new()), CONTROLLER);
        let user = Keypair::random();
        let call = client
            .add_contribution_call(&user.public_key(), 2, 5_000_000, b"proof")
            .unwrap();
        assert!(matches!(call.args[3], ScVal::Bytes(_)));
    }

    #[test]
    fn test_bad_address_rejected() {
        let client = MissionControllerClient::new(Arc::new(MockContractInvoker::new()), CONTROLLER);
        assert!(client.enlist_call("not-an-address", 1, 1).is_err());
    }

    #[tokio::test]
    async fn test_get_mission_decodes() {
        let mut mock = MockContractInvoker::new();
        mock.expect_simulate()
            .withf(|call| call.function == "get_mission" && call.args == vec![ScVal::U64(3)])
            .returning(|_| Ok(mission_val(3)));
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        let m = client.get_mission(3).await.unwrap();
        assert_eq!(m.id, 3);
        assert_eq!(m.reward_pool, 50_000_000_000);
    }

    #[tokio::test]
    async fn test_list_missions_stops_at_first_gap() {
        let mut mock = MockContractInvoker::new();
        mock.expect_simulate().returning(|call| match &call.args[0] {
            ScVal::U64(id) if *id <= 2 => Ok(mission_val(*id)),
            _ => Err(MissionError::Contract {
                function: "get_mission".into(),
                failure: ContractFailure::NotFound,
            }
            .into()),
        });
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        let missions = client.list_missions(50).await.unwrap();
        assert_eq!(missions.len(), 2);

        let latest = client.latest_mission(50).await.unwrap().unwrap();
        assert_eq!(latest.id, 2);
    }

    #[tokio::test]
    async fn test_latest_mission_none_when_empty() {
        let mut mock = MockContractInvoker::new();
        mock.expect_simulate().returning(|call| {
            Err(crate::contracts::contract_error(&call.function, "Error(Context, MissingValue)").into())
        });
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        assert!(client.latest_mission(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_propagates_rpc_failure() {
        let mut mock = MockContractInvoker::new();
        mock.expect_simulate().returning(|call| match &call.args[0] {
            ScVal::U64(1) => Ok(mission_val(1)),
            _ => Err(anyhow::anyhow!("connection refused")),
        });
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);

        let err = client.list_missions(50).await.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert!(client.latest_mission(50).await.is_err());
    }

    #[tokio::test]
    async fn test_scan_propagates_decode_failure() {
        let mut mock = MockContractInvoker::new();
        mock.expect_simulate().returning(|_| Ok(ScVal::Bool(true)));
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        assert!(client.list_missions(5).await.is_err());
    }

    #[tokio::test]
    async fn test_create_mission_returns_id() {
        let mut mock = MockContractInvoker::new();
        mock.expect_invoke()
            .withf(|call, _| call.function == "create_mission")
            .returning(|_, _| {
                Ok(InvokeReceipt {
                    hash: "feed".into(),
                    ledger: Some(1),
                    return_value: Some(ScVal::U64(7)),
                })
            });
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        let admin = Keypair::random();
        let params = MissionParams {
            target_liquidity: 1,
            reward_pool: 1,
            duration_hours: 1,
            trigger_price: 1,
        };
        assert_eq!(client.create_mission(&admin, &params).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_check_and_create_mission_none() {
        let mut mock = MockContractInvoker::new();
        mock.expect_invoke().returning(|_, _| {
            Ok(InvokeReceipt {
                hash: "00".into(),
                ledger: None,
                return_value: Some(ScVal::Void),
            })
        });
        let client = MissionControllerClient::new(Arc::new(mock), CONTROLLER);
        let caller = Keypair::random();
        assert_eq!(client.check_and_create_mission(&caller).await.unwrap(), None);
    }
}
