//! In-memory chain for integration testing.
//!
//! Implements `ContractInvoker` over a deterministic model of the three
//! deployed contracts (mission controller, mock oracle, reflector reader).
//! Writes check that the signer matches the address argument, the way
//! `require_auth` does on chain. No network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use stellar_xdr::curr::ScVal;

use kale_missions::contracts::{
    contract_error, ContractCall, ContractInvoker, InvokeReceipt, MissionControllerClient,
    MockOracleClient, PreparedTransaction, ReflectorReaderClient,
};
use kale_missions::soroban::keys::Keypair;
use kale_missions::soroban::scval::{self, FromScVal};
use kale_missions::types::{Mission, MissionError, UserStake};

pub const CONTROLLER: &str = "CAYN6HSE7E6MH2PYKQ6VPRLOUUQVX735UUMM45Y76IJETJUWU6K67IOA";
pub const ORACLE: &str = "CD2F43R6Q2QYOCQGGWBDSC65YBCXPHJ5H4LZEYFGFGBFL65W3PPQUO34";
pub const READER: &str = "CB2JLA7X5TE7KUC2CHSWUU2QJO6Q3HLVTD3BIK65HNE2NPHTS434VDCJ";

/// Reflector prices carry 14 decimals.
pub const REFLECTOR_DECIMALS: u32 = 14;
/// Ledger time the chain starts at.
pub const GENESIS: u64 = 1_700_000_000;

#[derive(Debug, Clone, Default)]
struct ChainState {
    missions: BTreeMap<u64, Mission>,
    stakes: HashMap<(String, u64), UserStake>,
    oracle_prices: HashMap<String, i128>,
    reflector_prices: HashMap<String, i128>,
    /// Every XLM price the reflector has published, oldest first.
    reflector_history: Vec<(u64, i128)>,
    now: u64,
    tx_count: u64,
}

/// A deterministic chain with one admin.
pub struct MockChain {
    admin: String,
    state: Mutex<ChainState>,
    offline: Mutex<bool>,
}

impl MockChain {
    pub fn new(admin: &Keypair) -> Self {
        let state = ChainState {
            now: GENESIS,
            ..Default::default()
        };
        Self {
            admin: admin.public_key(),
            state: Mutex::new(state),
            offline: Mutex::new(false),
        }
    }

    /// Publish a reflector price (14 decimals) and advance the ledger clock.
    pub fn set_reflector_price(&self, symbol: &str, price: i128) {
        let mut state = self.state.lock().unwrap();
        state.now += 300;
        state.reflector_prices.insert(symbol.to_string(), price);
        if symbol == "XLM" {
            let now = state.now;
            state.reflector_history.push((now, price));
        }
    }

    /// Make every call fail as if the RPC endpoint were down.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn mission_count(&self) -> usize {
        self.state.lock().unwrap().missions.len()
    }

    pub fn mission(&self, id: u64) -> Option<Mission> {
        self.state.lock().unwrap().missions.get(&id).cloned()
    }

    pub fn transactions(&self) -> u64 {
        self.state.lock().unwrap().tx_count
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.lock().unwrap() {
            return Err(MissionError::Rpc {
                code: -32603,
                message: "connection refused".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Run `call` against a copy of the state; keep the copy when `commit`.
    fn execute(&self, call: &ContractCall, signer: Option<&str>, commit: bool) -> Result<ScVal> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap().clone();
        let out = match call.contract_id.as_str() {
            CONTROLLER => self.controller(&mut state, call, signer),
            ORACLE => self.oracle(&mut state, call, signer),
            READER => reader(&state, call),
            other => Err(anyhow!("no contract deployed at {other}")),
        }?;
        if commit {
            state.tx_count += 1;
            *self.state.lock().unwrap() = state;
        }
        Ok(out)
    }

    /// `require_auth` on `address`, plus the admin check for admin-only calls.
    fn authorize(
        &self,
        call: &ContractCall,
        address: &str,
        signer: Option<&str>,
        admin_only: bool,
    ) -> Result<()> {
        if let Some(signer) = signer {
            if signer != address {
                return Err(contract_error(&call.function, "HostError: Error(Auth, InvalidAction)").into());
            }
        }
        if admin_only && address != self.admin {
            return Err(contract_error(&call.function, "Unauthorized: only admin").into());
        }
        Ok(())
    }

    fn controller(&self, state: &mut ChainState, call: &ContractCall, signer: Option<&str>) -> Result<ScVal> {
        let a = &call.args;
        match call.function.as_str() {
            "create_mission" => {
                let caller = String::from_scval(&a[0])?;
                self.authorize(call, &caller, signer, true)?;
                let id = state.missions.len() as u64 + 1;
                let mission = Mission {
                    id,
                    target_liquidity: i128::from_scval(&a[1])?,
                    current_progress: 0,
                    reward_pool: i128::from_scval(&a[2])?,
                    deadline: state.now + u64::from_scval(&a[3])? * 3600,
                    active: true,
                    trigger_price: i128::from_scval(&a[4])?,
                    participants_count: 0,
                };
                state.missions.insert(id, mission);
                Ok(scval::u64(id))
            }
            "get_mission" => {
                let id = u64::from_scval(&a[0])?;
                let m = state
                    .missions
                    .get(&id)
                    .ok_or_else(|| contract_error("get_mission", "Error(Context, MissingValue)"))?;
                Ok(mission_val(m)?)
            }
            "enlist" => {
                let user = String::from_scval(&a[0])?;
                let id = u64::from_scval(&a[1])?;
                let amount = i128::from_scval(&a[2])?;
                self.authorize(call, &user, signer, false)?;
                let now = state.now;
                let mission = state
                    .missions
                    .get_mut(&id)
                    .ok_or_else(|| contract_error("enlist", "Error(Context, MissingValue)"))?;
                if !mission.active {
                    return Err(contract_error("enlist", "Mission inactive").into());
                }
                if mission.is_expired(now) {
                    return Err(contract_error("enlist", "Mission expired").into());
                }
                if state.stakes.contains_key(&(user.clone(), id)) {
                    return Err(contract_error("enlist", "User already enlisted").into());
                }
                mission.participants_count += 1;
                state.stakes.insert(
                    (user.clone(), id),
                    UserStake {
                        user,
                        mission_id: id,
                        kale_staked: amount,
                        contribution: 0,
                        enlisted_at: now,
                    },
                );
                Ok(ScVal::Void)
            }
            "add_contribution" => {
                let user = String::from_scval(&a[0])?;
                let id = u64::from_scval(&a[1])?;
                let amount = i128::from_scval(&a[2])?;
                self.authorize(call, &user, signer, false)?;
                let stake = state
                    .stakes
                    .get_mut(&(user, id))
                    .ok_or_else(|| contract_error("add_contribution", "Error(Context, MissingValue)"))?;
                stake.contribution += amount;
                if let Some(m) = state.missions.get_mut(&id) {
                    m.current_progress += amount;
                }
                Ok(ScVal::Void)
            }
            "get_user_stake" => {
                let user = String::from_scval(&a[0])?;
                let id = u64::from_scval(&a[1])?;
                let s = state
                    .stakes
                    .get(&(user, id))
                    .ok_or_else(|| contract_error("get_user_stake", "Error(Context, MissingValue)"))?;
                Ok(scval::record(vec![
                    ("user", scval::address(&s.user)?),
                    ("mission_id", scval::u64(s.mission_id)),
                    ("kale_staked", scval::i128(s.kale_staked)),
                    ("contribution", scval::i128(s.contribution)),
                    ("enlisted_at", scval::u64(s.enlisted_at)),
                ])?)
            }
            "get_current_price" => {
                // The controller reports the reader's XLM price in stroops.
                let price = state.reflector_prices.get("XLM").copied().unwrap_or(0)
                    / 10i128.pow(REFLECTOR_DECIMALS - 7);
                Ok(scval::record(vec![
                    ("price", scval::i128(price)),
                    ("timestamp", scval::u64(state.now)),
                ])?)
            }
            other => Err(anyhow!("mission controller has no function {other}")),
        }
    }

    fn oracle(&self, state: &mut ChainState, call: &ContractCall, signer: Option<&str>) -> Result<ScVal> {
        let a = &call.args;
        match call.function.as_str() {
            "get_price" => {
                let asset = String::from_scval(&a[0])?;
                let price = state.oracle_prices.get(&asset).copied().unwrap_or(0);
                Ok(scval::record(vec![
                    ("asset", scval::string(&asset)?),
                    ("price", scval::i128(price)),
                    ("timestamp", scval::u64(state.now)),
                ])?)
            }
            "update_price" => {
                let admin = String::from_scval(&a[0])?;
                self.authorize(call, &admin, signer, true)?;
                let asset = String::from_scval(&a[1])?;
                state.oracle_prices.insert(asset, i128::from_scval(&a[2])?);
                state.now += 60;
                Ok(ScVal::Void)
            }
            "simulate_price_drop" => {
                let admin = String::from_scval(&a[0])?;
                self.authorize(call, &admin, signer, true)?;
                let asset = String::from_scval(&a[1])?;
                let pct = u32::from_scval(&a[2])? as i128;
                let price = state.oracle_prices.entry(asset).or_insert(0);
                *price = *price * (100 - pct) / 100;
                let new_price = *price;
                state.now += 60;
                Ok(scval::i128(new_price))
            }
            other => Err(anyhow!("mock oracle has no function {other}")),
        }
    }
}

fn reader(state: &ChainState, call: &ContractCall) -> Result<ScVal> {
    let a = &call.args;
    match call.function.as_str() {
        "get_price" => reader_price(state, &String::from_scval(&a[0])?),
        "get_xlm_price" => reader_price(state, "XLM"),
        "get_btc_price" => reader_price(state, "BTC"),
        "get_oracle_decimals" => Ok(scval::u32(REFLECTOR_DECIMALS)),
        "chk_drop" => {
            let threshold = u32::from_scval(&a[0])? as i128;
            let dropped = match state.reflector_history.as_slice() {
                [.., (_, prev), (_, cur)] if *prev > 0 => (prev - cur) * 100 / prev >= threshold,
                _ => false,
            };
            Ok(ScVal::Bool(dropped))
        }
        "get_price_history" => {
            let from = u64::from_scval(&a[0])?;
            let to = u64::from_scval(&a[1])?;
            let points = state
                .reflector_history
                .iter()
                .filter(|(ts, _)| *ts >= from && *ts <= to)
                .map(|(ts, p)| scval::vec(vec![scval::u64(*ts), scval::i128(*p)]))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(scval::vec(points)?)
        }
        other => Err(anyhow!("reflector reader has no function {other}")),
    }
}

/// Unknown feeds read as a zero price, like the deployed reader.
fn reader_price(state: &ChainState, symbol: &str) -> Result<ScVal> {
    let price = state.reflector_prices.get(symbol).copied().unwrap_or(0);
    let timestamp = if price == 0 { 0 } else { state.now };
    Ok(scval::record(vec![
        ("price", scval::i128(price)),
        ("timestamp", scval::u64(timestamp)),
    ])?)
}

fn mission_val(m: &Mission) -> Result<ScVal, MissionError> {
    scval::record(vec![
        ("id", scval::u64(m.id)),
        ("target_liquidity", scval::i128(m.target_liquidity)),
        ("current_progress", scval::i128(m.current_progress)),
        ("reward_pool", scval::i128(m.reward_pool)),
        ("deadline", scval::u64(m.deadline)),
        ("active", ScVal::Bool(m.active)),
        ("trigger_price", scval::i128(m.trigger_price)),
        ("participants_count", scval::u32(m.participants_count)),
    ])
}

#[async_trait]
impl ContractInvoker for MockChain {
    async fn simulate(&self, call: &ContractCall) -> Result<ScVal> {
        self.execute(call, None, false)
    }

    async fn invoke(&self, call: &ContractCall, signer: &Keypair) -> Result<InvokeReceipt> {
        let value = self.execute(call, Some(&signer.public_key()), true)?;
        let count = self.transactions();
        Ok(InvokeReceipt {
            hash: format!("{count:064x}"),
            ledger: Some(1000 + count as u32),
            return_value: Some(value),
        })
    }

    async fn prepare(&self, call: &ContractCall, source: &str) -> Result<PreparedTransaction> {
        // Dry run so contract failures surface before signing.
        self.execute(call, Some(source), false)?;
        Ok(PreparedTransaction {
            xdr: format!("unsigned:{}:{}", call.function, source),
            hash: format!("{:064x}", self.transactions() + 1),
            fee: 100,
            network_passphrase: "Test SDF Network ; September 2015".into(),
        })
    }

    async fn submit_signed(&self, envelope_xdr: &str) -> Result<InvokeReceipt> {
        self.check_online()?;
        if envelope_xdr.is_empty() {
            return Err(MissionError::Xdr("empty envelope".into()).into());
        }
        let mut state = self.state.lock().unwrap();
        state.tx_count += 1;
        Ok(InvokeReceipt {
            hash: format!("{:064x}", state.tx_count),
            ledger: Some(1000 + state.tx_count as u32),
            return_value: None,
        })
    }
}

/// Typed clients over one shared `MockChain`.
pub struct Deployment {
    pub chain: Arc<MockChain>,
    pub admin: Keypair,
}

impl Deployment {
    pub fn new() -> Self {
        let admin = Keypair::random();
        Self {
            chain: Arc::new(MockChain::new(&admin)),
            admin,
        }
    }

    fn invoker(&self) -> Arc<dyn ContractInvoker> {
        self.chain.clone()
    }

    pub fn controller(&self) -> MissionControllerClient {
        MissionControllerClient::new(self.invoker(), CONTROLLER)
    }

    pub fn oracle(&self) -> MockOracleClient {
        MockOracleClient::new(self.invoker(), ORACLE)
    }

    pub fn reader(&self) -> ReflectorReaderClient {
        ReflectorReaderClient::new(self.invoker(), READER)
    }

    pub fn shared_invoker(&self) -> Arc<dyn ContractInvoker> {
        self.invoker()
    }
}

/// `usd` at 14 decimals.
pub fn reflector_units(usd: f64) -> i128 {
    (usd * 1e14).round() as i128
}

// ---------------------------------------------------------------------------
// Self-tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mock_chain_rejects_non_admin_create() {
    let d = Deployment::new();
    let stranger = Keypair::random();
    let params = kale_missions::types::MissionParams {
        target_liquidity: 1,
        reward_pool: 1,
        duration_hours: 1,
        trigger_price: 1,
    };
    let err = d.controller().create_mission(&stranger, &params).await.unwrap_err();
    let failure = err.downcast_ref::<MissionError>().and_then(|e| e.contract_failure());
    assert_eq!(failure, Some(&kale_missions::types::ContractFailure::Unauthorized));
    assert_eq!(d.chain.mission_count(), 0);
}

#[tokio::test]
async fn test_mock_chain_offline() {
    let d = Deployment::new();
    d.chain.set_offline(true);
    assert!(d.reader().get_xlm_price().await.is_err());
    d.chain.set_offline(false);
    assert!(d.reader().get_xlm_price().await.unwrap().is_missing());
}
