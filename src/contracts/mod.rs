//! Contract bindings.
//!
//! Defines the `ContractInvoker` trait (how a call reaches the chain) and
//! typed clients for the three deployed contracts:
//! - `mission_controller`: missions, enlistment, contributions
//! - `mock_oracle`: admin-settable test prices
//! - `reflector_reader`: wrapper over the Reflector price feeds

pub mod mission_controller;
pub mod mock_oracle;
pub mod reflector_reader;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use stellar_xdr::curr::ScVal;
use tracing::{debug, info, warn};

use crate::soroban::horizon::HorizonClient;
use crate::soroban::keys::{parse_account_id, Keypair};
use crate::soroban::rpc::{SendStatus, SimulationOutcome, SorobanRpc, TransactionStatus};
use crate::soroban::scval::FromScVal;
use crate::soroban::transaction::{self, SERVICE_TIMEOUT_SECS, WALLET_TIMEOUT_SECS};
use crate::types::{ContractFailure, MissionError};

pub use mission_controller::MissionControllerClient;
pub use mock_oracle::MockOracleClient;
pub use reflector_reader::ReflectorReaderClient;

/// One contract function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub contract_id: String,
    pub function: String,
    pub args: Vec<ScVal>,
}

impl ContractCall {
    pub fn new(contract_id: &str, function: &str, args: Vec<ScVal>) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            function: function.to_string(),
            args,
        }
    }
}

/// A write that reached a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeReceipt {
    pub hash: String,
    pub ledger: Option<u32>,
    pub return_value: Option<ScVal>,
}

impl InvokeReceipt {
    /// Decode the function's return value.
    pub fn decode<T: FromScVal>(&self, function: &str) -> Result<T> {
        match &self.return_value {
            Some(v) => Ok(T::from_scval(v)?),
            None => bail!(MissionError::Decode(format!(
                "{function} returned no value (tx {})",
                self.hash
            ))),
        }
    }
}

/// A simulated, unsigned transaction handed to a wallet for signing.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedTransaction {
    /// Base64 `TransactionEnvelope` with no signatures.
    pub xdr: String,
    pub hash: String,
    pub fee: u32,
    pub network_passphrase: String,
}

/// How contract calls reach the chain.
///
/// Reads are simulated only. Writes are simulated, assembled, signed and
/// submitted, or prepared for an external signer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractInvoker: Send + Sync {
    /// Simulate a read-only call and return its value.
    async fn simulate(&self, call: &ContractCall) -> Result<ScVal>;

    /// Submit a call signed by `signer` and wait for the result.
    async fn invoke(&self, call: &ContractCall, signer: &Keypair) -> Result<InvokeReceipt>;

    /// Build a simulated, unsigned transaction for `source` to sign.
    async fn prepare(&self, call: &ContractCall, source: &str) -> Result<PreparedTransaction>;

    /// Submit a base64 envelope already signed elsewhere.
    async fn submit_signed(&self, envelope_xdr: &str) -> Result<InvokeReceipt>;
}

/// Map a simulation failure onto a typed contract error.
pub fn contract_error(function: &str, diagnostic: &str) -> MissionError {
    MissionError::Contract {
        function: function.to_string(),
        failure: ContractFailure::classify(diagnostic),
    }
}

// ---------------------------------------------------------------------------
// RPC-backed invoker
// ---------------------------------------------------------------------------

/// Invoker backed by Soroban RPC (simulation, submission) and Horizon
/// (sequence numbers).
pub struct SorobanInvoker {
    rpc: SorobanRpc,
    horizon: HorizonClient,
    passphrase: String,
    confirm_timeout: Duration,
}

impl SorobanInvoker {
    pub fn new(rpc: SorobanRpc, horizon: HorizonClient, passphrase: &str) -> Self {
        Self {
            rpc,
            horizon,
            passphrase: passphrase.to_string(),
            confirm_timeout: Duration::from_secs(SERVICE_TIMEOUT_SECS),
        }
    }

    pub fn rpc(&self) -> &SorobanRpc {
        &self.rpc
    }

    pub fn horizon(&self) -> &HorizonClient {
        &self.horizon
    }

    async fn run_simulation(
        &self,
        call: &ContractCall,
        tx: stellar_xdr::curr::Transaction,
    ) -> Result<SimulationOutcome> {
        let envelope = transaction::unsigned_envelope(tx);
        let sim = self
            .rpc
            .simulate(&transaction::encode_envelope(&envelope)?)
            .await?;
        if let Some(diagnostic) = &sim.error {
            debug!(function = %call.function, diagnostic = %diagnostic, "Simulation failed");
            bail!(contract_error(&call.function, diagnostic));
        }
        Ok(sim)
    }

    /// Build and simulate a transaction from `source`, returning it with
    /// the simulation applied.
    async fn assemble(
        &self,
        call: &ContractCall,
        source: [u8; 32],
        account_id: &str,
        timeout_secs: u64,
    ) -> Result<stellar_xdr::curr::Transaction> {
        let account = self.horizon.account(account_id).await?;
        let sequence = account.sequence()? + 1;
        let op = transaction::invoke_operation(&call.contract_id, &call.function, call.args.clone())?;
        let tx = transaction::build_transaction(source, sequence, op, timeout_secs)?;
        let sim = self.run_simulation(call, tx.clone()).await?;
        Ok(transaction::apply_simulation(tx, &sim)?)
    }

    async fn send_and_confirm(&self, envelope_xdr: &str, function: &str) -> Result<InvokeReceipt> {
        let sent = self.rpc.send(envelope_xdr).await?;
        match &sent.status {
            SendStatus::Pending | SendStatus::Duplicate => {}
            SendStatus::TryAgainLater => bail!(MissionError::Transaction {
                hash: sent.hash,
                status: "TRY_AGAIN_LATER".into(),
            }),
            SendStatus::Error(result_xdr) => {
                warn!(function, hash = %sent.hash, result = ?result_xdr, "Transaction rejected");
                bail!(MissionError::Transaction {
                    hash: sent.hash,
                    status: "ERROR".into(),
                });
            }
        }
        info!(function, hash = %sent.hash, "Transaction submitted");

        match self
            .rpc
            .wait_for_transaction(&sent.hash, self.confirm_timeout)
            .await?
        {
            TransactionStatus::Success {
                ledger,
                return_value,
            } => {
                info!(function, hash = %sent.hash, ledger = ?ledger, "Transaction confirmed");
                Ok(InvokeReceipt {
                    hash: sent.hash,
                    ledger,
                    return_value,
                })
            }
            TransactionStatus::Failed { .. } => bail!(MissionError::Transaction {
                hash: sent.hash,
                status: "FAILED".into(),
            }),
            TransactionStatus::NotFound => bail!(MissionError::Transaction {
                hash: sent.hash,
                status: "NOT_FOUND".into(),
            }),
        }
    }
}

#[async_trait]
impl ContractInvoker for SorobanInvoker {
    async fn simulate(&self, call: &ContractCall) -> Result<ScVal> {
        // Read-only calls need no real source account.
        let op = transaction::invoke_operation(&call.contract_id, &call.function, call.args.clone())?;
        let tx = transaction::build_transaction([0u8; 32], 0, op, SERVICE_TIMEOUT_SECS)?;
        let sim = self.run_simulation(call, tx).await?;
        Ok(sim.result.unwrap_or(ScVal::Void))
    }

    async fn invoke(&self, call: &ContractCall, signer: &Keypair) -> Result<InvokeReceipt> {
        let tx = self
            .assemble(
                call,
                signer.public_key_bytes(),
                &signer.public_key(),
                SERVICE_TIMEOUT_SECS,
            )
            .await?;
        let envelope = transaction::sign(tx, signer, &self.passphrase)?;
        let xdr = transaction::encode_envelope(&envelope)?;
        self.send_and_confirm(&xdr, &call.function).await
    }

    async fn prepare(&self, call: &ContractCall, source: &str) -> Result<PreparedTransaction> {
        let source_key = parse_account_id(source)?;
        let tx = self
            .assemble(call, source_key, source, WALLET_TIMEOUT_SECS)
            .await?;
        let fee = tx.fee;
        let hash = hex::encode(transaction::transaction_hash(&tx, &self.passphrase)?);
        let xdr = transaction::encode_envelope(&transaction::unsigned_envelope(tx))?;
        Ok(PreparedTransaction {
            xdr,
            hash,
            fee,
            network_passphrase: self.passphrase.clone(),
        })
    }

    async fn submit_signed(&self, envelope_xdr: &str) -> Result<InvokeReceipt> {
        let envelope = transaction::decode_envelope(envelope_xdr)?;
        let stellar_xdr::curr::TransactionEnvelope::Tx(v1) = &envelope else {
            bail!(MissionError::Validation(
                "only v1 transaction envelopes are supported".into()
            ));
        };
        if v1.signatures.is_empty() {
            bail!(MissionError::Validation("transaction is not signed".into()));
        }
        let function = invoked_function(&v1.tx).unwrap_or_else(|| "unknown".into());
        self.send_and_confirm(&transaction::encode_envelope(&envelope)?, &function)
            .await
    }
}

/// Name of the contract function a transaction invokes, if any.
fn invoked_function(tx: &stellar_xdr::curr::Transaction) -> Option<String> {
    use stellar_xdr::curr::{HostFunction, OperationBody};
    tx.operations.iter().find_map(|op| match &op.body {
        OperationBody::InvokeHostFunction(invoke) => match &invoke.host_function {
            HostFunction::InvokeContract(args) => {
                Some(args.function_name.0.to_utf8_string_lossy())
            }
            _ => None,
        },
        _ => None,
    })
}
