//! Transaction assembly and signing for contract invocations.
//!
//! Every transaction carries exactly one `InvokeHostFunction` operation.
//! The flow is build → simulate → [`apply_simulation`] → sign → send.

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, Hash, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, Limits,
    Memo, MuxedAccount, Operation, OperationBody, Preconditions, ReadXdr, ScAddress, ScSymbol,
    ScVal, SequenceNumber, Signature, SignatureHint, StringM, TimeBounds, TimePoint, Transaction,
    TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

use super::keys::{parse_contract_id, Keypair};
use super::rpc::SimulationOutcome;
use crate::types::MissionError;

/// Inclusion fee offered before the simulated resource fee is added.
pub const BASE_FEE: u32 = 100_000;

/// Validity window for transactions the service signs itself.
pub const SERVICE_TIMEOUT_SECS: u64 = 300;

/// Validity window for transactions handed to a wallet for signing.
pub const WALLET_TIMEOUT_SECS: u64 = 30;

/// `sha256(passphrase)`, the network id mixed into every signature.
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// An `InvokeHostFunction` operation calling `function` on a contract.
pub fn invoke_operation(
    contract_id: &str,
    function: &str,
    args: Vec<ScVal>,
) -> Result<Operation, MissionError> {
    let contract_address = ScAddress::Contract(Hash(parse_contract_id(contract_id)?));
    let function_name = ScSymbol(StringM::try_from(function)?);
    Ok(Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function: HostFunction::InvokeContract(InvokeContractArgs {
                contract_address,
                function_name,
                args: args.try_into()?,
            }),
            auth: VecM::default(),
        }),
    })
}

/// Wrap one operation in an unsimulated transaction.
///
/// `sequence` is the sequence number the transaction will consume
/// (account sequence + 1).
pub fn build_transaction(
    source: [u8; 32],
    sequence: i64,
    operation: Operation,
    timeout_secs: u64,
) -> Result<Transaction, MissionError> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Ok(Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(source)),
        fee: BASE_FEE,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(now + timeout_secs),
        }),
        memo: Memo::None,
        operations: vec![operation].try_into()?,
        ext: TransactionExt::V0,
    })
}

/// Fold a simulation result into the transaction: resource data, the
/// resource fee and any authorization entries the host asked for.
pub fn apply_simulation(
    tx: Transaction,
    sim: &SimulationOutcome,
) -> Result<Transaction, MissionError> {
    let mut tx = tx;
    let mut operations = tx.operations.to_vec();
    for op in operations.iter_mut() {
        if let OperationBody::InvokeHostFunction(invoke) = &mut op.body {
            if invoke.auth.is_empty() && !sim.auth.is_empty() {
                invoke.auth = sim.auth.clone().try_into()?;
            }
        }
    }
    tx.operations = operations.try_into()?;

    let resource_fee = u32::try_from(sim.min_resource_fee)
        .map_err(|_| MissionError::Xdr(format!("resource fee {} overflows", sim.min_resource_fee)))?;
    tx.fee = tx.fee.saturating_add(resource_fee);

    if let Some(data) = &sim.transaction_data {
        tx.ext = TransactionExt::V1(data.clone());
    }
    Ok(tx)
}

/// Hash that signers sign: `sha256(network_id || ENVELOPE_TYPE_TX || tx)`.
pub fn transaction_hash(tx: &Transaction, passphrase: &str) -> Result<[u8; 32], MissionError> {
    let payload = TransactionSignaturePayload {
        network_id: Hash(network_id(passphrase)),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Sign `tx` with `keypair` and wrap it in an envelope.
pub fn sign(
    tx: Transaction,
    keypair: &Keypair,
    passphrase: &str,
) -> Result<TransactionEnvelope, MissionError> {
    let hash = transaction_hash(&tx, passphrase)?;
    let signature = DecoratedSignature {
        hint: SignatureHint(keypair.signature_hint()),
        signature: Signature(keypair.sign(&hash).to_vec().try_into()?),
    };
    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: vec![signature].try_into()?,
    }))
}

/// An envelope with no signatures, for simulation or wallet signing.
pub fn unsigned_envelope(tx: Transaction) -> TransactionEnvelope {
    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    })
}

pub fn encode_envelope(envelope: &TransactionEnvelope) -> Result<String, MissionError> {
    Ok(envelope.to_xdr_base64(Limits::none())?)
}

pub fn decode_envelope(xdr: &str) -> Result<TransactionEnvelope, MissionError> {
    Ok(TransactionEnvelope::from_xdr_base64(xdr.trim(), Limits::none())?)
}

/// Hex hash of a (possibly wallet-signed) envelope, as RPC reports it.
pub fn envelope_hash(envelope: &TransactionEnvelope, passphrase: &str) -> Result<String, MissionError> {
    match envelope {
        TransactionEnvelope::Tx(v1) => Ok(hex::encode(transaction_hash(&v1.tx, passphrase)?)),
        _ => Err(MissionError::Validation(
            "only v1 transaction envelopes are supported".into(),
        )),
    }
}
