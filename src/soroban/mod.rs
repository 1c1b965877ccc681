//! Minimal Soroban client stack.
//!
//! - `keys` : strkey parsing and ed25519 signing
//! - `scval` : Rust ↔ `ScVal` conversion
//! - `transaction` : invoke-contract transaction assembly
//! - `rpc` : Soroban JSON-RPC
//! - `horizon` : account sequence and balances

pub mod horizon;
pub mod keys;
pub mod rpc;
pub mod scval;
pub mod transaction;

pub use keys::Keypair;
pub use rpc::SorobanRpc;
