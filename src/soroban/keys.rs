//! Stellar key handling.
//!
//! Parses strkey-encoded secrets (`S…`), account ids (`G…`) and contract
//! ids (`C…`), and signs with ed25519.

use ed25519_dalek::{Signer, SigningKey};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use stellar_strkey::{ed25519, Contract};

use crate::types::MissionError;

/// An ed25519 signing identity.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Parse an `S…` secret seed.
    pub fn from_secret(secret: &str) -> Result<Self, MissionError> {
        let key = ed25519::PrivateKey::from_string(secret.trim())
            .map_err(|e| MissionError::InvalidKey(format!("secret seed: {e}")))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&key.0),
        })
    }

    pub fn from_secret_string(secret: &SecretString) -> Result<Self, MissionError> {
        Self::from_secret(secret.expose_secret())
    }

    /// A throwaway identity (used to exercise admin-only entry points).
    pub fn random() -> Self {
        let seed: [u8; 32] = rand::random();
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// `G…` account id.
    pub fn public_key(&self) -> String {
        ed25519::PublicKey(self.public_key_bytes()).to_string()
    }

    /// Last four bytes of the public key, as used in decorated signatures.
    pub fn signature_hint(&self) -> [u8; 4] {
        let pk = self.public_key_bytes();
        [pk[28], pk[29], pk[30], pk[31]]
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Decode a `G…` account id to its raw ed25519 key.
pub fn parse_account_id(account: &str) -> Result<[u8; 32], MissionError> {
    ed25519::PublicKey::from_string(account.trim())
        .map(|k| k.0)
        .map_err(|e| MissionError::InvalidKey(format!("account id {account}: {e}")))
}

/// Decode a `C…` contract id to its raw hash.
pub fn parse_contract_id(contract: &str) -> Result<[u8; 32], MissionError> {
    Contract::from_string(contract.trim())
        .map(|c| c.0)
        .map_err(|e| MissionError::InvalidKey(format!("contract id {contract}: {e}")))
}

pub fn account_id_string(key: [u8; 32]) -> String {
    ed25519::PublicKey(key).to_string()
}

pub fn contract_id_string(hash: [u8; 32]) -> String {
    Contract(hash).to_string()
}
