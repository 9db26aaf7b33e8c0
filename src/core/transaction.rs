// A transaction is one vote: who (voter_id), for what (choice), when, and the
// signature that proves the holder of `public_key` cast it.
// Once signed it is never mutated; it either lands in a block or is discarded.

use crate::core::signature::{self, KeyPair};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, sha256_digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    voter_id: String,     // Truncated hash of the public key
    choice: String,       // Candidate label
    timestamp: i64,       // Creation time in milliseconds
    signature: String,    // Hex ECDSA signature over the canonical message
    public_key: String,   // Hex uncompressed P-256 public key
    #[serde(default)]
    display_name: Option<String>,
}

impl Transaction {
    // Client side: sign a fresh vote with the voter's own key pair
    pub fn new_signed(keys: &KeyPair, choice: &str, display_name: Option<String>) -> Result<Self> {
        Self::new_signed_at(keys, choice, display_name, current_timestamp()?)
    }

    pub fn new_signed_at(
        keys: &KeyPair,
        choice: &str,
        display_name: Option<String>,
        timestamp: i64,
    ) -> Result<Self> {
        let voter_id = keys.voter_id();
        let message = signature::canonical_message(&voter_id, choice, timestamp);
        let sig = signature::sign(keys.get_pkcs8(), &message)?;
        Ok(Transaction {
            voter_id,
            choice: choice.to_string(),
            timestamp,
            signature: HEXLOWER.encode(&sig),
            public_key: keys.public_key_hex(),
            display_name,
        })
    }

    // Node side: rebuild a vote from transport fields; nothing is checked here
    pub fn from_parts(
        voter_id: String,
        choice: String,
        timestamp: i64,
        signature: String,
        public_key: String,
        display_name: Option<String>,
    ) -> Self {
        Transaction {
            voter_id,
            choice,
            timestamp,
            signature,
            public_key,
            display_name,
        }
    }

    pub fn get_voter_id(&self) -> &str {
        self.voter_id.as_str()
    }

    pub fn get_choice(&self) -> &str {
        self.choice.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }

    pub fn get_public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn get_display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn canonical_message(&self) -> String {
        signature::canonical_message(&self.voter_id, &self.choice, self.timestamp)
    }

    pub fn verify_signature(&self) -> bool {
        signature::verify_hex(&self.public_key, &self.canonical_message(), &self.signature)
    }

    /// Signature first, then identity binding. Duplicate checks need chain
    /// context and live in the ledger guard.
    pub fn validate(&self) -> Result<()> {
        if !self.verify_signature() {
            return Err(BlockchainError::InvalidSignature);
        }
        let derived = signature::derive_identity_hex(&self.public_key)
            .ok_or(BlockchainError::InvalidSignature)?;
        if derived != self.voter_id {
            return Err(BlockchainError::IdentityMismatch {
                claimed: self.voter_id.clone(),
                derived,
            });
        }
        Ok(())
    }

    // Length-prefixed encoding of every field, the input to the Merkle leaf hash
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for field in [
            self.voter_id.as_str(),
            self.choice.as_str(),
            self.signature.as_str(),
            self.public_key.as_str(),
        ] {
            bytes.extend((field.len() as u64).to_be_bytes());
            bytes.extend(field.as_bytes());
        }
        bytes.extend(self.timestamp.to_be_bytes());
        match &self.display_name {
            Some(name) => {
                bytes.push(1);
                bytes.extend((name.len() as u64).to_be_bytes());
                bytes.extend(name.as_bytes());
            }
            None => bytes.push(0),
        }
        bytes
    }

    pub fn hash(&self) -> Vec<u8> {
        sha256_digest(&self.canonical_bytes())
    }
}
