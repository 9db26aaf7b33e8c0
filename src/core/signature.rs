//! Signature codec
//!
//! ECDSA P-256/SHA-256 over a canonical `voter_id:choice:timestamp` message.
//! Key material is passed in by the caller and never stored here.

use crate::error::Result;
use crate::utils::{
    ecdsa_p256_public_key, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, sha256_hex,
};
use data_encoding::HEXLOWER;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Hex characters of the public-key digest kept as the voter id.
pub const VOTER_ID_LEN: usize = 16;

/// Separator between canonical message fields.
pub const MESSAGE_DELIMITER: char = ':';

/// PKCS#8 private key plus its uncompressed public key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl KeyPair {
    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<KeyPair> {
        let public_key = ecdsa_p256_public_key(&pkcs8)?;
        Ok(KeyPair { pkcs8, public_key })
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn public_key_hex(&self) -> String {
        HEXLOWER.encode(&self.public_key)
    }

    pub fn voter_id(&self) -> String {
        derive_identity(&self.public_key)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("voter_id", &self.voter_id())
            .finish_non_exhaustive()
    }
}

pub fn generate_keypair() -> Result<KeyPair> {
    KeyPair::from_pkcs8(new_key_pair()?)
}

pub fn sign(pkcs8: &[u8], message: &str) -> Result<Vec<u8>> {
    ecdsa_p256_sha256_sign_digest(pkcs8, message.as_bytes())
}

/// Never fails: malformed keys or signatures simply do not verify.
pub fn verify(public_key: &[u8], message: &str, signature: &[u8]) -> bool {
    if public_key.is_empty() || signature.is_empty() {
        return false;
    }
    ecdsa_p256_sha256_sign_verify(public_key, signature, message.as_bytes())
}

/// Same as [`verify`] for the hex-encoded fields carried in transactions.
pub fn verify_hex(public_key_hex: &str, message: &str, signature_hex: &str) -> bool {
    let (Ok(public_key), Ok(signature)) = (
        HEXLOWER.decode(public_key_hex.as_bytes()),
        HEXLOWER.decode(signature_hex.as_bytes()),
    ) else {
        return false;
    };
    verify(&public_key, message, &signature)
}

/// Voter id = first [`VOTER_ID_LEN`] hex chars of SHA-256(public key).
pub fn derive_identity(public_key: &[u8]) -> String {
    let mut digest = sha256_hex(public_key);
    digest.truncate(VOTER_ID_LEN);
    digest
}

/// Identity for a hex-encoded key; `None` if the hex is malformed.
pub fn derive_identity_hex(public_key_hex: &str) -> Option<String> {
    HEXLOWER
        .decode(public_key_hex.as_bytes())
        .ok()
        .map(|bytes| derive_identity(&bytes))
}

pub fn canonical_message(voter_id: &str, choice: &str, timestamp: i64) -> String {
    format!("{voter_id}{MESSAGE_DELIMITER}{choice}{MESSAGE_DELIMITER}{timestamp}")
}
