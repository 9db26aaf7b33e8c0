use crate::core::signature::{self, KeyPair};
use crate::core::Transaction;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A voter's key material. The private key never leaves the wallet;
/// nodes only ever see the signed vote and the public key.
#[derive(
    Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode, Zeroize, ZeroizeOnDrop,
)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
    display_name: Option<String>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("voter_id", &self.get_voter_id())
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    pub fn new(display_name: Option<String>) -> Result<Wallet> {
        let keys = signature::generate_keypair()?;
        Ok(Wallet {
            pkcs8: keys.get_pkcs8().to_vec(),
            public_key: keys.get_public_key().to_vec(),
            display_name,
        })
    }

    pub fn get_voter_id(&self) -> String {
        signature::derive_identity(&self.public_key)
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pkcs8(self.pkcs8.clone())
    }

    /// Sign a ballot for `choice` at the current time.
    pub fn cast_vote(&self, choice: &str) -> Result<Transaction> {
        Transaction::new_signed(&self.key_pair()?, choice, self.display_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_vote_is_valid() {
        let wallet = Wallet::new(Some("alice".to_string())).unwrap();
        let tx = wallet.cast_vote("X").unwrap();
        assert!(tx.validate().is_ok());
        assert_eq!(tx.get_voter_id(), wallet.get_voter_id());
        assert_eq!(tx.get_display_name(), Some("alice"));
    }

    #[test]
    fn test_debug_hides_key() {
        let wallet = Wallet::new(None).unwrap();
        let shown = format!("{wallet:?}");
        assert!(shown.contains(&wallet.get_voter_id()));
        assert!(!shown.contains("pkcs8"));
    }
}
