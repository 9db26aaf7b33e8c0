//! Voter key custody
//!
//! Wallets hold a voter's ECDSA P-256 key pair and sign ballots locally.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::Wallet;
pub use wallets::{Wallets, WALLET_FILE};
