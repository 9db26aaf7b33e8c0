//! # Ballot Chain - a signed-vote blockchain
//!
//! Every ballot is an ECDSA P-256 signed vote bound to a voter id derived
//! from the voter's public key. Nodes admit ballots through a ledger guard
//! (signature, identity, one vote per voter), seal them into proof-of-work
//! blocks committed by a Merkle root, and converge on the longest valid chain.
//!
//! ## How the code is organised
//! - `core/`: signatures, votes, Merkle trees, blocks and their proof-of-work,
//!   the difficulty governor, the stake ledger, chain validation and fork choice
//! - `storage/`: the pending pool and the per-node sled store
//! - `network/`: the voting node, peer messages and an in-process network
//! - `wallet/`: voter key custody and ballot signing
//! - `config/`: consensus parameters and node settings
//! - `utils/`: hashing, ECDSA and bincode helpers
//! - `cli/`: command-line interface
//!
//! ## Where to start reading
//! 1. `network/node.rs` for what a node does with ballots, blocks and chains
//! 2. `core/blockchain.rs` for the ledger guard and the vote tally
//! 3. `core/consensus.rs` for what makes a chain valid
//! 4. `core/difficulty.rs` and `core/stake.rs` for how hard each node mines

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{ConsensusParams, Settings};
pub use core::{
    Block, Blockchain, CancelToken, DifficultyGovernor, DifficultyReport, ForkChoice, KeyPair,
    MerkleProof, MerkleTree, MineOutcome, ProofOfWork, ResultsReport, StakeLedger, Transaction,
};
pub use error::{BlockchainError, Result};
pub use network::{
    LocalNetwork, MessageOutcome, NodeStats, PeerBroadcaster, PeerMessage, VotingNode,
};
pub use storage::{MemoryPool, MemoryStore, NodeStore, SledStore};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
pub use wallet::{Wallet, Wallets};
