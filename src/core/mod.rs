//! Core ledger functionality
//!
//! This module contains the vote ledger components: signed votes, Merkle
//! commitments, blocks and their proof-of-work, the difficulty governor, the
//! stake ledger, chain validation and fork choice.

pub mod block;
pub mod blockchain;
pub mod consensus;
pub mod difficulty;
pub mod merkle;
pub mod proof_of_work;
pub mod signature;
pub mod stake;
pub mod transaction;

pub use block::{Block, BlockTemplate};
pub use blockchain::{Blockchain, ChoiceCount, MineOutcome, ResultsReport};
pub use consensus::ForkChoice;
pub use difficulty::{AdjustmentReason, DifficultyGovernor, DifficultyReport};
pub use merkle::{MerkleProof, MerkleTree, ProofElement};
pub use proof_of_work::{CancelToken, ProofOfWork};
pub use signature::KeyPair;
pub use stake::{StakeEntry, StakeLedger};
pub use transaction::Transaction;
