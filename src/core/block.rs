use crate::config::ConsensusParams;
use crate::core::merkle::{compute_root, MerkleProof, MerkleTree};
use crate::core::{CancelToken, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_hex;
use log::info;
use serde::{Deserialize, Serialize};

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_MINER_ID: &str = "genesis";

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    index: u64,
    timestamp: i64,
    transactions: Vec<Transaction>,
    merkle_root: String,
    previous_hash: String,
    hash: String,
    miner_id: String,
    miner_stake: u64,          // Sealer's stake when the block was mined
    base_difficulty: u32,      // Network base difficulty in force
    effective_difficulty: u32, // Base minus the sealer's stake discount
    nonce: u64,
}

/// Everything a block needs before the nonce search.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub miner_id: String,
    pub miner_stake: u64,
    pub base_difficulty: u32,
    pub effective_difficulty: u32,
}

impl Block {
    /// Compute the Merkle root, then search nonces until the digest meets
    /// `effective_difficulty`. `Ok(None)` means the search was cancelled.
    pub fn seal(template: BlockTemplate, cancel: &CancelToken) -> Result<Option<Block>> {
        let merkle_root = compute_root(&template.transactions);
        let mut block = Block {
            index: template.index,
            timestamp: template.timestamp,
            transactions: template.transactions,
            merkle_root,
            previous_hash: template.previous_hash,
            hash: String::new(),
            miner_id: template.miner_id,
            miner_stake: template.miner_stake,
            base_difficulty: template.base_difficulty,
            effective_difficulty: template.effective_difficulty,
            nonce: 0,
        };

        info!(
            "Starting proof-of-work for block {} with difficulty {} (base {})",
            block.index, block.effective_difficulty, block.base_difficulty
        );
        let found = ProofOfWork::new_proof_of_work(&block)?.run(cancel);
        let Some((nonce, hash)) = found else {
            return Ok(None);
        };
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block {}: {} (nonce {nonce})",
            block.index, block.hash
        );
        Ok(Some(block))
    }

    /// Fixed first block: no votes, timestamp 0. It carries the initial base
    /// difficulty but is sealed at the minimum one, so every node derives the
    /// same genesis cheaply from the same params.
    pub fn genesis(params: &ConsensusParams) -> Result<Block> {
        let template = BlockTemplate {
            index: 0,
            timestamp: 0,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            transactions: vec![],
            miner_id: GENESIS_MINER_ID.to_string(),
            miner_stake: 0,
            base_difficulty: params.clamp_difficulty(params.initial_difficulty),
            effective_difficulty: params.min_difficulty,
        };
        Block::seal(template, &CancelToken::new())?.ok_or_else(|| {
            BlockchainError::InvalidDifficulty {
                difficulty: params.min_difficulty,
                max: crate::config::DIGEST_HEX_WIDTH,
            }
        })
    }

    /// Header bytes hashed for proof-of-work. Votes are committed through the Merkle root.
    pub fn hash_data(&self, nonce: u64) -> Vec<u8> {
        let mut data = vec![];
        data.extend(self.index.to_be_bytes());
        data.extend(self.timestamp.to_be_bytes());
        for field in [
            self.previous_hash.as_str(),
            self.merkle_root.as_str(),
            self.miner_id.as_str(),
        ] {
            data.extend((field.len() as u64).to_be_bytes());
            data.extend(field.as_bytes());
        }
        data.extend(self.miner_stake.to_be_bytes());
        data.extend(self.base_difficulty.to_be_bytes());
        data.extend(self.effective_difficulty.to_be_bytes());
        data.extend(nonce.to_be_bytes());
        data
    }

    pub fn recompute_hash(&self) -> String {
        sha256_hex(&self.hash_data(self.nonce))
    }

    pub fn verify_merkle_root(&self) -> bool {
        compute_root(&self.transactions) == self.merkle_root
    }

    /// Inclusion proof for the vote at `transaction_index`.
    pub fn merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::new(&self.transactions).proof(transaction_index)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle_root.as_str()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_miner_id(&self) -> &str {
        self.miner_id.as_str()
    }

    pub fn get_miner_stake(&self) -> u64 {
        self.miner_stake
    }

    pub fn get_base_difficulty(&self) -> u32 {
        self.base_difficulty
    }

    pub fn get_effective_difficulty(&self) -> u32 {
        self.effective_difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn contains_voter(&self, voter_id: &str) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.get_voter_id() == voter_id)
    }
}

#[cfg(test)]
impl Block {
    // Tamper hooks for validator tests
    pub(crate) fn set_previous_hash(&mut self, previous_hash: &str) {
        self.previous_hash = previous_hash.to_string();
    }

    pub(crate) fn set_merkle_root(&mut self, merkle_root: &str) {
        self.merkle_root = merkle_root.to_string();
    }

    pub(crate) fn set_hash(&mut self, hash: &str) {
        self.hash = hash.to_string();
    }

    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}
