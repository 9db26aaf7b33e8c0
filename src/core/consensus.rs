//! Chain validation and fork choice
//!
//! A chain is accepted only as a whole: every block from genesis to tip must
//! link, recompute, meet its own difficulty and carry a matching Merkle root.
//! Between two chains the longer valid one wins; equal length keeps local.

use crate::config::ConsensusParams;
use crate::core::block::GENESIS_PREVIOUS_HASH;
use crate::core::{Block, ProofOfWork};
use crate::error::{BlockchainError, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkChoice {
    /// Candidate is not longer than the local chain
    KeepLocal,
    /// Candidate is longer and fully valid
    Replace,
}

fn invalid(reason: String) -> BlockchainError {
    BlockchainError::ChainValidation(reason)
}

/// Checks for one non-genesis block given its predecessor.
pub fn validate_block(prev: &Block, block: &Block, params: &ConsensusParams) -> Result<()> {
    let index = block.get_index();
    if index != prev.get_index() + 1 {
        return Err(invalid(format!(
            "block {index} follows block {}",
            prev.get_index()
        )));
    }
    if block.get_previous_hash() != prev.get_hash() {
        return Err(invalid(format!(
            "block {index} does not link to the hash of block {}",
            prev.get_index()
        )));
    }

    let base = block.get_base_difficulty();
    if !(params.min_difficulty..=params.max_difficulty).contains(&base) {
        return Err(invalid(format!(
            "block {index} base difficulty {base} outside [{}, {}]",
            params.min_difficulty, params.max_difficulty
        )));
    }
    let expected = params.effective_difficulty(base, block.get_miner_stake());
    if block.get_effective_difficulty() != expected {
        return Err(invalid(format!(
            "block {index} claims difficulty {} but stake {} on base {base} allows {expected}",
            block.get_effective_difficulty(),
            block.get_miner_stake()
        )));
    }

    if !ProofOfWork::validate(block) {
        return Err(invalid(format!(
            "block {index} hash does not recompute or miss its difficulty target"
        )));
    }
    if !block.verify_merkle_root() {
        return Err(invalid(format!("block {index} merkle root mismatch")));
    }

    // Signature checks run in parallel; the first failure in block order is reported.
    let outcomes: Vec<Result<()>> = block
        .get_transactions()
        .par_iter()
        .map(|tx| tx.validate())
        .collect();
    if let Some((position, Err(err))) = outcomes
        .into_iter()
        .enumerate()
        .find(|(_, outcome)| outcome.is_err())
    {
        return Err(invalid(format!(
            "block {index} transaction {position} rejected: {err}"
        )));
    }
    Ok(())
}

fn validate_genesis(candidate: &Block, genesis: &Block) -> Result<()> {
    if candidate.get_index() != 0 || candidate.get_previous_hash() != GENESIS_PREVIOUS_HASH {
        return Err(invalid("first block is not a genesis block".to_string()));
    }
    if candidate != genesis {
        return Err(invalid("genesis block differs from ours".to_string()));
    }
    Ok(())
}

/// Full structural and cryptographic check of `chain` against our `genesis`.
pub fn validate_chain(chain: &[Block], genesis: &Block, params: &ConsensusParams) -> Result<()> {
    let first = chain
        .first()
        .ok_or_else(|| invalid("chain is empty".to_string()))?;
    validate_genesis(first, genesis)?;

    let mut voters: HashSet<&str> = HashSet::new();
    for pair in chain.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        validate_block(prev, block, params)?;
        for tx in block.get_transactions() {
            if !voters.insert(tx.get_voter_id()) {
                return Err(invalid(format!(
                    "voter {} appears twice (again in block {})",
                    tx.get_voter_id(),
                    block.get_index()
                )));
            }
        }
    }
    debug!("Validated chain of {} blocks", chain.len());
    Ok(())
}

pub fn is_chain_valid(chain: &[Block], genesis: &Block, params: &ConsensusParams) -> bool {
    validate_chain(chain, genesis, params).is_ok()
}

/// Longest-valid-chain rule. Length is checked first, so a stale or
/// duplicate offer is dismissed without re-validation.
pub fn resolve(
    local: &[Block],
    candidate: &[Block],
    genesis: &Block,
    params: &ConsensusParams,
) -> Result<ForkChoice> {
    if candidate.len() <= local.len() {
        debug!(
            "Candidate chain ({}) is not longer than local ({})",
            candidate.len(),
            local.len()
        );
        return Ok(ForkChoice::KeepLocal);
    }
    if let Err(err) = validate_chain(candidate, genesis, params) {
        warn!(
            "Rejecting longer candidate chain ({} blocks): {err}",
            candidate.len()
        );
        return Err(err);
    }
    Ok(ForkChoice::Replace)
}
