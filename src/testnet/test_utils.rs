//! Test utilities for multi-node testing

use crate::config::ConsensusParams;
use crate::core::{Block, BlockTemplate, CancelToken, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::{LocalNetwork, VotingNode};
use crate::storage::{NodeStore, SledStore};
use crate::wallet::Wallet;
use std::sync::Arc;
use tempfile::TempDir;

/// Lowest difficulties so sealing stays fast in tests
pub fn test_params() -> ConsensusParams {
    ConsensusParams::for_testing()
}

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// A sled-backed node in a temporary directory
pub fn create_test_node(node_id: &str) -> Result<(VotingNode, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let store = SledStore::open(&temp_dir.path().join(format!("node_{node_id}")))?;
    let node = VotingNode::with_store(node_id, &test_params(), Arc::new(store))?;
    Ok((node, temp_dir))
}

/// A local network whose nodes each persist to their own sled directory
pub fn create_test_network(node_count: usize) -> Result<(LocalNetwork, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let mut stores: Vec<(String, Arc<dyn NodeStore>)> = Vec::new();
    for i in 0..node_count {
        let node_id = format!("node-{i}");
        let store = SledStore::open(&temp_dir.path().join(format!("node_{node_id}")))?;
        stores.push((node_id, Arc::new(store)));
    }
    let network = LocalNetwork::with_stores(&test_params(), stores)?;
    Ok((network, temp_dir))
}

pub fn create_test_wallets(count: usize) -> Result<Vec<Wallet>> {
    (0..count).map(|_| Wallet::new(None)).collect()
}

/// A valid ballot from a fresh voter
pub fn signed_vote(choice: &str) -> Result<Transaction> {
    Wallet::new(None)?.cast_vote(choice)
}

/// Seal `length` blocks on top of `base`, one fresh ballot each.
/// Timestamps step by one second from the base tip.
pub fn create_fork_scenario(base: &[Block], length: usize, miner_id: &str) -> Result<Vec<Block>> {
    let params = test_params();
    let mut chain = base.to_vec();
    for _ in 0..length {
        let prev = chain
            .last()
            .ok_or_else(|| BlockchainError::ChainValidation("empty base chain".to_string()))?;
        let base_difficulty = prev.get_base_difficulty().max(params.min_difficulty);
        let template = BlockTemplate {
            index: prev.get_index() + 1,
            timestamp: prev.get_timestamp() + 1_000,
            previous_hash: prev.get_hash().to_string(),
            transactions: vec![signed_vote("fork")?],
            miner_id: miner_id.to_string(),
            miner_stake: 0,
            base_difficulty,
            effective_difficulty: params.effective_difficulty(base_difficulty, 0),
        };
        let block = Block::seal(template, &CancelToken::new())?
            .ok_or_else(|| BlockchainError::ChainValidation("seal cancelled".to_string()))?;
        chain.push(block);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consensus;

    #[test]
    fn test_create_test_node() {
        let (node, _temp_dir) = create_test_node("solo").unwrap();
        assert_eq!(node.chain_len().unwrap(), 1);
        assert!(node.is_valid().unwrap());
    }

    #[test]
    fn test_create_test_network() {
        let (network, _temp_dir) = create_test_network(3).unwrap();
        assert_eq!(network.nodes().len(), 3);
        assert!(network.converged().unwrap());
    }

    #[test]
    fn test_create_test_wallets_unique() {
        let wallets = create_test_wallets(5).unwrap();
        for i in 0..wallets.len() {
            for j in i + 1..wallets.len() {
                assert_ne!(wallets[i].get_voter_id(), wallets[j].get_voter_id());
            }
        }
    }

    #[test]
    fn test_fork_scenario_is_valid() {
        let genesis = Block::genesis(&test_params()).unwrap();
        let fork = create_fork_scenario(&[genesis.clone()], 3, "forker").unwrap();
        assert_eq!(fork.len(), 4);
        assert!(consensus::is_chain_valid(&fork, &genesis, &test_params()));
    }
}
