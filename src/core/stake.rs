use crate::config::ConsensusParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the stake leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeEntry {
    pub node_id: String,
    pub stake: u64,
}

/// Per-node reputation counter.
///
/// Stake only grows, and only when this node seals a block of its own. Peer
/// stake values seen in blocks or chain offers are never written back here.
#[derive(Debug, Clone)]
pub struct StakeLedger {
    stakes: HashMap<String, u64>,
    params: ConsensusParams,
}

impl StakeLedger {
    pub fn new(params: &ConsensusParams) -> Self {
        StakeLedger {
            stakes: HashMap::new(),
            params: params.clone(),
        }
    }

    /// Seed a node's stake from persistence on startup.
    pub fn with_stake(params: &ConsensusParams, node_id: &str, stake: u64) -> Self {
        let mut ledger = Self::new(params);
        ledger.stakes.insert(node_id.to_string(), stake);
        ledger
    }

    pub fn stake_of(&self, node_id: &str) -> u64 {
        self.stakes
            .get(node_id)
            .copied()
            .unwrap_or(self.params.baseline_stake)
    }

    /// Reward a successful seal. Returns the new stake.
    pub fn record_success(&mut self, node_id: &str) -> u64 {
        let baseline = self.params.baseline_stake;
        let stake = self.stakes.entry(node_id.to_string()).or_insert(baseline);
        *stake = stake.saturating_add(self.params.stake_reward);
        *stake
    }

    pub fn discount(&self, node_id: &str) -> u32 {
        self.params.stake_discount(self.stake_of(node_id))
    }

    pub fn effective_difficulty(&self, node_id: &str, base_difficulty: u32) -> u32 {
        self.params
            .effective_difficulty(base_difficulty, self.stake_of(node_id))
    }

    /// Highest stake first, ties by node id.
    pub fn leaderboard(&self) -> Vec<StakeEntry> {
        let mut entries: Vec<StakeEntry> = self
            .stakes
            .iter()
            .map(|(node_id, stake)| StakeEntry {
                node_id: node_id.clone(),
                stake: *stake,
            })
            .collect();
        entries.sort_by(|a, b| b.stake.cmp(&a.stake).then_with(|| a.node_id.cmp(&b.node_id)));
        entries
    }
}
