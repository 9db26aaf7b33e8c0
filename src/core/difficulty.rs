use crate::config::ConsensusParams;
use crate::core::Block;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentReason {
    InsufficientBlocks,
    TooFast,
    TooSlow,
    Stable,
}

/// Read-only view of where the governor stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyReport {
    pub base_difficulty: u32,
    pub avg_block_time_secs: f64,
    pub blocks_until_adjustment: usize,
    pub reason: AdjustmentReason,
}

/// Base difficulty state machine.
///
/// Whenever the tip index is a positive multiple of `adjustment_interval`, the
/// mean gap over the most recent window is compared with the fast/slow
/// thresholds and the tip's base moves by one step, clamped to
/// `[min_difficulty, max_difficulty]`. The result rides in the next sealed
/// block, so whichever node mines it carries the adjustment forward.
#[derive(Debug, Clone)]
pub struct DifficultyGovernor {
    base_difficulty: u32,
    params: ConsensusParams,
}

impl DifficultyGovernor {
    pub fn new(params: &ConsensusParams) -> Self {
        DifficultyGovernor {
            base_difficulty: params.clamp_difficulty(params.initial_difficulty),
            params: params.clone(),
        }
    }

    pub fn base_difficulty(&self) -> u32 {
        self.base_difficulty
    }

    /// Mean gap in milliseconds across `window`, skipping the genesis
    /// timestamp and non-increasing pairs, each gap capped at 5x target.
    pub fn average_block_time_ms(&self, window: &[Block]) -> Option<f64> {
        let cap = self.params.block_time_cap_ms() as i64;
        let gaps: Vec<i64> = window
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (&pair[0], &pair[1]);
                let gap = next.get_timestamp() - prev.get_timestamp();
                (prev.get_timestamp() > 0 && gap > 0).then(|| gap.min(cap))
            })
            .collect();
        if gaps.is_empty() {
            return None;
        }
        Some(gaps.iter().sum::<i64>() as f64 / gaps.len() as f64)
    }

    fn classify(&self, avg_ms: f64) -> AdjustmentReason {
        if avg_ms < (self.params.fast_threshold_secs * 1000) as f64 {
            AdjustmentReason::TooFast
        } else if avg_ms > (self.params.slow_threshold_secs * 1000) as f64 {
            AdjustmentReason::TooSlow
        } else {
            AdjustmentReason::Stable
        }
    }

    /// One step from `base` over a window: +1 when too fast, -1 when too slow, clamped.
    fn step(&self, base: u32, window: &[Block]) -> u32 {
        let Some(avg_ms) = self.average_block_time_ms(window) else {
            return self.params.clamp_difficulty(base);
        };
        let proposed = match self.classify(avg_ms) {
            AdjustmentReason::TooFast => base.saturating_add(1),
            AdjustmentReason::TooSlow => base.saturating_sub(1),
            _ => base,
        };
        self.params.clamp_difficulty(proposed)
    }

    /// Base difficulty the block after `chain`'s tip must carry.
    ///
    /// The tip's own base, stepped once over the last `adjustment_interval`
    /// blocks when the tip index is a positive multiple of the interval. It
    /// depends only on the chain, so any miner derives the same value and it
    /// survives restarts and chain adoption.
    pub fn next_base_difficulty(&self, chain: &[Block]) -> u32 {
        let Some(tip) = chain.last() else {
            return self.params.clamp_difficulty(self.params.initial_difficulty);
        };
        let interval = self.params.adjustment_interval;
        let tip_base = tip.get_base_difficulty();
        let index = tip.get_index() as usize;
        if index == 0 || index % interval != 0 {
            return self.params.clamp_difficulty(tip_base);
        }
        let start = chain.len().saturating_sub(interval);
        self.step(tip_base, &chain[start..])
    }

    /// Re-derive the base from `chain` after any append, adoption or restart.
    pub fn sync_from_chain(&mut self, chain: &[Block]) -> u32 {
        let next = self.next_base_difficulty(chain);
        let height = chain.last().map(Block::get_index).unwrap_or_default();
        self.set_base(next, &format!("chain tip {height}"));
        self.base_difficulty
    }

    fn set_base(&mut self, next: u32, source: &str) {
        if next != self.base_difficulty {
            info!(
                "Base difficulty from {source}: {} -> {next}",
                self.base_difficulty
            );
        }
        self.base_difficulty = next;
    }

    pub fn report(&self, chain: &[Block]) -> DifficultyReport {
        let interval = self.params.adjustment_interval;
        let mined = chain.len().saturating_sub(1);
        let start = chain.len().saturating_sub(interval);
        let avg_ms = self
            .average_block_time_ms(&chain[start..])
            .unwrap_or(self.params.target_block_time_ms as f64);
        let reason = if chain.len() < interval {
            AdjustmentReason::InsufficientBlocks
        } else {
            self.classify(avg_ms)
        };
        DifficultyReport {
            base_difficulty: self.base_difficulty,
            avg_block_time_secs: avg_ms / 1000.0,
            blocks_until_adjustment: interval - (mined % interval),
            reason,
        }
    }
}
