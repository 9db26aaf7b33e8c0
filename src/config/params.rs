use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Number of hex digits in a SHA-256 digest; no difficulty can exceed it.
pub const DIGEST_HEX_WIDTH: u32 = 64;

/// Network-wide consensus constants.
///
/// Every node on a network must run with the same values, otherwise the
/// stake-discount consistency check in chain validation will reject peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Base difficulty for genesis and fresh nodes
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    /// Governor runs after every this many mined blocks
    pub adjustment_interval: usize,
    /// Mean block time below this raises difficulty
    pub fast_threshold_secs: u64,
    /// Mean block time above this lowers difficulty
    pub slow_threshold_secs: u64,
    /// Fallback block time, also the basis of the outlier cap (5x)
    pub target_block_time_ms: u64,
    pub stake_reward: u64,
    pub stake_divisor: u64,
    pub max_stake_influence: u32,
    pub baseline_stake: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            initial_difficulty: 2,
            min_difficulty: 1,
            max_difficulty: 5,
            adjustment_interval: 3,
            fast_threshold_secs: 15,
            slow_threshold_secs: 20,
            target_block_time_ms: 17_500,
            stake_reward: 1,
            stake_divisor: 7,
            max_stake_influence: 2,
            baseline_stake: 0,
        }
    }
}

impl ConsensusParams {
    /// Cheap parameters for tests and local demos: every block seals at difficulty 1.
    pub fn for_testing() -> Self {
        Self {
            initial_difficulty: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_difficulty == 0 {
            return Err(BlockchainError::Config(
                "min_difficulty must be at least 1".to_string(),
            ));
        }
        if self.min_difficulty > self.max_difficulty {
            return Err(BlockchainError::Config(format!(
                "min_difficulty {} exceeds max_difficulty {}",
                self.min_difficulty, self.max_difficulty
            )));
        }
        if self.max_difficulty > DIGEST_HEX_WIDTH {
            return Err(BlockchainError::Config(format!(
                "max_difficulty {} exceeds digest width {DIGEST_HEX_WIDTH}",
                self.max_difficulty
            )));
        }
        if !(self.min_difficulty..=self.max_difficulty).contains(&self.initial_difficulty) {
            return Err(BlockchainError::Config(format!(
                "initial_difficulty {} is outside [{}, {}]",
                self.initial_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        if self.adjustment_interval < 2 {
            return Err(BlockchainError::Config(
                "adjustment_interval must cover at least two blocks".to_string(),
            ));
        }
        if self.fast_threshold_secs > self.slow_threshold_secs {
            return Err(BlockchainError::Config(format!(
                "fast threshold {}s is above slow threshold {}s",
                self.fast_threshold_secs, self.slow_threshold_secs
            )));
        }
        if self.stake_divisor == 0 {
            return Err(BlockchainError::Config(
                "stake_divisor must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp a difficulty into the configured window.
    pub fn clamp_difficulty(&self, difficulty: u32) -> u32 {
        difficulty.clamp(self.min_difficulty, self.max_difficulty)
    }

    /// Stake-derived discount: `min(stake / divisor, max_stake_influence)`.
    pub fn stake_discount(&self, stake: u64) -> u32 {
        let steps = stake / self.stake_divisor;
        steps.min(self.max_stake_influence as u64) as u32
    }

    /// `max(base - discount, min_difficulty)`.
    pub fn effective_difficulty(&self, base_difficulty: u32, stake: u64) -> u32 {
        base_difficulty
            .saturating_sub(self.stake_discount(stake))
            .max(self.min_difficulty)
    }

    /// Longest single gap the governor will count.
    pub fn block_time_cap_ms(&self) -> u64 {
        self.target_block_time_ms * 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        assert!(ConsensusParams::default().validate().is_ok());
        assert!(ConsensusParams::for_testing().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let params = ConsensusParams {
            min_difficulty: 4,
            max_difficulty: 3,
            ..ConsensusParams::default()
        };
        assert!(matches!(params.validate(), Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_divisor_and_wide_max() {
        let params = ConsensusParams {
            stake_divisor: 0,
            ..ConsensusParams::default()
        };
        assert!(params.validate().is_err());

        let params = ConsensusParams {
            max_difficulty: 65,
            ..ConsensusParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_effective_difficulty_stake_curve() {
        let params = ConsensusParams::default();
        assert_eq!(params.effective_difficulty(4, 0), 4);
        assert_eq!(params.effective_difficulty(4, 6), 4);
        assert_eq!(params.effective_difficulty(4, 7), 3);
        assert_eq!(params.effective_difficulty(4, 14), 2);
        assert_eq!(params.effective_difficulty(4, 20), 2);
        assert_eq!(params.effective_difficulty(4, 1_000), 2);
        // floor holds even when the discount would go below it
        assert_eq!(params.effective_difficulty(2, 14), 1);
        assert_eq!(params.effective_difficulty(1, 14), 1);
    }
}
