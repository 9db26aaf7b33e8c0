use crate::config::DIGEST_HEX_WIDTH;
use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::debug;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bits of difficulty per leading zero hex digit
const BITS_PER_UNIT: u32 = 4;

const MAX_NONCE: u64 = u64::MAX;

/// Shared flag that aborts an in-progress nonce search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Nonce search for a block whose SHA-256 hex digest starts with
/// `effective_difficulty` zero digits.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigInt,
}

/// Rejects difficulties of zero or wider than the digest.
pub fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty == 0 || difficulty > DIGEST_HEX_WIDTH {
        return Err(BlockchainError::InvalidDifficulty {
            difficulty,
            max: DIGEST_HEX_WIDTH,
        });
    }
    Ok(())
}

fn target_for(difficulty: u32) -> BigInt {
    let mut target = BigInt::from(1);
    target.shl_assign(256 - difficulty * BITS_PER_UNIT);
    target
}

fn hash_meets_target(hash: &[u8], target: &BigInt) -> bool {
    BigInt::from_bytes_be(Sign::Plus, hash) < *target
}

/// True if a hex digest has at least `difficulty` leading zero digits.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    if check_difficulty(difficulty).is_err() {
        return false;
    }
    match HEXLOWER.decode(hash_hex.as_bytes()) {
        Ok(hash) if hash.len() * 2 == DIGEST_HEX_WIDTH as usize => {
            hash_meets_target(&hash, &target_for(difficulty))
        }
        _ => false,
    }
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(block: &'a Block) -> Result<ProofOfWork<'a>> {
        let difficulty = block.get_effective_difficulty();
        check_difficulty(difficulty)?;
        Ok(ProofOfWork {
            block,
            target: target_for(difficulty),
        })
    }

    /// Recompute the block's digest and check it against its own effective difficulty.
    pub fn validate(block: &Block) -> bool {
        let Ok(pow) = ProofOfWork::new_proof_of_work(block) else {
            return false;
        };
        let hash = sha256_digest(&block.hash_data(block.get_nonce()));
        HEXLOWER.encode(&hash) == block.get_hash() && hash_meets_target(&hash, &pow.target)
    }

    /// Search nonces from zero. Returns `None` if cancelled or the space is exhausted.
    pub fn run(&self, cancel: &CancelToken) -> Option<(u64, String)> {
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            if cancel.is_cancelled() {
                debug!(
                    "Proof-of-work for block {} cancelled at nonce {nonce}",
                    self.block.get_index()
                );
                return None;
            }
            let hash = sha256_digest(&self.block.hash_data(nonce));
            if hash_meets_target(&hash, &self.target) {
                return Some((nonce, HEXLOWER.encode(&hash)));
            }
            nonce += 1;
        }
        None
    }
}
