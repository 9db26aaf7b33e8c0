// Durable node state: the adopted chain and this node's own stake
// I keep one sled database per node, with a tree for blocks and one for stake

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use log::{debug, info};
use sled::{Batch, Db, Tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const BLOCKS_TREE: &str = "blocks"; // Block index (big-endian u64) -> bincode block
const STAKE_TREE: &str = "stake"; // Node id -> big-endian u64 stake
const PENDING_KEY: &str = "pending"; // Default tree: bincode Vec<Transaction>

/// Where a node keeps its chain and stake between runs.
pub trait NodeStore: Send + Sync {
    /// Stored chain in index order. Empty when nothing was saved yet.
    fn load_chain(&self) -> Result<Vec<Block>>;
    /// Replace the stored chain with `blocks`.
    fn save_chain(&self, blocks: &[Block]) -> Result<()>;
    /// Store one block on top of what is already saved.
    fn append_block(&self, block: &Block) -> Result<()>;
    fn load_stake(&self, node_id: &str) -> Result<Option<u64>>;
    fn save_stake(&self, node_id: &str, stake: u64) -> Result<()>;
    /// Votes accepted but not yet sealed, in pool order.
    fn load_pending(&self) -> Result<Vec<Transaction>>;
    fn save_pending(&self, pending: &[Transaction]) -> Result<()>;
}

pub struct SledStore {
    db: Db,
    blocks: Tree,
    stake: Tree,
    path: PathBuf,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let stake = db
            .open_tree(STAKE_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open stake tree: {e}")))?;
        info!("Opened node store at {}", path.display());
        Ok(SledStore {
            db,
            blocks,
            stake,
            path: path.to_path_buf(),
        })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}

impl NodeStore for SledStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        // Big-endian keys iterate in index order
        let mut chain = Vec::new();
        for entry in self.blocks.iter() {
            let (_, value) = entry
                .map_err(|e| BlockchainError::Database(format!("Failed to read block: {e}")))?;
            chain.push(deserialize::<Block>(&value)?);
        }
        debug!("Loaded {} blocks from {}", chain.len(), self.path.display());
        Ok(chain)
    }

    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for block in blocks {
            batch.insert(block.get_index().to_be_bytes().to_vec(), serialize(block)?);
        }
        // Drop anything past the new tip left over from a longer old chain
        for entry in self.blocks.range((blocks.len() as u64).to_be_bytes()..) {
            let (key, _) = entry
                .map_err(|e| BlockchainError::Database(format!("Failed to scan blocks: {e}")))?;
            batch.remove(key);
        }
        self.blocks
            .apply_batch(batch)
            .map_err(|e| BlockchainError::Database(format!("Failed to save chain: {e}")))?;
        self.flush()
    }

    fn append_block(&self, block: &Block) -> Result<()> {
        self.blocks
            .insert(block.get_index().to_be_bytes(), serialize(block)?)
            .map_err(|e| BlockchainError::Database(format!("Failed to store block: {e}")))?;
        self.flush()
    }

    fn load_stake(&self, node_id: &str) -> Result<Option<u64>> {
        let Some(raw) = self
            .stake
            .get(node_id)
            .map_err(|e| BlockchainError::Database(format!("Failed to read stake: {e}")))?
        else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            BlockchainError::Database(format!("Corrupt stake entry for {node_id}"))
        })?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    fn save_stake(&self, node_id: &str, stake: u64) -> Result<()> {
        self.stake
            .insert(node_id, stake.to_be_bytes().to_vec())
            .map_err(|e| BlockchainError::Database(format!("Failed to store stake: {e}")))?;
        self.flush()
    }

    fn load_pending(&self) -> Result<Vec<Transaction>> {
        match self
            .db
            .get(PENDING_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to read pending votes: {e}")))?
        {
            Some(raw) => deserialize(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<()> {
        self.db
            .insert(PENDING_KEY, serialize(&pending.to_vec())?)
            .map_err(|e| BlockchainError::Database(format!("Failed to store pending votes: {e}")))?;
        self.flush()
    }
}

/// Volatile store for tests and simulations.
#[derive(Default)]
pub struct MemoryStore {
    chain: Mutex<Vec<Block>>,
    stake: Mutex<HashMap<String, u64>>,
    pending: Mutex<Vec<Transaction>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> BlockchainError {
    BlockchainError::Lock("memory store lock poisoned".to_string())
}

impl NodeStore for MemoryStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        Ok(self.chain.lock().map_err(poisoned)?.clone())
    }

    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        *self.chain.lock().map_err(poisoned)? = blocks.to_vec();
        Ok(())
    }

    fn append_block(&self, block: &Block) -> Result<()> {
        self.chain.lock().map_err(poisoned)?.push(block.clone());
        Ok(())
    }

    fn load_stake(&self, node_id: &str) -> Result<Option<u64>> {
        Ok(self.stake.lock().map_err(poisoned)?.get(node_id).copied())
    }

    fn save_stake(&self, node_id: &str, stake: u64) -> Result<()> {
        self.stake
            .lock()
            .map_err(poisoned)?
            .insert(node_id.to_string(), stake);
        Ok(())
    }

    fn load_pending(&self) -> Result<Vec<Transaction>> {
        Ok(self.pending.lock().map_err(poisoned)?.clone())
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<()> {
        *self.pending.lock().map_err(poisoned)? = pending.to_vec();
        Ok(())
    }
}
