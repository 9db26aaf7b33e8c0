//! Data storage and persistence
//!
//! This module holds the pending vote pool and the durable per-node store
//! for the adopted chain and the node's stake.

pub mod memory_pool;
pub mod node_store;

pub use memory_pool::MemoryPool;
pub use node_store::{MemoryStore, NodeStore, SledStore};
