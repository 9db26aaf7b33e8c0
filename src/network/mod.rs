//! Node-level coordination
//!
//! This module holds the per-node state object, the messages nodes exchange
//! and an in-process network that delivers those messages between nodes.
//! Wire transport is left to the embedding application.

pub mod local;
pub mod message;
pub mod node;

pub use local::LocalNetwork;
pub use message::{MessageOutcome, NoopBroadcaster, PeerBroadcaster, PeerMessage};
pub use node::{NodeStats, VoteReceipt, VotingNode};
