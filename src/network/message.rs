use crate::core::Block;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Payloads exchanged between voting nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    NewBlock { sender_id: String, block: Block },
    RequestChain { sender_id: String },
    ChainResponse { sender_id: String, chain: Vec<Block> },
}

impl PeerMessage {
    pub fn get_sender_id(&self) -> &str {
        match self {
            PeerMessage::NewBlock { sender_id, .. }
            | PeerMessage::RequestChain { sender_id }
            | PeerMessage::ChainResponse { sender_id, .. } => sender_id,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<PeerMessage> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// What a node did with an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Appended,
    /// The block is ahead of our tip; ask the sender for its chain
    NeedFullChain,
    Ignored,
    Rejected(String),
    Reply(PeerMessage),
    Adopted { length: usize },
    KeptLocal,
}

/// Receives announcements of blocks this node sealed.
pub trait PeerBroadcaster: Send + Sync {
    fn broadcast(&self, message: PeerMessage);
}

/// Broadcaster for a node with no peers.
pub struct NoopBroadcaster;

impl PeerBroadcaster for NoopBroadcaster {
    fn broadcast(&self, _message: PeerMessage) {}
}
