use crate::config::ConsensusParams;
use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::network::{MessageOutcome, PeerBroadcaster, PeerMessage, VotingNode};
use crate::storage::{MemoryStore, NodeStore};
use log::{debug, error, info};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Messages broadcast by any node, waiting for delivery.
#[derive(Default)]
struct Outbox {
    queue: Mutex<VecDeque<PeerMessage>>,
}

impl PeerBroadcaster for Outbox {
    fn broadcast(&self, message: PeerMessage) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(message),
            Err(_) => error!("Outbox lock poisoned, dropping message"),
        }
    }
}

impl Outbox {
    fn pop(&self) -> Result<Option<PeerMessage>> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| BlockchainError::Lock("outbox lock poisoned".to_string()))?;
        Ok(queue.pop_front())
    }
}

/// Several nodes in one process with a shared message queue.
///
/// Delivery is explicit: nothing moves between nodes until `deliver` runs,
/// so callers control interleavings of mining and propagation.
pub struct LocalNetwork {
    nodes: Vec<Arc<VotingNode>>,
    outbox: Arc<Outbox>,
}

impl LocalNetwork {
    /// `count` nodes named `node-0`, `node-1`, ... on in-memory stores.
    pub fn new(params: &ConsensusParams, count: usize) -> Result<LocalNetwork> {
        let stores = (0..count)
            .map(|i| {
                let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
                (format!("node-{i}"), store)
            })
            .collect();
        Self::with_stores(params, stores)
    }

    pub fn with_stores(
        params: &ConsensusParams,
        stores: Vec<(String, Arc<dyn NodeStore>)>,
    ) -> Result<LocalNetwork> {
        let outbox = Arc::new(Outbox::default());
        let mut nodes = Vec::with_capacity(stores.len());
        for (node_id, store) in stores {
            let node = VotingNode::with_store(&node_id, params, store)?
                .with_broadcaster(outbox.clone());
            nodes.push(Arc::new(node));
        }
        info!("Local network started with {} nodes", nodes.len());
        Ok(LocalNetwork { nodes, outbox })
    }

    pub fn nodes(&self) -> &[Arc<VotingNode>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Arc<VotingNode>> {
        self.nodes.get(index)
    }

    fn find(&self, node_id: &str) -> Option<&Arc<VotingNode>> {
        self.nodes.iter().find(|node| node.get_node_id() == node_id)
    }

    /// Gossip a vote to every node. Returns how many accepted it.
    pub fn submit_everywhere(&self, tx: &Transaction) -> usize {
        self.nodes
            .iter()
            .filter(|node| match node.submit(tx.clone()) {
                Ok(()) => true,
                Err(err) => {
                    debug!("{} refused vote: {err}", node.get_node_id());
                    false
                }
            })
            .count()
    }

    /// Deliver queued messages until the queue is empty. Returns how many
    /// messages were handed to a node, chain requests included.
    pub fn deliver(&self) -> Result<usize> {
        let mut delivered = 0;
        while let Some(message) = self.outbox.pop()? {
            let sender_id = message.get_sender_id().to_string();
            for node in self.nodes.iter().filter(|n| n.get_node_id() != sender_id) {
                delivered += 1;
                if node.handle_message(message.clone())? == MessageOutcome::NeedFullChain {
                    delivered += self.fetch_chain(node, &sender_id)?;
                }
            }
        }
        Ok(delivered)
    }

    fn fetch_chain(&self, node: &VotingNode, from: &str) -> Result<usize> {
        let Some(peer) = self.find(from) else {
            return Ok(0);
        };
        let request = PeerMessage::RequestChain {
            sender_id: node.get_node_id().to_string(),
        };
        if let MessageOutcome::Reply(reply) = peer.handle_message(request)? {
            let outcome = node.handle_message(reply)?;
            debug!("{} synced from {from}: {outcome:?}", node.get_node_id());
            return Ok(2);
        }
        Ok(1)
    }

    /// Every node offers its chain to every other node once.
    pub fn exchange_chains(&self) -> Result<()> {
        for source in &self.nodes {
            let chain = source.chain()?;
            for target in self.nodes.iter().filter(|n| n.get_node_id() != source.get_node_id()) {
                target.offer_chain(chain.clone())?;
            }
        }
        Ok(())
    }

    /// True when every node has the same tip.
    pub fn converged(&self) -> Result<bool> {
        let mut tips = self.nodes.iter().map(|node| node.tip_hash());
        let Some(first) = tips.next().transpose()? else {
            return Ok(true);
        };
        for tip in tips {
            if tip? != first {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn shutdown(&self) -> Result<()> {
        for node in &self.nodes {
            node.shutdown()?;
        }
        Ok(())
    }
}
