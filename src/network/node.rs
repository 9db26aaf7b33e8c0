// One voting node: its ledger, governor and stake behind a single lock,
// plus the store it persists to and the broadcaster it announces blocks on

use crate::config::{ConsensusParams, Settings};
use crate::core::{
    Block, Blockchain, CancelToken, DifficultyGovernor, DifficultyReport, ForkChoice,
    MerkleProof, MineOutcome, ResultsReport, StakeEntry, StakeLedger, Transaction,
};
use crate::error::{BlockchainError, Result};
use crate::network::{MessageOutcome, NoopBroadcaster, PeerBroadcaster, PeerMessage};
use crate::storage::{NodeStore, SledStore};
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct NodeState {
    chain: Blockchain,
    governor: DifficultyGovernor,
    stake: StakeLedger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_id: String,
    pub blocks: usize,
    pub base_difficulty: u32,
    pub effective_difficulty: u32,
    pub stake: u64,
    pub total_votes: usize,
    pub pending: usize,
    pub chain_valid: bool,
}

/// Proof that a voter's ballot sits in a given block.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub block_index: u64,
    pub merkle_root: String,
    pub proof: MerkleProof,
}

pub struct VotingNode {
    node_id: String,
    params: ConsensusParams,
    state: RwLock<NodeState>,
    store: Arc<dyn NodeStore>,
    broadcaster: Arc<dyn PeerBroadcaster>,
    // Shared by every seal in flight; replaced after each cancellation
    mining: Mutex<CancelToken>,
    shut_down: AtomicBool,
    // Set when a chain write failed; the next write rewrites the whole chain
    store_dirty: AtomicBool,
}

impl VotingNode {
    /// Open the node described by `settings`, backed by its own sled database.
    pub fn open(settings: &Settings) -> Result<VotingNode> {
        let store = SledStore::open(&settings.node_db_path())?;
        Self::with_store(&settings.node_id, &settings.params, Arc::new(store))
    }

    pub fn with_store(
        node_id: &str,
        params: &ConsensusParams,
        store: Arc<dyn NodeStore>,
    ) -> Result<VotingNode> {
        params.validate()?;
        let chain = Self::restore_chain(params, store.as_ref())?;

        let mut governor = DifficultyGovernor::new(params);
        governor.sync_from_chain(chain.blocks());
        let stake = match store.load_stake(node_id)? {
            Some(stake) => StakeLedger::with_stake(params, node_id, stake),
            None => StakeLedger::new(params),
        };

        let mut state = NodeState {
            chain,
            governor,
            stake,
        };
        for tx in store.load_pending()? {
            if let Err(err) = state.chain.submit(tx) {
                debug!("Dropped stored pending vote: {err}");
            }
        }
        info!(
            "Node {node_id} ready: {} blocks, {} pending, stake {}",
            state.chain.len(),
            state.chain.pending_len(),
            state.stake.stake_of(node_id)
        );

        Ok(VotingNode {
            node_id: node_id.to_string(),
            params: params.clone(),
            state: RwLock::new(state),
            store,
            broadcaster: Arc::new(NoopBroadcaster),
            mining: Mutex::new(CancelToken::new()),
            shut_down: AtomicBool::new(false),
            store_dirty: AtomicBool::new(false),
        })
    }

    fn restore_chain(params: &ConsensusParams, store: &dyn NodeStore) -> Result<Blockchain> {
        let stored = store.load_chain()?;
        if stored.is_empty() {
            let chain = Blockchain::new(params)?;
            store.save_chain(chain.blocks())?;
            return Ok(chain);
        }
        match Blockchain::from_blocks(params, stored) {
            Ok(chain) => Ok(chain),
            Err(err) => {
                warn!("Stored chain failed validation, starting from genesis: {err}");
                let chain = Blockchain::new(params)?;
                store.save_chain(chain.blocks())?;
                Ok(chain)
            }
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn PeerBroadcaster>) -> VotingNode {
        self.broadcaster = broadcaster;
        self
    }

    pub fn get_node_id(&self) -> &str {
        &self.node_id
    }

    pub fn get_params(&self) -> &ConsensusParams {
        &self.params
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, NodeState>> {
        self.state
            .read()
            .map_err(|_| BlockchainError::Lock("node state lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, NodeState>> {
        self.state
            .write()
            .map_err(|_| BlockchainError::Lock("node state lock poisoned".to_string()))
    }

    fn current_token(&self) -> Result<CancelToken> {
        let token = self
            .mining
            .lock()
            .map_err(|_| BlockchainError::Lock("mining token lock poisoned".to_string()))?;
        Ok(token.clone())
    }

    /// Abort every seal in flight. Later calls to `mine` start fresh.
    pub fn cancel_mining(&self) -> Result<()> {
        let mut token = self
            .mining
            .lock()
            .map_err(|_| BlockchainError::Lock("mining token lock poisoned".to_string()))?;
        token.cancel();
        *token = CancelToken::new();
        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        info!("Node {} shutting down", self.node_id);
        self.cancel_mining()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Run a vote through the ledger guard and keep it pending.
    pub fn submit(&self, tx: Transaction) -> Result<()> {
        let mut state = self.write_state()?;
        state.chain.submit(tx)?;
        if let Err(err) = self.store.save_pending(&state.chain.pending()) {
            error!("Node {} failed to persist pending votes: {err}", self.node_id);
        }
        Ok(())
    }

    /// Store a block just appended to the in-memory chain. A failure is
    /// logged and the next write falls back to a full chain rewrite.
    fn persist_block(&self, state: &NodeState, block: &Block) {
        let written = if self.store_dirty.load(Ordering::SeqCst) {
            self.store.save_chain(state.chain.blocks())
        } else {
            self.store.append_block(block)
        }
        .and_then(|()| self.store.save_pending(&state.chain.pending()));
        self.record_persist(written);
    }

    fn persist_chain(&self, state: &NodeState) {
        let written = self
            .store
            .save_chain(state.chain.blocks())
            .and_then(|()| self.store.save_pending(&state.chain.pending()));
        self.record_persist(written);
    }

    fn record_persist(&self, written: Result<()>) {
        match written {
            Ok(()) => self.store_dirty.store(false, Ordering::SeqCst),
            Err(err) => {
                error!("Node {} failed to persist chain: {err}", self.node_id);
                self.store_dirty.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Seal everything pending into one block.
    ///
    /// The nonce search runs without the state lock. If another block lands
    /// on our tip meanwhile, the result is thrown away as `Cancelled`. Once
    /// the block is appended in memory it is announced and returned even if
    /// the store refuses it.
    pub fn mine(&self) -> Result<MineOutcome> {
        if self.is_shut_down() {
            return Ok(MineOutcome::Cancelled);
        }
        let cancel = self.current_token()?;
        let template = {
            let state = self.read_state()?;
            let stake = state.stake.stake_of(&self.node_id);
            state.chain.next_template(
                &self.node_id,
                stake,
                state.governor.next_base_difficulty(state.chain.blocks()),
                current_timestamp()?,
            )
        };
        let Some(template) = template else {
            debug!("Node {} has nothing to mine", self.node_id);
            return Ok(MineOutcome::NoPendingTransactions);
        };
        let consumed = template.transactions.len();
        let tip_hash = template.previous_hash.clone();

        let Some(block) = Block::seal(template, &cancel)? else {
            info!("Node {} stopped mining: cancelled", self.node_id);
            return Ok(MineOutcome::Cancelled);
        };

        let mut state = self.write_state()?;
        if state.chain.get_tip_hash() != tip_hash {
            info!(
                "Node {} discarded block {}: tip moved while sealing",
                self.node_id,
                block.get_index()
            );
            return Ok(MineOutcome::Cancelled);
        }
        state.chain.append_sealed(block.clone(), consumed)?;
        let stake = state.stake.record_success(&self.node_id);
        let NodeState {
            chain, governor, ..
        } = &mut *state;
        governor.sync_from_chain(chain.blocks());

        self.persist_block(&state, &block);
        if let Err(err) = self.store.save_stake(&self.node_id, stake) {
            error!("Node {} failed to persist stake: {err}", self.node_id);
        }
        drop(state);

        info!(
            "Node {} mined block {} (stake now {stake})",
            self.node_id,
            block.get_index()
        );
        self.broadcaster.broadcast(PeerMessage::NewBlock {
            sender_id: self.node_id.clone(),
            block: block.clone(),
        });
        Ok(MineOutcome::Mined(block))
    }

    pub fn handle_message(&self, message: PeerMessage) -> Result<MessageOutcome> {
        match message {
            PeerMessage::NewBlock { sender_id, block } => self.receive_block(&sender_id, block),
            PeerMessage::RequestChain { sender_id } => {
                debug!("Node {} sending chain to {sender_id}", self.node_id);
                Ok(MessageOutcome::Reply(PeerMessage::ChainResponse {
                    sender_id: self.node_id.clone(),
                    chain: self.chain()?,
                }))
            }
            PeerMessage::ChainResponse { sender_id, chain } => {
                debug!(
                    "Node {} received {} blocks from {sender_id}",
                    self.node_id,
                    chain.len()
                );
                self.offer_chain(chain)
            }
        }
    }

    fn receive_block(&self, sender_id: &str, block: Block) -> Result<MessageOutcome> {
        let mut state = self.write_state()?;
        let tip = state.chain.last_block();
        let expected = tip.get_index() + 1;
        if block.get_index() < expected {
            return Ok(MessageOutcome::Ignored);
        }
        // Further ahead, or a sibling of our tip's successor: the sender holds a longer chain
        if block.get_index() > expected || block.get_previous_hash() != tip.get_hash() {
            debug!(
                "Node {} needs the chain of {sender_id} for block {}",
                self.node_id,
                block.get_index()
            );
            return Ok(MessageOutcome::NeedFullChain);
        }
        if let Err(err) = state.chain.append_peer_block(block.clone()) {
            warn!(
                "Node {} rejected block {} from {sender_id}: {err}",
                self.node_id,
                block.get_index()
            );
            return Ok(MessageOutcome::Rejected(err.to_string()));
        }
        let NodeState {
            chain, governor, ..
        } = &mut *state;
        governor.sync_from_chain(chain.blocks());
        self.persist_block(&state, &block);
        drop(state);
        self.cancel_mining()?;
        Ok(MessageOutcome::Appended)
    }

    /// Longest-valid-chain resolution against a peer's full chain.
    pub fn offer_chain(&self, candidate: Vec<Block>) -> Result<MessageOutcome> {
        let mut state = self.write_state()?;
        match state.chain.offer_chain(candidate) {
            Ok(ForkChoice::KeepLocal) => Ok(MessageOutcome::KeptLocal),
            Ok(ForkChoice::Replace) => {
                let NodeState {
                    chain, governor, ..
                } = &mut *state;
                governor.sync_from_chain(chain.blocks());
                self.persist_chain(&state);
                let length = state.chain.len();
                drop(state);
                self.cancel_mining()?;
                Ok(MessageOutcome::Adopted { length })
            }
            Err(err) => Ok(MessageOutcome::Rejected(err.to_string())),
        }
    }

    pub fn chain(&self) -> Result<Vec<Block>> {
        Ok(self.read_state()?.chain.blocks().to_vec())
    }

    pub fn chain_len(&self) -> Result<usize> {
        Ok(self.read_state()?.chain.len())
    }

    pub fn tip_hash(&self) -> Result<String> {
        Ok(self.read_state()?.chain.get_tip_hash().to_string())
    }

    pub fn pending(&self) -> Result<Vec<Transaction>> {
        Ok(self.read_state()?.chain.pending())
    }

    pub fn has_voted(&self, voter_id: &str) -> Result<bool> {
        Ok(self.read_state()?.chain.has_voted(voter_id))
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.read_state()?.chain.is_valid())
    }

    pub fn validate(&self) -> Result<()> {
        self.read_state()?.chain.validate()
    }

    pub fn results(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.read_state()?.chain.results())
    }

    pub fn results_report(&self) -> Result<ResultsReport> {
        Ok(self.read_state()?.chain.results_report())
    }

    pub fn base_difficulty(&self) -> Result<u32> {
        Ok(self.read_state()?.governor.base_difficulty())
    }

    pub fn stake(&self) -> Result<u64> {
        Ok(self.read_state()?.stake.stake_of(&self.node_id))
    }

    pub fn stake_leaderboard(&self) -> Result<Vec<StakeEntry>> {
        Ok(self.read_state()?.stake.leaderboard())
    }

    pub fn difficulty_report(&self) -> Result<DifficultyReport> {
        let state = self.read_state()?;
        Ok(state.governor.report(state.chain.blocks()))
    }

    pub fn stats(&self) -> Result<NodeStats> {
        let state = self.read_state()?;
        let base = state.governor.base_difficulty();
        Ok(NodeStats {
            node_id: self.node_id.clone(),
            blocks: state.chain.len(),
            base_difficulty: base,
            effective_difficulty: state.stake.effective_difficulty(&self.node_id, base),
            stake: state.stake.stake_of(&self.node_id),
            total_votes: state.chain.results().values().sum(),
            pending: state.chain.pending_len(),
            chain_valid: state.chain.is_valid(),
        })
    }

    /// Merkle inclusion proof for a committed vote.
    pub fn vote_receipt(&self, voter_id: &str) -> Result<Option<VoteReceipt>> {
        let state = self.read_state()?;
        let Some((block, position)) = state.chain.find_vote(voter_id) else {
            return Ok(None);
        };
        Ok(Some(VoteReceipt {
            block_index: block.get_index(),
            merkle_root: block.get_merkle_root().to_string(),
            proof: block.merkle_proof(position)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::generate_keypair;
    use crate::storage::MemoryStore;
    use std::thread;
    use std::time::Duration;

    /// Memory store whose writes fail while `failing` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(BlockchainError::Database("disk full".to_string()));
            }
            Ok(())
        }
    }

    impl NodeStore for FlakyStore {
        fn load_chain(&self) -> Result<Vec<Block>> {
            self.inner.load_chain()
        }

        fn save_chain(&self, blocks: &[Block]) -> Result<()> {
            self.check()?;
            self.inner.save_chain(blocks)
        }

        fn append_block(&self, block: &Block) -> Result<()> {
            self.check()?;
            self.inner.append_block(block)
        }

        fn load_stake(&self, node_id: &str) -> Result<Option<u64>> {
            self.inner.load_stake(node_id)
        }

        fn save_stake(&self, node_id: &str, stake: u64) -> Result<()> {
            self.check()?;
            self.inner.save_stake(node_id, stake)
        }

        fn load_pending(&self) -> Result<Vec<Transaction>> {
            self.inner.load_pending()
        }

        fn save_pending(&self, pending: &[Transaction]) -> Result<()> {
            self.check()?;
            self.inner.save_pending(pending)
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<PeerMessage>>,
    }

    impl PeerBroadcaster for Recorder {
        fn broadcast(&self, message: PeerMessage) {
            self.sent.lock().unwrap().push(message);
        }
    }

    fn node(id: &str) -> VotingNode {
        VotingNode::with_store(id, &ConsensusParams::for_testing(), Arc::new(MemoryStore::new()))
            .unwrap()
    }

    fn vote(choice: &str) -> Transaction {
        Transaction::new_signed(&generate_keypair().unwrap(), choice, None).unwrap()
    }

    #[test]
    fn test_mine_grows_chain_and_stake() {
        let node = node("a");
        node.submit(vote("X")).unwrap();
        assert!(matches!(node.mine().unwrap(), MineOutcome::Mined(_)));
        assert_eq!(node.chain_len().unwrap(), 2);
        assert_eq!(node.stake().unwrap(), 1);
        assert!(node.pending().unwrap().is_empty());
        assert_eq!(node.mine().unwrap(), MineOutcome::NoPendingTransactions);
    }

    #[test]
    fn test_shutdown_cancels_mining() {
        let node = node("a");
        node.submit(vote("X")).unwrap();
        node.shutdown().unwrap();
        assert_eq!(node.mine().unwrap(), MineOutcome::Cancelled);
        assert_eq!(node.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_new_block_appended_by_peer() {
        let a = node("a");
        let b = node("b");
        let tx = vote("X");
        a.submit(tx.clone()).unwrap();
        b.submit(tx).unwrap();
        let MineOutcome::Mined(block) = a.mine().unwrap() else {
            panic!("expected a block");
        };
        let outcome = b
            .handle_message(PeerMessage::NewBlock {
                sender_id: "a".to_string(),
                block: block.clone(),
            })
            .unwrap();
        assert_eq!(outcome, MessageOutcome::Appended);
        assert_eq!(b.tip_hash().unwrap(), block.get_hash());
        assert!(b.pending().unwrap().is_empty());

        // replaying the same block is stale
        let again = b
            .handle_message(PeerMessage::NewBlock {
                sender_id: "a".to_string(),
                block,
            })
            .unwrap();
        assert_eq!(again, MessageOutcome::Ignored);
    }

    #[test]
    fn test_block_ahead_requests_chain() {
        let a = node("a");
        let b = node("b");
        for choice in ["X", "Y"] {
            a.submit(vote(choice)).unwrap();
            a.mine().unwrap();
        }
        let tip = a.chain().unwrap().pop().unwrap();
        let outcome = b
            .handle_message(PeerMessage::NewBlock {
                sender_id: "a".to_string(),
                block: tip,
            })
            .unwrap();
        assert_eq!(outcome, MessageOutcome::NeedFullChain);

        let Ok(MessageOutcome::Reply(reply)) =
            a.handle_message(PeerMessage::RequestChain {
                sender_id: "b".to_string(),
            })
        else {
            panic!("expected a chain reply");
        };
        assert_eq!(
            b.handle_message(reply).unwrap(),
            MessageOutcome::Adopted { length: 3 }
        );
        assert_eq!(b.results().unwrap(), a.results().unwrap());
    }

    #[test]
    fn test_vote_receipt_verifies() {
        let node = node("a");
        let keys = generate_keypair().unwrap();
        node.submit(Transaction::new_signed(&keys, "X", None).unwrap())
            .unwrap();
        node.submit(vote("Y")).unwrap();
        node.mine().unwrap();
        let receipt = node.vote_receipt(&keys.voter_id()).unwrap().unwrap();
        assert_eq!(receipt.block_index, 1);
        assert!(receipt.proof.verify(&receipt.merkle_root));
        assert!(node.vote_receipt("nobody").unwrap().is_none());
    }

    #[test]
    fn test_restart_restores_state() {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
        let params = ConsensusParams::for_testing();
        {
            let node = VotingNode::with_store("a", &params, store.clone()).unwrap();
            node.submit(vote("X")).unwrap();
            node.mine().unwrap();
            node.submit(vote("Y")).unwrap();
        }
        let node = VotingNode::with_store("a", &params, store).unwrap();
        assert_eq!(node.chain_len().unwrap(), 2);
        assert_eq!(node.stake().unwrap(), 1);
        assert_eq!(node.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_store_falls_back_to_genesis() {
        let store = Arc::new(MemoryStore::new());
        let params = ConsensusParams::for_testing();
        let mut forged = Blockchain::new(&params).unwrap().blocks().to_vec();
        forged[0].set_hash("abc");
        store.save_chain(&forged).unwrap();
        let node = VotingNode::with_store("a", &params, store).unwrap();
        assert_eq!(node.chain_len().unwrap(), 1);
        assert!(node.is_valid().unwrap());
    }

    #[test]
    fn test_store_failure_after_append_still_announces_block() {
        let store = Arc::new(FlakyStore::default());
        let recorder = Arc::new(Recorder::default());
        let params = ConsensusParams::for_testing();
        let node = VotingNode::with_store("a", &params, store.clone())
            .unwrap()
            .with_broadcaster(recorder.clone());

        node.submit(vote("X")).unwrap();
        store.failing.store(true, Ordering::SeqCst);
        // a vote the store cannot save is still accepted
        node.submit(vote("Y")).unwrap();
        assert_eq!(node.pending().unwrap().len(), 2);

        assert!(matches!(node.mine().unwrap(), MineOutcome::Mined(_)));
        assert_eq!(node.chain_len().unwrap(), 2);
        assert_eq!(node.stake().unwrap(), 1);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        assert_eq!(store.load_chain().unwrap().len(), 1);

        // once the disk recovers the missed block is written with the next one
        store.failing.store(false, Ordering::SeqCst);
        node.submit(vote("Z")).unwrap();
        assert!(matches!(node.mine().unwrap(), MineOutcome::Mined(_)));
        assert_eq!(store.load_chain().unwrap(), node.chain().unwrap());
        assert_eq!(store.load_stake("a").unwrap(), Some(2));
    }

    #[test]
    fn test_restart_keeps_adjusted_difficulty() {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
        let params = ConsensusParams::for_testing();
        let before = {
            let node = VotingNode::with_store("a", &params, store.clone()).unwrap();
            for choice in ["X", "Y", "Z"] {
                thread::sleep(Duration::from_millis(5));
                node.submit(vote(choice)).unwrap();
                node.mine().unwrap();
            }
            node.base_difficulty().unwrap()
        };
        assert_eq!(before, params.initial_difficulty + 1);

        let node = VotingNode::with_store("a", &params, store).unwrap();
        assert_eq!(node.base_difficulty().unwrap(), before);
        node.submit(vote("W")).unwrap();
        let MineOutcome::Mined(block) = node.mine().unwrap() else {
            panic!("expected a block");
        };
        assert_eq!(block.get_base_difficulty(), before);
    }
}
