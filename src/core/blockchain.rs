// This is the vote ledger: the committed chain plus the pending pool in front of it
// Every vote passes the ledger guard here before it can reach a block
// Chains from peers only replace ours through the consensus module

use crate::config::ConsensusParams;
use crate::core::consensus::{self, ForkChoice};
use crate::core::{Block, BlockTemplate, CancelToken, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::MemoryPool;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// What a mining attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(Block),
    NoPendingTransactions,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceCount {
    pub choice: String,
    pub count: usize,
    pub percentage: f64,
}

/// Tally over committed votes, most popular choice first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsReport {
    pub total_votes: usize,
    pub entries: Vec<ChoiceCount>,
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    pool: MemoryPool,
    committed_voters: HashSet<String>, // Every voter_id already in a block
    params: ConsensusParams,
}

impl Blockchain {
    // A fresh ledger holding only the shared genesis block
    pub fn new(params: &ConsensusParams) -> Result<Blockchain> {
        params.validate()?;
        let genesis = Block::genesis(params)?;
        Ok(Blockchain {
            blocks: vec![genesis],
            pool: MemoryPool::new(),
            committed_voters: HashSet::new(),
            params: params.clone(),
        })
    }

    // I use this when loading a persisted chain: it must be fully valid against our genesis
    pub fn from_blocks(params: &ConsensusParams, blocks: Vec<Block>) -> Result<Blockchain> {
        params.validate()?;
        let genesis = Block::genesis(params)?;
        consensus::validate_chain(&blocks, &genesis, params)?;
        let committed_voters = Self::collect_voters(&blocks);
        Ok(Blockchain {
            blocks,
            pool: MemoryPool::new(),
            committed_voters,
            params: params.clone(),
        })
    }

    fn collect_voters(blocks: &[Block]) -> HashSet<String> {
        blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(|tx| tx.get_voter_id().to_string())
            .collect()
    }

    pub fn get_params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn last_block(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_tip_hash(&self) -> &str {
        self.last_block().get_hash()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.pool.get_all()
    }

    pub fn pending_len(&self) -> usize {
        self.pool.len()
    }

    /// True if `voter_id` has a vote in any block or in the pending pool.
    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.committed_voters.contains(voter_id) || self.pool.contains_voter(voter_id)
    }

    /// Ledger guard. Checks run in a fixed order: signature, identity, then
    /// one-vote-per-voter against both the chain and the pool.
    pub fn submit(&mut self, tx: Transaction) -> Result<()> {
        if let Err(err) = tx.validate() {
            warn!("Rejected vote from {}: {err}", tx.get_voter_id());
            return Err(err);
        }
        if self.has_voted(tx.get_voter_id()) {
            warn!("Rejected duplicate vote from {}", tx.get_voter_id());
            return Err(BlockchainError::DuplicateVoter(tx.get_voter_id().to_string()));
        }
        info!(
            "Accepted vote from {} for {}",
            tx.get_voter_id(),
            tx.get_choice()
        );
        self.pool.add(tx);
        Ok(())
    }

    /// Snapshot of the pool as the next block to seal, or `None` when nothing is pending.
    pub fn next_template(
        &self,
        miner_id: &str,
        miner_stake: u64,
        base_difficulty: u32,
        timestamp: i64,
    ) -> Option<BlockTemplate> {
        if self.pool.is_empty() {
            return None;
        }
        let last = self.last_block();
        let base_difficulty = self.params.clamp_difficulty(base_difficulty);
        Some(BlockTemplate {
            index: last.get_index() + 1,
            timestamp,
            previous_hash: last.get_hash().to_string(),
            transactions: self.pool.get_all(),
            miner_id: miner_id.to_string(),
            miner_stake,
            base_difficulty,
            effective_difficulty: self.params.effective_difficulty(base_difficulty, miner_stake),
        })
    }

    /// Append a block this node sealed from the first `consumed` pending votes.
    /// The tip must not have moved since the template was taken.
    pub fn append_sealed(&mut self, block: Block, consumed: usize) -> Result<()> {
        consensus::validate_block(self.last_block(), &block, &self.params)?;
        let snapshot: Vec<&Transaction> = self.pool.iter().take(consumed).collect();
        if snapshot.len() != block.get_transactions().len()
            || snapshot
                .iter()
                .zip(block.get_transactions())
                .any(|(pending, sealed)| *pending != sealed)
        {
            return Err(BlockchainError::ChainValidation(
                "sealed block does not match the pending pool".to_string(),
            ));
        }
        self.pool.drain_front(consumed);
        self.commit(block);
        Ok(())
    }

    /// Append a block announced by a peer that extends our tip directly.
    pub fn append_peer_block(&mut self, block: Block) -> Result<()> {
        consensus::validate_block(self.last_block(), &block, &self.params)?;
        let mut seen = HashSet::new();
        for tx in block.get_transactions() {
            let voter = tx.get_voter_id();
            if self.committed_voters.contains(voter) || !seen.insert(voter) {
                return Err(BlockchainError::ChainValidation(format!(
                    "block {} repeats voter {voter}",
                    block.get_index()
                )));
            }
        }
        self.commit(block);
        Ok(())
    }

    fn commit(&mut self, block: Block) {
        let voters: HashSet<String> = block
            .get_transactions()
            .iter()
            .map(|tx| tx.get_voter_id().to_string())
            .collect();
        let pruned = self.pool.remove_voters(&voters);
        if pruned > 0 {
            info!("Dropped {pruned} pending votes now committed in block {}", block.get_index());
        }
        self.committed_voters.extend(voters);
        info!(
            "Appended block {} ({} votes) {}",
            block.get_index(),
            block.get_transactions().len(),
            block.get_hash()
        );
        self.blocks.push(block);
    }

    /// Mine every pending vote in one go, holding `&mut self` throughout.
    pub fn mine_pending(
        &mut self,
        miner_id: &str,
        miner_stake: u64,
        base_difficulty: u32,
        timestamp: i64,
        cancel: &CancelToken,
    ) -> Result<MineOutcome> {
        let Some(template) = self.next_template(miner_id, miner_stake, base_difficulty, timestamp)
        else {
            return Ok(MineOutcome::NoPendingTransactions);
        };
        let consumed = template.transactions.len();
        match Block::seal(template, cancel)? {
            Some(block) => {
                self.append_sealed(block.clone(), consumed)?;
                Ok(MineOutcome::Mined(block))
            }
            None => Ok(MineOutcome::Cancelled),
        }
    }

    /// Offer a peer's full chain. Replaces ours atomically only when the
    /// candidate is longer and valid; pending votes it already commits are dropped.
    pub fn offer_chain(&mut self, candidate: Vec<Block>) -> Result<ForkChoice> {
        let choice = consensus::resolve(&self.blocks, &candidate, self.genesis(), &self.params)?;
        if choice == ForkChoice::Replace {
            let committed = Self::collect_voters(&candidate);
            let pruned = self.pool.remove_voters(&committed);
            info!(
                "Adopted peer chain: {} -> {} blocks, {pruned} pending votes dropped",
                self.blocks.len(),
                candidate.len()
            );
            self.blocks = candidate;
            self.committed_voters = committed;
        }
        Ok(choice)
    }

    pub fn is_valid(&self) -> bool {
        consensus::is_chain_valid(&self.blocks, self.genesis(), &self.params)
    }

    pub fn validate(&self) -> Result<()> {
        consensus::validate_chain(&self.blocks, self.genesis(), &self.params)
    }

    /// Committed votes per choice. Pending votes are not counted.
    pub fn results(&self) -> BTreeMap<String, usize> {
        let mut tally = BTreeMap::new();
        for tx in self.blocks.iter().flat_map(|block| block.get_transactions()) {
            *tally.entry(tx.get_choice().to_string()).or_insert(0) += 1;
        }
        tally
    }

    pub fn results_report(&self) -> ResultsReport {
        let tally = self.results();
        let total_votes: usize = tally.values().sum();
        let mut entries: Vec<ChoiceCount> = tally
            .into_iter()
            .map(|(choice, count)| ChoiceCount {
                percentage: if total_votes == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total_votes as f64
                },
                choice,
                count,
            })
            .collect();
        // BTreeMap order breaks ties alphabetically; the sort is stable
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        ResultsReport {
            total_votes,
            entries,
        }
    }

    /// Look up the block holding `voter_id`'s committed vote.
    pub fn find_vote(&self, voter_id: &str) -> Option<(&Block, usize)> {
        self.blocks.iter().find_map(|block| {
            block
                .get_transactions()
                .iter()
                .position(|tx| tx.get_voter_id() == voter_id)
                .map(|position| (block, position))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::{generate_keypair, KeyPair};

    fn params() -> ConsensusParams {
        ConsensusParams::for_testing()
    }

    fn vote(keys: &KeyPair, choice: &str) -> Transaction {
        Transaction::new_signed(keys, choice, None).unwrap()
    }

    fn mine(chain: &mut Blockchain, timestamp: i64) -> MineOutcome {
        chain
            .mine_pending("node-a", 0, 1, timestamp, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_new_chain_has_genesis_only() {
        let chain = Blockchain::new(&params()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.pending_len(), 0);
        assert!(chain.is_valid());
        assert!(chain.results().is_empty());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = ConsensusParams {
            stake_divisor: 0,
            ..ConsensusParams::for_testing()
        };
        assert!(matches!(Blockchain::new(&params), Err(BlockchainError::Config(_))));
        let blocks = Blockchain::new(&ConsensusParams::for_testing())
            .unwrap()
            .blocks()
            .to_vec();
        assert!(matches!(
            Blockchain::from_blocks(&params, blocks),
            Err(BlockchainError::Config(_))
        ));
    }

    #[test]
    fn test_submit_rejects_pending_duplicate() {
        let mut chain = Blockchain::new(&params()).unwrap();
        let keys = generate_keypair().unwrap();
        chain.submit(vote(&keys, "X")).unwrap();
        assert_eq!(
            chain.submit(vote(&keys, "Y")),
            Err(BlockchainError::DuplicateVoter(keys.voter_id()))
        );
        assert_eq!(chain.pending_len(), 1);
    }

    #[test]
    fn test_submit_rejects_committed_duplicate() {
        let mut chain = Blockchain::new(&params()).unwrap();
        let keys = generate_keypair().unwrap();
        chain.submit(vote(&keys, "X")).unwrap();
        assert!(matches!(mine(&mut chain, 1_000), MineOutcome::Mined(_)));
        assert!(matches!(
            chain.submit(vote(&keys, "X")),
            Err(BlockchainError::DuplicateVoter(_))
        ));
    }

    #[test]
    fn test_signature_checked_before_duplicate() {
        let mut chain = Blockchain::new(&params()).unwrap();
        let keys = generate_keypair().unwrap();
        let good = vote(&keys, "X");
        chain.submit(good.clone()).unwrap();

        let forged = Transaction::from_parts(
            good.get_voter_id().to_string(),
            "Y".to_string(),
            good.get_timestamp(),
            good.get_signature().to_string(),
            good.get_public_key().to_string(),
            None,
        );
        assert_eq!(chain.submit(forged), Err(BlockchainError::InvalidSignature));
    }

    #[test]
    fn test_mine_empty_pool() {
        let mut chain = Blockchain::new(&params()).unwrap();
        assert_eq!(mine(&mut chain, 1_000), MineOutcome::NoPendingTransactions);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_mine_consumes_pool_in_order() {
        let mut chain = Blockchain::new(&params()).unwrap();
        let a = generate_keypair().unwrap();
        let b = generate_keypair().unwrap();
        chain.submit(vote(&a, "X")).unwrap();
        chain.submit(vote(&b, "Y")).unwrap();

        let MineOutcome::Mined(block) = mine(&mut chain, 1_000) else {
            panic!("expected a block");
        };
        assert_eq!(block.get_index(), 1);
        assert_eq!(block.get_transactions()[0].get_voter_id(), a.voter_id());
        assert_eq!(block.get_transactions()[1].get_voter_id(), b.voter_id());
        assert_eq!(chain.pending_len(), 0);
        assert!(chain.is_valid());

        let tally = chain.results();
        assert_eq!(tally.get("X"), Some(&1));
        assert_eq!(tally.get("Y"), Some(&1));
        assert!(chain.find_vote(&b.voter_id()).is_some());
    }

    #[test]
    fn test_cancelled_mine_leaves_pool() {
        let mut chain = Blockchain::new(&params()).unwrap();
        chain.submit(vote(&generate_keypair().unwrap(), "X")).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = chain.mine_pending("node-a", 0, 1, 1_000, &cancel).unwrap();
        assert_eq!(outcome, MineOutcome::Cancelled);
        assert_eq!(chain.pending_len(), 1);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_sealed_rejects_stale_tip() {
        let mut chain = Blockchain::new(&params()).unwrap();
        chain.submit(vote(&generate_keypair().unwrap(), "X")).unwrap();
        let template = chain.next_template("node-a", 0, 1, 1_000).unwrap();
        let consumed = template.transactions.len();
        let block = Block::seal(template, &CancelToken::new()).unwrap().unwrap();

        chain.submit(vote(&generate_keypair().unwrap(), "Y")).unwrap();
        assert!(matches!(mine(&mut chain, 2_000), MineOutcome::Mined(_)));
        assert!(chain.append_sealed(block, consumed).is_err());
    }

    #[test]
    fn test_results_report_sorted() {
        let mut chain = Blockchain::new(&params()).unwrap();
        for choice in ["B", "A", "B"] {
            chain.submit(vote(&generate_keypair().unwrap(), choice)).unwrap();
        }
        mine(&mut chain, 1_000);
        let report = chain.results_report();
        assert_eq!(report.total_votes, 3);
        assert_eq!(report.entries[0].choice, "B");
        assert_eq!(report.entries[0].count, 2);
        assert!((report.entries[1].percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_offer_chain_adopts_longer_and_prunes_pool() {
        let keys = generate_keypair().unwrap();
        let mut remote = Blockchain::new(&params()).unwrap();
        remote.submit(vote(&keys, "X")).unwrap();
        mine(&mut remote, 1_000);

        let mut local = Blockchain::new(&params()).unwrap();
        local.submit(vote(&keys, "X")).unwrap();
        assert_eq!(local.pending_len(), 1);

        let choice = local.offer_chain(remote.blocks().to_vec()).unwrap();
        assert_eq!(choice, ForkChoice::Replace);
        assert_eq!(local.len(), 2);
        assert_eq!(local.pending_len(), 0);
        assert!(local.has_voted(&keys.voter_id()));

        // offering the same chain again changes nothing
        assert_eq!(
            local.offer_chain(remote.blocks().to_vec()).unwrap(),
            ForkChoice::KeepLocal
        );
    }

    #[test]
    fn test_from_blocks_rejects_tampered() {
        let mut chain = Blockchain::new(&params()).unwrap();
        chain.submit(vote(&generate_keypair().unwrap(), "X")).unwrap();
        mine(&mut chain, 1_000);
        let mut blocks = chain.blocks().to_vec();
        blocks[1].set_merkle_root("ff");
        assert!(Blockchain::from_blocks(&params(), blocks).is_err());
    }
}
