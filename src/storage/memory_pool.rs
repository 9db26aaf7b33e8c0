use crate::core::Transaction;
use std::collections::HashSet;

/// Pending votes in arrival order.
///
/// The pool keeps a voter index next to the queue so the ledger guard can
/// reject a second pending vote without scanning. It has no lock of its own:
/// it is only reachable through the node state, which serialises access.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    queue: Vec<Transaction>,
    voters: HashSet<String>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        Self::default()
    }

    /// Append a vote the ledger guard has already admitted.
    pub fn add(&mut self, tx: Transaction) {
        self.voters.insert(tx.get_voter_id().to_string());
        self.queue.push(tx);
    }

    pub fn contains_voter(&self, voter_id: &str) -> bool {
        self.voters.contains(voter_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.queue.clone()
    }

    /// Remove and return the first `count` votes, in order.
    pub fn drain_front(&mut self, count: usize) -> Vec<Transaction> {
        let count = count.min(self.queue.len());
        let drained: Vec<Transaction> = self.queue.drain(..count).collect();
        for tx in &drained {
            self.voters.remove(tx.get_voter_id());
        }
        drained
    }

    /// Drop pending votes whose voter is in `committed`. Returns how many went.
    pub fn remove_voters(&mut self, committed: &HashSet<String>) -> usize {
        let before = self.queue.len();
        self.queue.retain(|tx| !committed.contains(tx.get_voter_id()));
        self.voters.retain(|voter| !committed.contains(voter));
        before - self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::generate_keypair;

    fn vote(choice: &str) -> Transaction {
        let keys = generate_keypair().unwrap();
        Transaction::new_signed(&keys, choice, None).unwrap()
    }

    #[test]
    fn test_fifo_order_and_drain() {
        let mut pool = MemoryPool::new();
        let (a, b, c) = (vote("X"), vote("Y"), vote("Z"));
        pool.add(a.clone());
        pool.add(b.clone());
        pool.add(c.clone());

        assert_eq!(pool.get_all(), vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(pool.drain_front(2), vec![a.clone(), b]);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains_voter(a.get_voter_id()));
        assert!(pool.contains_voter(c.get_voter_id()));
        assert_eq!(pool.drain_front(10), vec![c]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_committed_voters() {
        let mut pool = MemoryPool::new();
        let (a, b) = (vote("X"), vote("Y"));
        pool.add(a.clone());
        pool.add(b.clone());

        let committed: HashSet<String> = [a.get_voter_id().to_string()].into_iter().collect();
        assert_eq!(pool.remove_voters(&committed), 1);
        assert_eq!(pool.get_all(), vec![b]);
        assert!(!pool.contains_voter(a.get_voter_id()));
    }
}
