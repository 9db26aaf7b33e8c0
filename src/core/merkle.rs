use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Merkle tree over an ordered vote sequence.
///
/// Leaves are SHA-256 digests of each transaction's canonical bytes; parents
/// are SHA-256 of `left || right`. An odd level duplicates its last node.
/// Transaction order is part of the commitment: swapping two votes changes
/// the root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds the root
    levels: Vec<Vec<Vec<u8>>>,
}

/// Inclusion proof for one transaction of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf digest being proven
    pub leaf_hash: Vec<u8>,
    /// Position of the transaction in the block
    pub transaction_index: usize,
    /// Sibling digests from the leaf level upwards
    pub proof_path: Vec<ProofElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofElement {
    /// Sibling hash
    pub hash: Vec<u8>,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    pub fn new(transactions: &[Transaction]) -> Self {
        // Leaf hashing is independent per vote; collect keeps leaf order.
        let leaves: Vec<Vec<u8>> = transactions.par_iter().map(|tx| tx.hash()).collect();
        Self::from_leaf_hashes(leaves)
    }

    pub fn from_leaf_hashes(leaves: Vec<Vec<u8>>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map_or(0, Vec::len) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Vec<u8>> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        MerkleTree { levels }
    }

    /// Root as raw bytes. An empty tree yields SHA-256 of the empty input.
    pub fn root(&self) -> Vec<u8> {
        match self.levels.last().and_then(|level| level.first()) {
            Some(root) => root.clone(),
            None => sha256_digest(b""),
        }
    }

    pub fn root_hex(&self) -> String {
        HEXLOWER.encode(&self.root())
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        let leaf_hash = self
            .levels
            .first()
            .and_then(|leaves| leaves.get(transaction_index))
            .cloned()
            .ok_or_else(|| {
                BlockchainError::ChainValidation(format!(
                    "Transaction index {transaction_index} out of bounds (leaves: {})",
                    self.leaf_count()
                ))
            })?;

        let mut proof_path = Vec::new();
        let mut index = transaction_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = index % 2 == 0;
            let sibling_index = if is_right { index + 1 } else { index - 1 };
            // Missing right sibling means the node was paired with itself
            let sibling = level.get(sibling_index).unwrap_or(&level[index]).clone();
            proof_path.push(ProofElement {
                hash: sibling,
                is_right,
            });
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash,
            transaction_index,
            proof_path,
        })
    }
}

impl MerkleProof {
    /// Fold the path and compare against a hex root.
    pub fn verify(&self, merkle_root_hex: &str) -> bool {
        let mut current = self.leaf_hash.clone();
        for element in &self.proof_path {
            current = if element.is_right {
                hash_pair(&current, &element.hash)
            } else {
                hash_pair(&element.hash, &current)
            };
        }
        HEXLOWER.encode(&current) == merkle_root_hex
    }
}

/// Hex Merkle root of an ordered transaction list.
pub fn compute_root(transactions: &[Transaction]) -> String {
    MerkleTree::new(transactions).root_hex()
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::generate_keypair;
    use crate::utils::sha256_hex;

    fn votes(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| {
                let keys = generate_keypair().unwrap();
                Transaction::new_signed_at(&keys, &format!("Candidate {}", i % 3), None, i as i64)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_empty_root_is_hash_of_nothing() {
        assert_eq!(compute_root(&[]), sha256_hex(b""));
        assert!(MerkleTree::new(&[]).is_empty());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let txs = votes(1);
        assert_eq!(compute_root(&txs), HEXLOWER.encode(&txs[0].hash()));
    }

    #[test]
    fn test_two_leaves_pairwise() {
        let txs = votes(2);
        let mut concat = txs[0].hash();
        concat.extend(txs[1].hash());
        assert_eq!(compute_root(&txs), sha256_hex(&concat));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let txs = votes(3);
        let leaves: Vec<Vec<u8>> = txs.iter().map(Transaction::hash).collect();
        let left = hash_pair(&leaves[0], &leaves[1]);
        let right = hash_pair(&leaves[2], &leaves[2]);
        assert_eq!(compute_root(&txs), HEXLOWER.encode(&hash_pair(&left, &right)));
    }

    #[test]
    fn test_deterministic_and_order_sensitive() {
        let txs = votes(4);
        assert_eq!(compute_root(&txs), compute_root(&txs));

        let mut swapped = txs.clone();
        swapped.swap(1, 2);
        assert_ne!(compute_root(&txs), compute_root(&swapped));

        let mut fewer = txs.clone();
        fewer.pop();
        assert_ne!(compute_root(&txs), compute_root(&fewer));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in [1, 2, 5, 8] {
            let txs = votes(n);
            let tree = MerkleTree::new(&txs);
            let root = tree.root_hex();
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&root), "leaf {i} of {n} should verify");
            }
        }
    }

    #[test]
    fn test_proof_rejects_wrong_root_and_index() {
        let txs = votes(4);
        let tree = MerkleTree::new(&txs);
        let proof = tree.proof(2).unwrap();
        assert!(!proof.verify(&sha256_hex(b"other")));
        assert!(tree.proof(4).is_err());
    }
}
