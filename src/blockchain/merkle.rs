//! Merkle commitments over executed transaction records.
//!
//! - An empty record set yields the sentinel root `"0"`.
//! - Leaves are `SHA256(record.canonical())`, kept in input order.
//! - Parents are `SHA256(left_hex ‖ right_hex)`; an odd last node is paired
//!   with itself.

use serde::{Deserialize, Serialize};

use super::crypto::sha256_hex;
use super::transaction::TransactionRecord;

/// Root reported for an empty record set
pub const EMPTY_ROOT: &str = "0";

/// A Merkle tree, stored level by level from the leaves up
#[derive(Debug, Clone, PartialEq)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    fn hash_pair(left: &str, right: &str) -> String {
        sha256_hex(&format!("{}{}", left, right))
    }

    /// Builds a tree from already-hashed leaves
    pub fn from_leaves(leaves: Vec<String>) -> Self {
        let mut levels = vec![leaves];

        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next: Vec<String> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    Self::hash_pair(left, right)
                })
                .collect();
            levels.push(next);
        }

        MerkleTree { levels }
    }

    /// Builds a tree over executed transaction records
    pub fn build(records: &[TransactionRecord]) -> Self {
        let leaves = records
            .iter()
            .map(|record| sha256_hex(&record.canonical()))
            .collect();
        Self::from_leaves(leaves)
    }

    /// Computes only the root for `records`
    pub fn root_of(records: &[TransactionRecord]) -> String {
        Self::build(records).root()
    }

    /// The root hash, or `"0"` if the tree has no leaves
    pub fn root(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| EMPTY_ROOT.to_string())
    }

    /// Number of leaves in the tree
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Builds an inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = self.levels.first()?.get(index)?.clone();
        let mut path = Vec::new();
        let mut position = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_is_left = position % 2 == 1;
            let sibling = if sibling_is_left {
                level[position - 1].clone()
            } else {
                // duplicate-last rule
                level.get(position + 1).unwrap_or(&level[position]).clone()
            };
            path.push(ProofStep {
                sibling,
                sibling_is_left,
            });
            position /= 2;
        }

        Some(MerkleProof { leaf, path })
    }
}

/// One sibling hash on the path from a leaf to the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub sibling_is_left: bool,
}

/// Proof that a leaf hash is committed under a Merkle root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: String,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recomputes the root from the leaf and checks it against `root`
    pub fn verify(&self, root: &str) -> bool {
        let computed = self.path.iter().fold(self.leaf.clone(), |hash, step| {
            if step.sibling_is_left {
                MerkleTree::hash_pair(&step.sibling, &hash)
            } else {
                MerkleTree::hash_pair(&hash, &step.sibling)
            }
        });
        computed == root
    }
}
