use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{is_hex_digest, meets_difficulty, sha256_hex};
use super::merkle::{MerkleProof, MerkleTree};
use super::transaction::TransactionRecord;

/// Previous-hash value carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Reasons a block fails validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
    #[error("Block {index}: hash does not satisfy difficulty {difficulty}")]
    InvalidProofOfWork { index: u64, difficulty: usize },

    #[error("Block {index}: stored hash does not match its fields")]
    HashMismatch { index: u64 },

    #[error("Block {index}: merkle root does not match its transactions")]
    MerkleRootMismatch { index: u64 },

    #[error("Block {index}: malformed hash '{hash}'")]
    MalformedHash { index: u64, hash: String },
}

/// Represents a block in the chain
///
/// `merkle_root` and `hash` are derived from the other fields. The
/// transactions are the records that were actually executed when the
/// block was assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Creation time in unix seconds
    pub timestamp: i64,

    /// Executed transactions committed by this block
    pub transactions: Vec<TransactionRecord>,

    /// Proof of work
    pub nonce: u64,

    /// Merkle root over `transactions`, or "0" when there are none
    pub merkle_root: String,

    /// Hash of the current block (calculated)
    pub hash: String,
}

impl Block {
    /// Creates a new unmined block
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `previous_hash` - The hash of the previous block
    /// * `transactions` - The executed records to commit
    ///
    /// # Returns
    ///
    /// A block with nonce 0 and its merkle root and hash filled in
    pub fn new(index: u64, previous_hash: String, transactions: Vec<TransactionRecord>) -> Self {
        let merkle_root = MerkleTree::root_of(&transactions);

        let mut block = Block {
            index,
            previous_hash,
            timestamp: Utc::now().timestamp(),
            transactions,
            nonce: 0,
            merkle_root,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Creates the genesis block
    pub fn genesis() -> Self {
        Block::new(0, GENESIS_PREVIOUS_HASH.to_string(), Vec::new())
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// SHA-256 of index, previous hash, timestamp, merkle root and nonce,
    /// concatenated as text
    pub fn calculate_hash(&self) -> String {
        let data = format!(
            "{}{}{}{}{}",
            self.index, self.previous_hash, self.timestamp, self.merkle_root, self.nonce
        );
        sha256_hex(&data)
    }

    /// Checks stored fields against fresh recomputation, without the PoW predicate
    ///
    /// The merkle root is rebuilt from the stored records only; nothing is
    /// executed, so this can be called any number of times.
    pub fn verify_integrity(&self) -> Result<(), BlockError> {
        if !is_hex_digest(&self.hash) {
            return Err(BlockError::MalformedHash {
                index: self.index,
                hash: self.hash.clone(),
            });
        }
        if self.hash != self.calculate_hash() {
            return Err(BlockError::HashMismatch { index: self.index });
        }
        if self.merkle_root != MerkleTree::root_of(&self.transactions) {
            return Err(BlockError::MerkleRootMismatch { index: self.index });
        }
        Ok(())
    }

    /// Full validation of a mined block
    pub fn validate(&self, difficulty: usize) -> Result<(), BlockError> {
        if !meets_difficulty(&self.hash, difficulty) {
            return Err(BlockError::InvalidProofOfWork {
                index: self.index,
                difficulty,
            });
        }
        self.verify_integrity()
    }

    /// Returns true iff the block passes [`Block::validate`]
    pub fn is_valid(&self, difficulty: usize) -> bool {
        self.validate(difficulty).is_ok()
    }

    /// Inclusion proof for the transaction at `position`
    pub fn merkle_proof(&self, position: usize) -> Option<MerkleProof> {
        MerkleTree::build(&self.transactions).proof(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::sha256_hex;

    fn record(sender: &str, recipient: &str, amount: f64) -> TransactionRecord {
        TransactionRecord {
            id: "tx".to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
        }
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();

        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.merkle_root, "0");
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.verify_integrity().is_ok());
    }

    #[test]
    fn test_calculate_hash() {
        let block = Block::new(1, "previous_hash".to_string(), vec![record("a", "b", 1.0)]);

        let expected = sha256_hex(&format!(
            "1previous_hash{}{}0",
            block.timestamp, block.merkle_root
        ));
        assert_eq!(block.calculate_hash(), expected);
        assert_eq!(block.hash, expected);
        assert_eq!(block.hash.len(), 64);
    }

    #[test]
    fn test_validation_is_repeatable() {
        let mut block = Block::new(1, "p".to_string(), vec![record("a", "b", 1.0)]);
        while !block.hash.starts_with('0') {
            block.nonce += 1;
            block.hash = block.calculate_hash();
        }

        assert!(block.is_valid(1));
        assert!(block.is_valid(1));
        assert_eq!(block.merkle_root, MerkleTree::root_of(&block.transactions));
    }

    #[test]
    fn test_tampering_is_detected() {
        let block = Block::new(1, "p".to_string(), vec![record("a", "b", 1.0)]);

        let mut tampered_records = block.clone();
        tampered_records.transactions[0].amount = 100.0;
        assert_eq!(
            tampered_records.verify_integrity(),
            Err(BlockError::MerkleRootMismatch { index: 1 })
        );

        let mut tampered_nonce = block.clone();
        tampered_nonce.nonce += 1;
        assert_eq!(
            tampered_nonce.verify_integrity(),
            Err(BlockError::HashMismatch { index: 1 })
        );

        let mut malformed = block;
        malformed.hash = "xyz".to_string();
        assert!(matches!(
            malformed.verify_integrity(),
            Err(BlockError::MalformedHash { .. })
        ));
    }

    #[test]
    fn test_proof_of_work_predicate() {
        let block = Block::new(1, "p".to_string(), Vec::new());
        assert!(block.validate(0).is_ok());
        assert_eq!(
            block.validate(64),
            Err(BlockError::InvalidProofOfWork {
                index: 1,
                difficulty: 64
            })
        );
    }

    #[test]
    fn test_merkle_proof_against_block_root() {
        let block = Block::new(
            1,
            "p".to_string(),
            vec![record("a", "b", 1.0), record("b", "c", 2.0), record("c", "a", 3.0)],
        );

        let proof = block.merkle_proof(2).unwrap();
        assert!(proof.verify(&block.merkle_root));
        assert!(block.merkle_proof(3).is_none());
    }
}
