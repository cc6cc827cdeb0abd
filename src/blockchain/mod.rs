// Ledger engine
//
// This module contains the core ledger implementation including:
// - Accounts and the account registry
// - Transactions and executed transaction records
// - Merkle commitments
// - Proof of work
// - Blocks and the chain

pub mod account;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod merkle;
pub mod pow;
pub mod transaction;

// Re-export main components for easier access
pub use account::{Account, AccountError, AccountRegistry};
pub use block::Block;
pub use chain::{BlockSummary, Ledger, LedgerError, MinedBlockSummary, TransactionSummary};
pub use pow::CancelToken;
pub use transaction::{Transaction, TransactionRecord};
