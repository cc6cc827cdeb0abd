//! Minimal single-process ledger: accounts, transactions, Merkle-committed
//! blocks and a proof-of-work chain, with an HTTP front end.

pub mod api;
pub mod blockchain;
pub mod config;
