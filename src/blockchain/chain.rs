use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::account::{Account, AccountError, AccountRegistry};
use super::block::{Block, BlockError, GENESIS_PREVIOUS_HASH};
use super::merkle::EMPTY_ROOT;
use super::pow::{CancelToken, PowError, ProofOfWork, DEFAULT_DIFFICULTY};
use super::transaction::{Transaction, TransactionError, TransactionRecord};
use crate::config::LedgerConfig;

/// Default reward minted for the miner of each block
pub const DEFAULT_MINING_REWARD: f64 = 50.0;

/// Errors that can occur during ledger operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Mining failed: {0}")]
    MiningFailed(BlockError),

    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),

    #[error("Mining aborted: {0}")]
    Pow(#[from] PowError),

    #[error("Chain linkage violation at block {index}: expected previous hash {expected}, found {found}")]
    ChainLinkageViolation {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("Block index mismatch: expected {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("Invalid genesis block: {0}")]
    InvalidGenesis(String),
}

impl LedgerError {
    /// True when the caller can fix its input and try again
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LedgerError::ChainLinkageViolation { .. }
                | LedgerError::IndexMismatch { .. }
                | LedgerError::InvalidGenesis(_)
        )
    }
}

/// Transaction as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionSummary {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
}

impl From<&Transaction> for TransactionSummary {
    fn from(transaction: &Transaction) -> Self {
        TransactionSummary {
            id: transaction.id.clone(),
            sender: transaction.sender.clone(),
            recipient: transaction.recipient.clone(),
            amount: transaction.amount,
        }
    }
}

impl From<&TransactionRecord> for TransactionSummary {
    fn from(record: &TransactionRecord) -> Self {
        TransactionSummary {
            id: record.id.clone(),
            sender: record.sender.clone(),
            recipient: record.recipient.clone(),
            amount: record.amount,
        }
    }
}

/// Block as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BlockSummary {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub merkle_root: String,
    pub nonce: u64,
    pub hash: String,
    pub transactions: Vec<TransactionSummary>,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        BlockSummary {
            index: block.index,
            previous_hash: block.previous_hash.clone(),
            timestamp: block.timestamp,
            merkle_root: block.merkle_root.clone(),
            nonce: block.nonce,
            hash: block.hash.clone(),
            transactions: block.transactions.iter().map(TransactionSummary::from).collect(),
        }
    }
}

/// A pending transaction left out of a block, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExcludedTransaction {
    pub transaction: TransactionSummary,
    pub reason: String,
}

/// Outcome of a successful mining round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MinedBlockSummary {
    pub block: BlockSummary,
    pub excluded: Vec<ExcludedTransaction>,
}

/// The ledger: an append-only chain of blocks anchored at genesis,
/// the pending pool, and the accounts it moves value between
#[derive(Debug)]
pub struct Ledger {
    /// The chain of blocks
    chain: Vec<Block>,

    /// Transactions waiting for the next block
    pending: Vec<Transaction>,

    /// Registered accounts
    accounts: AccountRegistry,

    /// Nonce search settings
    proof_of_work: ProofOfWork,

    /// Reward minted for each mined block
    mining_reward: f64,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new()
    }
}

impl Ledger {
    /// Creates a ledger with the default difficulty and reward
    pub fn new() -> Self {
        Ledger::with_settings(ProofOfWork::new(DEFAULT_DIFFICULTY), DEFAULT_MINING_REWARD)
    }

    /// Creates a ledger from configuration
    pub fn from_config(config: &LedgerConfig) -> Self {
        let proof_of_work = ProofOfWork::new(config.difficulty)
            .with_timeout(config.mining_timeout_secs.map(Duration::from_secs));
        Ledger::with_settings(proof_of_work, config.mining_reward)
    }

    fn with_settings(proof_of_work: ProofOfWork, mining_reward: f64) -> Self {
        let mut ledger = Ledger {
            chain: Vec::new(),
            pending: Vec::new(),
            accounts: AccountRegistry::new(),
            proof_of_work,
            mining_reward,
        };

        ledger.create_genesis_block();
        ledger
    }

    /// Creates the genesis block (first block in the chain)
    fn create_genesis_block(&mut self) {
        let genesis = Block::genesis();
        debug!("Created genesis block {}", genesis.hash);
        self.chain.push(genesis);
    }

    pub fn difficulty(&self) -> usize {
        self.proof_of_work.difficulty()
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// Gets the last block in the chain
    pub fn latest_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    /// Gets the blocks in the chain, genesis first
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Gets the account registry
    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Registers a new account with an opening balance
    pub fn register_account(&self, name: &str, initial_deposit: f64) -> Result<Account, LedgerError> {
        let account = self.accounts.register(name, initial_deposit)?;
        info!("Registered account {} with {}", account.name, account.balance);
        Ok(account)
    }

    /// Adds a transaction to the pending pool
    ///
    /// Both parties must be registered. Rewards are minted only while a
    /// block is assembled and are never accepted from callers.
    pub fn create_transaction(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        if transaction.is_reward() {
            return Err(TransactionError::ReservedSender(transaction.sender).into());
        }
        for name in [&transaction.sender, &transaction.recipient] {
            if !self.accounts.contains(name) {
                return Err(AccountError::AccountNotFound(name.clone()).into());
            }
        }

        debug!(
            "Queued transaction {} ({} -> {}: {})",
            transaction.id, transaction.sender, transaction.recipient, transaction.amount
        );
        self.pending.push(transaction);
        Ok(())
    }

    /// Builds a transfer between registered accounts and queues it
    ///
    /// Balances are not checked here; an uncovered transfer is dropped
    /// when the next block is assembled.
    pub fn submit_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<TransactionSummary, LedgerError> {
        let transaction = Transaction::new(sender, recipient, amount)?;
        let summary = TransactionSummary::from(&transaction);
        self.create_transaction(transaction)?;
        Ok(summary)
    }

    /// Mines the pending pool into a new block, rewarding `miner`
    pub fn mine(&mut self, miner: &str) -> Result<MinedBlockSummary, LedgerError> {
        self.mine_with_cancel(miner, &CancelToken::new())
    }

    /// Like [`Ledger::mine`], but the nonce search stops once `cancel` is set
    pub fn mine_with_cancel(
        &mut self,
        miner: &str,
        cancel: &CancelToken,
    ) -> Result<MinedBlockSummary, LedgerError> {
        if !self.accounts.contains(miner) {
            return Err(AccountError::AccountNotFound(miner.to_string()).into());
        }

        let (block, excluded) = self.mine_pending_transactions(miner, cancel)?;
        Ok(MinedBlockSummary {
            block: BlockSummary::from(&block),
            excluded,
        })
    }

    /// Assembles, mines and appends the next block
    ///
    /// The pending pool is cleared up front: if mining or validation fails
    /// its transactions are lost and no value moves.
    fn mine_pending_transactions(
        &mut self,
        miner: &str,
        cancel: &CancelToken,
    ) -> Result<(Block, Vec<ExcludedTransaction>), LedgerError> {
        let reward = Transaction::new_reward(miner, self.mining_reward)?;
        let mut pending = std::mem::take(&mut self.pending);
        pending.push(reward);

        // Effects are staged on a copy and committed only with the block
        let staged = self.accounts.clone();
        let mut records = Vec::with_capacity(pending.len());
        let mut excluded = Vec::new();

        for transaction in &pending {
            match transaction.execute(&staged) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!("Excluding transaction {}: {}", transaction.id, err);
                    excluded.push(ExcludedTransaction {
                        transaction: TransactionSummary::from(transaction),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let latest = self.latest_block();
        let mut block = Block::new(latest.index + 1, latest.hash.clone(), records);

        if let Err(err) = self.proof_of_work.mine(&mut block, cancel) {
            warn!("Discarding candidate block {}: {}", block.index, err);
            return Err(err.into());
        }

        if let Err(err) = block.validate(self.difficulty()) {
            warn!("Discarding candidate block {}: {}", block.index, err);
            return Err(LedgerError::MiningFailed(err));
        }

        self.append_block(block.clone())?;
        self.accounts.commit(staged);

        info!(
            "Mined block {} with {} transactions (nonce {}, hash {})",
            block.index,
            block.transactions.len(),
            block.nonce,
            block.hash
        );
        Ok((block, excluded))
    }

    /// Appends a block after checking its position and linkage
    fn append_block(&mut self, block: Block) -> Result<(), LedgerError> {
        let latest = self.latest_block();

        let expected_index = latest.index + 1;
        if block.index != expected_index {
            return Err(LedgerError::IndexMismatch {
                expected: expected_index,
                found: block.index,
            });
        }

        if block.previous_hash != latest.hash {
            return Err(LedgerError::ChainLinkageViolation {
                index: block.index,
                expected: latest.hash.clone(),
                found: block.previous_hash.clone(),
            });
        }

        self.chain.push(block);
        Ok(())
    }

    /// Derives a balance by replaying the whole chain
    ///
    /// Starts from the account's opening balance and applies every
    /// committed record in chain order, the same order and arithmetic
    /// mining used. The live balance is not read.
    pub fn get_balance(&self, name: &str) -> Result<f64, LedgerError> {
        let account = self.accounts.get_account(name)?;

        let balance = self
            .chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .fold(account.opening_balance, |balance, record| {
                record.apply_to(&account.name, balance)
            });

        Ok(balance)
    }

    /// Balance lookup for front ends
    pub fn query_balance(&self, name: &str) -> Result<f64, LedgerError> {
        self.get_balance(name)
    }

    /// Gets every block in the chain
    pub fn list_blocks(&self) -> Vec<BlockSummary> {
        self.chain.iter().map(BlockSummary::from).collect()
    }

    /// Gets all pending transactions
    pub fn list_pending(&self) -> Vec<TransactionSummary> {
        self.pending.iter().map(TransactionSummary::from).collect()
    }

    /// Validates the entire chain
    ///
    /// Checks the genesis shape, then for every later block its index,
    /// linkage, stored hash, merkle root and proof of work. Nothing is
    /// re-executed.
    pub fn validate_chain(&self) -> Result<(), LedgerError> {
        let genesis = &self.chain[0];
        if genesis.index != 0
            || genesis.previous_hash != GENESIS_PREVIOUS_HASH
            || !genesis.transactions.is_empty()
            || genesis.merkle_root != EMPTY_ROOT
        {
            return Err(LedgerError::InvalidGenesis(format!(
                "unexpected genesis fields in block {}",
                genesis.hash
            )));
        }
        genesis
            .verify_integrity()
            .map_err(|err| LedgerError::InvalidGenesis(err.to_string()))?;

        for pair in self.chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            if current.index != previous.index + 1 {
                return Err(LedgerError::IndexMismatch {
                    expected: previous.index + 1,
                    found: current.index,
                });
            }

            if current.previous_hash != previous.hash {
                return Err(LedgerError::ChainLinkageViolation {
                    index: current.index,
                    expected: previous.hash.clone(),
                    found: current.previous_hash.clone(),
                });
            }

            current.validate(self.difficulty())?;
        }

        Ok(())
    }

    /// Returns true iff [`Ledger::validate_chain`] succeeds
    pub fn is_chain_valid(&self) -> bool {
        self.validate_chain().is_ok()
    }
}
