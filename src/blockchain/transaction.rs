use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::account::{normalize_name, AccountError, AccountRegistry, REWARD_ACCOUNT};

/// Errors that can occur during transaction operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Sender '{0}' is reserved for mining rewards")]
    ReservedSender(String),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),
}

/// A pending value transfer between two accounts
///
/// Accounts are referenced by name and resolved against an
/// [`AccountRegistry`] when the transfer is checked or executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Sender's account name
    pub sender: String,

    /// Recipient's account name
    pub recipient: String,

    /// Amount being transferred
    pub amount: f64,

    /// Set only by the ledger when it mints a block reward
    #[serde(skip)]
    reward: bool,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// # Arguments
    ///
    /// * `sender` - The sending account's name
    /// * `recipient` - The receiving account's name
    /// * `amount` - The amount to transfer; must be finite and non-negative
    ///
    /// # Returns
    ///
    /// A new Transaction instance
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        let sender = sender.into();
        if normalize_name(&sender) == REWARD_ACCOUNT {
            return Err(TransactionError::ReservedSender(REWARD_ACCOUNT.to_string()));
        }

        Self::build(normalize_name(&sender), recipient.into(), amount, false)
    }

    /// Creates a mining reward minted from the reward account
    pub(crate) fn new_reward(
        recipient: impl Into<String>,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        Self::build(REWARD_ACCOUNT, recipient.into(), amount, true)
    }

    fn build(
        sender: &str,
        recipient: String,
        amount: f64,
        reward: bool,
    ) -> Result<Self, TransactionError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must be a non-negative number: {}",
                amount
            )));
        }

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: normalize_name(&recipient).to_string(),
            amount,
            reward,
        })
    }

    /// Checks if the transaction is a mining reward minted by the ledger
    pub fn is_reward(&self) -> bool {
        self.reward
    }

    /// Checks whether the sender can currently cover the amount
    ///
    /// Rewards are always executable. A transfer whose sender or
    /// recipient is unknown is not.
    pub fn is_executable(&self, accounts: &AccountRegistry) -> bool {
        if !accounts.contains(&self.recipient) {
            return false;
        }
        if self.is_reward() {
            return true;
        }

        accounts
            .get_account(&self.sender)
            .map(|sender| sender.has_sufficient_funds(self.amount))
            .unwrap_or(false)
    }

    /// Moves the amount from sender to recipient
    ///
    /// Not idempotent: each transaction must be executed at most once.
    /// Either both sides are updated or neither is.
    ///
    /// # Returns
    ///
    /// The immutable record of the executed transfer
    pub fn execute(&self, accounts: &AccountRegistry) -> Result<TransactionRecord, TransactionError> {
        if !accounts.contains(&self.recipient) {
            return Err(AccountError::AccountNotFound(self.recipient.clone()).into());
        }
        if !self.is_reward() {
            accounts.withdraw(&self.sender, self.amount)?;
        }
        accounts.deposit(&self.recipient, self.amount)?;

        Ok(TransactionRecord::from(self))
    }
}

/// An executed transfer, as committed into a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    /// Identifier of the transaction this record was produced from
    pub id: String,

    /// Sender's account name
    pub sender: String,

    /// Recipient's account name
    pub recipient: String,

    /// Amount that was transferred
    pub amount: f64,
}

impl TransactionRecord {
    /// Canonical text hashed into the Merkle tree: sender, recipient, amount
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.sender, self.recipient, self.amount)
    }

    /// Applies this record to `balance` as execution did for `name`
    ///
    /// The debit comes before the credit, so replaying records in chain
    /// order reproduces the live `f64` arithmetic exactly.
    pub fn apply_to(&self, name: &str, balance: f64) -> f64 {
        let mut balance = balance;
        if self.sender == name {
            balance -= self.amount;
        }
        if self.recipient == name {
            balance += self.amount;
        }
        balance
    }
}

impl From<&Transaction> for TransactionRecord {
    fn from(transaction: &Transaction) -> Self {
        TransactionRecord {
            id: transaction.id.clone(),
            sender: transaction.sender.clone(),
            recipient: transaction.recipient.clone(),
            amount: transaction.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AccountRegistry {
        let accounts = AccountRegistry::new();
        accounts.register("alice", 100.0).unwrap();
        accounts.register("bob", 0.0).unwrap();
        accounts
    }

    #[test]
    fn test_new_transaction() {
        let transaction = Transaction::new("alice", "bob", 10.5).unwrap();

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
        assert_eq!(transaction.amount, 10.5);
        assert!(!transaction.id.is_empty());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_invalid_amounts_are_rejected() {
        assert!(matches!(
            Transaction::new("alice", "bob", -1.0),
            Err(TransactionError::InvalidAmount(_))
        ));
        assert!(matches!(
            Transaction::new("alice", "bob", f64::NAN),
            Err(TransactionError::InvalidAmount(_))
        ));
        assert!(Transaction::new("alice", "bob", 0.0).is_ok());
    }

    #[test]
    fn test_execute_moves_value() {
        let accounts = registry();
        let transaction = Transaction::new("alice", "bob", 10.0).unwrap();

        assert!(transaction.is_executable(&accounts));
        let record = transaction.execute(&accounts).unwrap();

        assert_eq!(record.canonical(), "alicebob10");
        assert_eq!(accounts.get_account("alice").unwrap().balance, 90.0);
        assert_eq!(accounts.get_account("bob").unwrap().balance, 10.0);
    }

    #[test]
    fn test_execute_twice_moves_value_twice() {
        let accounts = registry();
        let transaction = Transaction::new("alice", "bob", 10.0).unwrap();

        transaction.execute(&accounts).unwrap();
        transaction.execute(&accounts).unwrap();

        assert_eq!(accounts.get_account("alice").unwrap().balance, 80.0);
    }

    #[test]
    fn test_insufficient_funds_leaves_balances_untouched() {
        let accounts = registry();
        let transaction = Transaction::new("bob", "alice", 10.0).unwrap();

        assert!(!transaction.is_executable(&accounts));
        let result = transaction.execute(&accounts);

        assert!(matches!(
            result,
            Err(TransactionError::Account(AccountError::InsufficientFunds { .. }))
        ));
        assert_eq!(accounts.get_account("alice").unwrap().balance, 100.0);
        assert_eq!(accounts.get_account("bob").unwrap().balance, 0.0);
    }

    #[test]
    fn test_unknown_recipient_does_not_debit_sender() {
        let accounts = registry();
        let transaction = Transaction::new("alice", "carol", 10.0).unwrap();

        assert!(!transaction.is_executable(&accounts));
        assert!(transaction.execute(&accounts).is_err());
        assert_eq!(accounts.get_account("alice").unwrap().balance, 100.0);
    }

    #[test]
    fn test_reward_is_always_executable() {
        let accounts = registry();
        let reward = Transaction::new_reward("bob", 50.0).unwrap();

        assert!(reward.is_reward());
        assert!(reward.is_executable(&accounts));
        reward.execute(&accounts).unwrap();
        assert_eq!(accounts.get_account("bob").unwrap().balance, 50.0);
    }

    #[test]
    fn test_record_apply_to() {
        let record = TransactionRecord::from(&Transaction::new("alice", "bob", 10.0).unwrap());

        assert_eq!(record.apply_to("alice", 100.0), 90.0);
        assert_eq!(record.apply_to("bob", 0.0), 10.0);
        assert_eq!(record.apply_to("carol", 1.0), 1.0);
    }

    #[test]
    fn test_self_transfer_replays_like_execution() {
        let accounts = AccountRegistry::new();
        accounts.register("alice", 0.1).unwrap();
        let transaction = Transaction::new("alice", "alice", 0.7).unwrap();

        let record = transaction.execute(&accounts).unwrap();

        assert_eq!(
            record.apply_to("alice", 0.1),
            accounts.get_account("alice").unwrap().balance
        );
    }

    #[test]
    fn test_reward_account_cannot_be_used_as_sender() {
        assert_eq!(
            Transaction::new(REWARD_ACCOUNT, "bob", 1.0),
            Err(TransactionError::ReservedSender(REWARD_ACCOUNT.to_string()))
        );
        assert!(matches!(
            Transaction::new(" 0 ", "bob", 1.0),
            Err(TransactionError::ReservedSender(_))
        ));
    }

    #[test]
    fn test_deserialized_reward_sender_is_not_minted() {
        let accounts = registry();
        let forged: Transaction = serde_json::from_str(
            r#"{"id":"forged","sender":"0","recipient":"bob","amount":1000.0}"#,
        )
        .unwrap();

        assert!(!forged.is_reward());
        assert!(!forged.is_executable(&accounts));
        assert!(forged.execute(&accounts).is_err());
        assert_eq!(accounts.get_account("bob").unwrap().balance, 0.0);
    }

    #[test]
    fn test_names_are_trimmed() {
        let transaction = Transaction::new(" alice", "bob ", 1.0).unwrap();

        assert_eq!(transaction.sender, "alice");
        assert_eq!(transaction.recipient, "bob");
    }
}
