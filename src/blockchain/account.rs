use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Name of the synthetic account that mining rewards are minted from
pub const REWARD_ACCOUNT: &str = "0";

/// Canonical form of an account name: surrounding whitespace is ignored
pub fn normalize_name(name: &str) -> &str {
    name.trim()
}

/// Errors that can occur during account operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Invalid account name: {0}")]
    InvalidName(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// A named balance holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// Unique account name
    pub name: String,

    /// Live balance, mutated as transactions are executed
    pub balance: f64,

    /// Balance at registration time; never changes afterwards
    pub opening_balance: f64,
}

impl Account {
    /// Creates a new account holding `initial_deposit`
    pub fn new(name: impl Into<String>, initial_deposit: f64) -> Self {
        Account {
            name: name.into(),
            balance: initial_deposit,
            opening_balance: initial_deposit,
        }
    }

    /// Increases the account's balance
    pub fn deposit(&mut self, amount: f64) {
        self.balance += amount;
    }

    /// Decreases the account's balance
    ///
    /// # Arguments
    ///
    /// * `amount` - The amount to subtract
    ///
    /// # Returns
    ///
    /// `InsufficientFunds` if the balance is lower than `amount`; the
    /// balance is left untouched in that case
    pub fn withdraw(&mut self, amount: f64) -> Result<(), AccountError> {
        if !self.has_sufficient_funds(amount) {
            return Err(AccountError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Checks if the account has sufficient funds
    pub fn has_sufficient_funds(&self, amount: f64) -> bool {
        self.balance >= amount
    }
}

/// Registry of every known account, keyed by name
///
/// Lookups never create accounts: a miss is reported as
/// `AccountNotFound`. Every name is normalized before it is used as a key. Cloning the registry yields an independent copy,
/// which is what mining uses to stage transaction effects.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: DashMap<String, Account>,
}

impl AccountRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        AccountRegistry {
            accounts: DashMap::new(),
        }
    }

    /// Registers a new account
    ///
    /// # Arguments
    ///
    /// * `name` - The account name; surrounding whitespace is ignored
    /// * `initial_deposit` - The opening balance
    ///
    /// # Returns
    ///
    /// The registered account
    pub fn register(&self, name: &str, initial_deposit: f64) -> Result<Account, AccountError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(AccountError::InvalidName("name must not be empty".to_string()));
        }
        if name == REWARD_ACCOUNT {
            return Err(AccountError::InvalidName(format!("'{}' is reserved", name)));
        }
        if !initial_deposit.is_finite() || initial_deposit < 0.0 {
            return Err(AccountError::InvalidAmount(format!(
                "Initial deposit must be a non-negative number: {}",
                initial_deposit
            )));
        }

        match self.accounts.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(AccountError::AccountAlreadyExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let account = Account::new(name, initial_deposit);
                entry.insert(account.clone());
                Ok(account)
            }
        }
    }

    /// Gets a copy of an account by name
    pub fn get_account(&self, name: &str) -> Result<Account, AccountError> {
        let name = normalize_name(name);
        self.accounts
            .get(name)
            .map(|account| account.clone())
            .ok_or_else(|| AccountError::AccountNotFound(name.to_string()))
    }

    /// Checks whether an account is registered
    pub fn contains(&self, name: &str) -> bool {
        self.accounts.contains_key(normalize_name(name))
    }

    /// Deposits into a registered account
    pub fn deposit(&self, name: &str, amount: f64) -> Result<(), AccountError> {
        let name = normalize_name(name);
        let mut account = self
            .accounts
            .get_mut(name)
            .ok_or_else(|| AccountError::AccountNotFound(name.to_string()))?;
        account.deposit(amount);
        Ok(())
    }

    /// Withdraws from a registered account
    pub fn withdraw(&self, name: &str, amount: f64) -> Result<(), AccountError> {
        let name = normalize_name(name);
        let mut account = self
            .accounts
            .get_mut(name)
            .ok_or_else(|| AccountError::AccountNotFound(name.to_string()))?;
        account.withdraw(amount)
    }

    /// Replaces this registry's contents with those of `staged`
    pub fn commit(&self, staged: AccountRegistry) {
        self.accounts.clear();
        for (name, account) in staged.accounts.into_iter() {
            self.accounts.insert(name, account);
        }
    }

    /// Gets all accounts, ordered by name
    pub fn get_all_accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        accounts
    }
}
