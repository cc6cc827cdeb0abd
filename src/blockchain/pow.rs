use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use thiserror::Error;

use super::block::Block;
use super::crypto::meets_difficulty;

/// Default number of leading zero hex digits required in a block hash
pub const DEFAULT_DIFFICULTY: usize = 2;

const PROGRESS_LOG_INTERVAL: u64 = 100_000;

/// Errors that can stop a nonce search
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Mining timed out after {attempts} attempts")]
    TimedOut { attempts: u64 },

    #[error("Nonce space exhausted")]
    NonceExhausted,
}

/// Shared flag used to abort a running nonce search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Nonce search against a fixed leading-zero difficulty
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    difficulty: usize,
    timeout: Option<Duration>,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    /// Creates a proof of work with no time limit
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork {
            difficulty,
            timeout: None,
        }
    }

    /// Sets a wall-clock limit for each search
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether a hash satisfies this difficulty
    pub fn is_satisfied_by(&self, hash: &str) -> bool {
        meets_difficulty(hash, self.difficulty)
    }

    /// Searches for a nonce that satisfies the difficulty
    ///
    /// The search starts at nonce 0. The token and the deadline are
    /// polled before every attempt.
    ///
    /// # Arguments
    ///
    /// * `block` - The candidate block; its `nonce` and `hash` are updated in place
    /// * `cancel` - Token checked on every nonce increment
    ///
    /// # Returns
    ///
    /// The winning nonce; `block.hash` reflects it on return
    pub fn mine(&self, block: &mut Block, cancel: &CancelToken) -> Result<u64, PowError> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut attempts: u64 = 0;

        block.nonce = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PowError::Cancelled { attempts });
            }
            if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
                return Err(PowError::TimedOut { attempts });
            }

            block.hash = block.calculate_hash();
            attempts += 1;

            if self.is_satisfied_by(&block.hash) {
                debug!(
                    "Found nonce {} for block {} after {} attempts",
                    block.nonce, block.index, attempts
                );
                return Ok(block.nonce);
            }

            if attempts % PROGRESS_LOG_INTERVAL == 0 {
                debug!("Block {}: {} nonces tried", block.index, attempts);
            }

            block.nonce = block.nonce.checked_add(1).ok_or(PowError::NonceExhausted)?;
        }
    }
}
