use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::BlockSummary;

/// Request for the register account endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterAccountRequest {
    /// The account name
    pub name: String,

    /// The opening balance
    #[serde(default)]
    pub initial_deposit: f64,
}

/// Request for the transaction endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's account name
    pub sender: String,

    /// The recipient's account name
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Request for the mine endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The account that receives the mining reward
    pub miner: String,
}

/// Response for the chain endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<BlockSummary>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Response for the balance endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub name: String,

    /// Balance derived from the chain
    pub balance: f64,
}

/// Body returned with every non-2xx response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
