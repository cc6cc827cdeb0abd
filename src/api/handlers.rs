use std::sync::{Mutex, MutexGuard, TryLockError};

use actix_web::{web, HttpResponse, Responder};
use log::error;

use crate::blockchain::chain::{MinedBlockSummary, TransactionSummary};
use crate::blockchain::{Account, AccountError, Ledger, LedgerError};

use super::schema::{
    BalanceResponse, ChainResponse, ErrorResponse, MineRequest, RegisterAccountRequest,
    TransactionRequest,
};

/// Shared ledger state
pub type LedgerData = web::Data<Mutex<Ledger>>;

fn error_body(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: message.into(),
    }
}

/// Maps an engine error to an HTTP response
fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    let body = error_body(err.to_string());
    match err {
        LedgerError::Account(AccountError::AccountNotFound(_)) => HttpResponse::NotFound().json(body),
        LedgerError::Account(AccountError::AccountAlreadyExists(_)) => {
            HttpResponse::Conflict().json(body)
        }
        LedgerError::Account(_) | LedgerError::Transaction(_) => HttpResponse::BadRequest().json(body),
        LedgerError::MiningFailed(_) | LedgerError::Pow(_) => {
            HttpResponse::UnprocessableEntity().json(body)
        }
        _ => {
            error!("Ledger error: {}", err);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn poisoned_response() -> HttpResponse {
    error!("Ledger lock poisoned");
    HttpResponse::InternalServerError().json(error_body("Ledger state unavailable"))
}

fn busy_response() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(error_body("Ledger busy: mining in progress"))
}

/// Takes the ledger lock without parking the async worker
///
/// Mining holds the lock for the whole nonce search, so a request that
/// arrives meanwhile gets `503 Service Unavailable` instead of waiting.
fn lock_ledger(ledger: &LedgerData) -> Result<MutexGuard<'_, Ledger>, HttpResponse> {
    ledger.try_lock().map_err(|err| match err {
        TryLockError::WouldBlock => busy_response(),
        TryLockError::Poisoned(_) => poisoned_response(),
    })
}

/// Get the full chain
///
/// Returns every block and the chain's validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let ledger = match lock_ledger(&ledger) {
        Ok(ledger) => ledger,
        Err(response) => return response,
    };

    let chain = ledger.list_blocks();
    let response = ChainResponse {
        length: chain.len(),
        chain,
        is_valid: ledger.is_chain_valid(),
    };

    HttpResponse::Ok().json(response)
}

/// Check if the chain is valid
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    match lock_ledger(&ledger) {
        Ok(ledger) => HttpResponse::Ok().json(ledger.is_chain_valid()),
        Err(response) => response,
    }
}

/// Register an account
///
/// Creates a named account holding an opening balance
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    request_body = RegisterAccountRequest,
    responses(
        (status = 201, description = "Account registered", body = Account),
        (status = 400, description = "Invalid name or deposit", body = ErrorResponse),
        (status = 409, description = "Name already taken", body = ErrorResponse)
    )
)]
pub async fn register_account(
    ledger: LedgerData,
    request: web::Json<RegisterAccountRequest>,
) -> impl Responder {
    let ledger = match lock_ledger(&ledger) {
        Ok(ledger) => ledger,
        Err(response) => return response,
    };

    match ledger.register_account(&request.name, request.initial_deposit) {
        Ok(account) => HttpResponse::Created().json(account),
        Err(err) => ledger_error_response(&err),
    }
}

/// Get all accounts
///
/// Returns the live state of every registered account
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = Vec<Account>)
    )
)]
pub async fn get_all_accounts(ledger: LedgerData) -> impl Responder {
    match lock_ledger(&ledger) {
        Ok(ledger) => HttpResponse::Ok().json(ledger.accounts().get_all_accounts()),
        Err(response) => response,
    }
}

/// Get an account balance
///
/// The balance is derived by replaying the chain
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{name}/balance",
    params(
        ("name" = String, Path, description = "Account name")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    )
)]
pub async fn get_balance(ledger: LedgerData, name: web::Path<String>) -> impl Responder {
    let ledger = match lock_ledger(&ledger) {
        Ok(ledger) => ledger,
        Err(response) => return response,
    };

    let name = name.into_inner();
    match ledger.query_balance(&name) {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { name, balance }),
        Err(err) => ledger_error_response(&err),
    }
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<TransactionSummary>)
    )
)]
pub async fn get_pending_transactions(ledger: LedgerData) -> impl Responder {
    match lock_ledger(&ledger) {
        Ok(ledger) => HttpResponse::Ok().json(ledger.list_pending()),
        Err(response) => response,
    }
}

/// Create a new transaction
///
/// Adds a new transaction to the pending pool. Funds are checked when
/// the next block is mined, not here.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction queued", body = TransactionSummary),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 404, description = "Unknown sender or recipient", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    ledger: LedgerData,
    request: web::Json<TransactionRequest>,
) -> impl Responder {
    let mut ledger = match lock_ledger(&ledger) {
        Ok(ledger) => ledger,
        Err(response) => return response,
    };

    match ledger.submit_transaction(&request.sender, &request.recipient, request.amount) {
        Ok(summary) => HttpResponse::Created().json(summary),
        Err(err) => ledger_error_response(&err),
    }
}

enum MineFailure {
    Busy,
    Poisoned,
    Ledger(LedgerError),
}

/// Mine a new block
///
/// Commits every covered pending transaction plus the miner's reward
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MinedBlockSummary),
        (status = 404, description = "Unknown miner", body = ErrorResponse),
        (status = 422, description = "Candidate block discarded", body = ErrorResponse),
        (status = 503, description = "Another block is being mined", body = ErrorResponse)
    )
)]
pub async fn mine_block(ledger: LedgerData, request: web::Json<MineRequest>) -> impl Responder {
    let miner = request.into_inner().miner;

    // Nonce search is CPU-bound; keep it off the async workers
    let result = web::block(move || -> Result<MinedBlockSummary, MineFailure> {
        let mut ledger = ledger.try_lock().map_err(|err| match err {
            TryLockError::WouldBlock => MineFailure::Busy,
            TryLockError::Poisoned(_) => MineFailure::Poisoned,
        })?;
        ledger.mine(&miner).map_err(MineFailure::Ledger)
    })
    .await;

    match result {
        Ok(Ok(mined)) => HttpResponse::Ok().json(mined),
        Ok(Err(MineFailure::Ledger(err))) => ledger_error_response(&err),
        Ok(Err(MineFailure::Busy)) => busy_response(),
        Ok(Err(MineFailure::Poisoned)) => poisoned_response(),
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(error_body("Mining task failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::chain::BlockSummary;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    fn ledger_data() -> LedgerData {
        web::Data::new(Mutex::new(Ledger::new()))
    }

    macro_rules! app {
        ($data:expr) => {
            test::init_service(App::new().app_data($data.clone()).configure(configure_routes)).await
        };
    }

    #[actix_web::test]
    async fn test_transfer_flow() {
        let data = ledger_data();
        let app = app!(data);

        for (name, deposit) in [("alice", 100.0), ("bob", 0.0), ("miner", 0.0)] {
            let req = test::TestRequest::post()
                .uri("/api/v1/accounts")
                .set_json(json!({ "name": name, "initial_deposit": deposit }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(json!({ "sender": "alice", "recipient": "bob", "amount": 10.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get().uri("/api/v1/transactions/pending").to_request();
        let pending: Vec<TransactionSummary> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending.len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(json!({ "miner": "miner" }))
            .to_request();
        let mined: MinedBlockSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mined.block.index, 1);
        assert!(mined.block.hash.starts_with("00"));

        let req = test::TestRequest::get().uri("/api/v1/accounts/bob/balance").to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(balance.balance, 10.0);

        let req = test::TestRequest::get().uri("/api/v1/chain").to_request();
        let chain: ChainResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chain.length, 2);
        assert!(chain.is_valid);
        let blocks: &[BlockSummary] = &chain.chain;
        assert_eq!(blocks[1].previous_hash, blocks[0].hash);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let data = ledger_data();
        let app = app!(data);

        let req = test::TestRequest::get().uri("/api/v1/accounts/ghost/balance").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(json!({ "miner": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let req = test::TestRequest::post()
                .uri("/api/v1/accounts")
                .set_json(json!({ "name": "alice", "initial_deposit": 1.0 }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(json!({ "sender": "alice", "recipient": "alice", "amount": -5.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/validate").to_request();
        let valid: bool = test::call_and_read_body_json(&app, req).await;
        assert!(valid);
    }

    #[actix_web::test]
    async fn test_requests_during_mining_are_turned_away() {
        let data = ledger_data();
        let app = app!(data);

        let guard = data.lock().unwrap();
        for req in [
            test::TestRequest::get().uri("/api/v1/validate").to_request(),
            test::TestRequest::get().uri("/api/v1/transactions/pending").to_request(),
            test::TestRequest::post()
                .uri("/api/v1/mine")
                .set_json(json!({ "miner": "miner" }))
                .to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        drop(guard);

        let req = test::TestRequest::get().uri("/api/v1/validate").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_reward_account_is_not_a_valid_sender() {
        let data = ledger_data();
        let app = app!(data);

        let req = test::TestRequest::post()
            .uri("/api/v1/accounts")
            .set_json(json!({ "name": "mallory", "initial_deposit": 0.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(json!({ "sender": "0", "recipient": "mallory", "amount": 1000.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/accounts/mallory/balance").to_request();
        let balance: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(balance.balance, 0.0);
    }
}
