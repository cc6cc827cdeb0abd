use std::path::PathBuf;
use std::sync::Mutex;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use mini_ledger::config::Config;
use mini_ledger::{api, blockchain};

/// Single-process proof-of-work ledger with a REST API
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    Ok(config)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::register_account,
        api::handlers::get_all_accounts,
        api::handlers::get_balance,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block
    ),
    components(
        schemas(
            blockchain::Account,
            blockchain::chain::BlockSummary,
            blockchain::chain::TransactionSummary,
            blockchain::chain::ExcludedTransaction,
            blockchain::chain::MinedBlockSummary,
            api::schema::RegisterAccountRequest,
            api::schema::TransactionRequest,
            api::schema::MineRequest,
            api::schema::ChainResponse,
            api::schema::BalanceResponse,
            api::schema::ErrorResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "A minimal proof-of-work ledger API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let ledger = blockchain::Ledger::from_config(&config.ledger);
    info!(
        "Ledger ready (difficulty {}, reward {})",
        ledger.difficulty(),
        ledger.mining_reward()
    );
    let ledger = web::Data::new(Mutex::new(ledger));

    let bind = (config.server.host.clone(), config.server.port);
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)
    .context("binding HTTP listener")?
    .run()
    .await
    .context("running HTTP server")?;

    Ok(())
}
