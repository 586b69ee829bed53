use std::path::PathBuf;
use std::sync::Arc;

use alloy_provider::ProviderBuilder;
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use tx_cache::auth::{HmacTokenAuthority, TokenAuthority};
use tx_cache::fetcher::NodeFetcher;
use tx_cache::fetcher::rpc::{AlloyNodeClient, NodeClient};
use tx_cache::metrics::Metrics;
use tx_cache::service::{Retrieved, TransactionService};
use tx_cache::storage::postgres::PostgresStore;
use tx_cache::storage::{CacheStore, setup_write_back};
use tx_cache::utils::load_config;

#[derive(Parser)]
#[command(name = "tx-cache", about = "Cached Ethereum transaction lookups")]
struct Cli {
    #[arg(long, env = "TX_CACHE_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up transactions by hash
    Lookup {
        #[arg(required = true)]
        hashes: Vec<String>,
        #[arg(long, env = "AUTH_TOKEN")]
        auth_token: Option<String>,
    },
    /// Look up the hashes carried by a hex-encoded RLP list
    LookupEncoded {
        batch: String,
        #[arg(long, env = "AUTH_TOKEN")]
        auth_token: Option<String>,
    },
    /// Transactions previously looked up by the token's subject
    History {
        #[arg(long, env = "AUTH_TOKEN")]
        auth_token: String,
    },
    /// Create a user account
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "TX_CACHE_PASSWORD")]
        password: String,
    },
    /// Check a user's credentials and issue a token for them
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "TX_CACHE_PASSWORD")]
        password: String,
    },
    /// Serve lookups read line by line from stdin until EOF or Ctrl-C.
    /// Each line holds hashes separated by whitespace or commas.
    Serve {
        #[arg(long, env = "AUTH_TOKEN")]
        auth_token: Option<String>,
    },
    /// Every cached transaction
    All,
}

fn retrieved_json(retrieved: &Retrieved) -> serde_json::Value {
    let failures: Vec<_> = retrieved
        .failures
        .iter()
        .flat_map(|failures| failures.failures.iter())
        .map(|failure| json!({ "hash": failure.hash, "error": failure.cause.to_string() }))
        .collect();

    json!({
        "transactions": retrieved.records,
        "failures": failures,
    })
}

fn print_retrieved(retrieved: &Retrieved) -> Result<()> {
    print_json(&retrieved_json(retrieved))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve<N: NodeClient>(
    service: &TransactionService<N>,
    auth_token: Option<&str>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Reading transaction hashes from stdin");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("Reached end of input");
                    break;
                };
                let hashes: Vec<String> = line
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|hash| !hash.is_empty())
                    .map(str::to_string)
                    .collect();
                if hashes.is_empty() {
                    continue;
                }

                match service.retrieve_for(auth_token, &hashes).await {
                    Ok(retrieved) => println!("{}", retrieved_json(&retrieved)),
                    Err(e) => error!("Failed to get transactions: {}", e),
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    let tokens: Arc<dyn TokenAuthority> =
        Arc::new(HmacTokenAuthority::new(config.jwt_secret.as_bytes()));

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new("tx_cache".to_string())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    let store = PostgresStore::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    store
        .migrate()
        .await
        .context("failed to migrate tables to database")?;
    let store: Arc<dyn CacheStore> = Arc::new(store);

    let rpc_url: Url = config.rpc_url.parse()?;
    info!("RPC URL: {}", rpc_url);
    let provider = ProviderBuilder::new().connect_http(rpc_url);
    let fetcher = NodeFetcher::new(AlloyNodeClient::new(provider), &config.fetch)
        .with_metrics(metrics.clone());

    let (write_back, worker) = setup_write_back(
        store.clone(),
        config.write_back.channel_capacity,
        metrics.clone(),
    );
    let service = TransactionService::new(store, fetcher, tokens, write_back)
        .with_metrics(metrics.clone())
        .with_token_ttl(config.token_ttl_hours);

    let outcome = match cli.command {
        Command::Lookup { hashes, auth_token } => service
            .retrieve_for(auth_token.as_deref(), &hashes)
            .await
            .map_err(|e| anyhow!(e).context("get transactions"))
            .and_then(|retrieved| print_retrieved(&retrieved)),
        Command::LookupEncoded { batch, auth_token } => service
            .retrieve_encoded(auth_token.as_deref(), &batch)
            .await
            .map_err(|e| anyhow!(e).context("get transactions by batch"))
            .and_then(|retrieved| print_retrieved(&retrieved)),
        Command::History { auth_token } => service
            .history_for_token(&auth_token)
            .await
            .map_err(|e| anyhow!(e).context("get user transactions"))
            .and_then(|records| print_json(&json!({ "transactions": records }))),
        Command::All => service
            .all_transactions()
            .await
            .map_err(|e| anyhow!(e).context("get all transactions"))
            .and_then(|records| print_json(&json!({ "transactions": records }))),
        Command::AddUser { username, password } => service
            .register_user(&username, &password)
            .await
            .map_err(|e| anyhow!(e).context("add user"))
            .and_then(|user| print_json(&json!({ "id": user.id, "username": user.username }))),
        Command::Login { username, password } => service
            .authenticate(&username, &password)
            .await
            .map_err(|e| anyhow!(e).context("authenticate"))
            .and_then(|token| print_json(&json!({ "token": token }))),
        Command::Serve { auth_token } => serve(&service, auth_token.as_deref()).await,
    };

    // Dropping the service closes the write-back channel; wait for queued records
    drop(service);
    worker.join().await;

    if let Some(metrics) = &metrics {
        debug!("Final metrics:\n{}", metrics.render());
    }

    outcome
}
