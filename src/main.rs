//! Stakeflow operator CLI
//!
//! Inspects the backend's game catalog and sessions, and checks deposit
//! transactions against the ledger.

use clap::{Parser, Subcommand};
use stakeflow::{
    config::{generate_sample_config, ConfigLoader, StakeflowConfig},
    errors::StakeflowResult,
    ledger::{ConfirmationWaiter, Finality, LedgerQuery, RpcLedger, TransactionRef},
    protocol::{ApiClientConfig, GameService, HttpGameService},
};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Stakeflow CLI
#[derive(Parser)]
#[command(name = "stakeflow")]
#[command(about = "Staked game session client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List games offered by the backend, merged over the configured catalog
    Games,
    /// Show the server's record of a session
    Session { id: String },
    /// Cancel a session on the server
    Cancel { id: String },
    /// Query a transaction's status once
    TxStatus { reference: String },
    /// Poll a transaction until it is final or the timeout passes
    AwaitTx {
        reference: String,
        /// Overrides session.confirmation_timeout_ms
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Write a sample configuration file
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> StakeflowResult<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        generate_sample_config(&path.to_string_lossy())?;
        println!("📝 Wrote sample configuration to {}", path.display());
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let default_filter = if cli.verbose {
        "stakeflow=debug".to_string()
    } else {
        format!("stakeflow={}", config.logging.level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Games => list_games(&config).await,
        Commands::Session { id } => show_session(&config, &id).await,
        Commands::Cancel { id } => cancel_session(&config, &id).await,
        Commands::TxStatus { reference } => tx_status(&config, &reference).await,
        Commands::AwaitTx { reference, timeout_ms } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.confirmation_timeout());
            await_tx(&config, &reference, timeout).await
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn game_service(config: &StakeflowConfig) -> StakeflowResult<HttpGameService> {
    let mut client_config = ApiClientConfig::new(&config.backend.url)?.with_timeout(config.request_timeout());
    if let Some(token) = &config.backend.auth_token {
        client_config = client_config.with_token(token.clone());
    }
    Ok(HttpGameService::new(client_config)?)
}

fn rpc_ledger(config: &StakeflowConfig) -> StakeflowResult<RpcLedger> {
    Ok(RpcLedger::new(&config.ledger.rpc_url, config.request_timeout())?.with_commitment(config.commitment()))
}

async fn list_games(config: &StakeflowConfig) -> StakeflowResult<()> {
    let service = game_service(config)?;
    let catalog = match service.supported_games().await {
        Ok(supported) => config.catalog().merge_supported(supported),
        Err(e) => {
            tracing::warn!("Could not fetch supported games, showing configured catalog: {}", e);
            config.catalog()
        }
    };

    println!("🎲 {} games", catalog.len());
    for game in catalog.iter() {
        println!(
            "  {:<20} bet [{}, {}] {} {}",
            game.kind,
            game.min_bet,
            game.max_bet,
            config.ledger.token.symbol,
            if game.auto_resolve { "(auto-resolve)" } else { "" }
        );
    }
    Ok(())
}

async fn show_session(config: &StakeflowConfig, id: &str) -> StakeflowResult<()> {
    let snapshot = game_service(config)?.fetch_session(id).await?;

    println!("Session {}", snapshot.session_id);
    println!("  game:   {}", snapshot.game_type);
    println!("  status: {:?}", snapshot.status);
    if let Some(bet) = snapshot.bet_amount {
        println!("  bet:    {}", bet);
    }
    if let Some(proof) = &snapshot.deposit_proof {
        println!("  proof:  {}", proof);
    }
    if let Some(result) = &snapshot.result {
        println!(
            "  result: {} x{} payout {}",
            if result.is_win { "win" } else { "loss" },
            result.multiplier,
            result.payout
        );
    }
    println!("  state:  {}", snapshot.game_state);
    Ok(())
}

async fn cancel_session(config: &StakeflowConfig, id: &str) -> StakeflowResult<()> {
    game_service(config)?.cancel_session(id).await?;
    println!("🛑 Cancelled session {}", id);
    Ok(())
}

async fn tx_status(config: &StakeflowConfig, reference: &str) -> StakeflowResult<()> {
    let ledger = rpc_ledger(config)?;
    let status = ledger.transaction_status(&TransactionRef::new(reference)).await?;

    match (status.included, &status.execution_error) {
        (false, _) => println!("⏳ {} not yet included at {} commitment", reference, config.ledger.commitment),
        (true, None) => println!("✅ {} confirmed", reference),
        (true, Some(error)) => println!("❌ {} included with error: {}", reference, error),
    }
    Ok(())
}

async fn await_tx(config: &StakeflowConfig, reference: &str, timeout: Duration) -> StakeflowResult<()> {
    let ledger: Arc<dyn LedgerQuery> = Arc::new(rpc_ledger(config)?);
    let waiter = ConfirmationWaiter::with_poll_interval(ledger, config.poll_interval());

    println!("⏳ Waiting up to {}ms for {}", timeout.as_millis(), reference);
    match waiter.await_finality(&TransactionRef::new(reference), timeout).await {
        Finality::Confirmed => println!("✅ {} confirmed", reference),
        Finality::TimedOut => println!("⌛ {} not confirmed within {}ms", reference, timeout.as_millis()),
        Finality::Reverted(reason) => println!("❌ {} reverted: {}", reference, reason),
    }
    Ok(())
}
