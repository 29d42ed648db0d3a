//! ICM Dashboard backend
//!
//! Serves the dashboard API and tracks delivery of sent messages. The same
//! binary can send a message with a local key, quote fees and check status.
//!
//! # Send Flow
//!
//! 1. `POST /api/icm/send` returns an unsigned transaction
//! 2. The browser wallet signs and broadcasts it
//! 3. `POST /api/icm/complete` waits for the receipt and records the message
//! 4. The status tracker marks the message delivered once the destination
//!    contract reports it received

use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use icm_dashboard::api::{self, AppState};
use icm_dashboard::config::Config;
use icm_dashboard::encoder::parse_hash;
use icm_dashboard::fees::FeeEstimator;
use icm_dashboard::ledger::RpcLedger;
use icm_dashboard::store::{MemoryStore, MessageStore, PgStore};
use icm_dashboard::tracker::{StatusTracker, TrackerConfig};
use icm_dashboard::wallet::LocalWallet;
use icm_dashboard::{Orchestrator, SendDraft};

#[derive(Parser)]
#[command(name = "icm-dashboard")]
#[command(about = "Send and track Teleporter cross-chain messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and status tracker (default)
    Serve,

    /// Send a message using EVM_PRIVATE_KEY
    Send {
        /// Destination blockchain ID (hex or decimal)
        #[arg(long)]
        destination: String,

        /// Recipient address on the destination chain
        #[arg(long)]
        recipient: String,

        /// Message text
        #[arg(long)]
        message: String,

        /// Relayer fee in AVAX (default fee when omitted)
        #[arg(long, default_value = "")]
        amount: String,

        /// Gas limit on the destination chain
        #[arg(long)]
        gas_limit: Option<u64>,
    },

    /// Quote the relayer fee
    Fee {
        /// Destination blockchain ID
        #[arg(long, default_value = "")]
        destination: String,

        /// Message size in bytes
        #[arg(long)]
        size: u64,

        /// Gas limit on the destination chain
        #[arg(long)]
        gas_limit: Option<u64>,
    },

    /// Check whether a message has been delivered
    Status {
        /// Message ID (0x + 64 hex)
        message_id: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(config.json_logs);

    info!(
        rpc_url = %config.chain.rpc_url,
        mock = config.mode().is_mock(),
        environment = ?config.environment,
        "Configuration loaded"
    );
    tracing::debug!(config = ?config, "Full configuration");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Send {
            destination,
            recipient,
            message,
            amount,
            gas_limit,
        } => {
            let key = config
                .private_key
                .clone()
                .ok_or_else(|| eyre!("EVM_PRIVATE_KEY required for send"))?;
            let wallet = LocalWallet::new(&config.chain.rpc_url, &key)?;
            let orchestrator = build_orchestrator(&config).await?;

            let draft = SendDraft {
                destination_chain_id: destination,
                recipient,
                message,
                amount,
                required_gas_limit: gas_limit,
                allowed_relayer_addresses: vec![],
            };
            let confirmation = orchestrator.send(&draft, &wallet).await?;
            println!("{}", serde_json::to_string_pretty(&confirmation)?);
            if let Err(err) = confirmation.message_id() {
                warn!(error = %err, "Message sent without an observable message ID");
            }
            Ok(())
        }
        Commands::Fee {
            destination,
            size,
            gas_limit,
        } => {
            let fees = FeeEstimator::new(config.send.fee_schedule);
            let quote = fees.estimate(
                &destination,
                size,
                gas_limit.unwrap_or(config.send.default_gas_limit),
            );
            println!("{}", serde_json::to_string_pretty(&quote)?);
            Ok(())
        }
        Commands::Status { message_id } => {
            let message_id = parse_hash(&message_id)?;
            let orchestrator = build_orchestrator(&config).await?;
            let status = orchestrator.message_status(message_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let ledger = RpcLedger::new(&config.chain.rpc_url)?;
    match ledger.chain_id().await {
        Ok(chain_id) => info!(chain_id, "Connected to ledger RPC"),
        Err(err) => warn!(error = %err, "Ledger RPC not reachable yet"),
    }

    let store: Arc<dyn MessageStore> = match &config.database {
        Some(db) => {
            let store = PgStore::connect(&db.url)
                .await
                .wrap_err("Failed to open Postgres message store")?;
            info!("Using Postgres message store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory message store");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(Orchestrator::new(
        config.orchestrator(),
        FeeEstimator::new(config.send.fee_schedule),
        Arc::new(ledger),
        store,
    ))
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting ICM dashboard backend");

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let mut tracker = StatusTracker::new(TrackerConfig::from(&config), orchestrator.clone());

    // Create shutdown channels
    let (tracker_tx, tracker_rx) = mpsc::channel::<()>(1);
    let (server_tx, server_rx) = oneshot::channel::<()>();

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = tracker_tx.send(()).await;
        let _ = server_tx.send(());
    });

    let tracker_handle = tokio::spawn(async move { tracker.run(tracker_rx).await });

    api::start_server(
        &config.api.bind_address,
        config.api.port,
        AppState::new(orchestrator),
        async {
            let _ = server_rx.await;
        },
    )
    .await?;

    match tracker_handle.await {
        Ok(result) => result?,
        Err(err) => warn!(error = %err, "Status tracker task ended abnormally"),
    }

    info!("ICM dashboard backend stopped");
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,icm_dashboard=debug"));

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
