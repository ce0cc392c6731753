use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use ethers::types::Address;
use op_reputation_api::{ReadApiDriver, WalletSigner};
use op_reputation_driver::{
    Driver, DriverConfig, LogScanConfig, LogScanDriver, PostgresSink, ScanDriver, TxPage,
    DEFAULT_EXPLORER_URL,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::Level;

/// Arguments for the `op-reputation` binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count, env = "VERBOSITY", global = true)]
    v: u8,

    /// The PostgreSQL connection string of the result sink.
    #[arg(
        long,
        help = "The PostgreSQL connection string of the result sink.",
        env = "DATABASE_URL",
        global = true
    )]
    database_url: Option<String>,

    /// The logical collection name that prefixes the result tables.
    #[arg(
        long,
        help = "The logical collection name that prefixes the result tables.",
        env = "COLLECTION_NAME",
        default_value = "dispute_games",
        global = true
    )]
    collection: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the dispute games and record proposer verdicts.
    Scan {
        /// The HTTP RPC endpoint used to read the dispute game contracts.
        #[arg(
            long,
            short,
            help = "The HTTP RPC endpoint used to read the dispute game contracts.",
            env = "L1_RPC_URL"
        )]
        rpc_url: String,

        /// The address of the dispute game factory contract.
        #[arg(
            long,
            short,
            help = "The address of the dispute game factory contract.",
            env = "DISPUTE_GAME_FACTORY",
            default_value = "0xe5965Ab5962eDc7477C8520243A95517CD252fA9"
        )]
        dispute_game_factory: Address,

        /// The delay awaited before every RPC request, in milliseconds.
        #[arg(
            long,
            help = "The delay awaited before every RPC request, in milliseconds.",
            env = "RATE_LIMIT_DELAY_MS",
            default_value_t = 200
        )]
        rate_limit_delay_ms: u64,

        /// The first game index to scan.
        #[arg(long, help = "The first game index to scan.", default_value_t = 0)]
        start_index: u64,

        /// The maximum number of games to scan.
        #[arg(long, help = "The maximum number of games to scan.")]
        max_games: Option<u64>,
    },
    /// Follow a proposer's transactions through Etherscan and classify the challengers.
    Logs {
        /// The Etherscan API endpoint.
        #[arg(
            long,
            help = "The Etherscan API endpoint.",
            env = "ETHERSCAN_API_URL",
            default_value = DEFAULT_EXPLORER_URL
        )]
        explorer_url: String,

        /// The Etherscan API key.
        #[arg(
            long,
            help = "The Etherscan API key.",
            env = "API_KEY",
            hide_env_values = true
        )]
        api_key: String,

        /// The proposer whose transactions are followed.
        #[arg(
            long,
            help = "The proposer whose transactions are followed.",
            env = "PROPOSER_ADDRESS"
        )]
        proposer: Address,

        /// The delay awaited before every explorer request, in milliseconds.
        #[arg(
            long,
            help = "The delay awaited before every explorer request, in milliseconds.",
            env = "RATE_LIMIT_DELAY_MS",
            default_value_t = 200
        )]
        rate_limit_delay_ms: u64,

        /// The page of the proposer's transaction list to follow.
        #[arg(long, help = "The page of the proposer's transaction list to follow.", default_value_t = LogScanConfig::DEFAULT_PAGE.page)]
        page: u64,

        /// The number of transactions per page.
        #[arg(long, help = "The number of transactions per page.", default_value_t = LogScanConfig::DEFAULT_PAGE.offset)]
        offset: u64,
    },
    /// Serve the signed read API.
    Serve {
        /// The port the read API listens on.
        #[arg(
            long,
            help = "The port the read API listens on.",
            env = "PORT",
            default_value_t = 3000
        )]
        port: u16,

        /// The private key used to sign responses.
        #[arg(
            long,
            help = "The private key used to sign responses.",
            env = "PRIVATE_KEY",
            hide_env_values = true
        )]
        private_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command arguments
    let Args {
        v,
        database_url,
        collection,
        command,
    } = Args::parse();

    // Initialize the tracing subscriber
    init_tracing_subscriber(v)?;

    let database_url = database_url.ok_or(anyhow!(
        "Missing required configuration: DATABASE_URL must be set."
    ))?;

    match command {
        Command::Scan {
            rpc_url,
            dispute_game_factory,
            rate_limit_delay_ms,
            start_index,
            max_games,
        } => {
            // Create the driver config.
            let driver_config = DriverConfig::new(
                rpc_url,
                database_url,
                collection,
                dispute_game_factory,
                Duration::from_millis(rate_limit_delay_ms),
            )
            .with_window(start_index, max_games);
            tracing::info!(target: "op-reputation-cli", "Driver config created successfully.");

            // Create the driver and connect to the result sink.
            tracing::debug!(target: "op-reputation-cli", "Creating driver and connecting to the result sink...");
            let driver = ScanDriver::try_new(driver_config).await?;
            tracing::info!(target: "op-reputation-cli", "Driver created successfully, scanning @ {}", &driver.config.rpc_endpoint);

            // Run the scan.
            let report = driver.start().await?;
            tracing::info!(
                target: "op-reputation-cli",
                "Scan complete: {} games recorded, {} skipped, {} claims skipped, {} verdicts written.",
                report.games_processed,
                report.errors_by_game.len(),
                report.claims_skipped,
                report.verdicts_written
            );
            for (index, e) in &report.errors_by_game {
                tracing::warn!(target: "op-reputation-cli", "Game {} was skipped: {}", index, e);
            }
        }
        Command::Logs {
            explorer_url,
            api_key,
            proposer,
            rate_limit_delay_ms,
            page,
            offset,
        } => {
            let config = LogScanConfig::new(
                explorer_url,
                api_key,
                database_url,
                collection,
                proposer,
                Duration::from_millis(rate_limit_delay_ms),
            )
            .with_page(TxPage { page, offset });

            let driver = LogScanDriver::try_new(config).await?;
            tracing::info!(target: "op-reputation-cli", "Driver created successfully, following proposer {:?}", &driver.config.proposer);

            let report = driver.start().await?;
            tracing::info!(
                target: "op-reputation-cli",
                "Log scan complete: {} transactions, {} valid, {} invalid, {} lookups skipped.",
                report.transactions_scanned,
                report.valid_entries,
                report.invalid_entries,
                report.lookups_skipped
            );
            for (hash, e) in &report.errors_by_transaction {
                tracing::warn!(target: "op-reputation-cli", "Transaction {:?} was skipped: {}", hash, e);
            }
        }
        Command::Serve { port, private_key } => {
            let signer = WalletSigner::from_private_key(&private_key)?;
            tracing::info!(target: "op-reputation-cli", "Signing responses as {:?}", signer.address());

            let sink = PostgresSink::connect(&database_url, &collection).await?;
            let driver = ReadApiDriver::new(
                SocketAddr::from(([0, 0, 0, 0], port)),
                Arc::new(sink),
                Arc::new(signer),
            );

            // Start the server loop.
            driver.start().await?;
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
