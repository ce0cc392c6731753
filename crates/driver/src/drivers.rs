//! The `drivers` module contains the scan loops and the drivers that own their collaborators.

use crate::{
    handlers, retry::with_retry, utils, ChainDataSource, Driver, DriverConfig, EtherscanClient,
    ExplorerSource, LogScanConfig, PostgresSink, ResultSink, RpcChainSource,
};
use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    providers::{Http, Provider},
    types::H256,
};
use op_reputation_analyzer::{analyze_challengers, AnalyzerError, ProposerAggregator};
use std::{collections::BTreeMap, sync::Arc};

/// The [ScanReport] summarizes a single scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// The number of games whose outcome was persisted.
    pub games_processed: u64,
    /// The number of non-root claims skipped after a failed fetch.
    pub claims_skipped: u64,
    /// The number of proposer verdicts persisted.
    pub verdicts_written: u64,
    /// The error that aborted each skipped game, keyed by game index.
    pub errors_by_game: BTreeMap<u64, AnalyzerError>,
}

/// Scans the games selected by `config`, persisting one outcome per game and one verdict per
/// proposer.
///
/// Fetch and classification errors abort only the affected game, unless they are
/// [fatal](AnalyzerError::is_fatal). Sink errors and a failure to read the game count abort the
/// scan.
pub async fn run_scan<S, K>(
    source: &S,
    sink: &K,
    config: &DriverConfig,
) -> Result<ScanReport, AnalyzerError>
where
    S: ChainDataSource + ?Sized,
    K: ResultSink + ?Sized,
{
    let policy = config.retry_policy();
    let mut report = ScanReport::default();
    let mut aggregator = ProposerAggregator::new();

    let game_count = crate::retry::with_retry(policy, "gameCount", || source.game_count()).await?;
    let range = config.game_range(game_count);
    tracing::info!(target: "scan-driver", "Total games: {}, scanning {:?}", game_count, range);

    for index in range {
        let fetched = match handlers::fetch_game(source, policy, index).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(target: "scan-driver", "Skipping game {}: {}", index, e);
                report.errors_by_game.insert(index, e);
                continue;
            }
        };
        report.claims_skipped += fetched.claims_skipped;

        let outcome = match handlers::analyze_game(&fetched.game) {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(target: "scan-driver", "Skipping game {}: {}", index, e);
                report.errors_by_game.insert(index, e);
                continue;
            }
        };

        aggregator.observe(outcome.root_claimant, outcome.status);
        sink.put_game_outcome(&outcome).await?;
        report.games_processed += 1;
        tracing::info!(target: "scan-driver", "Game {} recorded: status={:?}, valid={}, invalid={}", index, outcome.status, outcome.valid_transactions.challenged_hashes.len(), outcome.invalid_transactions.challenged_hashes.len());
    }

    for verdict in aggregator.finalize() {
        sink.put_proposer_verdict(&verdict).await?;
        report.verdicts_written += 1;
        tracing::info!(target: "scan-driver", "Proposer {:?} verdict: honest={}", verdict.proposer, verdict.honest_proposer);
    }

    Ok(report)
}

/// The [ScanDriver] runs a single scan from a [ChainDataSource] into a [ResultSink], and closes
/// the sink afterwards.
pub struct ScanDriver<S, K> {
    /// The configuration for the driver.
    pub config: DriverConfig,
    /// The chain data source.
    pub(crate) source: S,
    /// The result sink.
    pub(crate) sink: K,
}

impl<S, K> ScanDriver<S, K>
where
    S: ChainDataSource,
    K: ResultSink,
{
    /// Creates a new [ScanDriver] over already connected collaborators.
    pub fn new(config: DriverConfig, source: S, sink: K) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }
}

impl ScanDriver<RpcChainSource<Provider<Http>>, PostgresSink> {
    /// Validates the configuration, creates the HTTP provider, and connects to the sink.
    pub async fn try_new(config: DriverConfig) -> Result<Self> {
        config.validate()?;

        let provider = Provider::<Http>::try_from(config.rpc_endpoint.as_str())
            .map_err(|e| AnalyzerError::Configuration(format!("invalid RPC endpoint: {e}")))?;
        let provider = Arc::new(provider);

        match utils::implementation_address(provider.as_ref(), config.dispute_game_factory).await {
            Ok(implementation) => {
                tracing::info!(target: "scan-driver", "Dispute game factory implementation: {:?}", implementation)
            }
            Err(e) => {
                tracing::warn!(target: "scan-driver", "Could not resolve factory implementation: {}", e)
            }
        }

        let source = RpcChainSource::new(config.dispute_game_factory, provider);
        let sink = PostgresSink::connect(&config.database_url, &config.collection).await?;
        Ok(Self::new(config, source, sink))
    }
}

#[async_trait]
impl<S, K> Driver for ScanDriver<S, K>
where
    S: ChainDataSource,
    K: ResultSink,
{
    type Output = ScanReport;

    async fn start(self) -> Result<ScanReport> {
        tracing::info!(target: "scan-driver", "Starting dispute game scan...");
        let result = run_scan(&self.source, &self.sink, &self.config).await;

        // The sink is closed whether or not the scan succeeded.
        if let Err(e) = self.sink.close().await {
            tracing::error!(target: "scan-driver", "Error closing result sink: {}", e);
        }

        Ok(result?)
    }
}

/// The [LogScanReport] summarizes a single log scan.
#[derive(Debug, Default)]
pub struct LogScanReport {
    /// The number of proposer transactions listed.
    pub transactions_scanned: u64,
    /// The number of logs or challenger lookups skipped.
    pub lookups_skipped: u64,
    /// The number of proposer transactions recorded as validly challenged.
    pub valid_entries: u64,
    /// The number of proposer transactions recorded as not validly challenged.
    pub invalid_entries: u64,
    /// The error that aborted each skipped proposer transaction.
    pub errors_by_transaction: BTreeMap<H256, AnalyzerError>,
}

/// Follows a page of the configured proposer's transactions through the explorer, classifies
/// the challengers named in their logs, and persists one entry per proposer transaction.
///
/// A failure to list the proposer's transactions, a sink error, or any fatal error aborts the
/// scan. Other errors abort only the affected proposer transaction.
pub async fn run_log_scan<E, K>(
    explorer: &E,
    sink: &K,
    config: &LogScanConfig,
) -> Result<LogScanReport, AnalyzerError>
where
    E: ExplorerSource + ?Sized,
    K: ResultSink + ?Sized,
{
    let policy = config.retry_policy();
    let mut report = LogScanReport::default();

    let proposer_txs = with_retry(policy, "txlist", || {
        explorer.transactions(config.proposer, Some(config.page))
    })
    .await?;
    tracing::info!(target: "log-scan", "Proposer {:?} has {} transactions on page {}", config.proposer, proposer_txs.len(), config.page.page);

    let mut activity = Vec::new();
    for tx in &proposer_txs {
        report.transactions_scanned += 1;
        match handlers::fetch_challenger_activity(explorer, policy, tx).await {
            Ok(fetched) => {
                report.lookups_skipped += fetched.lookups_skipped;
                activity.extend(fetched.activity);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(target: "log-scan", "Skipping transaction {:?}: {}", tx.hash, e);
                report.errors_by_transaction.insert(tx.hash, e);
            }
        }
    }

    let analysis = analyze_challengers(&activity);
    tracing::info!(target: "log-scan", "Valid transactions: {}, invalid transactions: {}", analysis.valid_transactions.len(), analysis.invalid_transactions.len());

    for entry in &analysis.valid_transactions {
        sink.put_challenge_entry(entry).await?;
        report.valid_entries += 1;
    }
    for entry in &analysis.invalid_transactions {
        sink.put_challenge_entry(entry).await?;
        report.invalid_entries += 1;
    }

    Ok(report)
}

/// The [LogScanDriver] runs a single log scan from an [ExplorerSource] into a [ResultSink], and
/// closes the sink afterwards.
pub struct LogScanDriver<E, K> {
    /// The configuration for the driver.
    pub config: LogScanConfig,
    /// The explorer source.
    pub(crate) explorer: E,
    /// The result sink.
    pub(crate) sink: K,
}

impl<E, K> LogScanDriver<E, K>
where
    E: ExplorerSource,
    K: ResultSink,
{
    /// Creates a new [LogScanDriver] over already connected collaborators.
    pub fn new(config: LogScanConfig, explorer: E, sink: K) -> Self {
        Self {
            config,
            explorer,
            sink,
        }
    }
}

impl LogScanDriver<EtherscanClient, PostgresSink> {
    /// Validates the configuration, creates the Etherscan client, and connects to the sink.
    pub async fn try_new(config: LogScanConfig) -> Result<Self> {
        config.validate()?;
        let explorer = EtherscanClient::new(config.explorer_url.clone(), config.api_key.clone());
        let sink = PostgresSink::connect(&config.database_url, &config.collection).await?;
        Ok(Self::new(config, explorer, sink))
    }
}

#[async_trait]
impl<E, K> Driver for LogScanDriver<E, K>
where
    E: ExplorerSource,
    K: ResultSink,
{
    type Output = LogScanReport;

    async fn start(self) -> Result<LogScanReport> {
        tracing::info!(target: "log-scan", "Starting proposer log scan...");
        let result = run_log_scan(&self.explorer, &self.sink, &self.config).await;

        if let Err(e) = self.sink.close().await {
            tracing::error!(target: "log-scan", "Error closing result sink: {}", e);
        }

        Ok(result?)
    }
}
