#![doc = include_str!("../README.md")]

use anyhow::Result;
use async_trait::async_trait;

/// Contains the smart contract bindings used by the driver.
mod bindings;

mod config;
pub use config::{DriverConfig, LogScanConfig};

mod source;
pub use source::{ChainDataSource, RpcChainSource};

mod explorer;
pub use explorer::{EtherscanClient, ExplorerLog, ExplorerSource, TxPage, DEFAULT_EXPLORER_URL};

mod sink;
pub use sink::{validate_collection, MemorySink, PostgresSink, ResultSink};

pub mod retry;
pub mod utils;

mod handlers;
pub use handlers::{
    analyze_game, fetch_challenger_activity, fetch_game, FetchedActivity, FetchedGame,
    MAX_CLAIM_COUNT,
};

mod drivers;
pub use drivers::{run_log_scan, run_scan, LogScanDriver, LogScanReport, ScanDriver, ScanReport};

#[cfg(test)]
mod mocks;

/// The [Driver] trait defines the interface for the loops ran by the `op-reputation` binary.
#[async_trait]
pub trait Driver {
    /// The value the driver produces once its loop ends.
    type Output;

    /// Starts the [Driver] loop.
    async fn start(self) -> Result<Self::Output>;
}
