//! The `config` module contains the [DriverConfig] and the [LogScanConfig].

use crate::{retry::RetryPolicy, sink::validate_collection, TxPage};
use ethers::types::Address;
use op_reputation_analyzer::AnalyzerError;
use std::time::Duration;

/// The [DriverConfig] struct contains the configuration for the [ScanDriver](crate::ScanDriver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// The URL of the HTTP RPC endpoint used to read the dispute game contracts.
    pub rpc_endpoint: String,
    /// The PostgreSQL connection string of the result sink.
    pub database_url: String,
    /// The logical collection name that prefixes the sink's tables.
    pub collection: String,
    /// The address of the dispute game factory contract.
    pub dispute_game_factory: Address,
    /// The delay awaited before every RPC request.
    pub rate_limit_delay: Duration,
    /// The first game index to scan.
    pub start_index: u64,
    /// The maximum number of games to scan, if bounded.
    pub max_games: Option<u64>,
}

impl DriverConfig {
    /// Creates a new [DriverConfig] that scans every game.
    pub fn new(
        rpc_endpoint: String,
        database_url: String,
        collection: String,
        dispute_game_factory: Address,
        rate_limit_delay: Duration,
    ) -> Self {
        Self {
            rpc_endpoint,
            database_url,
            collection,
            dispute_game_factory,
            rate_limit_delay,
            start_index: 0,
            max_games: None,
        }
    }

    /// Restricts the scan to `max_games` games starting at `start_index`.
    pub fn with_window(mut self, start_index: u64, max_games: Option<u64>) -> Self {
        self.start_index = start_index;
        self.max_games = max_games;
        self
    }

    /// The retry policy applied to every chain call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::single_retry(self.rate_limit_delay)
    }

    /// The range of game indices to scan, given the factory's game count.
    pub fn game_range(&self, game_count: u64) -> std::ops::Range<u64> {
        let end = match self.max_games {
            Some(max) => self.start_index.saturating_add(max).min(game_count),
            None => game_count,
        };
        self.start_index.min(end)..end
    }

    /// Checks that every required connection parameter is present.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.rpc_endpoint.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "missing RPC endpoint".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "missing database URL".to_string(),
            ));
        }
        if self.dispute_game_factory.is_zero() {
            return Err(AnalyzerError::Configuration(
                "missing dispute game factory address".to_string(),
            ));
        }
        validate_collection(&self.collection)
    }
}

/// The [LogScanConfig] struct contains the configuration for the
/// [LogScanDriver](crate::LogScanDriver).
#[derive(Debug, Clone)]
pub struct LogScanConfig {
    /// The Etherscan API endpoint.
    pub explorer_url: String,
    /// The Etherscan API key.
    pub api_key: String,
    /// The PostgreSQL connection string of the result sink.
    pub database_url: String,
    /// The logical collection name that prefixes the sink's tables.
    pub collection: String,
    /// The proposer whose transactions are scanned.
    pub proposer: Address,
    /// The delay awaited before every explorer request.
    pub rate_limit_delay: Duration,
    /// The page of the proposer's transaction list to scan.
    pub page: TxPage,
}

impl LogScanConfig {
    /// The page scanned when none is given.
    pub const DEFAULT_PAGE: TxPage = TxPage {
        page: 70,
        offset: 10,
    };

    /// Creates a new [LogScanConfig] scanning the [LogScanConfig::DEFAULT_PAGE].
    pub fn new(
        explorer_url: String,
        api_key: String,
        database_url: String,
        collection: String,
        proposer: Address,
        rate_limit_delay: Duration,
    ) -> Self {
        Self {
            explorer_url,
            api_key,
            database_url,
            collection,
            proposer,
            rate_limit_delay,
            page: Self::DEFAULT_PAGE,
        }
    }

    /// Scans `page` of the proposer's transaction list instead.
    pub fn with_page(mut self, page: TxPage) -> Self {
        self.page = page;
        self
    }

    /// The retry policy applied to every explorer call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::single_retry(self.rate_limit_delay)
    }

    /// Checks that every required connection parameter is present.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.explorer_url.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "missing explorer URL".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(AnalyzerError::Configuration("missing API key".to_string()));
        }
        if self.database_url.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "missing database URL".to_string(),
            ));
        }
        if self.proposer.is_zero() {
            return Err(AnalyzerError::Configuration(
                "missing proposer address".to_string(),
            ));
        }
        if self.page.page == 0 || self.page.offset == 0 {
            return Err(AnalyzerError::Configuration(
                "page and offset must be positive".to_string(),
            ));
        }
        validate_collection(&self.collection)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> DriverConfig {
        DriverConfig::new(
            "http://localhost:8545".to_string(),
            "postgres://localhost/reputation".to_string(),
            "dispute_games".to_string(),
            Address::repeat_byte(0x01),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn full_range_by_default() {
        assert_eq!(config().game_range(5), 0..5);
        assert_eq!(config().game_range(0), 0..0);
    }

    #[test]
    fn windowed_range_is_clamped() {
        let config = config().with_window(3, Some(4));
        assert_eq!(config.game_range(10), 3..7);
        assert_eq!(config.game_range(5), 3..5);
        assert_eq!(config.game_range(2), 2..2);
    }

    #[test]
    fn validation() {
        assert!(config().validate().is_ok());

        let mut missing_rpc = config();
        missing_rpc.rpc_endpoint = String::new();
        assert!(matches!(
            missing_rpc.validate(),
            Err(AnalyzerError::Configuration(_))
        ));

        let mut bad_collection = config();
        bad_collection.collection = "games; --".to_string();
        assert!(matches!(
            bad_collection.validate(),
            Err(AnalyzerError::Configuration(_))
        ));
    }

    #[test]
    fn single_retry_with_configured_delay() {
        let policy = config().retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay, Duration::from_millis(200));
    }

    fn log_config() -> LogScanConfig {
        LogScanConfig::new(
            crate::DEFAULT_EXPLORER_URL.to_string(),
            "KEY".to_string(),
            "postgres://localhost/reputation".to_string(),
            "dispute_games".to_string(),
            Address::repeat_byte(0x0b),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn log_scan_validation() {
        let config = log_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.page, LogScanConfig::DEFAULT_PAGE);

        let mut missing_key = log_config();
        missing_key.api_key = " ".to_string();
        assert!(matches!(
            missing_key.validate(),
            Err(AnalyzerError::Configuration(_))
        ));

        let mut missing_proposer = log_config();
        missing_proposer.proposer = Address::zero();
        assert!(matches!(
            missing_proposer.validate(),
            Err(AnalyzerError::Configuration(_))
        ));

        let empty_page = log_config().with_page(TxPage { page: 1, offset: 0 });
        assert!(matches!(
            empty_page.validate(),
            Err(AnalyzerError::Configuration(_))
        ));
    }
}
