//! Error types for dispute game analysis.

use thiserror::Error;

/// Errors that can occur while scanning and analyzing dispute games.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A network or rate limit failure. Retried once, then the affected claim or game is skipped.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// The fetched game data can not be analyzed. The game is skipped.
    #[error("malformed game data: {0}")]
    MalformedGameData(String),

    /// The result sink can not be reached. Fatal for the scan.
    #[error("result sink unavailable: {0}")]
    SinkUnavailable(String),

    /// A required configuration value is missing or invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalyzerError {
    /// Returns `true` if the error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::TransientFetch(_))
    }

    /// Returns `true` if the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalyzerError::SinkUnavailable(_) | AnalyzerError::Configuration(_)
        )
    }
}
