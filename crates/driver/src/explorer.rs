//! The `explorer` module contains the [ExplorerSource] trait and its Etherscan implementation.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use op_reputation_analyzer::{AnalyzerError, ExplorerTransaction};
use serde::{de::DeserializeOwned, Deserialize};

/// The Etherscan API used when none is configured.
pub const DEFAULT_EXPLORER_URL: &str = "https://api-sepolia.etherscan.io/api";

/// A page of an account's transaction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPage {
    /// The 1-based page number.
    pub page: u64,
    /// The number of transactions per page.
    pub offset: u64,
}

/// A log entry as listed by a block explorer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExplorerLog {
    /// The emitting contract.
    pub address: Address,
    /// The indexed topics, starting with the event signature.
    pub topics: Vec<H256>,
}

/// The [ExplorerSource] trait is a read-only view of account transactions and contract logs.
#[async_trait]
pub trait ExplorerSource: Send + Sync {
    /// Returns the transactions of `address`, newest first. `None` returns the explorer's
    /// default listing.
    async fn transactions(
        &self,
        address: Address,
        page: Option<TxPage>,
    ) -> Result<Vec<ExplorerTransaction>, AnalyzerError>;

    /// Returns the logs emitted by `address` in `block`.
    async fn logs(&self, address: Address, block: u64) -> Result<Vec<ExplorerLog>, AnalyzerError>;
}

/// The JSON envelope of every Etherscan API response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl Envelope {
    /// Decodes a list result. A string result is the explorer's error message.
    fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, AnalyzerError> {
        match self.result {
            serde_json::Value::Array(_) => serde_json::from_value(self.result).map_err(|e| {
                AnalyzerError::MalformedGameData(format!("unexpected explorer result: {e}"))
            }),
            serde_json::Value::String(reason) => Err(explorer_error(&self.message, reason)),
            other => Err(AnalyzerError::MalformedGameData(format!(
                "unexpected explorer result: {other}"
            ))),
        }
    }
}

fn explorer_error(message: &str, reason: String) -> AnalyzerError {
    if reason.to_ascii_lowercase().contains("api key") {
        AnalyzerError::Configuration(reason)
    } else {
        AnalyzerError::TransientFetch(format!("{message}: {reason}"))
    }
}

/// A transaction as returned by `module=account&action=txlist`. Numbers arrive as decimal
/// strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: H256,
    block_number: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    function_name: String,
}

impl TryFrom<RawTransaction> for ExplorerTransaction {
    type Error = AnalyzerError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let block_number = raw.block_number.parse::<u64>().map_err(|e| {
            AnalyzerError::MalformedGameData(format!(
                "invalid block number `{}`: {e}",
                raw.block_number
            ))
        })?;
        let to = match raw.to.as_str() {
            "" => None,
            to => Some(to.parse::<Address>().map_err(|e| {
                AnalyzerError::MalformedGameData(format!("invalid recipient `{to}`: {e}"))
            })?),
        };
        Ok(ExplorerTransaction {
            hash: raw.hash,
            block_number,
            to,
            function_name: raw.function_name,
        })
    }
}

/// The [EtherscanClient] reads transactions and logs through the Etherscan HTTP API.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EtherscanClient {
    /// Creates a new [EtherscanClient] against `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AnalyzerError> {
        let transient = |e: reqwest::Error| AnalyzerError::TransientFetch(e.to_string());
        let envelope = self
            .http
            .get(&self.base_url)
            .query(query)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(transient)?
            .error_for_status()
            .map_err(transient)?
            .json::<Envelope>()
            .await
            .map_err(transient)?;
        envelope.into_list()
    }
}

#[async_trait]
impl ExplorerSource for EtherscanClient {
    async fn transactions(
        &self,
        address: Address,
        page: Option<TxPage>,
    ) -> Result<Vec<ExplorerTransaction>, AnalyzerError> {
        let mut query = vec![
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", format!("{address:?}")),
        ];
        if let Some(TxPage { page, offset }) = page {
            query.extend([
                ("startblock", "0".to_string()),
                ("endblock", "99999999".to_string()),
                ("page", page.to_string()),
                ("offset", offset.to_string()),
                ("sort", "desc".to_string()),
            ]);
        }

        let raw = self.get::<RawTransaction>(&query).await?;
        tracing::debug!(target: "explorer", "Fetched {} transactions of {:?}", raw.len(), address);
        raw.into_iter().map(ExplorerTransaction::try_from).collect()
    }

    async fn logs(&self, address: Address, block: u64) -> Result<Vec<ExplorerLog>, AnalyzerError> {
        let query = [
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("fromBlock", block.to_string()),
            ("toBlock", block.to_string()),
            ("address", format!("{address:?}")),
        ];
        let logs = self.get::<ExplorerLog>(&query).await?;
        tracing::debug!(target: "explorer", "Fetched {} logs of {:?} in block {}", logs.len(), address, block);
        Ok(logs)
    }
}
