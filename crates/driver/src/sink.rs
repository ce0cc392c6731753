//! The `sink` module contains the [ResultSink] trait along with a PostgreSQL and an in-memory
//! implementation.

use async_trait::async_trait;
use ethers::{types::Address, utils::to_checksum};
use op_reputation_analyzer::{AnalyzerError, ChallengeEntry, GameOutcome, ProposerVerdict};
use postgres::{Client, NoTls};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The [ResultSink] trait is the append-only store for analysis results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Appends the outcome of a single game.
    async fn put_game_outcome(&self, outcome: &GameOutcome) -> Result<(), AnalyzerError>;

    /// Appends the verdict of a single proposer.
    async fn put_proposer_verdict(&self, verdict: &ProposerVerdict) -> Result<(), AnalyzerError>;

    /// Appends a classified proposer transaction from the log scan.
    async fn put_challenge_entry(&self, entry: &ChallengeEntry) -> Result<(), AnalyzerError>;

    /// Returns the proposers whose most recent verdict is honest, ordered by address.
    async fn query_honest_proposers(&self) -> Result<Vec<Address>, AnalyzerError>;

    /// Releases the underlying connection. Every call after `close` fails with
    /// [AnalyzerError::SinkUnavailable].
    async fn close(&self) -> Result<(), AnalyzerError>;
}

#[async_trait]
impl<T: ResultSink + ?Sized> ResultSink for Arc<T> {
    async fn put_game_outcome(&self, outcome: &GameOutcome) -> Result<(), AnalyzerError> {
        (**self).put_game_outcome(outcome).await
    }

    async fn put_proposer_verdict(&self, verdict: &ProposerVerdict) -> Result<(), AnalyzerError> {
        (**self).put_proposer_verdict(verdict).await
    }

    async fn put_challenge_entry(&self, entry: &ChallengeEntry) -> Result<(), AnalyzerError> {
        (**self).put_challenge_entry(entry).await
    }

    async fn query_honest_proposers(&self) -> Result<Vec<Address>, AnalyzerError> {
        (**self).query_honest_proposers().await
    }

    async fn close(&self) -> Result<(), AnalyzerError> {
        (**self).close().await
    }
}

/// Validates the logical collection name that prefixes the sink's tables.
pub fn validate_collection(collection: &str) -> Result<(), AnalyzerError> {
    let mut chars = collection.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AnalyzerError::Configuration(format!(
            "invalid collection name `{collection}`: expected [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

/// The table names derived from a collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tables {
    game_outcomes: String,
    proposer_verdicts: String,
    challenge_entries: String,
}

impl Tables {
    fn new(collection: &str) -> Self {
        Self {
            game_outcomes: format!("{collection}_game_outcomes"),
            proposer_verdicts: format!("{collection}_proposer_verdicts"),
            challenge_entries: format!("{collection}_challenge_entries"),
        }
    }

    fn schema(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {games} (
                id BIGSERIAL PRIMARY KEY,
                game_index BIGINT NOT NULL,
                game_contract_address TEXT NOT NULL,
                root_claimant TEXT NOT NULL,
                status SMALLINT NOT NULL,
                valid_transactions JSONB NOT NULL,
                invalid_transactions JSONB NOT NULL,
                honest_proposer BOOLEAN NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS {verdicts} (
                id BIGSERIAL PRIMARY KEY,
                proposer TEXT NOT NULL,
                honest_proposer BOOLEAN NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS {challenges} (
                id BIGSERIAL PRIMARY KEY,
                proposer_transaction_hash TEXT NOT NULL,
                challenged_transaction_hashes JSONB NOT NULL,
                valid BOOLEAN NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );",
            games = self.game_outcomes,
            verdicts = self.proposer_verdicts,
            challenges = self.challenge_entries,
        )
    }
}

fn unavailable(err: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::SinkUnavailable(err.to_string())
}

fn encode(value: &impl serde::Serialize) -> Result<serde_json::Value, AnalyzerError> {
    serde_json::to_value(value).map_err(unavailable)
}

/// The [PostgresSink] persists results into tables prefixed by the collection name.
///
/// The blocking [Client] is only ever touched from `spawn_blocking`, and a client still open
/// when the sink is dropped is released off the async runtime.
pub struct PostgresSink {
    client: Arc<Mutex<Option<Client>>>,
    tables: Arc<Tables>,
}

impl PostgresSink {
    /// Connects to `database_url` and creates the collection's tables if they are missing.
    pub async fn connect(database_url: &str, collection: &str) -> Result<Self, AnalyzerError> {
        validate_collection(collection)?;
        let tables = Tables::new(collection);

        let url = database_url.to_string();
        let schema = tables.schema();
        let client = tokio::task::spawn_blocking(move || {
            let mut client = Client::connect(&url, NoTls)?;
            client.batch_execute(&schema)?;
            Ok::<_, postgres::Error>(client)
        })
        .await
        .map_err(unavailable)?
        .map_err(unavailable)?;

        tracing::info!(target: "postgres-sink", "Connected to PostgreSQL, writing to {} and {}", tables.game_outcomes, tables.proposer_verdicts);
        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            tables: Arc::new(tables),
        })
    }

    /// Runs `f` against the open connection on the blocking thread pool.
    async fn with_client<T, F>(&self, f: F) -> Result<T, AnalyzerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client, &Tables) -> Result<T, postgres::Error> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let tables = Arc::clone(&self.tables);
        tokio::task::spawn_blocking(move || {
            let mut guard = client.lock().map_err(unavailable)?;
            let client = guard
                .as_mut()
                .ok_or_else(|| unavailable("connection closed"))?;
            f(client, &tables).map_err(unavailable)
        })
        .await
        .map_err(unavailable)?
    }
}

#[async_trait]
impl ResultSink for PostgresSink {
    async fn put_game_outcome(&self, outcome: &GameOutcome) -> Result<(), AnalyzerError> {
        let game_index = i64::try_from(outcome.game_index).map_err(unavailable)?;
        let game_contract_address = to_checksum(&outcome.game_contract_address, None);
        let root_claimant = to_checksum(&outcome.root_claimant, None);
        let status = outcome.status as u8 as i16;
        let valid = encode(&outcome.valid_transactions)?;
        let invalid = encode(&outcome.invalid_transactions)?;
        let honest = outcome.honest_proposer;

        self.with_client(move |client, tables| {
            client.execute(
                format!(
                    "INSERT INTO {} (game_index, game_contract_address, root_claimant, status, \
                     valid_transactions, invalid_transactions, honest_proposer) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    tables.game_outcomes
                )
                .as_str(),
                &[
                    &game_index,
                    &game_contract_address,
                    &root_claimant,
                    &status,
                    &valid,
                    &invalid,
                    &honest,
                ],
            )
        })
        .await?;

        tracing::debug!(target: "postgres-sink", "Inserted outcome of game {}", outcome.game_index);
        Ok(())
    }

    async fn put_proposer_verdict(&self, verdict: &ProposerVerdict) -> Result<(), AnalyzerError> {
        let proposer = to_checksum(&verdict.proposer, None);
        let honest = verdict.honest_proposer;

        self.with_client(move |client, tables| {
            client.execute(
                format!(
                    "INSERT INTO {} (proposer, honest_proposer) VALUES ($1, $2)",
                    tables.proposer_verdicts
                )
                .as_str(),
                &[&proposer, &honest],
            )
        })
        .await?;

        tracing::debug!(target: "postgres-sink", "Inserted verdict for proposer {:?}: honest={}", verdict.proposer, verdict.honest_proposer);
        Ok(())
    }

    async fn put_challenge_entry(&self, entry: &ChallengeEntry) -> Result<(), AnalyzerError> {
        let proposer_transaction_hash = format!("{:?}", entry.proposer_transaction_hash);
        let challenged = encode(&entry.challenged_transaction_hashes)?;
        let valid = entry.valid;

        self.with_client(move |client, tables| {
            client.execute(
                format!(
                    "INSERT INTO {} (proposer_transaction_hash, challenged_transaction_hashes, valid) \
                     VALUES ($1, $2, $3)",
                    tables.challenge_entries
                )
                .as_str(),
                &[&proposer_transaction_hash, &challenged, &valid],
            )
        })
        .await?;

        tracing::debug!(target: "postgres-sink", "Inserted challenge entry for {:?}: valid={}", entry.proposer_transaction_hash, entry.valid);
        Ok(())
    }

    async fn query_honest_proposers(&self) -> Result<Vec<Address>, AnalyzerError> {
        let rows = self
            .with_client(|client, tables| {
                let rows = client.query(
                    format!(
                        "SELECT proposer FROM ( \
                            SELECT DISTINCT ON (proposer) proposer, honest_proposer \
                            FROM {} ORDER BY proposer, id DESC \
                         ) latest WHERE honest_proposer",
                        tables.proposer_verdicts
                    )
                    .as_str(),
                    &[],
                )?;
                Ok(rows
                    .iter()
                    .map(|row| row.get::<_, String>(0))
                    .collect::<Vec<_>>())
            })
            .await?;

        let mut proposers = rows
            .iter()
            .map(|raw| {
                raw.parse::<Address>()
                    .map_err(|e| unavailable(format!("stored proposer `{raw}` is not an address: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        proposers.sort();
        Ok(proposers)
    }

    async fn close(&self) -> Result<(), AnalyzerError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let taken = client.lock().map_err(unavailable)?.take();
            match taken {
                Some(client) => client.close().map_err(unavailable),
                None => Ok(()),
            }
        })
        .await
        .map_err(unavailable)??;

        tracing::info!(target: "postgres-sink", "PostgreSQL connection closed");
        Ok(())
    }
}

impl Drop for PostgresSink {
    fn drop(&mut self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(client) = client {
            tracing::warn!(target: "postgres-sink", "Result sink dropped without close, releasing the connection");
            drop_off_runtime(client);
        }
    }
}

/// Drops `value` on a plain thread when called from within a Tokio runtime. The blocking
/// [Client] runs its own runtime on drop, which can not be started from inside another one.
fn drop_off_runtime<T: Send + 'static>(value: T) {
    if tokio::runtime::Handle::try_current().is_err() {
        drop(value);
        return;
    }
    if std::thread::spawn(move || drop(value)).join().is_err() {
        tracing::error!(target: "postgres-sink", "Releasing the PostgreSQL connection panicked");
    }
}

/// The contents of a [MemorySink].
#[derive(Debug, Default)]
struct MemoryState {
    outcomes: Vec<GameOutcome>,
    verdicts: Vec<ProposerVerdict>,
    challenges: Vec<ChallengeEntry>,
    closed: bool,
    unavailable: bool,
}

/// The [MemorySink] keeps results in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    /// Creates an empty [MemorySink].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [MemorySink] whose writes and queries all fail with
    /// [AnalyzerError::SinkUnavailable].
    pub fn unavailable() -> Self {
        let sink = Self::default();
        if let Ok(mut state) = sink.state.lock() {
            state.unavailable = true;
        }
        sink
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AnalyzerError> {
        let state = self.state.lock().map_err(unavailable)?;
        if state.unavailable {
            return Err(unavailable("sink is unavailable"));
        }
        if state.closed {
            return Err(unavailable("connection closed"));
        }
        Ok(state)
    }

    /// Returns every outcome written so far.
    pub fn outcomes(&self) -> Vec<GameOutcome> {
        self.state
            .lock()
            .map(|s| s.outcomes.clone())
            .unwrap_or_default()
    }

    /// Returns every verdict written so far.
    pub fn verdicts(&self) -> Vec<ProposerVerdict> {
        self.state
            .lock()
            .map(|s| s.verdicts.clone())
            .unwrap_or_default()
    }

    /// Returns every challenge entry written so far.
    pub fn challenges(&self) -> Vec<ChallengeEntry> {
        self.state
            .lock()
            .map(|s| s.challenges.clone())
            .unwrap_or_default()
    }

    /// Returns `true` once [ResultSink::close] has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn put_game_outcome(&self, outcome: &GameOutcome) -> Result<(), AnalyzerError> {
        self.lock()?.outcomes.push(outcome.clone());
        Ok(())
    }

    async fn put_proposer_verdict(&self, verdict: &ProposerVerdict) -> Result<(), AnalyzerError> {
        self.lock()?.verdicts.push(*verdict);
        Ok(())
    }

    async fn put_challenge_entry(&self, entry: &ChallengeEntry) -> Result<(), AnalyzerError> {
        self.lock()?.challenges.push(entry.clone());
        Ok(())
    }

    async fn query_honest_proposers(&self) -> Result<Vec<Address>, AnalyzerError> {
        let state = self.lock()?;
        let mut latest = std::collections::BTreeMap::new();
        for verdict in &state.verdicts {
            latest.insert(verdict.proposer, verdict.honest_proposer);
        }
        Ok(latest
            .into_iter()
            .filter_map(|(proposer, honest)| honest.then_some(proposer))
            .collect())
    }

    async fn close(&self) -> Result<(), AnalyzerError> {
        self.state.lock().map_err(unavailable)?.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn verdict(byte: u8, honest_proposer: bool) -> ProposerVerdict {
        ProposerVerdict {
            proposer: Address::repeat_byte(byte),
            honest_proposer,
        }
    }

    #[test]
    fn collection_names() {
        assert!(validate_collection("dispute_games").is_ok());
        assert!(validate_collection("_games2").is_ok());
        for bad in ["", "2games", "games; DROP TABLE x", "dispute-games"] {
            assert!(matches!(
                validate_collection(bad),
                Err(AnalyzerError::Configuration(_))
            ));
        }
    }

    #[test]
    fn tables_are_prefixed() {
        let tables = Tables::new("mainnet");
        assert_eq!(tables.game_outcomes, "mainnet_game_outcomes");
        assert_eq!(tables.proposer_verdicts, "mainnet_proposer_verdicts");
        assert_eq!(tables.challenge_entries, "mainnet_challenge_entries");
        let schema = tables.schema();
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS mainnet_game_outcomes"));
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS mainnet_proposer_verdicts"));
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS mainnet_challenge_entries"));
    }

    #[tokio::test]
    async fn latest_verdict_wins() {
        let sink = MemorySink::new();
        sink.put_proposer_verdict(&verdict(0xbb, true)).await.unwrap();
        sink.put_proposer_verdict(&verdict(0xaa, true)).await.unwrap();
        sink.put_proposer_verdict(&verdict(0xcc, true)).await.unwrap();
        sink.put_proposer_verdict(&verdict(0xcc, false)).await.unwrap();

        assert_eq!(
            sink.query_honest_proposers().await.unwrap(),
            vec![Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)]
        );
    }

    #[tokio::test]
    async fn closed_sink_rejects_writes() {
        let sink = MemorySink::new();
        sink.close().await.unwrap();
        assert!(sink.is_closed());
        assert!(matches!(
            sink.put_proposer_verdict(&verdict(0xaa, true)).await,
            Err(AnalyzerError::SinkUnavailable(_))
        ));
    }

    /// Records whether it was dropped outside of any Tokio runtime.
    struct DropWitness(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for DropWitness {
        fn drop(&mut self) {
            self.0.store(
                tokio::runtime::Handle::try_current().is_err(),
                std::sync::atomic::Ordering::SeqCst,
            );
        }
    }

    #[tokio::test]
    async fn released_off_runtime_inside_runtime() {
        let outside = Arc::new(std::sync::atomic::AtomicBool::new(false));
        drop_off_runtime(DropWitness(Arc::clone(&outside)));
        assert!(outside.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn released_inline_outside_runtime() {
        let outside = Arc::new(std::sync::atomic::AtomicBool::new(false));
        drop_off_runtime(DropWitness(Arc::clone(&outside)));
        assert!(outside.load(std::sync::atomic::Ordering::SeqCst));
    }
}
