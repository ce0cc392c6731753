//! Mock implementations of the [ChainDataSource] and [ExplorerSource] traits, and a
//! [ResultSink] that rejects verdicts, for testing.

use crate::{ChainDataSource, ExplorerLog, ExplorerSource, MemorySink, ResultSink, TxPage};
use async_trait::async_trait;
use ethers::types::{Address, H256};
use op_reputation_analyzer::{
    AnalyzerError, ChallengeEntry, ClaimData, ClaimHash, ExplorerTransaction, GameOutcome,
    GameRef, GameStatus, ProposerVerdict,
};
use std::{collections::HashMap, sync::Mutex};

/// A game served by the [MockChainSource].
#[derive(Debug, Clone)]
pub struct MockGame {
    /// The raw status byte.
    pub status: u8,
    /// `(claimant, countered_by)` per claim.
    pub claims: Vec<(Address, Option<Address>)>,
    /// Overrides the reported `claimDataLen`.
    pub reported_claims: Option<u64>,
}

impl MockGame {
    pub fn new(status: u8) -> Self {
        Self {
            status,
            claims: Vec::new(),
            reported_claims: None,
        }
    }

    pub fn claim(mut self, claimant: Address, countered_by: Option<Address>) -> Self {
        self.claims.push((claimant, countered_by));
        self
    }

    pub fn reporting_claims(mut self, count: u64) -> Self {
        self.reported_claims = Some(count);
        self
    }
}

/// A call into the [MockChainSource] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    GameCount,
    ClaimCount(u64),
    Claim(u64, u64),
    Status(u64),
}

/// The [MockChainSource] serves a fixed list of games. Game `i` lives at proxy address
/// `0x00..0i+1` and its claim `j` hashes to `(i << 32) | j + 1`.
#[derive(Debug)]
pub struct MockChainSource {
    games: Vec<MockGame>,
    /// Remaining forced failures per call.
    failures: Mutex<HashMap<MockCall, u32>>,
}

impl MockChainSource {
    pub fn new(games: Vec<MockGame>) -> Self {
        Self {
            games,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `times` invocations of `call` fail transiently.
    pub fn fail(self, call: MockCall, times: u32) -> Self {
        self.failures.lock().unwrap().insert(call, times);
        self
    }

    /// Makes the next `times` fetches of claim `claim` in game `game` fail transiently.
    pub fn fail_claim(self, game: u64, claim: u64, times: u32) -> Self {
        self.fail(MockCall::Claim(game, claim), times)
    }

    pub fn claim_hash(&self, game: u64, claim: u64) -> ClaimHash {
        H256::from_low_u64_be((game << 32) | (claim + 1))
    }

    fn proxy(index: u64) -> Address {
        Address::from_low_u64_be(index + 1)
    }

    fn lookup(&self, proxy: Address) -> Result<(u64, &MockGame), AnalyzerError> {
        self.games
            .iter()
            .enumerate()
            .map(|(i, g)| (i as u64, g))
            .find(|(i, _)| Self::proxy(*i) == proxy)
            .ok_or_else(|| AnalyzerError::TransientFetch(format!("no game at {proxy:?}")))
    }

    fn check(&self, call: MockCall) -> Result<(), AnalyzerError> {
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&call) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AnalyzerError::TransientFetch(
                    "Max rate limit reached".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainDataSource for MockChainSource {
    async fn game_count(&self) -> Result<u64, AnalyzerError> {
        self.check(MockCall::GameCount)?;
        Ok(self.games.len() as u64)
    }

    async fn game_at_index(&self, index: u64) -> Result<GameRef, AnalyzerError> {
        if index as usize >= self.games.len() {
            return Err(AnalyzerError::TransientFetch(format!(
                "game index {index} out of bounds"
            )));
        }
        Ok(GameRef {
            index,
            game_type: 0,
            created_at: 1_700_000_000 + index,
            proxy: Self::proxy(index),
        })
    }

    async fn claim_count(&self, game: Address) -> Result<u64, AnalyzerError> {
        let (game_index, mock) = self.lookup(game)?;
        self.check(MockCall::ClaimCount(game_index))?;
        Ok(mock
            .reported_claims
            .unwrap_or(mock.claims.len() as u64))
    }

    async fn claim_at(&self, game: Address, index: u64) -> Result<ClaimData, AnalyzerError> {
        let (game_index, mock) = self.lookup(game)?;
        self.check(MockCall::Claim(game_index, index))?;

        let (claimant, countered_by) = *mock.claims.get(index as usize).ok_or_else(|| {
            AnalyzerError::MalformedGameData(format!("no claim {index} in game {game_index}"))
        })?;
        Ok(ClaimData {
            index: index as u32,
            parent_index: if index == 0 { u32::MAX } else { 0 },
            countered_by,
            claimant,
            bond: 0,
            claim: self.claim_hash(game_index, index),
            position: 1,
            clock: 0,
        })
    }

    async fn status(&self, game: Address) -> Result<GameStatus, AnalyzerError> {
        let (game_index, mock) = self.lookup(game)?;
        self.check(MockCall::Status(game_index))?;
        GameStatus::try_from(mock.status)
    }
}

/// The [MockExplorer] serves fixed transaction lists and logs, keyed by address and by
/// `(address, block)` respectively.
#[derive(Debug, Default)]
pub struct MockExplorer {
    transactions: HashMap<Address, Vec<ExplorerTransaction>>,
    logs: HashMap<(Address, u64), Vec<ExplorerLog>>,
    /// Remaining forced failures per address, for both transaction and log lookups.
    failures: Mutex<HashMap<Address, u32>>,
    /// The page requested by the last paged transaction lookup.
    pub last_page: Mutex<Option<TxPage>>,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactions(mut self, address: Address, txs: Vec<ExplorerTransaction>) -> Self {
        self.transactions.insert(address, txs);
        self
    }

    pub fn logs(mut self, address: Address, block: u64, logs: Vec<ExplorerLog>) -> Self {
        self.logs.insert((address, block), logs);
        self
    }

    /// Makes the next `times` lookups for `address` fail transiently.
    pub fn fail(self, address: Address, times: u32) -> Self {
        self.failures.lock().unwrap().insert(address, times);
        self
    }

    fn check(&self, address: Address) -> Result<(), AnalyzerError> {
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AnalyzerError::TransientFetch(
                    "Max rate limit reached".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExplorerSource for MockExplorer {
    async fn transactions(
        &self,
        address: Address,
        page: Option<TxPage>,
    ) -> Result<Vec<ExplorerTransaction>, AnalyzerError> {
        self.check(address)?;
        if page.is_some() {
            *self.last_page.lock().unwrap() = page;
        }
        Ok(self.transactions.get(&address).cloned().unwrap_or_default())
    }

    async fn logs(&self, address: Address, block: u64) -> Result<Vec<ExplorerLog>, AnalyzerError> {
        self.check(address)?;
        Ok(self.logs.get(&(address, block)).cloned().unwrap_or_default())
    }
}

/// A [MemorySink] that accepts everything but proposer verdicts.
#[derive(Debug, Default)]
pub struct RejectVerdicts(pub MemorySink);

#[async_trait]
impl ResultSink for RejectVerdicts {
    async fn put_game_outcome(&self, outcome: &GameOutcome) -> Result<(), AnalyzerError> {
        self.0.put_game_outcome(outcome).await
    }

    async fn put_proposer_verdict(&self, _: &ProposerVerdict) -> Result<(), AnalyzerError> {
        Err(AnalyzerError::SinkUnavailable(
            "verdict table is read-only".to_string(),
        ))
    }

    async fn put_challenge_entry(&self, entry: &ChallengeEntry) -> Result<(), AnalyzerError> {
        self.0.put_challenge_entry(entry).await
    }

    async fn query_honest_proposers(&self) -> Result<Vec<Address>, AnalyzerError> {
        self.0.query_honest_proposers().await
    }

    async fn close(&self) -> Result<(), AnalyzerError> {
        self.0.close().await
    }
}
