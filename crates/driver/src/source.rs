//! The `source` module contains the [ChainDataSource] trait and its JSON-RPC implementation.

use crate::bindings::{DisputeGameFactory, FaultDisputeGame};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use op_reputation_analyzer::{countered_by, AnalyzerError, ClaimData, GameRef, GameStatus};
use std::sync::Arc;

/// The [ChainDataSource] trait is a read-only view of a dispute game factory and the claims of
/// the games it created. Implementations decode raw contract data into strict types once, at
/// this boundary.
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Returns the number of games created by the factory.
    async fn game_count(&self) -> Result<u64, AnalyzerError>;

    /// Returns the factory entry of the game at `index`.
    async fn game_at_index(&self, index: u64) -> Result<GameRef, AnalyzerError>;

    /// Returns the number of claims in the game at `game`.
    async fn claim_count(&self, game: Address) -> Result<u64, AnalyzerError>;

    /// Returns the claim at `index` in the game at `game`.
    async fn claim_at(&self, game: Address, index: u64) -> Result<ClaimData, AnalyzerError>;

    /// Returns the status of the game at `game`.
    async fn status(&self, game: Address) -> Result<GameStatus, AnalyzerError>;
}

/// The [RpcChainSource] reads dispute games through the contract bindings over any ethers
/// [Middleware].
pub struct RpcChainSource<M> {
    /// The provider used to call the contracts.
    provider: Arc<M>,
    /// The dispute game factory binding.
    factory: DisputeGameFactory<M>,
}

impl<M: Middleware + 'static> RpcChainSource<M> {
    /// Creates a new [RpcChainSource] reading from the factory at `dispute_game_factory`.
    pub fn new(dispute_game_factory: Address, provider: Arc<M>) -> Self {
        let factory = DisputeGameFactory::new(dispute_game_factory, Arc::clone(&provider));
        Self { provider, factory }
    }

    fn game(&self, game: Address) -> FaultDisputeGame<M> {
        FaultDisputeGame::new(game, Arc::clone(&self.provider))
    }
}

/// Maps a failed contract call to [AnalyzerError::TransientFetch].
fn transient(context: &str, err: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::TransientFetch(format!("{context}: {err}"))
}

fn to_u64(value: U256, what: &str) -> Result<u64, AnalyzerError> {
    u64::try_from(value)
        .map_err(|_| AnalyzerError::MalformedGameData(format!("{what} does not fit in u64: {value}")))
}

#[async_trait]
impl<M: Middleware + 'static> ChainDataSource for RpcChainSource<M> {
    async fn game_count(&self) -> Result<u64, AnalyzerError> {
        let count = self
            .factory
            .game_count()
            .call()
            .await
            .map_err(|e| transient("gameCount", e))?;
        to_u64(count, "gameCount")
    }

    async fn game_at_index(&self, index: u64) -> Result<GameRef, AnalyzerError> {
        let (game_type, created_at, proxy) = self
            .factory
            .game_at_index(U256::from(index))
            .call()
            .await
            .map_err(|e| transient("gameAtIndex", e))?;
        Ok(GameRef {
            index,
            game_type,
            created_at,
            proxy,
        })
    }

    async fn claim_count(&self, game: Address) -> Result<u64, AnalyzerError> {
        let len = self
            .game(game)
            .claim_data_len()
            .call()
            .await
            .map_err(|e| transient("claimDataLen", e))?;
        to_u64(len, "claimDataLen")
    }

    async fn claim_at(&self, game: Address, index: u64) -> Result<ClaimData, AnalyzerError> {
        let (parent_index, countered, claimant, bond, claim, position, clock) = self
            .game(game)
            .claim_data(U256::from(index))
            .call()
            .await
            .map_err(|e| transient("claimData", e))?;
        tracing::debug!(target: "chain-source", "Claim {} of game {:?}: parent={}, claimant={:?}, countered_by={:?}", index, game, parent_index, claimant, countered);

        Ok(ClaimData {
            index: u32::try_from(index).map_err(|_| {
                AnalyzerError::MalformedGameData(format!("claim index {index} exceeds u32"))
            })?,
            parent_index,
            countered_by: countered_by(countered),
            claimant,
            bond,
            claim: claim.into(),
            position,
            clock,
        })
    }

    async fn status(&self, game: Address) -> Result<GameStatus, AnalyzerError> {
        let raw = self
            .game(game)
            .status()
            .call()
            .await
            .map_err(|e| transient("status", e))?;
        GameStatus::try_from(raw)
    }
}
