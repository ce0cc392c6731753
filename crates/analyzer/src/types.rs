//! The types module contains the data model shared by the classifier, the aggregator, and the
//! collaborators that feed and persist them.

use crate::AnalyzerError;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// The [ClaimHash] type represents the 32 byte commitment made by a participant in a dispute
/// game.
pub type ClaimHash = H256;

/// The [GameStatus] enum mirrors the `GameStatus` of an onchain dispute game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum GameStatus {
    /// The game has not been resolved yet.
    InProgress = 0,
    /// The challenger of the root claim won the game.
    ChallengerWins = 1,
    /// The defender of the root claim won the game.
    DefenderWins = 2,
}

impl TryFrom<u8> for GameStatus {
    type Error = AnalyzerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameStatus::InProgress),
            1 => Ok(GameStatus::ChallengerWins),
            2 => Ok(GameStatus::DefenderWins),
            _ => Err(AnalyzerError::MalformedGameData(format!(
                "unknown game status: {value}"
            ))),
        }
    }
}

/// The [ClaimData] struct represents a single claim within a dispute game as well as the data
/// associated with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    /// The index of the claim in the game's claim array.
    pub index: u32,
    /// The index of the parent claim in the claim array. `u32::MAX` for the root claim.
    pub parent_index: u32,
    /// The address that countered this claim, if any.
    pub countered_by: Option<Address>,
    /// The address that made the claim.
    pub claimant: Address,
    /// The bond posted alongside the claim.
    pub bond: u128,
    /// The claim hash.
    pub claim: ClaimHash,
    /// The position of the claim within the game tree.
    pub position: u128,
    /// The packed chess clock of the claim.
    pub clock: u128,
}

impl ClaimData {
    /// Returns `true` if the claim has been countered by another participant.
    pub fn is_countered(&self) -> bool {
        self.countered_by.is_some()
    }
}

/// Normalizes the `counteredBy` field of a decoded claim: the zero address means "uncountered".
pub fn countered_by(raw: Address) -> Option<Address> {
    (!raw.is_zero()).then_some(raw)
}

/// The [GameRef] struct is an entry in the dispute game factory's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    /// The index of the game within the factory.
    pub index: u64,
    /// The raw game type.
    pub game_type: u32,
    /// The UNIX timestamp of the game's creation.
    pub created_at: u64,
    /// The address of the dispute game proxy.
    pub proxy: Address,
}

/// A fully fetched dispute game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    /// The factory entry of the game.
    pub game: GameRef,
    /// The status read after all claims were fetched.
    pub status: GameStatus,
    /// The claims of the game, ordered by index.
    pub claims: Vec<ClaimData>,
}

/// A bucket of classified claim hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBucket {
    /// The root claim hash. Only ever set on the valid bucket.
    pub root_claim_hash: Option<ClaimHash>,
    /// The claim hashes sorted into this bucket, in claim order.
    pub challenged_hashes: Vec<ClaimHash>,
}

/// The [GameOutcome] struct is the per-game record written to the result sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOutcome {
    /// The index of the game within the factory.
    pub game_index: u64,
    /// The address of the dispute game proxy.
    pub game_contract_address: Address,
    /// The address that made the root claim.
    pub root_claimant: Address,
    /// The status of the game.
    pub status: GameStatus,
    /// The uncountered claims, seeded with the root claim hash.
    pub valid_transactions: TransactionBucket,
    /// The countered claims.
    pub invalid_transactions: TransactionBucket,
    /// Whether the defender won this game.
    pub honest_proposer: bool,
}

/// The running counters for a single proposer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposerRecord {
    /// The number of games observed.
    pub total: u64,
    /// The number of games won by the defender.
    pub defended: u64,
    /// The number of games won by the challenger.
    pub disputed: u64,
}

impl ProposerRecord {
    /// The number of observed games that were still in progress.
    pub fn in_progress(&self) -> u64 {
        self.total - self.defended - self.disputed
    }

    /// A proposer is honest only if every one of its games was defended.
    pub fn is_honest(&self) -> bool {
        self.total == self.defended
    }
}

/// The [ProposerVerdict] struct is the persisted distillation of a [ProposerRecord].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposerVerdict {
    /// The proposer's address.
    pub proposer: Address,
    /// Whether the proposer defended every game it was observed in.
    pub honest_proposer: bool,
}
