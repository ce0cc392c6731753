//! The aggregator module folds per-game results into per-proposer reputation records.

use crate::{GameStatus, ProposerRecord, ProposerVerdict};
use ethers::types::Address;
use std::collections::BTreeMap;

/// The [ProposerAggregator] accumulates a [ProposerRecord] per root claimant over a single scan.
///
/// The aggregator is owned by the scan that feeds it; games must be observed serially.
#[derive(Debug, Clone, Default)]
pub struct ProposerAggregator {
    records: BTreeMap<Address, ProposerRecord>,
}

impl ProposerAggregator {
    /// Creates an empty [ProposerAggregator].
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the status of one game into the record of its root claimant.
    pub fn observe(&mut self, root_claimant: Address, status: GameStatus) {
        let record = self.records.entry(root_claimant).or_default();
        record.total += 1;
        match status {
            GameStatus::DefenderWins => record.defended += 1,
            GameStatus::ChallengerWins => record.disputed += 1,
            // Counts toward `total` only.
            GameStatus::InProgress => {}
        }
        tracing::trace!(target: "aggregator", "Observed {:?} for proposer {:?}: {:?}", status, root_claimant, record);
    }

    /// Returns the running record of a proposer, if it has been observed.
    pub fn record(&self, proposer: &Address) -> Option<&ProposerRecord> {
        self.records.get(proposer)
    }

    /// The number of distinct proposers observed.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no game has been observed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distills every record into a [ProposerVerdict], ordered by proposer address.
    pub fn finalize(&self) -> Vec<ProposerVerdict> {
        self.records
            .iter()
            .map(|(proposer, record)| ProposerVerdict {
                proposer: *proposer,
                honest_proposer: record.is_honest(),
            })
            .collect()
    }
}
