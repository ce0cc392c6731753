//! Dispute game outcome analysis: claim classification and proposer reputation.

mod error;
pub use error::AnalyzerError;

mod types;
pub use types::*;

mod classifier;
pub use classifier::{classify, Classification};

mod aggregator;
pub use aggregator::ProposerAggregator;

mod challenger;
pub use challenger::{
    address_from_topic, analyze_challengers, ChallengeAnalysis, ChallengeEntry,
    ChallengerActivity, ExplorerTransaction, RESOLVING_FUNCTIONS,
};
