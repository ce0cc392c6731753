//! Classification of challenger activity scraped from a block explorer.
//!
//! A proposer transaction emits logs whose second topic names a challenger. The challenger's
//! own transactions then tell whether the challenge was carried through: a challenger that
//! resolved a claim, resolved the game, or claimed its credit made a valid challenge.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Function signatures, as reported by the explorer, that mark a challenge as carried through.
pub const RESOLVING_FUNCTIONS: [&str; 3] = [
    "resolveClaim(uint256 _claimIndex,uint256 _numToResolve)",
    "resolve()",
    "claimCredit(address _recipient)",
];

/// A transaction as listed by a block explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerTransaction {
    /// The transaction hash.
    pub hash: H256,
    /// The block the transaction was included in.
    pub block_number: u64,
    /// `None` for contract creations.
    pub to: Option<Address>,
    /// The decoded function signature, empty when the explorer could not decode the call.
    pub function_name: String,
}

impl ExplorerTransaction {
    /// Returns `true` if the transaction carries a challenge through.
    pub fn is_resolving(&self) -> bool {
        RESOLVING_FUNCTIONS.contains(&self.function_name.as_str())
    }
}

/// The transactions of one challenger named by a log of a proposer transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengerActivity {
    /// The proposer transaction whose logs named the challenger.
    pub proposer_transaction_hash: H256,
    /// The challenger.
    pub challenger: Address,
    /// The challenger's transactions.
    pub transactions: Vec<ExplorerTransaction>,
}

/// A proposer transaction along with the challenger transactions that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeEntry {
    /// The proposer transaction.
    pub proposer_transaction_hash: H256,
    /// Deduplicated, in first-seen order.
    pub challenged_transaction_hashes: Vec<H256>,
    /// Whether any of the challenger transactions was resolving.
    pub valid: bool,
}

/// The result of [analyze_challengers].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAnalysis {
    /// Entries with at least one resolving challenger transaction.
    pub valid_transactions: Vec<ChallengeEntry>,
    /// Every other entry.
    pub invalid_transactions: Vec<ChallengeEntry>,
}

/// Extracts the address packed into the low 20 bytes of a log topic.
pub fn address_from_topic(topic: H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Splits challenger activity into valid and invalid challenges.
///
/// Only the first activity seen for a proposer transaction is considered; later activity for
/// the same proposer transaction is ignored.
pub fn analyze_challengers(activity: &[ChallengerActivity]) -> ChallengeAnalysis {
    let mut seen = HashSet::new();
    let mut analysis = ChallengeAnalysis::default();

    for group in activity {
        if !seen.insert(group.proposer_transaction_hash) {
            continue;
        }

        let mut unique = HashSet::new();
        let challenged_transaction_hashes = group
            .transactions
            .iter()
            .map(|tx| tx.hash)
            .filter(|hash| unique.insert(*hash))
            .collect();
        let valid = group.transactions.iter().any(ExplorerTransaction::is_resolving);

        let entry = ChallengeEntry {
            proposer_transaction_hash: group.proposer_transaction_hash,
            challenged_transaction_hashes,
            valid,
        };
        tracing::trace!(target: "challenger", "Proposer transaction {:?}: valid={}", entry.proposer_transaction_hash, valid);

        if valid {
            analysis.valid_transactions.push(entry);
        } else {
            analysis.invalid_transactions.push(entry);
        }
    }

    analysis
}

#[cfg(test)]
mod test {
    use super::*;

    fn tx(byte: u8, function_name: &str) -> ExplorerTransaction {
        ExplorerTransaction {
            hash: H256::repeat_byte(byte),
            block_number: 1,
            to: Some(Address::repeat_byte(0xee)),
            function_name: function_name.to_string(),
        }
    }

    fn activity(proposer_tx: u8, transactions: Vec<ExplorerTransaction>) -> ChallengerActivity {
        ChallengerActivity {
            proposer_transaction_hash: H256::repeat_byte(proposer_tx),
            challenger: Address::repeat_byte(0xcc),
            transactions,
        }
    }

    #[test]
    fn topic_address() {
        let mut topic = [0u8; 32];
        topic[12..].copy_from_slice(Address::repeat_byte(0xab).as_bytes());
        assert_eq!(address_from_topic(H256(topic)), Address::repeat_byte(0xab));
    }

    #[test]
    fn resolving_functions() {
        assert!(tx(1, "resolve()").is_resolving());
        assert!(tx(1, "claimCredit(address _recipient)").is_resolving());
        assert!(tx(1, "resolveClaim(uint256 _claimIndex,uint256 _numToResolve)").is_resolving());
        assert!(!tx(1, "move(uint256 _challengeIndex,bytes32 _claim,bool _isAttack)").is_resolving());
        assert!(!tx(1, "").is_resolving());
    }

    #[test]
    fn splits_valid_and_invalid() {
        let analysis = analyze_challengers(&[
            activity(0x01, vec![tx(0x10, "attack(uint256,bytes32)"), tx(0x11, "resolve()")]),
            activity(0x02, vec![tx(0x20, "attack(uint256,bytes32)")]),
        ]);

        assert_eq!(analysis.valid_transactions.len(), 1);
        assert_eq!(
            analysis.valid_transactions[0].challenged_transaction_hashes,
            vec![H256::repeat_byte(0x10), H256::repeat_byte(0x11)]
        );
        assert_eq!(analysis.invalid_transactions.len(), 1);
        assert_eq!(
            analysis.invalid_transactions[0].proposer_transaction_hash,
            H256::repeat_byte(0x02)
        );
        assert!(!analysis.invalid_transactions[0].valid);
    }

    #[test]
    fn challenged_hashes_are_deduplicated() {
        let analysis = analyze_challengers(&[activity(
            0x01,
            vec![tx(0x10, ""), tx(0x11, ""), tx(0x10, "")],
        )]);
        assert_eq!(
            analysis.invalid_transactions[0].challenged_transaction_hashes,
            vec![H256::repeat_byte(0x10), H256::repeat_byte(0x11)]
        );
    }

    #[test]
    fn first_activity_per_proposer_transaction_wins() {
        let analysis = analyze_challengers(&[
            activity(0x01, vec![tx(0x10, "")]),
            activity(0x01, vec![tx(0x11, "resolve()")]),
        ]);
        assert!(analysis.valid_transactions.is_empty());
        assert_eq!(analysis.invalid_transactions.len(), 1);
        assert_eq!(
            analysis.invalid_transactions[0].challenged_transaction_hashes,
            vec![H256::repeat_byte(0x10)]
        );
    }

    #[test]
    fn empty_activity() {
        assert_eq!(analyze_challengers(&[]), ChallengeAnalysis::default());
    }
}
