//! The classifier module sorts the claims of a single dispute game into valid and invalid
//! buckets.

use crate::{AnalyzerError, ClaimData, GameOutcome, GameRef, GameStatus, TransactionBucket};
use ethers::types::Address;

/// The result of classifying a game's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Uncountered claims. The root claim hash seeds `root_claim_hash`.
    pub valid: TransactionBucket,
    /// Countered claims.
    pub invalid: TransactionBucket,
    /// The address that made the root claim.
    pub root_claimant: Address,
}

impl Classification {
    /// Builds the [GameOutcome] record for the classified game.
    pub fn into_outcome(self, game: &GameRef, status: GameStatus) -> GameOutcome {
        GameOutcome {
            game_index: game.index,
            game_contract_address: game.proxy,
            root_claimant: self.root_claimant,
            status,
            valid_transactions: self.valid,
            invalid_transactions: self.invalid,
            honest_proposer: status == GameStatus::DefenderWins,
        }
    }
}

/// Classifies an ordered sequence of claims.
///
/// ### Takes
/// - `claims`: The claims of a game, ordered by index. The first element must be the root claim.
///
/// ### Returns
/// - `Ok(Classification)`: Every non-root claim sorted into exactly one bucket, in claim order.
/// - `Err(AnalyzerError::MalformedGameData)`: The sequence is empty or does not start at the root.
pub fn classify(claims: &[ClaimData]) -> Result<Classification, AnalyzerError> {
    let root = claims
        .first()
        .ok_or_else(|| AnalyzerError::MalformedGameData("game has no claims".to_string()))?;
    if root.index != 0 {
        return Err(AnalyzerError::MalformedGameData(format!(
            "first claim has index {}, expected the root claim",
            root.index
        )));
    }

    let mut valid = TransactionBucket {
        root_claim_hash: Some(root.claim),
        challenged_hashes: Vec::new(),
    };
    let mut invalid = TransactionBucket::default();

    for (j, claim) in claims.iter().enumerate() {
        if claim.is_countered() {
            invalid.challenged_hashes.push(claim.claim);
        } else if j != 0 {
            valid.challenged_hashes.push(claim.claim);
        }
    }

    Ok(Classification {
        valid,
        invalid,
        root_claimant: root.claimant,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use ethers::types::H256;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn claim(index: u32, claimant: Address, countered_by: Option<Address>) -> ClaimData {
        ClaimData {
            index,
            parent_index: index.checked_sub(1).unwrap_or(u32::MAX),
            countered_by,
            claimant,
            bond: 0,
            claim: H256::from_low_u64_be(index as u64 + 1),
            position: 1,
            clock: 0,
        }
    }

    #[test]
    fn empty_claims_are_malformed() {
        assert!(matches!(
            classify(&[]),
            Err(AnalyzerError::MalformedGameData(_))
        ));
    }

    #[test]
    fn missing_root_is_malformed() {
        let a = Address::repeat_byte(0xaa);
        assert!(matches!(
            classify(&[claim(1, a, None), claim(2, a, None)]),
            Err(AnalyzerError::MalformedGameData(_))
        ));
    }

    #[test]
    fn root_only() {
        let a = Address::repeat_byte(0xaa);
        let root = claim(0, a, None);
        let c = classify(&[root]).unwrap();
        assert_eq!(c.root_claimant, a);
        assert_eq!(c.valid.root_claim_hash, Some(root.claim));
        assert!(c.valid.challenged_hashes.is_empty());
        assert!(c.invalid.challenged_hashes.is_empty());
        assert_eq!(c.invalid.root_claim_hash, None);
    }

    #[test]
    fn countered_root_is_invalid() {
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));
        let root = claim(0, a, Some(b));
        let c = classify(&[root]).unwrap();
        assert_eq!(c.valid.root_claim_hash, Some(root.claim));
        assert_eq!(c.invalid.challenged_hashes, vec![root.claim]);
    }

    #[test]
    fn buckets_preserve_claim_order() {
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));
        let claims = [
            claim(0, a, None),
            claim(1, b, Some(a)),
            claim(2, a, None),
            claim(3, b, Some(a)),
            claim(4, a, None),
        ];
        let c = classify(&claims).unwrap();
        assert_eq!(
            c.valid.challenged_hashes,
            vec![claims[2].claim, claims[4].claim]
        );
        assert_eq!(
            c.invalid.challenged_hashes,
            vec![claims[1].claim, claims[3].claim]
        );
    }

    #[test]
    fn outcome_reflects_status() {
        let a = Address::repeat_byte(0xaa);
        let game = GameRef {
            index: 4,
            game_type: 0,
            created_at: 0,
            proxy: Address::repeat_byte(0x42),
        };
        let classification = classify(&[claim(0, a, None)]).unwrap();
        let outcome = classification
            .clone()
            .into_outcome(&game, GameStatus::DefenderWins);
        assert!(outcome.honest_proposer);
        assert_eq!(outcome.game_index, 4);
        assert_eq!(outcome.game_contract_address, game.proxy);

        let outcome = classification.into_outcome(&game, GameStatus::InProgress);
        assert!(!outcome.honest_proposer);
    }

    proptest! {
        #[test]
        fn partitions_non_root_claims(countered in proptest::collection::vec(any::<bool>(), 1..64)) {
            let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));
            let claims = countered
                .iter()
                .enumerate()
                .map(|(i, c)| claim(i as u32, a, c.then_some(b)))
                .collect::<Vec<_>>();

            let c = classify(&claims).unwrap();
            let valid = c.valid.challenged_hashes.iter().collect::<HashSet<_>>();
            let invalid = c.invalid.challenged_hashes.iter().collect::<HashSet<_>>();

            prop_assert!(valid.is_disjoint(&invalid));
            for data in &claims[1..] {
                prop_assert!(valid.contains(&data.claim) ^ invalid.contains(&data.claim));
            }
            prop_assert!(!valid.contains(&claims[0].claim));
            prop_assert_eq!(
                c.valid.challenged_hashes.len() + c.invalid.challenged_hashes.len(),
                claims.len() - 1 + usize::from(claims[0].is_countered())
            );
        }
    }
}
