use crate::{
    retry::{with_retry, RetryPolicy},
    ChainDataSource, ExplorerSource,
};
use op_reputation_analyzer::{
    address_from_topic, classify, AnalyzerError, ChallengerActivity, ExplorerTransaction, Game,
    GameOutcome,
};

/// The largest `claimDataLen` a game may report before it is treated as malformed.
pub const MAX_CLAIM_COUNT: u64 = 1 << 16;

/// A fetched [Game] along with the number of non-root claims that had to be skipped.
#[derive(Debug, Clone)]
pub struct FetchedGame {
    /// The game, with any skipped claims left out.
    pub game: Game,
    /// The number of claims skipped after their fetch failed twice.
    pub claims_skipped: u64,
}

/// Fetches the factory entry, the claims, and finally the status of the game at `index`.
///
/// A non-root claim that can not be fetched after the retry is logged and skipped. Failing to
/// fetch the root claim, the claim count, the factory entry, or the status aborts the game, as
/// does a claim count above [MAX_CLAIM_COUNT].
pub async fn fetch_game<S: ChainDataSource + ?Sized>(
    source: &S,
    policy: RetryPolicy,
    index: u64,
) -> Result<FetchedGame, AnalyzerError> {
    let game = with_retry(policy, "gameAtIndex", || source.game_at_index(index)).await?;
    tracing::info!(target: "scan-driver", "Game {} contract address: {:?}", index, game.proxy);

    let claim_count = with_retry(policy, "claimDataLen", || source.claim_count(game.proxy)).await?;
    tracing::info!(target: "scan-driver", "Game {} has {} claims", index, claim_count);
    if claim_count > MAX_CLAIM_COUNT {
        return Err(AnalyzerError::MalformedGameData(format!(
            "game {index} reports {claim_count} claims, more than {MAX_CLAIM_COUNT}"
        )));
    }

    let mut claims = Vec::new();
    let mut claims_skipped = 0;
    for j in 0..claim_count {
        match with_retry(policy, "claimData", || source.claim_at(game.proxy, j)).await {
            Ok(claim) => claims.push(claim),
            Err(e) if j == 0 => {
                return Err(e);
            }
            Err(e) => {
                // Soft failure, log the error and continue.
                tracing::warn!(target: "scan-driver", "Skipping claim {} of game {}: {}", j, index, e);
                claims_skipped += 1;
            }
        }
    }

    let status = with_retry(policy, "status", || source.status(game.proxy)).await?;

    Ok(FetchedGame {
        game: Game {
            game,
            status,
            claims,
        },
        claims_skipped,
    })
}

/// Classifies a fetched [Game] into its [GameOutcome].
pub fn analyze_game(game: &Game) -> Result<GameOutcome, AnalyzerError> {
    let classification = classify(&game.claims)?;
    Ok(classification.into_outcome(&game.game, game.status))
}

/// The challenger activity following a single proposer transaction.
#[derive(Debug, Clone, Default)]
pub struct FetchedActivity {
    /// One entry per challenger named in the transaction's logs.
    pub activity: Vec<ChallengerActivity>,
    /// The number of logs or challenger lookups skipped.
    pub lookups_skipped: u64,
}

/// Fetches the logs emitted by the recipient of `proposer_tx` in its block, and the
/// transactions of every challenger named by the second topic of those logs.
///
/// Failing to fetch the logs aborts the transaction. A challenger whose transactions can not be
/// fetched after the retry, or a log without a challenger topic, is logged and skipped.
pub async fn fetch_challenger_activity<E: ExplorerSource + ?Sized>(
    explorer: &E,
    policy: RetryPolicy,
    proposer_tx: &ExplorerTransaction,
) -> Result<FetchedActivity, AnalyzerError> {
    let mut fetched = FetchedActivity::default();
    let Some(to) = proposer_tx.to else {
        tracing::debug!(target: "log-scan", "Transaction {:?} created a contract, no logs to follow", proposer_tx.hash);
        return Ok(fetched);
    };

    let logs = with_retry(policy, "getLogs", || explorer.logs(to, proposer_tx.block_number)).await?;
    tracing::info!(target: "log-scan", "Transaction {:?} has {} logs", proposer_tx.hash, logs.len());

    for log in logs {
        let Some(topic) = log.topics.get(1) else {
            tracing::warn!(target: "log-scan", "Skipping log of {:?} without a challenger topic", log.address);
            fetched.lookups_skipped += 1;
            continue;
        };
        let challenger = address_from_topic(*topic);

        match with_retry(policy, "txlist", || explorer.transactions(challenger, None)).await {
            Ok(transactions) => fetched.activity.push(ChallengerActivity {
                proposer_transaction_hash: proposer_tx.hash,
                challenger,
                transactions,
            }),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                // Soft failure, log the error and continue.
                tracing::warn!(target: "log-scan", "Skipping challenger {:?}: {}", challenger, e);
                fetched.lookups_skipped += 1;
            }
        }
    }

    Ok(fetched)
}
