//! The `routes` module contains the read API router and its handlers.

use crate::ResponseSigner;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ethers::utils::to_checksum;
use op_reputation_driver::ResultSink;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// The message returned when no proposer has an honest verdict yet.
pub const NO_HONEST_SEQUENCERS: &str = "No honest sequencers found";

/// Shared state of the read API.
#[derive(Clone)]
pub struct ApiState {
    /// The sink queried for honest proposers.
    pub sink: Arc<dyn ResultSink>,
    /// The signer of every response body.
    pub signer: Arc<dyn ResponseSigner>,
}

/// The body that gets signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SequencerResponse {
    /// At least one honest proposer.
    Found {
        /// Checksummed proposer addresses.
        sequencers: Vec<String>,
        /// Milliseconds since the UNIX epoch.
        timestamp: u64,
    },
    /// No honest proposer yet.
    Empty {
        /// Always [NO_HONEST_SEQUENCERS].
        message: String,
    },
}

/// A [SequencerResponse] along with the detached signature over its JSON serialization.
#[derive(Debug, Clone, Serialize)]
pub struct SignedResponse {
    /// The signed body.
    pub sequencers: SequencerResponse,
    /// The `0x` prefixed EIP-191 signature over the JSON serialization of `sequencers`.
    pub signature: String,
}

/// Any failure behind the read API. Details are logged, never returned.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(target: "read-api", "Error: {:?}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Builds the read API [Router].
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/sequencers", get(get_sequencers))
        .route("/health", get(health))
        .with_state(state)
}

async fn get_sequencers(State(state): State<ApiState>) -> Result<Json<SignedResponse>, ApiError> {
    let proposers = state.sink.query_honest_proposers().await?;
    tracing::debug!(target: "read-api", "Found {} honest proposers", proposers.len());

    let sequencers = if proposers.is_empty() {
        SequencerResponse::Empty {
            message: NO_HONEST_SEQUENCERS.to_string(),
        }
    } else {
        SequencerResponse::Found {
            sequencers: proposers.iter().map(|p| to_checksum(p, None)).collect(),
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64,
        }
    };

    let message = serde_json::to_vec(&sequencers)?;
    let signature = state.signer.sign(&message).await?;

    Ok(Json(SignedResponse {
        sequencers,
        signature,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
