//! The signed read API over the verdicts persisted by the scan.

use anyhow::Result;
use async_trait::async_trait;
use op_reputation_driver::{Driver, ResultSink};
use std::{net::SocketAddr, sync::Arc};

mod signer;
pub use signer::{ResponseSigner, WalletSigner};

mod routes;
pub use routes::{router, ApiState, SequencerResponse, SignedResponse, NO_HONEST_SEQUENCERS};

/// The [ReadApiDriver] serves the read API until the server stops.
pub struct ReadApiDriver {
    /// The address the server binds to.
    pub addr: SocketAddr,
    /// The shared handler state.
    state: ApiState,
}

impl ReadApiDriver {
    /// Creates a new [ReadApiDriver].
    pub fn new(
        addr: SocketAddr,
        sink: Arc<dyn ResultSink>,
        signer: Arc<dyn ResponseSigner>,
    ) -> Self {
        Self {
            addr,
            state: ApiState { sink, signer },
        }
    }
}

#[async_trait]
impl Driver for ReadApiDriver {
    type Output = ();

    async fn start(self) -> Result<()> {
        let result = serve(self.addr, self.state.clone()).await;

        // The sink is closed whether the server failed to bind or stopped.
        if let Err(e) = self.state.sink.close().await {
            tracing::error!(target: "read-api", "Error closing result sink: {}", e);
        }

        result
    }
}

async fn serve(addr: SocketAddr, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "read-api", "Server running on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
