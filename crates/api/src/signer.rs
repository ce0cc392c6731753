//! The `signer` module contains the [ResponseSigner] used to sign read API responses.

use anyhow::Result;
use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::Address,
    utils::hex,
};
use op_reputation_analyzer::AnalyzerError;

/// The [ResponseSigner] trait produces a detached signature over a response body.
#[async_trait]
pub trait ResponseSigner: Send + Sync {
    /// Signs `message`, returning the `0x` prefixed hex signature.
    async fn sign(&self, message: &[u8]) -> Result<String>;
}

/// The [WalletSigner] signs with an EIP-191 personal message signature.
#[derive(Debug, Clone)]
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Creates a [WalletSigner] from a hex encoded private key.
    pub fn from_private_key(private_key: &str) -> Result<Self, AnalyzerError> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| AnalyzerError::Configuration(format!("invalid signing key: {e}")))?;
        Ok(Self { wallet })
    }

    /// The address whose key signs the responses.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

#[async_trait]
impl ResponseSigner for WalletSigner {
    async fn sign(&self, message: &[u8]) -> Result<String> {
        let signature = self.wallet.sign_message(message).await?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}
