use anyhow::{anyhow, Result};
use ethers::{
    providers::Middleware,
    types::{Address, H256},
};

/// The EIP-1967 storage slot holding a proxy's implementation address.
pub const IMPLEMENTATION_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// Reads the implementation address behind an EIP-1967 proxy.
///
/// # Arguments
/// * `provider` - The provider used to read the proxy's storage.
/// * `proxy` - The address of the proxy.
///
/// # Returns
/// * The address stored in the low 20 bytes of the implementation slot.
pub async fn implementation_address<M: Middleware>(provider: &M, proxy: Address) -> Result<Address> {
    let slot: H256 = IMPLEMENTATION_SLOT
        .parse()
        .map_err(|e| anyhow!("invalid implementation slot: {e}"))?;
    let raw = provider
        .get_storage_at(proxy, slot, None)
        .await
        .map_err(|e| anyhow!("failed to read implementation slot: {e}"))?;
    Ok(slot_to_address(raw))
}

fn slot_to_address(raw: H256) -> Address {
    Address::from_slice(&raw.as_bytes()[12..])
}
