//! # Mutation Transactions
//!
//! Every mutation re-resolves the directory entry inside the same
//! transaction that writes, so a write can never land on a configuration
//! that the entry no longer points to. Writes are idempotent.

use tracing::debug;

use shared::{Configuration, DeviceIdentity, DirectoryEntry, DirectoryError, DirectoryResult};

use super::resolver::{resolve, resolve_entry};
use crate::store::Transaction;

/// Replace the whole configuration record of `identity`
pub async fn update_configuration(
    tx: &mut dyn Transaction,
    identity: &DeviceIdentity,
    config: &Configuration,
) -> DirectoryResult<()> {
    // Full resolve: a dangling reference must surface, not be re-created
    let (resolved, _) = resolve(tx, identity).await?;
    let config_ref = resolved.config_ref();

    debug!(identity = %identity, config = %config_ref, "Replacing configuration");
    tx.set(&config_ref, config.to_store_fields()?);
    Ok(())
}

/// Set the address of `identity`, leaving every other entry field as is
pub async fn update_address(
    tx: &mut dyn Transaction,
    identity: &DeviceIdentity,
    address: &str,
) -> DirectoryResult<()> {
    let resolved = resolve_entry(tx, identity).await?;

    debug!(identity = %identity, entry = %resolved.reference, "Updating address");
    tx.update(&resolved.reference, DirectoryEntry::address_patch(address));
    Ok(())
}

/// Current address of `identity`
pub async fn read_address(
    tx: &mut dyn Transaction,
    identity: &DeviceIdentity,
) -> DirectoryResult<String> {
    resolve_entry(tx, identity)
        .await?
        .entry
        .address
        .ok_or_else(|| DirectoryError::AddressNotSet(identity.to_token()))
}
