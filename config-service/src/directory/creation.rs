//! # Creation Transaction
//!
//! New devices get a serial derived from their hardware ids,
//! `"{phidget_id}-{load_cell_id}"`. When that serial is taken the
//! allocator probes `"{base}-0"`, `"{base}-1"`, ... until it finds a free
//! one. Probes match on `serialNumber` alone, so a serial used by any
//! model is skipped.
//!
//! The probes and the inserts share one transaction. Two creators racing
//! for the same serial both see it free, but only the first commit
//! succeeds; the other fails with a write conflict and is retried from a
//! fresh snapshot.

use tracing::debug;

use shared::{
    Configuration, DeviceIdentity, DeviceModel, DirectoryEntry, DirectoryResult,
    CONFIG_COLLECTION, DEVICE_COLLECTION, FIELD_SERIAL_NUMBER,
};

use crate::store::{FieldFilter, Transaction};

/// Serial a device with `config` is first offered
pub fn base_serial(config: &Configuration) -> String {
    format!("{}-{}", config.phidget_id, config.load_cell_id)
}

async fn serial_in_use(tx: &mut dyn Transaction, serial: &str) -> DirectoryResult<bool> {
    let found = tx
        .query_equal(DEVICE_COLLECTION, &[FieldFilter::equal(FIELD_SERIAL_NUMBER, serial)])
        .await?;
    Ok(!found.is_empty())
}

/// First serial not used by any entry, starting from [`base_serial`]
pub async fn allocate_serial(
    tx: &mut dyn Transaction,
    config: &Configuration,
) -> DirectoryResult<String> {
    let base = base_serial(config);
    if !serial_in_use(tx, &base).await? {
        return Ok(base);
    }

    let mut suffix: u64 = 0;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !serial_in_use(tx, &candidate).await? {
            debug!(base = %base, serial = %candidate, probes = suffix + 2, "Allocated suffixed serial");
            return Ok(candidate);
        }
        suffix += 1;
    }
}

/// Create a configuration record and a directory entry pointing at it
///
/// Nothing is visible until the transaction commits.
pub async fn create(
    tx: &mut dyn Transaction,
    model: DeviceModel,
    config: &Configuration,
) -> DirectoryResult<DeviceIdentity> {
    let serial = allocate_serial(tx, config).await?;
    let identity = DeviceIdentity::new(model, serial);

    let config_ref = tx.create(CONFIG_COLLECTION);
    tx.set(&config_ref, config.to_store_fields()?);

    let entry = DirectoryEntry::new(&identity, config_ref.id.clone());
    let entry_ref = tx.create(DEVICE_COLLECTION);
    tx.set(&entry_ref, entry.to_store_fields()?);

    debug!(
        identity = %identity,
        entry = %entry_ref,
        config = %config_ref,
        "Staged new device"
    );
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::resolver::resolve;
    use crate::directory::testing::{sample_config, seed_device};
    use crate::store::{DocumentStore, MemoryStore, StoreError};
    use shared::DirectoryError;
    use std::collections::HashSet;

    async fn create_committed(store: &MemoryStore, model: DeviceModel) -> DeviceIdentity {
        let mut tx = store.begin().await.unwrap();
        let identity = create(tx.as_mut(), model, &sample_config()).await.unwrap();
        tx.commit().await.unwrap();
        identity
    }

    #[test]
    fn test_base_serial() {
        assert_eq!(base_serial(&sample_config()), "67890-12345");
    }

    #[tokio::test]
    async fn test_create_then_resolve() {
        let store = MemoryStore::new();
        let identity = create_committed(&store, DeviceModel::IchibuV1).await;
        assert_eq!(identity, DeviceIdentity::new(DeviceModel::IchibuV1, "67890-12345"));

        let mut tx = store.begin().await.unwrap();
        let (resolved, config) = resolve(tx.as_mut(), &identity).await.unwrap();
        assert_eq!(config, sample_config());
        assert_eq!(resolved.entry.address, None);
        assert_eq!(store.documents("config").len(), 1);
    }

    #[tokio::test]
    async fn test_collisions_take_the_next_suffix() {
        let store = MemoryStore::new();
        let first = create_committed(&store, DeviceModel::IchibuV1).await;
        let second = create_committed(&store, DeviceModel::IchibuV1).await;
        let third = create_committed(&store, DeviceModel::IchibuV1).await;

        assert_eq!(first.serial, "67890-12345");
        assert_eq!(second.serial, "67890-12345-0");
        assert_eq!(third.serial, "67890-12345-1");
    }

    #[tokio::test]
    async fn test_probe_ignores_model() {
        let store = MemoryStore::new();
        create_committed(&store, DeviceModel::IchibuV1).await;
        let other = create_committed(&store, DeviceModel::LibraV0).await;
        assert_eq!(other, DeviceIdentity::new(DeviceModel::LibraV0, "67890-12345-0"));
    }

    #[tokio::test]
    async fn test_probe_skips_gaps_left_by_older_entries() {
        let store = MemoryStore::new();
        for serial in ["67890-12345", "67890-12345-0", "67890-12345-2"] {
            seed_device(
                &store,
                &DeviceIdentity::new(DeviceModel::IchibuV2, serial),
                &sample_config(),
            );
        }
        let identity = create_committed(&store, DeviceModel::IchibuV2).await;
        assert_eq!(identity.serial, "67890-12345-1");
    }

    #[tokio::test]
    async fn test_racing_creates_one_commits_one_conflicts() {
        let store = MemoryStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        let a = create(first.as_mut(), DeviceModel::IchibuV1, &sample_config()).await.unwrap();
        let b = create(second.as_mut(), DeviceModel::IchibuV1, &sample_config()).await.unwrap();
        // Both saw the base serial as free
        assert_eq!(a, b);

        first.commit().await.unwrap();
        let err: DirectoryError = match second.commit().await {
            Err(e @ StoreError::Conflict(_)) => e.into(),
            other => panic!("expected a conflict, got {other:?}"),
        };
        assert!(err.is_retryable());

        assert_eq!(store.documents("devices").len(), 1);
        assert_eq!(store.documents("config").len(), 1);

        // A retry from a fresh snapshot gets the next serial
        let retried = create_committed(&store, DeviceModel::IchibuV1).await;
        assert_eq!(retried.serial, "67890-12345-0");
    }

    #[tokio::test]
    async fn test_serials_stay_unique_under_concurrent_creators() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let mut tx = store.begin().await.unwrap();
                    let identity = create(tx.as_mut(), DeviceModel::IchibuV1, &sample_config())
                        .await
                        .unwrap();
                    match tx.commit().await {
                        Ok(()) => return identity,
                        Err(StoreError::Conflict(_)) => tokio::task::yield_now().await,
                        Err(e) => panic!("unexpected store error: {e}"),
                    }
                }
            }));
        }

        let mut serials = HashSet::new();
        for handle in handles {
            assert!(serials.insert(handle.await.unwrap().serial));
        }
        assert_eq!(serials.len(), 8);
        assert_eq!(store.documents("devices").len(), 8);
        assert_eq!(store.documents("config").len(), 8);
    }
}
