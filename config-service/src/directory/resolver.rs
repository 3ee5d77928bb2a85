//! # Directory Resolver
//!
//! Maps a [`DeviceIdentity`] to its unique directory entry and, through
//! the entry's `config` reference, to its configuration record. Both
//! reads happen inside the caller's transaction so they observe the same
//! snapshot.

use tracing::{debug, error};

use shared::{
    Configuration, DeviceIdentity, DirectoryEntry, DirectoryError, DirectoryResult,
    CONFIG_COLLECTION, DEVICE_COLLECTION, FIELD_MODEL, FIELD_SERIAL_NUMBER,
};

use crate::store::{DocumentRef, FieldFilter, Transaction};

/// A directory entry together with the key it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    /// Location of the entry in `devices`
    pub reference: DocumentRef,
    /// Decoded entry
    pub entry: DirectoryEntry,
}

impl ResolvedEntry {
    /// Location of the configuration record the entry points to
    pub fn config_ref(&self) -> DocumentRef {
        DocumentRef::new(CONFIG_COLLECTION, self.entry.config_id())
    }
}

/// Filters selecting the entries of one identity
pub fn identity_filters(identity: &DeviceIdentity) -> [FieldFilter; 2] {
    [
        FieldFilter::equal(FIELD_MODEL, identity.model.as_str()),
        FieldFilter::equal(FIELD_SERIAL_NUMBER, identity.serial.as_str()),
    ]
}

fn integrity_violation(identity: &DeviceIdentity, detail: String) -> DirectoryError {
    error!(
        model = %identity.model,
        serial = %identity.serial,
        detail = %detail,
        "Directory integrity violation"
    );
    DirectoryError::IntegrityViolation(detail)
}

/// Find the single directory entry for `identity`
///
/// Fails with `NotFound` when there is none and `IntegrityViolation`
/// when there are several or the stored entry cannot be decoded.
pub async fn resolve_entry(
    tx: &mut dyn Transaction,
    identity: &DeviceIdentity,
) -> DirectoryResult<ResolvedEntry> {
    let mut matches = tx
        .query_equal(DEVICE_COLLECTION, &identity_filters(identity))
        .await?;

    match matches.len() {
        0 => {
            debug!(identity = %identity, "No directory entry");
            Err(DirectoryError::NotFound(identity.to_token()))
        }
        1 => {
            let document = matches.remove(0);
            let entry = DirectoryEntry::from_store_fields(&document.fields).map_err(|e| {
                integrity_violation(
                    identity,
                    format!("directory entry {} is unreadable: {e}", document.reference),
                )
            })?;
            Ok(ResolvedEntry {
                reference: document.reference,
                entry,
            })
        }
        count => Err(integrity_violation(
            identity,
            format!("{count} directory entries share identity {identity}"),
        )),
    }
}

/// Resolve `identity` all the way to its configuration record
///
/// A missing or undecodable configuration behind an existing entry is an
/// `IntegrityViolation`, never `NotFound`.
pub async fn resolve(
    tx: &mut dyn Transaction,
    identity: &DeviceIdentity,
) -> DirectoryResult<(ResolvedEntry, Configuration)> {
    let resolved = resolve_entry(tx, identity).await?;
    let config_ref = resolved.config_ref();

    let document = tx.get(&config_ref).await?.ok_or_else(|| {
        integrity_violation(
            identity,
            format!(
                "directory entry {} references missing configuration {config_ref}",
                resolved.reference
            ),
        )
    })?;

    let config = Configuration::from_store_fields(&document.fields).map_err(|e| {
        integrity_violation(identity, format!("configuration {config_ref} is unreadable: {e}"))
    })?;

    Ok((resolved, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::{sample_config, seed_device};
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::json;
    use shared::DeviceModel;

    #[tokio::test]
    async fn test_resolve_returns_entry_and_configuration() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "67890-12345");
        let (entry_ref, config_ref) = seed_device(&store, &identity, &sample_config());

        let mut tx = store.begin().await.unwrap();
        let (resolved, config) = resolve(tx.as_mut(), &identity).await.unwrap();
        assert_eq!(resolved.reference, entry_ref);
        assert_eq!(resolved.config_ref(), config_ref);
        assert_eq!(resolved.entry.identity(), identity);
        assert_eq!(config, sample_config());
    }

    #[tokio::test]
    async fn test_model_is_part_of_the_lookup() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "1-2");
        seed_device(&store, &identity, &sample_config());

        let mut tx = store.begin().await.unwrap();
        let other = DeviceIdentity::new(DeviceModel::IchibuV2, "1-2");
        let err = resolve_entry(tx.as_mut(), &other).await.unwrap_err();
        assert_eq!(err, DirectoryError::NotFound("IchibuV2/1-2".into()));
    }

    #[tokio::test]
    async fn test_duplicate_entries_are_an_integrity_violation() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "1-2");
        seed_device(&store, &identity, &sample_config());
        seed_device(&store, &identity, &sample_config());

        let mut tx = store.begin().await.unwrap();
        let err = resolve(tx.as_mut(), &identity).await.unwrap_err();
        assert!(matches!(err, DirectoryError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_dangling_reference_is_an_integrity_violation() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::LibraV0, "1-2");
        let (_, config_ref) = seed_device(&store, &identity, &sample_config());
        assert!(store.remove_document(&config_ref));

        let mut tx = store.begin().await.unwrap();
        // The entry alone still resolves
        assert!(resolve_entry(tx.as_mut(), &identity).await.is_ok());
        let err = resolve(tx.as_mut(), &identity).await.unwrap_err();
        assert!(matches!(err, DirectoryError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_corrupt_records_are_integrity_violations() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "1-2");
        let (entry_ref, config_ref) = seed_device(&store, &identity, &sample_config());

        let mut broken = serde_json::Map::new();
        broken.insert("gain".into(), json!("heavy"));
        store.seed_document(&config_ref, broken);

        let mut tx = store.begin().await.unwrap();
        let err = resolve(tx.as_mut(), &identity).await.unwrap_err();
        assert!(matches!(err, DirectoryError::IntegrityViolation(_)));

        let mut entry = serde_json::Map::new();
        entry.insert("model".into(), json!("IchibuV1"));
        entry.insert("serialNumber".into(), json!("1-2"));
        store.seed_document(&entry_ref, entry);

        let mut tx = store.begin().await.unwrap();
        let err = resolve_entry(tx.as_mut(), &identity).await.unwrap_err();
        assert!(matches!(err, DirectoryError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_legacy_config_path_is_followed() {
        let store = MemoryStore::new();
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "legacy");

        let config_ref = DocumentRef::new(CONFIG_COLLECTION, "oldcfg");
        store.seed_document(&config_ref, sample_config().to_store_fields().unwrap());
        let entry = DirectoryEntry::new(&identity, "config/oldcfg");
        store.seed_document(
            &DocumentRef::new(DEVICE_COLLECTION, "oldentry"),
            entry.to_store_fields().unwrap(),
        );

        let mut tx = store.begin().await.unwrap();
        let (resolved, config) = resolve(tx.as_mut(), &identity).await.unwrap();
        assert_eq!(resolved.config_ref(), config_ref);
        assert_eq!(config, sample_config());
    }
}
