//! # In-Memory Document Store
//!
//! [`MemoryStore`] keeps every collection in memory behind a
//! copy-on-write snapshot and optionally mirrors the committed state to a
//! JSON file so the service survives restarts.
//!
//! ## Concurrency
//!
//! Each transaction holds an `Arc` of the state as of `begin` and reads
//! only from it. At commit the store validates, under its write lock,
//! that nothing the transaction observed has moved since:
//!
//! - every document read (or found absent) still has the same version
//! - no collection the transaction queried has received a write
//!
//! The first transaction to commit wins; the other gets
//! [`StoreError::Conflict`]. Queries conflict at collection granularity,
//! which also rules out phantoms (an entry inserted behind a query that
//! returned nothing).
//!
//! ## Persistence
//!
//! With a data path, every commit writes the whole state to a temporary
//! file and renames it over the data file. If that write fails the commit
//! is already applied in memory but returns [`StoreError::Io`], so no
//! caller is acknowledged for a write that is not on disk. The next
//! successful commit writes the full state again.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shared::{config::StoreConfig, constants::DOCUMENT_ID_LENGTH, DocumentFields};

use super::{Document, DocumentRef, DocumentStore, FieldFilter, StoreError, StoreResult, Transaction};

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredDocument {
    /// Commit version that last wrote this document
    version: u64,
    fields: DocumentFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    /// Commit version of the latest write to any document in here
    #[serde(default)]
    last_write: u64,
    documents: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    /// Version of the latest commit
    version: u64,
    collections: BTreeMap<String, Collection>,
}

impl StoreState {
    fn document(&self, reference: &DocumentRef) -> Option<&StoredDocument> {
        self.collections
            .get(&reference.collection)?
            .documents
            .get(&reference.id)
    }

    fn last_write(&self, collection: &str) -> u64 {
        self.collections
            .get(collection)
            .map(|c| c.last_write)
            .unwrap_or(0)
    }

    fn write(&mut self, reference: &DocumentRef, fields: DocumentFields, version: u64) {
        let collection = self.collections.entry(reference.collection.clone()).or_default();
        collection.last_write = version;
        collection
            .documents
            .insert(reference.id.clone(), StoredDocument { version, fields });
    }
}

struct Inner {
    /// Latest committed state
    state: RwLock<Arc<StoreState>>,
    /// Snapshot file, if persistence is enabled
    data_path: Option<PathBuf>,
    /// Version last written to `data_path`
    persisted_version: Mutex<u64>,
}

// =============================================================================
// STORE
// =============================================================================

/// Transactional document store held in memory
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store
    pub fn new() -> Self {
        Self::with_state(StoreState::default(), None)
    }

    /// Open a store persisted at `path`, loading it if the file exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if tokio::fs::try_exists(&path).await? {
            let json = tokio::fs::read(&path).await?;
            let state: StoreState = serde_json::from_slice(&json)?;
            info!(
                path = ?path,
                version = state.version,
                collections = state.collections.len(),
                "Loaded persisted document store"
            );
            state
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!(path = ?path, "Starting new persisted document store");
            StoreState::default()
        };

        Ok(Self::with_state(state, Some(path)))
    }

    /// Build the store described by the service configuration
    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        match &config.data_path {
            Some(path) => Self::open(path).await,
            None => {
                info!("Starting in-memory document store (no persistence)");
                Ok(Self::new())
            }
        }
    }

    fn with_state(state: StoreState, data_path: Option<PathBuf>) -> Self {
        let version = state.version;
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(Arc::new(state)),
                data_path,
                persisted_version: Mutex::new(version),
            }),
        }
    }

    /// Write a document directly, outside any transaction
    ///
    /// Used to load fixtures and to reproduce corrupted directories in
    /// tests. Counts as a commit for conflict detection.
    pub fn seed_document(&self, reference: &DocumentRef, fields: DocumentFields) {
        let mut guard = self.inner.state.write();
        let state = Arc::make_mut(&mut *guard);
        state.version += 1;
        let version = state.version;
        state.write(reference, fields, version);
    }

    /// Delete a document directly, outside any transaction
    pub fn remove_document(&self, reference: &DocumentRef) -> bool {
        let mut guard = self.inner.state.write();
        let state = Arc::make_mut(&mut *guard);
        state.version += 1;
        let version = state.version;
        match state.collections.get_mut(&reference.collection) {
            Some(collection) => {
                collection.last_write = version;
                collection.documents.remove(&reference.id).is_some()
            }
            None => false,
        }
    }

    /// Every committed document in a collection, ordered by key
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.inner.state.read().clone();
        state
            .collections
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .map(|(id, doc)| Document {
                        reference: DocumentRef::new(collection, id.clone()),
                        fields: doc.fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Version of the latest commit
    pub fn version(&self) -> u64 {
        self.inner.state.read().version
    }

    /// Mirror a committed snapshot to disk unless a newer one already is
    async fn persist(&self, snapshot: Arc<StoreState>) -> StoreResult<()> {
        let Some(path) = &self.inner.data_path else {
            return Ok(());
        };

        let mut persisted = self.inner.persisted_version.lock().await;
        if *persisted >= snapshot.version {
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(&*snapshot)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        *persisted = snapshot.version;

        debug!(path = ?path, version = snapshot.version, "Document store persisted");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let snapshot = self.inner.state.read().clone();
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            snapshot,
            reads: HashMap::new(),
            queried: HashSet::new(),
            reserved: HashSet::new(),
            writes: Vec::new(),
        }))
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

enum Write {
    Set(DocumentRef, DocumentFields),
    Update(DocumentRef, DocumentFields),
}

struct MemoryTransaction {
    store: MemoryStore,
    /// State as of `begin`
    snapshot: Arc<StoreState>,
    /// Version of every document read (`None` if it was absent)
    reads: HashMap<DocumentRef, Option<u64>>,
    /// Collections scanned by a query
    queried: HashSet<String>,
    /// Keys handed out by `create`
    reserved: HashSet<DocumentRef>,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    fn validate(&self, current: &StoreState) -> StoreResult<()> {
        for (reference, seen) in &self.reads {
            let now = current.document(reference).map(|d| d.version);
            if now != *seen {
                return Err(StoreError::Conflict(format!(
                    "{reference} changed since the transaction began"
                )));
            }
        }

        for collection in &self.queried {
            if current.last_write(collection) > self.snapshot.version {
                return Err(StoreError::Conflict(format!(
                    "collection '{collection}' was written since the transaction began"
                )));
            }
        }

        // Partial updates need a target, either committed or set earlier here
        let mut created: HashSet<&DocumentRef> = HashSet::new();
        for write in &self.writes {
            match write {
                Write::Set(reference, _) => {
                    created.insert(reference);
                }
                Write::Update(reference, _) => {
                    if current.document(reference).is_none() && !created.contains(reference) {
                        return Err(StoreError::MissingDocument(reference.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn query_equal(
        &mut self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> StoreResult<Vec<Document>> {
        self.queried.insert(collection.to_string());

        let snapshot = Arc::clone(&self.snapshot);
        let Some(stored) = snapshot.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for (id, doc) in &stored.documents {
            if filters.iter().all(|filter| filter.matches(&doc.fields)) {
                let reference = DocumentRef::new(collection, id.clone());
                self.reads.insert(reference.clone(), Some(doc.version));
                matches.push(Document {
                    reference,
                    fields: doc.fields.clone(),
                });
            }
        }
        Ok(matches)
    }

    async fn get(&mut self, reference: &DocumentRef) -> StoreResult<Option<Document>> {
        let found = self.snapshot.document(reference).cloned();
        self.reads
            .insert(reference.clone(), found.as_ref().map(|d| d.version));

        Ok(found.map(|doc| Document {
            reference: reference.clone(),
            fields: doc.fields,
        }))
    }

    fn create(&mut self, collection: &str) -> DocumentRef {
        loop {
            let reference = DocumentRef::new(collection, generate_id());
            if self.snapshot.document(&reference).is_none() && self.reserved.insert(reference.clone()) {
                return reference;
            }
        }
    }

    fn set(&mut self, reference: &DocumentRef, fields: DocumentFields) {
        self.writes.push(Write::Set(reference.clone(), fields));
    }

    fn update(&mut self, reference: &DocumentRef, partial: DocumentFields) {
        self.writes.push(Write::Update(reference.clone(), partial));
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.writes.is_empty() {
            // Read-only: the snapshot was consistent, nothing to publish
            return Ok(());
        }

        let committed = {
            let mut guard = self.store.inner.state.write();
            if let Err(e) = self.validate(&guard) {
                warn!(error = %e, "Transaction rejected at commit");
                return Err(e);
            }

            let state = Arc::make_mut(&mut *guard);
            let version = state.version + 1;
            for write in &self.writes {
                match write {
                    Write::Set(reference, fields) => state.write(reference, fields.clone(), version),
                    Write::Update(reference, partial) => {
                        let mut fields = state
                            .document(reference)
                            .map(|d| d.fields.clone())
                            .unwrap_or_default();
                        fields.extend(partial.clone());
                        state.write(reference, fields, version);
                    }
                }
            }
            state.version = version;

            debug!(version, writes = self.writes.len(), "Transaction committed");
            Arc::clone(&*guard)
        };

        // The commit is visible in memory either way; the caller still
        // learns that it did not reach disk
        if let Err(e) = self.store.persist(committed).await {
            error!(error = %e, "Failed to persist document store snapshot");
            return Err(e);
        }
        Ok(())
    }
}
