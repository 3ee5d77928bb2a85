//! # Document Store Interface
//!
//! The directory layer talks to its backing store only through the
//! [`DocumentStore`] and [`Transaction`] traits defined here.
//!
//! ## Transaction model
//!
//! - Reads observe one consistent snapshot taken at [`DocumentStore::begin`]
//! - Writes are buffered and applied all-or-nothing at [`Transaction::commit`]
//! - A commit fails with [`StoreError::Conflict`] when another transaction
//!   committed first and touched something this one read
//! - Dropping a transaction without committing abandons it
//!
//! No retry happens at this level; callers decide whether to start over.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use shared::{DirectoryError, DocumentFields};

pub use memory::MemoryStore;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Address of a document: collection plus key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    /// Collection name
    pub collection: String,
    /// Document key
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Snapshot of a stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the document lives
    pub reference: DocumentRef,
    /// Field values at the transaction's snapshot
    pub fields: DocumentFields,
}

/// Equality predicate on a single top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    /// `field == value`
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether a document satisfies this filter
    pub fn matches(&self, fields: &DocumentFields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failures reported by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another transaction committed a conflicting write first
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A partial update targeted a document that does not exist
    #[error("cannot update missing document {0}")]
    MissingDocument(DocumentRef),

    /// Persisting or loading store data failed
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted store data could not be (de)serialized
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using StoreError
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => DirectoryError::WriteConflict(reason),
            StoreError::Io(e) => DirectoryError::StorageIOError(e.to_string()),
            other => DirectoryError::StoreError(other.to_string()),
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// A transactional store of keyed JSON documents grouped in collections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Start a transaction reading from the current committed state
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// One unit of work against a [`DocumentStore`]
///
/// Reads never observe this transaction's own buffered writes.
#[async_trait]
pub trait Transaction: Send {
    /// All documents in `collection` matching every filter
    async fn query_equal(
        &mut self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> StoreResult<Vec<Document>>;

    /// Fetch a single document by key
    async fn get(&mut self, reference: &DocumentRef) -> StoreResult<Option<Document>>;

    /// Reserve a fresh, unused key in `collection` (nothing is written
    /// until [`Transaction::set`] is called on it)
    fn create(&mut self, collection: &str) -> DocumentRef;

    /// Create or fully replace a document
    fn set(&mut self, reference: &DocumentRef, fields: DocumentFields);

    /// Merge `partial` into an existing document
    fn update(&mut self, reference: &DocumentRef, partial: DocumentFields);

    /// Apply every buffered write atomically
    ///
    /// Durable stores report a failed write to disk as [`StoreError::Io`].
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
