use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagemark_core::model::{Document, DocumentId, PersistedProgress, ProgressWrite, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for documents and their reading position.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update a document, including its progress columns.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn upsert_document(&self, document: &Document) -> Result<(), StorageError>;

    /// Fetch a document by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; a missing document is `Ok(None)`.
    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError>;

    /// List an owner's documents, most recently accessed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_documents(&self, owner: &UserId) -> Result<Vec<Document>, StorageError>;

    /// Fetch the stored reading position of a document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; a missing document is `Ok(None)`.
    async fn get_progress(&self, id: &DocumentId)
    -> Result<Option<PersistedProgress>, StorageError>;

    /// Overwrite a document's reading position and stamp `last_accessed_at`.
    ///
    /// The page is clamped to the document's page count before it is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document is not registered.
    async fn set_progress(
        &self,
        write: &ProgressWrite,
        at: DateTime<Utc>,
    ) -> Result<PersistedProgress, StorageError>;
}

/// Newest access first; ties broken by id so listings are stable.
pub(crate) fn sort_recent_first(documents: &mut [Document]) {
    documents.sort_by(|a, b| {
        b.last_accessed_at
            .cmp(&a.last_accessed_at)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_document(&self, document: &Document) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_documents(&self, owner: &UserId) -> Result<Vec<Document>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut documents: Vec<Document> = guard
            .values()
            .filter(|doc| &doc.owner == owner)
            .cloned()
            .collect();
        sort_recent_first(&mut documents);
        Ok(documents)
    }

    async fn get_progress(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PersistedProgress>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).map(Document::progress))
    }

    async fn set_progress(
        &self,
        write: &ProgressWrite,
        at: DateTime<Utc>,
    ) -> Result<PersistedProgress, StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let document = guard
            .get_mut(&write.document_id)
            .ok_or(StorageError::NotFound)?;
        let record = write.clone().into_record(document.total_pages, at);
        document.apply_progress(&record);
        Ok(record)
    }
}

/// Aggregates repository implementations for higher layers.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
