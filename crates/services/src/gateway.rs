use async_trait::async_trait;
use pagemark_core::model::{Document, DocumentId, PersistedProgress, ProgressWrite};

use crate::error::GatewayError;

/// Where reading positions are loaded from and written to.
///
/// Writes are full-state overwrites, so repeating one is harmless.
#[async_trait]
pub trait ProgressGateway: Send + Sync {
    /// Fetch the stored position of a document.
    ///
    /// A missing or unreadable record is `Ok(None)`: the caller treats it as
    /// "no prior progress".
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the backend cannot be reached.
    async fn get_progress(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PersistedProgress>, GatewayError>;

    /// Overwrite the stored position and return the record as stored.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for an unknown document, or other
    /// gateway errors.
    async fn set_progress(&self, write: &ProgressWrite) -> Result<PersistedProgress, GatewayError>;

    /// The reader's documents, most recently accessed first.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the backend cannot be reached.
    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError>;

    /// Look up one document from the reader's listing.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the backend cannot be reached.
    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, GatewayError> {
        Ok(self
            .list_documents()
            .await?
            .into_iter()
            .find(|doc| &doc.id == id))
    }
}
