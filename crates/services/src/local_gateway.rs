use std::sync::Arc;

use pagemark_core::Clock;
use pagemark_core::model::{Document, DocumentId, PersistedProgress, ProgressWrite, UserId};
use storage::repository::ProgressRepository;

use crate::error::GatewayError;
use crate::gateway::ProgressGateway;

/// Progress gateway over a local repository.
///
/// Writes are stamped with the gateway's clock.
#[derive(Clone)]
pub struct StoredProgressGateway {
    repo: Arc<dyn ProgressRepository>,
    owner: UserId,
    clock: Clock,
}

impl StoredProgressGateway {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>, owner: UserId) -> Self {
        Self {
            repo,
            owner,
            clock: Clock::default(),
        }
    }

    /// Override the clock (useful for deterministic tests).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait::async_trait]
impl ProgressGateway for StoredProgressGateway {
    async fn get_progress(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PersistedProgress>, GatewayError> {
        Ok(self.repo.get_progress(id).await?)
    }

    async fn set_progress(&self, write: &ProgressWrite) -> Result<PersistedProgress, GatewayError> {
        let stored = self.repo.set_progress(write, self.clock.now()).await?;
        tracing::debug!(
            document = %stored.document_id,
            page = stored.current_page.value(),
            percent = stored.progress_percent.value(),
            "stored progress"
        );
        Ok(stored)
    }

    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError> {
        Ok(self.repo.list_documents(&self.owner).await?)
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, GatewayError> {
        Ok(self.repo.get_document(id).await?)
    }
}
