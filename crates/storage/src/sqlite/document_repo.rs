use chrono::{DateTime, Utc};
use pagemark_core::model::{Document, DocumentId, PersistedProgress, ProgressWrite, UserId};

use super::SqliteRepository;
use super::mapping::{map_document_row, page_to_i64, total_pages_to_i64};
use crate::repository::{ProgressRepository, StorageError};

const DOCUMENT_COLUMNS: &str =
    "id, owner, title, total_pages, current_page, progress_percent, last_accessed_at";

impl SqliteRepository {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_document_row).transpose()
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_document(&self, document: &Document) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO documents (id, owner, title, total_pages, current_page, progress_percent, last_accessed_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                title = excluded.title,
                total_pages = excluded.total_pages,
                current_page = excluded.current_page,
                progress_percent = excluded.progress_percent,
                last_accessed_at = excluded.last_accessed_at
            ",
        )
        .bind(document.id.as_str())
        .bind(document.owner.as_str())
        .bind(&document.title)
        .bind(total_pages_to_i64(document.total_pages))
        .bind(page_to_i64(document.current_page))
        .bind(document.progress_percent.value())
        .bind(document.last_accessed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        self.fetch_document(id).await
    }

    async fn list_documents(&self, owner: &UserId) -> Result<Vec<Document>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner = ?1 \
             ORDER BY last_accessed_at DESC, id ASC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_document_row).collect()
    }

    async fn get_progress(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PersistedProgress>, StorageError> {
        Ok(self.fetch_document(id).await?.map(|doc| doc.progress()))
    }

    async fn set_progress(
        &self,
        write: &ProgressWrite,
        at: DateTime<Utc>,
    ) -> Result<PersistedProgress, StorageError> {
        let document = self
            .fetch_document(&write.document_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let record = write.clone().into_record(document.total_pages, at);

        let res = sqlx::query(
            r"
            UPDATE documents
            SET current_page = ?2, progress_percent = ?3, last_accessed_at = ?4
            WHERE id = ?1
            ",
        )
        .bind(record.document_id.as_str())
        .bind(page_to_i64(record.current_page))
        .bind(record.progress_percent.value())
        .bind(record.last_accessed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(record)
    }
}
