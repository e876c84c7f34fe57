use chrono::{DateTime, Utc};
use pagemark_core::model::{Document, DocumentId, PageNumber, ProgressPercent, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn page_to_i64(page: PageNumber) -> i64 {
    i64::from(page.value())
}

pub(crate) fn total_pages_to_i64(total: Option<u32>) -> Option<i64> {
    total.map(i64::from)
}

pub(crate) fn map_document_row(row: &SqliteRow) -> Result<Document, StorageError> {
    let id = DocumentId::new(row.try_get::<String, _>("id").map_err(ser)?).map_err(ser)?;
    let owner = UserId::new(row.try_get::<String, _>("owner").map_err(ser)?).map_err(ser)?;
    let title: String = row.try_get("title").map_err(ser)?;

    let total_pages = row
        .try_get::<Option<i64>, _>("total_pages")
        .map_err(ser)?
        .map(|v| i64_to_u32("total_pages", v))
        .transpose()?;

    let current_page = PageNumber::new(i64_to_u32(
        "current_page",
        row.try_get("current_page").map_err(ser)?,
    )?)
    .map_err(ser)?;

    let progress_percent =
        ProgressPercent::clamped(row.try_get::<f64, _>("progress_percent").map_err(ser)?);
    let last_accessed_at: DateTime<Utc> = row.try_get("last_accessed_at").map_err(ser)?;

    Ok(Document {
        id,
        owner,
        title,
        total_pages,
        current_page,
        progress_percent,
        last_accessed_at,
    })
}
