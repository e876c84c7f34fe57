use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{DocumentId, UserId};
use crate::model::progress::{PageNumber, PersistedProgress, ProgressPercent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("document title cannot be empty")]
    EmptyTitle,

    #[error("document title is too long ({len} > {max})")]
    TitleTooLong { len: usize, max: usize },

    #[error("a document must have at least one page")]
    NoPages,
}

/// Upper bound on stored titles, in characters.
pub const MAX_TITLE_CHARS: usize = 300;

/// Unvalidated input for registering a document.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub id: Option<DocumentId>,
    pub owner: UserId,
    pub title: String,
    pub total_pages: Option<u32>,
}

impl DocumentDraft {
    #[must_use]
    pub fn new(owner: UserId, title: impl Into<String>) -> Self {
        Self {
            id: None,
            owner,
            title: title.into(),
            total_pages: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_total_pages(mut self, total_pages: u32) -> Self {
        self.total_pages = Some(total_pages);
        self
    }

    /// Validate the draft into a document positioned at page 1, 0 %.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` for an empty or oversized title, or a page count of zero.
    pub fn validate(self, now: DateTime<Utc>) -> Result<Document, DocumentError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DocumentError::EmptyTitle);
        }
        let len = title.chars().count();
        if len > MAX_TITLE_CHARS {
            return Err(DocumentError::TitleTooLong {
                len,
                max: MAX_TITLE_CHARS,
            });
        }
        if self.total_pages == Some(0) {
            return Err(DocumentError::NoPages);
        }

        Ok(Document {
            id: self.id.unwrap_or_else(DocumentId::generate),
            owner: self.owner,
            title: title.to_owned(),
            total_pages: self.total_pages,
            current_page: PageNumber::first(),
            progress_percent: ProgressPercent::ZERO,
            last_accessed_at: now,
        })
    }
}

/// A registered document together with its reading position.
///
/// `total_pages` stays `None` when the page count could not be determined at
/// upload time; the viewer reports it on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner: UserId,
    pub title: String,
    pub total_pages: Option<u32>,
    pub current_page: PageNumber,
    pub progress_percent: ProgressPercent,
    pub last_accessed_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn progress(&self) -> PersistedProgress {
        PersistedProgress {
            document_id: self.id.clone(),
            current_page: self.current_page,
            progress_percent: self.progress_percent,
            total_pages: self.total_pages,
            last_accessed_at: self.last_accessed_at,
        }
    }

    /// Copy a stored progress record onto this document.
    pub fn apply_progress(&mut self, progress: &PersistedProgress) {
        self.current_page = progress.current_page;
        self.progress_percent = progress.progress_percent;
        self.last_accessed_at = progress.last_accessed_at;
        if progress.total_pages.is_some() {
            self.total_pages = progress.total_pages;
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress_percent.is_complete()
    }
}
