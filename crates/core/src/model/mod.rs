mod document;
mod ids;
mod progress;

pub use document::{Document, DocumentDraft, DocumentError, MAX_TITLE_CHARS};
pub use ids::{DocumentId, IdError, UserId};
pub use progress::{
    PageError, PageNumber, PersistedProgress, ProgressEstimate, ProgressPercent, ProgressWrite,
};
