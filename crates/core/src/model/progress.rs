use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::DocumentId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PageError {
    #[error("page numbers start at 1")]
    Zero,
}

//
// ─── PAGE NUMBER ───────────────────────────────────────────────────────────────
//

/// 1-based page index inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageNumber(u32);

impl PageNumber {
    /// Creates a page number.
    ///
    /// # Errors
    ///
    /// Returns `PageError::Zero` for `0`.
    pub fn new(page: u32) -> Result<Self, PageError> {
        if page == 0 {
            return Err(PageError::Zero);
        }
        Ok(Self(page))
    }

    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    /// Builds a page number from a 1-based value, mapping `0` to the first page.
    #[must_use]
    pub fn saturating(page: u32) -> Self {
        Self(page.max(1))
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Clamps the page into `[1, total]`. A `total` of zero leaves only page 1.
    #[must_use]
    pub fn clamp_to(self, total: u32) -> Self {
        Self(self.0.min(total.max(1)))
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::first()
    }
}

impl TryFrom<u32> for PageNumber {
    type Error = PageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageNumber> for u32 {
    fn from(page: PageNumber) -> Self {
        page.0
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── PROGRESS PERCENT ──────────────────────────────────────────────────────────
//

/// Reading progress in percent, always inside `[0, 100]`.
///
/// Out-of-range input is clamped rather than rejected; `NaN` reads as zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct ProgressPercent(f64);

impl ProgressPercent {
    pub const ZERO: Self = Self(0.0);
    pub const COMPLETE: Self = Self(100.0);

    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 100.0))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.0 >= 100.0
    }

    /// True for a started but unfinished read (`0 < p < 100`).
    #[must_use]
    pub fn is_partial(self) -> bool {
        self.0 > 0.0 && self.0 < 100.0
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.0 - other.0).abs()
    }
}

impl From<f64> for ProgressPercent {
    fn from(value: f64) -> Self {
        Self::clamped(value)
    }
}

impl From<ProgressPercent> for f64 {
    fn from(percent: ProgressPercent) -> Self {
        percent.0
    }
}

impl fmt::Display for ProgressPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0)
    }
}

//
// ─── ESTIMATE ──────────────────────────────────────────────────────────────────
//

/// A `(page, percent)` reading position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressEstimate {
    pub page: PageNumber,
    pub percent: ProgressPercent,
}

impl ProgressEstimate {
    #[must_use]
    pub fn new(page: PageNumber, percent: ProgressPercent) -> Self {
        Self { page, percent }
    }

    /// Page 1, 0 %.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }
}

//
// ─── PERSISTED RECORD ──────────────────────────────────────────────────────────
//

/// Durable last-known reading position of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProgress {
    pub document_id: DocumentId,
    pub current_page: PageNumber,
    pub progress_percent: ProgressPercent,
    pub total_pages: Option<u32>,
    pub last_accessed_at: DateTime<Utc>,
}

impl PersistedProgress {
    #[must_use]
    pub fn estimate(&self) -> ProgressEstimate {
        ProgressEstimate::new(self.current_page, self.progress_percent)
    }
}

/// Full-state overwrite of a document's progress.
///
/// Writes carry the whole position rather than a delta, so replaying one is
/// harmless: only `last_accessed_at` moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressWrite {
    pub document_id: DocumentId,
    pub current_page: PageNumber,
    pub progress_percent: ProgressPercent,
}

impl ProgressWrite {
    #[must_use]
    pub fn new(document_id: DocumentId, estimate: ProgressEstimate) -> Self {
        Self {
            document_id,
            current_page: estimate.page,
            progress_percent: estimate.percent,
        }
    }

    /// Resets the document to page 1, 0 %.
    #[must_use]
    pub fn restart(document_id: DocumentId) -> Self {
        Self::new(document_id, ProgressEstimate::start())
    }

    #[must_use]
    pub fn estimate(&self) -> ProgressEstimate {
        ProgressEstimate::new(self.current_page, self.progress_percent)
    }

    /// Produces the stored record for this write.
    ///
    /// The page is clamped to the known page count.
    #[must_use]
    pub fn into_record(self, total_pages: Option<u32>, now: DateTime<Utc>) -> PersistedProgress {
        let current_page = match total_pages {
            Some(total) => self.current_page.clamp_to(total),
            None => self.current_page,
        };
        PersistedProgress {
            document_id: self.document_id,
            current_page,
            progress_percent: self.progress_percent,
            total_pages,
            last_accessed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(ProgressPercent::clamped(-5.0).value(), 0.0);
        assert_eq!(ProgressPercent::clamped(140.0).value(), 100.0);
        assert_eq!(ProgressPercent::clamped(f64::NAN).value(), 0.0);
        assert_eq!(ProgressPercent::clamped(42.5).value(), 42.5);
    }

    #[test]
    fn percent_deserialization_clamps() {
        let p: ProgressPercent = serde_json::from_str("250").unwrap();
        assert!(p.is_complete());
        let p: ProgressPercent = serde_json::from_str("-1").unwrap();
        assert_eq!(p, ProgressPercent::ZERO);
    }

    #[test]
    fn partial_excludes_bounds() {
        assert!(!ProgressPercent::ZERO.is_partial());
        assert!(!ProgressPercent::COMPLETE.is_partial());
        assert!(ProgressPercent::clamped(45.0).is_partial());
    }

    #[test]
    fn page_zero_is_rejected() {
        assert_eq!(PageNumber::new(0), Err(PageError::Zero));
        assert_eq!(PageNumber::saturating(0), PageNumber::first());
        assert!(serde_json::from_str::<PageNumber>("0").is_err());
    }

    #[test]
    fn page_clamps_to_total() {
        let page = PageNumber::new(12).unwrap();
        assert_eq!(page.clamp_to(10).value(), 10);
        assert_eq!(page.clamp_to(0).value(), 1);
        assert_eq!(page.clamp_to(20).value(), 12);
    }

    #[test]
    fn write_into_record_clamps_page_and_stamps_time() {
        let id = DocumentId::new("doc").unwrap();
        let write = ProgressWrite::new(
            id.clone(),
            ProgressEstimate::new(PageNumber::new(9).unwrap(), ProgressPercent::clamped(80.0)),
        );
        let record = write.into_record(Some(4), fixed_now());
        assert_eq!(record.document_id, id);
        assert_eq!(record.current_page.value(), 4);
        assert_eq!(record.progress_percent.value(), 80.0);
        assert_eq!(record.last_accessed_at, fixed_now());
    }
}
