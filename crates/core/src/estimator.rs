//! Scroll position → `(page, percent)` estimation.
//!
//! The estimator is a pure function of viewer geometry. Hosts call it on
//! every scroll event; each call is a single linear scan over the page
//! offsets.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::model::{PageNumber, ProgressEstimate, ProgressPercent};
use crate::settings::TrackerSettings;

//
// ─── SCROLL METRICS ────────────────────────────────────────────────────────────
//

/// One observation of the hosting scroll container.
///
/// `scrollable_height` is the content height minus the viewport height, i.e.
/// the largest value `scroll_top` can take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scrollable_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    #[must_use]
    pub fn new(scroll_top: f64, scrollable_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top: scroll_top.max(0.0),
            scrollable_height: scrollable_height.max(0.0),
            viewport_height: viewport_height.max(0.0),
        }
    }

    #[must_use]
    pub fn content_height(&self) -> f64 {
        self.scrollable_height + self.viewport_height
    }

    /// Percent of the scrollable range covered, clamped to `[0, 100]`.
    #[must_use]
    pub fn percent(&self) -> ProgressPercent {
        if self.scrollable_height > 0.0 {
            ProgressPercent::clamped(self.scroll_top / self.scrollable_height * 100.0)
        } else {
            ProgressPercent::ZERO
        }
    }

    #[must_use]
    pub fn is_at_bottom(&self) -> bool {
        self.scrollable_height > 0.0 && self.scroll_top >= self.scrollable_height
    }

    fn viewport_center(&self) -> f64 {
        self.scroll_top + self.viewport_height / 2.0
    }
}

//
// ─── PAGE GEOMETRY ─────────────────────────────────────────────────────────────
//

/// Source of page boundary offsets.
///
/// Implementations wrap whatever the rendering surface can measure. Offsets
/// are page top edges in content coordinates, ascending, one per page.
pub trait PageGeometry {
    fn page_offsets(&self) -> Cow<'_, [f64]>;

    /// Bottom edge of the last page.
    fn content_height(&self) -> f64;
}

/// Page tops as measured from rendered page anchors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasuredPages {
    offsets: Vec<f64>,
    content_height: f64,
}

impl MeasuredPages {
    /// Builds measured geometry.
    ///
    /// Offsets are sorted so a late-arriving measurement cannot break the
    /// ascending order the estimator relies on; non-finite values are dropped.
    #[must_use]
    pub fn new(mut offsets: Vec<f64>, content_height: f64) -> Self {
        offsets.retain(|offset| offset.is_finite());
        offsets.sort_by(f64::total_cmp);
        let last = offsets.last().copied().unwrap_or(0.0);
        Self {
            offsets,
            content_height: content_height.max(last),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl PageGeometry for MeasuredPages {
    fn page_offsets(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(&self.offsets)
    }

    fn content_height(&self) -> f64 {
        self.content_height
    }
}

/// Equal-height pages, used before any page has been measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPages {
    pub page_count: u32,
    pub content_height: f64,
}

impl UniformPages {
    #[must_use]
    pub fn new(page_count: u32, content_height: f64) -> Self {
        Self {
            page_count,
            content_height: content_height.max(0.0),
        }
    }
}

impl UniformPages {
    fn page_height(&self) -> f64 {
        self.content_height / f64::from(self.page_count)
    }

    /// Zero-based index of the page covering content offset `y`, clamped to
    /// the page range.
    fn index_at(&self, y: f64) -> usize {
        let height = self.page_height();
        if height <= 0.0 || y <= 0.0 {
            return 0;
        }
        let last = self.page_count.saturating_sub(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = ((y / height).floor() as u64).min(u64::from(last));
        usize::try_from(index).unwrap_or(usize::MAX)
    }
}

impl PageGeometry for UniformPages {
    fn page_offsets(&self) -> Cow<'_, [f64]> {
        if self.page_count == 0 {
            return Cow::Owned(Vec::new());
        }
        let height = self.page_height();
        Cow::Owned(
            (0..self.page_count)
                .map(|i| f64::from(i) * height)
                .collect(),
        )
    }

    fn content_height(&self) -> f64 {
        self.content_height
    }
}

//
// ─── ESTIMATOR ─────────────────────────────────────────────────────────────────
//

/// Converts scroll observations into reading positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimator {
    boundary_tolerance: f64,
    change_threshold: f64,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new(&TrackerSettings::default())
    }
}

impl ProgressEstimator {
    #[must_use]
    pub fn new(settings: &TrackerSettings) -> Self {
        Self {
            boundary_tolerance: settings.boundary_tolerance,
            change_threshold: settings.change_threshold_percent,
        }
    }

    /// Estimate the reading position for one scroll observation.
    ///
    /// Page selection, in order:
    /// 1. scrolled to the very bottom → the last page;
    /// 2. the page whose `[top - tolerance, next_top - tolerance)` band holds
    ///    the viewport top (snaps to the upcoming page slightly early);
    /// 3. otherwise the page whose centre is nearest the viewport centre.
    ///
    /// With no pages or nothing to scroll the result is page 1 at 0 %.
    #[must_use]
    pub fn estimate(
        &self,
        metrics: &ScrollMetrics,
        geometry: &dyn PageGeometry,
        total_pages: u32,
    ) -> ProgressEstimate {
        if total_pages == 0 || metrics.scrollable_height <= 0.0 {
            return ProgressEstimate::start();
        }

        let percent = metrics.percent();
        if metrics.is_at_bottom() {
            return ProgressEstimate::new(PageNumber::saturating(total_pages), percent);
        }

        let offsets = geometry.page_offsets();
        let index = if offsets.is_empty() {
            self.uniform_page(&UniformPages::new(total_pages, metrics.content_height()), metrics)
        } else {
            let content_height = geometry.content_height();
            self.containing_page(&offsets, content_height, metrics.scroll_top)
                .or_else(|| nearest_center_page(&offsets, content_height, metrics.viewport_center()))
                .unwrap_or(0)
        };

        let page = u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX);
        ProgressEstimate::new(PageNumber::saturating(page).clamp_to(total_pages), percent)
    }

    /// True when `next` should be propagated downstream.
    #[must_use]
    pub fn is_significant(&self, previous: Option<ProgressEstimate>, next: ProgressEstimate) -> bool {
        match previous {
            None => true,
            Some(prev) => {
                prev.page != next.page || prev.percent.distance(next.percent) > self.change_threshold
            }
        }
    }

    /// Same selection rules as the measured scan, computed arithmetically.
    fn uniform_page(&self, pages: &UniformPages, metrics: &ScrollMetrics) -> usize {
        let probe = metrics.scroll_top + self.boundary_tolerance;
        if (0.0..pages.content_height).contains(&probe) {
            pages.index_at(probe)
        } else {
            pages.index_at(metrics.viewport_center())
        }
    }

    fn containing_page(&self, offsets: &[f64], content_height: f64, scroll_top: f64) -> Option<usize> {
        let probe = scroll_top + self.boundary_tolerance;
        offsets.iter().enumerate().position(|(i, &top)| {
            let bottom = offsets.get(i + 1).copied().unwrap_or(content_height);
            top <= probe && probe < bottom
        })
    }
}

fn nearest_center_page(offsets: &[f64], content_height: f64, viewport_center: f64) -> Option<usize> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &top)| {
            let bottom = offsets.get(i + 1).copied().unwrap_or(content_height);
            let center = (top + bottom) / 2.0;
            (i, (center - viewport_center).abs())
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten 1000-unit pages in an 800-unit viewport.
    fn ten_pages() -> (MeasuredPages, f64, f64) {
        let offsets = (0..10).map(|i| f64::from(i) * 1000.0).collect();
        let content = 10_000.0;
        let viewport = 800.0;
        (MeasuredPages::new(offsets, content), content - viewport, viewport)
    }

    #[test]
    fn top_of_document_is_page_one_at_zero() {
        let estimator = ProgressEstimator::default();
        let geometry = UniformPages::new(10, 1800.0);
        let est = estimator.estimate(&ScrollMetrics::new(0.0, 1000.0, 800.0), &geometry, 10);
        assert_eq!(est.page.value(), 1);
        assert_eq!(est.percent, ProgressPercent::ZERO);
    }

    #[test]
    fn bottom_of_document_is_last_page_at_hundred() {
        let estimator = ProgressEstimator::default();
        let geometry = UniformPages::new(10, 1800.0);
        let est = estimator.estimate(&ScrollMetrics::new(1000.0, 1000.0, 800.0), &geometry, 10);
        assert_eq!(est.page.value(), 10);
        assert_eq!(est.percent, ProgressPercent::COMPLETE);
    }

    #[test]
    fn single_screen_document_reports_zero() {
        let estimator = ProgressEstimator::default();
        let geometry = MeasuredPages::new(vec![0.0], 600.0);
        let est = estimator.estimate(&ScrollMetrics::new(500.0, 0.0, 800.0), &geometry, 1);
        assert_eq!(est, ProgressEstimate::start());
    }

    #[test]
    fn zero_pages_reports_start() {
        let estimator = ProgressEstimator::default();
        let geometry = MeasuredPages::default();
        let est = estimator.estimate(&ScrollMetrics::new(300.0, 1000.0, 800.0), &geometry, 0);
        assert_eq!(est, ProgressEstimate::start());
    }

    #[test]
    fn percent_stays_in_range_across_scroll_positions() {
        let estimator = ProgressEstimator::default();
        let (geometry, scrollable, viewport) = ten_pages();
        let mut top = 0.0;
        while top <= scrollable {
            let est = estimator.estimate(&ScrollMetrics::new(top, scrollable, viewport), &geometry, 10);
            assert!((0.0..=100.0).contains(&est.percent.value()), "top={top}");
            assert!((1..=10).contains(&est.page.value()), "top={top}");
            top += 37.0;
        }
    }

    #[test]
    fn tolerance_snaps_to_upcoming_page() {
        let estimator = ProgressEstimator::default();
        let (geometry, scrollable, viewport) = ten_pages();

        // 40 units above page 3's top edge: inside the 50-unit tolerance.
        let est = estimator.estimate(&ScrollMetrics::new(1960.0, scrollable, viewport), &geometry, 10);
        assert_eq!(est.page.value(), 3);

        // 60 units above: still page 2.
        let est = estimator.estimate(&ScrollMetrics::new(1940.0, scrollable, viewport), &geometry, 10);
        assert_eq!(est.page.value(), 2);
    }

    #[test]
    fn nearest_center_used_above_first_page() {
        let estimator = ProgressEstimator::default();
        // 400 units of header padding before page 1.
        let geometry = MeasuredPages::new(vec![400.0, 1400.0, 2400.0], 3400.0);
        let est = estimator.estimate(&ScrollMetrics::new(100.0, 2600.0, 800.0), &geometry, 3);
        assert_eq!(est.page.value(), 1);
    }

    #[test]
    fn unmeasured_geometry_falls_back_to_uniform_split() {
        let estimator = ProgressEstimator::new(&TrackerSettings {
            boundary_tolerance: 0.0,
            ..TrackerSettings::default()
        });
        let geometry = MeasuredPages::default();
        // 4 pages over 2000 units of content: each page is 500 tall.
        let est = estimator.estimate(&ScrollMetrics::new(1100.0, 1200.0, 800.0), &geometry, 4);
        assert_eq!(est.page.value(), 3);
    }

    #[test]
    fn unmeasured_geometry_matches_uniform_offset_scan() {
        let estimator = ProgressEstimator::default();
        let uniform = UniformPages::new(7, 7_700.0);
        let offsets = uniform.page_offsets();
        let measured = MeasuredPages::new(offsets.into_owned(), uniform.content_height);
        let mut top = 0.0;
        while top < 6_900.0 {
            let metrics = ScrollMetrics::new(top, 6_900.0, 800.0);
            assert_eq!(
                estimator.estimate(&metrics, &MeasuredPages::default(), 7),
                estimator.estimate(&metrics, &measured, 7),
                "top={top}"
            );
            top += 53.0;
        }
    }

    #[test]
    fn huge_unmeasured_page_count_is_computed_without_offsets() {
        let estimator = ProgressEstimator::new(&TrackerSettings {
            boundary_tolerance: 0.0,
            ..TrackerSettings::default()
        });
        let metrics = ScrollMetrics::new(500.0, f64::from(u32::MAX) - 800.0, 800.0);
        let est = estimator.estimate(&metrics, &MeasuredPages::default(), u32::MAX);
        assert_eq!(est.page.value(), 501);
    }

    #[test]
    fn page_never_exceeds_total() {
        let estimator = ProgressEstimator::default();
        // Geometry reports more pages than the document declares.
        let geometry = MeasuredPages::new(vec![0.0, 100.0, 200.0, 300.0], 400.0);
        let est = estimator.estimate(&ScrollMetrics::new(290.0, 300.0, 100.0), &geometry, 2);
        assert_eq!(est.page.value(), 2);
    }

    #[test]
    fn significance_uses_threshold_or_page_change() {
        let estimator = ProgressEstimator::default();
        let page = |n| PageNumber::new(n).unwrap();
        let base = ProgressEstimate::new(page(2), ProgressPercent::clamped(10.0));

        assert!(estimator.is_significant(None, base));
        assert!(!estimator.is_significant(
            Some(base),
            ProgressEstimate::new(page(2), ProgressPercent::clamped(10.9))
        ));
        assert!(estimator.is_significant(
            Some(base),
            ProgressEstimate::new(page(2), ProgressPercent::clamped(11.5))
        ));
        assert!(estimator.is_significant(
            Some(base),
            ProgressEstimate::new(page(3), ProgressPercent::clamped(10.2))
        ));
    }

    #[test]
    fn measured_pages_sort_and_drop_non_finite() {
        let geometry = MeasuredPages::new(vec![2000.0, f64::NAN, 0.0, 1000.0], 500.0);
        assert_eq!(geometry.page_offsets().as_ref(), &[0.0, 1000.0, 2000.0]);
        assert_eq!(geometry.content_height(), 2000.0);
    }
}
