//! Visible window arithmetic for prefetch and eviction.
//!
//! Everything here is a pure function of an immutable window snapshot.

/// Contiguous range of page indices currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleWindow {
    first: u32,
    last: u32,
}

impl VisibleWindow {
    /// Window spanning `first..=last`. Bounds are swapped if given in reverse.
    pub fn new(first: u32, last: u32) -> Self {
        Self {
            first: first.min(last),
            last: first.max(last),
        }
    }

    /// Window covering `[min, max]` of the visible indices, or `None` when nothing is visible.
    pub fn from_visible(indices: impl IntoIterator<Item = u32>) -> Option<Self> {
        let mut iter = indices.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), i| (lo.min(i), hi.max(i)));
        Some(Self::new(min, max))
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn contains(&self, index: u32) -> bool {
        (self.first..=self.last).contains(&index)
    }

    /// 0 inside the window, otherwise the gap to the nearest boundary.
    pub fn distance(&self, index: u32) -> u32 {
        if index < self.first {
            self.first - index
        } else if index > self.last {
            index - self.last
        } else {
            0
        }
    }
}

/// Whether a page is close enough to the window to be rendered.
pub fn should_retain(index: u32, window: &VisibleWindow, prefetch_radius: u32) -> bool {
    window.distance(index) <= prefetch_radius
}

/// Whether a rendered page is far enough from the window to be released.
///
/// A page exactly `eviction_distance` away is kept.
pub fn should_evict(index: u32, window: &VisibleWindow, eviction_distance: u32) -> bool {
    window.distance(index) > eviction_distance
}

/// Pages to render, nearest to the window first.
///
/// Visible pages come first in index order, then each ring outward. Within a ring the page
/// after the window precedes the page before it. Indices are clamped to `1..=page_count`.
pub fn retain_order(window: &VisibleWindow, prefetch_radius: u32, page_count: u32) -> Vec<u32> {
    if page_count == 0 || window.first > page_count {
        return Vec::new();
    }
    let first = window.first.max(1);
    let last = window.last.min(page_count);

    let mut order: Vec<u32> = (first..=last).collect();
    for ring in 1..=prefetch_radius {
        let after = last.checked_add(ring).filter(|&i| i <= page_count);
        let before = first.checked_sub(ring).filter(|&i| i >= 1);
        if after.is_none() && before.is_none() {
            break;
        }
        order.extend(after);
        order.extend(before);
    }
    order
}

/// Pages beyond `eviction_distance` of the window, in index order.
pub fn evict_candidates(
    window: &VisibleWindow,
    eviction_distance: u32,
    page_count: u32,
) -> impl Iterator<Item = u32> {
    let below_end = window.first.saturating_sub(eviction_distance);
    let above_start = window
        .last
        .saturating_add(eviction_distance)
        .saturating_add(1);
    (1..below_end).chain(above_start..=page_count)
}
