//! Read-only queries over one [`LayoutSnapshot`].
//!
//! Nothing here mutates layout; every query is a function of the snapshot it
//! was built with, so a locator can be rebuilt freely after each pass.

use core::ops::Range;

use serde::Serialize;

use crate::geometry::{
    LayoutBox, SafeBounds, SafePosition, Size, SpineItemPosition, UnsafePosition,
};
use crate::layout::{ItemLayout, LayoutSnapshot};
use crate::settings::ReaderSettings;

/// First and last visible entry (item or page index) in reading order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VisibleRange {
    pub begin: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn single(index: usize) -> Self {
        Self {
            begin: index,
            end: index,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.begin && index <= self.end
    }
}

/// One page of one item.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageRef {
    pub item_index: usize,
    pub page_index: usize,
    pub absolute_page_index: usize,
    pub layout_box: LayoutBox,
}

/// Query layer over a layout snapshot.
#[derive(Clone, Copy, Debug)]
pub struct Locator<'a> {
    snapshot: &'a LayoutSnapshot,
}

impl<'a> Locator<'a> {
    pub fn new(snapshot: &'a LayoutSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &'a LayoutSnapshot {
        self.snapshot
    }

    pub fn settings(&self) -> &'a ReaderSettings {
        self.snapshot.settings()
    }

    pub fn item(&self, index: usize) -> Option<&'a ItemLayout> {
        self.snapshot.item(index)
    }

    pub fn item_count(&self) -> usize {
        self.snapshot.len()
    }

    /// Index of the item under `position` along the active axis.
    ///
    /// Positions outside every box resolve to the nearest item along the
    /// axis, not only the origin: this never returns `None` for a
    /// non-empty book, even far outside it. The origin of an
    /// unmeasured book maps to the first item.
    pub fn item_at(&self, position: UnsafePosition) -> Option<usize> {
        let items = self.snapshot.items();
        let vertical = self.settings().is_vertical();
        let hit = items.iter().find(|item| {
            let layout_box = &item.layout_box;
            if vertical {
                layout_box.contains_y(position.y)
            } else {
                layout_box.contains_x(position.x)
            }
        });
        if let Some(item) = hit {
            return Some(item.index);
        }
        items
            .iter()
            .min_by(|a, b| {
                axis_distance(&a.layout_box, position, vertical)
                    .total_cmp(&axis_distance(&b.layout_box, position, vertical))
            })
            .map(|item| item.index)
    }

    /// Viewport box at `position`.
    pub fn viewport_box(&self, position: UnsafePosition) -> LayoutBox {
        LayoutBox::from_origin(position.x, position.y, self.settings().viewport)
    }

    /// Items visible from `position`.
    ///
    /// An item counts as visible when it covers more than `threshold` of its
    /// own extent on both axes, or more than `threshold` of the viewport on
    /// both axes. `restrict_to_screen` keeps only the viewport test. When no
    /// item passes, the item under the position is returned as both ends.
    pub fn visible_items_from(
        &self,
        position: UnsafePosition,
        threshold: f64,
        restrict_to_screen: bool,
    ) -> Option<VisibleRange> {
        let viewport = self.viewport_box(position);
        let visible = self
            .snapshot
            .items()
            .iter()
            .filter(|item| is_visible(&item.layout_box, &viewport, threshold, restrict_to_screen))
            .map(|item| item.index);
        collect_range(visible).or_else(|| self.item_at(position).map(VisibleRange::single))
    }

    /// Pages of `item_index` visible from `position`, same rules as
    /// [`Locator::visible_items_from`].
    pub fn visible_pages_from(
        &self,
        position: UnsafePosition,
        item_index: usize,
        threshold: f64,
        restrict_to_screen: bool,
    ) -> Option<VisibleRange> {
        let item = self.item(item_index)?;
        let viewport = self.viewport_box(position);
        let visible = (0..self.snapshot.page_count(item)).filter(|page| {
            let page_box = self.page_box(item, *page);
            is_visible(&page_box, &viewport, threshold, restrict_to_screen)
        });
        collect_range(visible).or_else(|| {
            let local = self.spine_item_position_from(position, item_index)?;
            self.page_index_of(local, item_index).map(VisibleRange::single)
        })
    }

    /// Translate a reading-space position into `item_index`'s local space.
    pub fn spine_item_position_from(
        &self,
        position: UnsafePosition,
        item_index: usize,
    ) -> Option<SpineItemPosition> {
        let layout_box = self.item(item_index)?.layout_box;
        let x = if self.settings().is_rtl() {
            layout_box.right - (position.x + self.settings().viewport.width)
        } else {
            position.x - layout_box.left
        };
        Some(SpineItemPosition::new(x, position.y - layout_box.top))
    }

    /// Inverse of [`Locator::spine_item_position_from`].
    pub fn position_from_spine_item(
        &self,
        local: SpineItemPosition,
        item_index: usize,
    ) -> Option<UnsafePosition> {
        let layout_box = self.item(item_index)?.layout_box;
        let x = if self.settings().is_rtl() {
            layout_box.right - self.settings().viewport.width - local.x
        } else {
            layout_box.left + local.x
        };
        Some(UnsafePosition::new(x, layout_box.top + local.y))
    }

    pub fn page_count(&self, item_index: usize) -> usize {
        self.item(item_index)
            .map(|item| self.snapshot.page_count(item))
            .unwrap_or(0)
    }

    /// Page containing an item-local position, clamped to the item's pages.
    pub fn page_index_of(&self, local: SpineItemPosition, item_index: usize) -> Option<usize> {
        let item = self.item(item_index)?;
        Some(self.page_index_with(item, local, f64::floor))
    }

    /// Page whose start is closest to an item-local position.
    pub fn nearest_page_index(&self, local: SpineItemPosition, item_index: usize) -> Option<usize> {
        let item = self.item(item_index)?;
        Some(self.page_index_with(item, local, f64::round))
    }

    /// Item-local start of a page. Out of range pages clamp.
    pub fn page_position(&self, page_index: usize, item_index: usize) -> Option<SpineItemPosition> {
        let item = self.item(item_index)?;
        let page = page_index.min(self.snapshot.page_count(item).saturating_sub(1));
        if page == 0 {
            return Some(SpineItemPosition::ORIGIN);
        }
        let page_size = self.settings().page_size();
        let offset = page as f64;
        Some(if self.snapshot.pages_along_y(item) {
            SpineItemPosition::new(0.0, offset * page_size.height)
        } else {
            SpineItemPosition::new(offset * page_size.width, 0.0)
        })
    }

    pub fn total_pages(&self) -> usize {
        self.snapshot
            .items()
            .iter()
            .map(|item| self.snapshot.page_count(item))
            .sum()
    }

    /// Absolute page index of `(item, page)`, counting every page of every
    /// earlier item.
    pub fn absolute_page_index(&self, item_index: usize, page_index: usize) -> Option<usize> {
        let item = self.item(item_index)?;
        let before: usize = self.snapshot.items()[..item_index]
            .iter()
            .map(|item| self.snapshot.page_count(item))
            .sum();
        let page = page_index.min(self.snapshot.page_count(item).saturating_sub(1));
        Some(before + page)
    }

    pub fn page_for_absolute_index(&self, absolute_page_index: usize) -> Option<PageRef> {
        let mut first = 0usize;
        for item in self.snapshot.items() {
            let count = self.snapshot.page_count(item);
            if absolute_page_index < first + count {
                let page_index = absolute_page_index - first;
                return Some(PageRef {
                    item_index: item.index,
                    page_index,
                    absolute_page_index,
                    layout_box: self.page_box(item, page_index),
                });
            }
            first += count;
        }
        None
    }

    pub fn page_ref(&self, item_index: usize, page_index: usize) -> Option<PageRef> {
        let item = self.item(item_index)?;
        let page_index = page_index.min(self.snapshot.page_count(item).saturating_sub(1));
        Some(PageRef {
            item_index,
            page_index,
            absolute_page_index: self.absolute_page_index(item_index, page_index)?,
            layout_box: self.page_box(item, page_index),
        })
    }

    /// Page under `position`.
    pub fn page_at(&self, position: UnsafePosition) -> Option<PageRef> {
        let item_index = self.item_at(position)?;
        let local = self.spine_item_position_from(position, item_index)?;
        let page_index = self.page_index_of(local, item_index)?;
        self.page_ref(item_index, page_index)
    }

    pub fn is_position_within_item(&self, position: UnsafePosition, item_index: usize) -> bool {
        let Some(item) = self.item(item_index) else {
            return false;
        };
        if self.settings().is_vertical() {
            item.layout_box.contains_y(position.y)
        } else {
            item.layout_box.contains_x(position.x)
        }
    }

    /// Items to keep loaded: the visible range widened by `radius` on both
    /// sides.
    pub fn preload_window(&self, position: UnsafePosition, radius: usize) -> Range<usize> {
        let threshold = self.settings().visibility_threshold;
        let Some(visible) = self.visible_items_from(position, threshold, false) else {
            return 0..0;
        };
        let start = visible.begin.saturating_sub(radius);
        let end = visible
            .end
            .saturating_add(radius)
            .saturating_add(1)
            .min(self.item_count());
        start..end
    }

    /// Range a viewport position may take for the current layout.
    pub fn safe_bounds(&self) -> SafeBounds {
        let items = self.snapshot.items();
        if items.is_empty() {
            return SafeBounds::default();
        }
        let settings = self.settings();
        let viewport = settings.viewport;
        let page = settings.page_size();
        let max_bottom = items
            .iter()
            .map(|item| item.layout_box.bottom)
            .fold(0.0f64, f64::max);
        let max_y = (max_bottom - page.height).max(0.0);
        let (min_x, max_x) = if settings.is_rtl() {
            let min_left = items
                .iter()
                .map(|item| item.layout_box.left)
                .fold(0.0f64, f64::min);
            (min_left.min(0.0), 0.0)
        } else {
            let max_right = items
                .iter()
                .map(|item| item.layout_box.right)
                .fold(0.0f64, f64::max);
            (0.0, (max_right - viewport.width).max(0.0))
        };
        SafeBounds {
            min_x,
            max_x,
            min_y: 0.0,
            max_y,
        }
    }

    pub fn clamp(&self, position: UnsafePosition) -> SafePosition {
        self.safe_bounds().clamp(position)
    }

    /// Reading-space box of one page.
    pub fn page_box(&self, item: &ItemLayout, page_index: usize) -> LayoutBox {
        let layout_box = item.layout_box;
        let count = self.snapshot.page_count(item);
        if count <= 1 {
            return layout_box;
        }
        let page = self.settings().page_size();
        let offset = page_index.min(count - 1) as f64;
        if self.snapshot.pages_along_y(item) {
            let top = layout_box.top + offset * page.height;
            let height = page.height.min(layout_box.bottom - top).max(0.0);
            LayoutBox::from_origin(
                layout_box.left,
                top,
                Size::new(layout_box.width, height),
            )
        } else if self.settings().is_rtl() {
            let right = layout_box.right - offset * page.width;
            let left = (right - page.width).max(layout_box.left);
            LayoutBox::from_origin(
                left,
                layout_box.top,
                Size::new(right - left, layout_box.height),
            )
        } else {
            let left = layout_box.left + offset * page.width;
            let width = page.width.min(layout_box.right - left).max(0.0);
            LayoutBox::from_origin(
                left,
                layout_box.top,
                Size::new(width, layout_box.height),
            )
        }
    }

    fn page_index_with(
        &self,
        item: &ItemLayout,
        local: SpineItemPosition,
        rounding: fn(f64) -> f64,
    ) -> usize {
        let count = self.snapshot.page_count(item);
        if count <= 1 {
            return 0;
        }
        let page = self.settings().page_size();
        let (offset, extent) = if self.snapshot.pages_along_y(item) {
            (local.y, page.height)
        } else {
            (local.x, page.width)
        };
        if !offset.is_finite() || extent <= 0.0 || offset <= 0.0 {
            return 0;
        }
        let raw = rounding(offset / extent + 1e-9);
        (raw as usize).min(count - 1)
    }
}

fn is_visible(
    target: &LayoutBox,
    viewport: &LayoutBox,
    threshold: f64,
    restrict_to_screen: bool,
) -> bool {
    let (horizontal, vertical) = target.overlap(viewport);
    if horizontal <= 0.0 || vertical <= 0.0 {
        return false;
    }
    let passes = |overlap: (f64, f64), extent: (f64, f64)| {
        extent.0 > 0.0
            && extent.1 > 0.0
            && overlap.0 / extent.0 > threshold
            && overlap.1 / extent.1 > threshold
    };
    let screen = passes((horizontal, vertical), (viewport.width, viewport.height));
    if restrict_to_screen {
        return screen;
    }
    screen || passes((horizontal, vertical), (target.width, target.height))
}

fn collect_range(mut indices: impl Iterator<Item = usize>) -> Option<VisibleRange> {
    let first = indices.next()?;
    let last = indices.last().unwrap_or(first);
    Some(VisibleRange {
        begin: first,
        end: last,
    })
}

fn axis_distance(layout_box: &LayoutBox, position: UnsafePosition, vertical: bool) -> f64 {
    let (value, start, end) = if vertical {
        (position.y, layout_box.top, layout_box.bottom)
    } else {
        (position.x, layout_box.left, layout_box.right)
    };
    if value < start {
        start - value
    } else if value >= end {
        value - end
    } else {
        0.0
    }
}
