//! Layout accumulator: absolute reading-space boxes for every spine item.
//!
//! Every pass walks the spine in order with a running cursor, asks the
//! renderer to measure each item under spread constraints and records the
//! resulting box. Passes are wholesale: the previous snapshot is replaced,
//! never patched.

use serde::Serialize;

use crate::geometry::{LayoutBox, Size};
use crate::renderer::{BlankPagePosition, ItemRenderer, LayoutConstraints, SpreadPosition};
use crate::settings::ReaderSettings;
use crate::spine::{LayoutMode, PageSpread, SpineItem, SpineItemRegistry};

const EDGE_EPSILON: f64 = 1e-6;

/// Laid-out state of one spine item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemLayout {
    pub index: usize,
    pub layout_box: LayoutBox,
    pub layout: LayoutMode,
    pub vertical_writing: bool,
    pub blank_page: BlankPagePosition,
}

/// Immutable result of one layout pass.
///
/// Locator and resolver only ever read a snapshot; a new pass produces a new
/// one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutSnapshot {
    settings: ReaderSettings,
    items: Vec<ItemLayout>,
}

impl LayoutSnapshot {
    /// Build a snapshot from precomputed boxes.
    pub fn new(settings: ReaderSettings, items: Vec<ItemLayout>) -> Self {
        Self { settings, items }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn items(&self) -> &[ItemLayout] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&ItemLayout> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of pages in an item.
    ///
    /// `ceil(extent / page_extent)` along the paging axis, at least one.
    /// Pre-paginated items of a pre-paginated book are always one page.
    pub fn page_count(&self, item: &ItemLayout) -> usize {
        if self.settings.pre_paginated_book && item.layout == LayoutMode::PrePaginated {
            return 1;
        }
        let page = self.settings.page_size();
        let (extent, page_extent) = if self.pages_along_y(item) {
            (item.layout_box.height, page.height)
        } else {
            (item.layout_box.width, page.width)
        };
        if page_extent <= 0.0 || extent <= 0.0 {
            return 1;
        }
        // Absorb float noise so 100.0000001 / 50 does not open a third page.
        let ratio = extent / page_extent;
        let pages = if (ratio - ratio.round()).abs() < EDGE_EPSILON {
            ratio.round()
        } else {
            ratio.ceil()
        };
        (pages as usize).max(1)
    }

    /// Pages stack vertically for vertical writing or vertical page turns.
    pub fn pages_along_y(&self, item: &ItemLayout) -> bool {
        item.vertical_writing || self.settings.is_vertical()
    }
}

/// Outcome of a layout pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutOutcome {
    /// Box list differs in length or any field from the previous pass.
    pub has_changed: bool,
}

/// Owner of the current layout snapshot.
#[derive(Clone, Debug, Default)]
pub struct SpineLayout {
    snapshot: LayoutSnapshot,
    passes: u64,
}

impl SpineLayout {
    pub fn new(settings: ReaderSettings) -> Self {
        Self {
            snapshot: LayoutSnapshot::new(settings, Vec::new()),
            passes: 0,
        }
    }

    pub fn snapshot(&self) -> &LayoutSnapshot {
        &self.snapshot
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Recompute every box. Never fails: an item the renderer cannot measure
    /// keeps its last known size, or zero size if it was never measured.
    pub fn layout(
        &mut self,
        registry: &mut SpineItemRegistry,
        settings: &ReaderSettings,
        renderer: &mut dyn ItemRenderer,
    ) -> LayoutOutcome {
        let page = settings.page_size();
        let viewport = settings.viewport;
        let spread = settings.is_using_spread();
        let rtl = settings.is_rtl();
        let vertical = settings.is_vertical();
        let count = registry.len();

        let mut items: Vec<ItemLayout> = Vec::with_capacity(count);
        let mut horizontal_offset = 0.0f64;
        let mut vertical_offset = 0.0f64;
        let mut row_top = 0.0f64;

        for index in 0..count {
            let Some(item) = registry.get(index).cloned() else {
                break;
            };
            let is_last = index + 1 == count;
            let starts_new_screen = is_on_screen_edge(horizontal_offset, viewport.width);
            let plan = plan_item(&item, settings, starts_new_screen, is_last, page.width);

            let constraints = LayoutConstraints {
                minimum_width: plan.minimum_width,
                blank_page: plan.blank_page,
                page_size: page,
                spread_position: spread_position(spread, rtl, starts_new_screen, plan.blank_page),
            };

            let (size, vertical_writing) = match renderer.measure(&item, &constraints) {
                Ok(measurement) => {
                    let realized = measurement.size.sanitized();
                    let size = Size::new(realized.width.max(plan.minimum_width), realized.height);
                    registry.set_measurement(index, size, measurement.vertical_writing);
                    (size, measurement.vertical_writing)
                }
                Err(err) => {
                    log::warn!(
                        "measure failed for spine item {} ({}): {}; keeping last known size",
                        index,
                        item.id,
                        err
                    );
                    (item.known_size(), item.vertical_writing)
                }
            };

            let layout_box = if vertical {
                let (x, top) = if starts_new_screen {
                    row_top = vertical_offset;
                    (0.0, vertical_offset)
                } else {
                    (horizontal_offset, row_top)
                };
                let left = if rtl { viewport.width - x - size.width } else { x };
                horizontal_offset = x + size.width;
                vertical_offset = vertical_offset.max(top + size.height);
                LayoutBox::from_origin(left, top, size)
            } else {
                let left = if rtl {
                    viewport.width - horizontal_offset - size.width
                } else {
                    horizontal_offset
                };
                horizontal_offset += size.width;
                LayoutBox::from_origin(left, 0.0, size)
            };

            log::trace!(
                "spine item {} laid out at ({}, {}) size {}x{} blank={:?}",
                index,
                layout_box.left,
                layout_box.top,
                layout_box.width,
                layout_box.height,
                plan.blank_page
            );

            items.push(ItemLayout {
                index,
                layout_box,
                layout: item.layout,
                vertical_writing,
                blank_page: plan.blank_page,
            });
        }

        let has_changed = boxes_differ(&self.snapshot.items, &items);
        self.snapshot = LayoutSnapshot::new(*settings, items);
        self.passes = self.passes.saturating_add(1);
        log::debug!(
            "layout pass {} over {} items (changed={})",
            self.passes,
            count,
            has_changed
        );
        LayoutOutcome { has_changed }
    }
}

struct ItemPlan {
    minimum_width: f64,
    blank_page: BlankPagePosition,
}

fn plan_item(
    item: &SpineItem,
    settings: &ReaderSettings,
    starts_new_screen: bool,
    is_last: bool,
    page_width: f64,
) -> ItemPlan {
    let mut plan = ItemPlan {
        minimum_width: page_width,
        blank_page: BlankPagePosition::None,
    };
    if !settings.is_using_spread() {
        return plan;
    }

    let rtl = settings.is_rtl();
    let pre_paginated_book = settings.pre_paginated_book;
    let full_spread = page_width * 2.0;

    // Two reflowable items never share one screen.
    if !pre_paginated_book && item.is_reflowable() && (!is_last || starts_new_screen) {
        plan.minimum_width = full_spread;
    }

    let wants_second_page = match item.page_spread {
        Some(PageSpread::Right) => !rtl,
        Some(PageSpread::Left) => rtl,
        Some(PageSpread::Center) | None => false,
    };
    if starts_new_screen && wants_second_page {
        plan.blank_page = BlankPagePosition::Before;
        plan.minimum_width = full_spread;
    } else if starts_new_screen && is_last && pre_paginated_book {
        plan.blank_page = if rtl {
            BlankPagePosition::Before
        } else {
            BlankPagePosition::After
        };
        plan.minimum_width = full_spread;
    }
    plan
}

fn spread_position(
    spread: bool,
    rtl: bool,
    starts_new_screen: bool,
    blank_page: BlankPagePosition,
) -> SpreadPosition {
    if !spread {
        return SpreadPosition::None;
    }
    let first_side = starts_new_screen && blank_page != BlankPagePosition::Before;
    match (first_side, rtl) {
        (true, false) | (false, true) => SpreadPosition::Left,
        (true, true) | (false, false) => SpreadPosition::Right,
    }
}

fn is_on_screen_edge(offset: f64, screen: f64) -> bool {
    if screen <= 0.0 {
        return true;
    }
    let remainder = (offset % screen).abs();
    remainder < EDGE_EPSILON || (screen - remainder) < EDGE_EPSILON
}

fn boxes_differ(previous: &[ItemLayout], next: &[ItemLayout]) -> bool {
    previous.len() != next.len()
        || previous
            .iter()
            .zip(next)
            .any(|(a, b)| a.layout_box != b.layout_box)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::Cfi;
    use crate::renderer::{Lookup, Measurement, RenderError};
    use crate::spine::{Manifest, ManifestItem};

    /// Reports fixed content widths; `None` fails the measure call.
    struct FixedWidths {
        widths: Vec<Option<f64>>,
        height: f64,
        seen: Vec<LayoutConstraints>,
    }

    impl ItemRenderer for FixedWidths {
        fn measure(
            &mut self,
            item: &SpineItem,
            constraints: &LayoutConstraints,
        ) -> Result<Measurement, RenderError> {
            self.seen.push(*constraints);
            match self.widths.get(item.index).copied().flatten() {
                Some(width) => Ok(Measurement::new(width, self.height)),
                None => Err(RenderError::NotLoaded),
            }
        }

        fn resolve_cfi_offset(&self, _item: &SpineItem, _cfi: &Cfi) -> Lookup<f64> {
            Lookup::NotFound
        }

        fn element_offset_for_fragment(&self, _item: &SpineItem, _fragment: &str) -> Lookup<f64> {
            Lookup::NotFound
        }
    }

    fn registry(items: Vec<ManifestItem>) -> SpineItemRegistry {
        SpineItemRegistry::from_manifest(&Manifest::new(items)).expect("registry")
    }

    fn reflowable(count: usize) -> SpineItemRegistry {
        registry(
            (0..count)
                .map(|idx| ManifestItem::new(format!("c{idx}"), format!("c{idx}.xhtml")))
                .collect(),
        )
    }

    fn lefts(layout: &SpineLayout) -> Vec<f64> {
        layout
            .snapshot()
            .items()
            .iter()
            .map(|item| item.layout_box.left)
            .collect()
    }

    #[test]
    fn ltr_boxes_are_contiguous() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0);
        let mut registry = reflowable(3);
        let mut renderer = FixedWidths {
            widths: vec![Some(200.0), Some(100.0), Some(300.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        let outcome = layout.layout(&mut registry, &settings, &mut renderer);
        assert!(outcome.has_changed);
        let items = layout.snapshot().items();
        assert_eq!(lefts(&layout), vec![0.0, 200.0, 300.0]);
        for pair in items.windows(2) {
            assert_eq!(pair[0].layout_box.right, pair[1].layout_box.left);
        }
        assert_eq!(layout.snapshot().page_count(&items[2]), 3);
        assert_eq!(registry.get(2).and_then(|item| item.measured), Some(Size::new(300.0, 100.0)));
    }

    #[test]
    fn unchanged_pass_reports_no_change() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0);
        let mut registry = reflowable(2);
        let mut renderer = FixedWidths {
            widths: vec![Some(100.0), Some(100.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        assert!(layout.layout(&mut registry, &settings, &mut renderer).has_changed);
        assert!(!layout.layout(&mut registry, &settings, &mut renderer).has_changed);
        renderer.widths[1] = Some(200.0);
        assert!(layout.layout(&mut registry, &settings, &mut renderer).has_changed);
        assert_eq!(layout.passes(), 3);
    }

    #[test]
    fn rtl_boxes_grow_negative_and_stay_ordered() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0)
            .with_reading_direction(crate::settings::ReadingDirection::Rtl);
        let mut registry = reflowable(2);
        let mut renderer = FixedWidths {
            widths: vec![Some(100.0), Some(200.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        let items = layout.snapshot().items();
        assert_eq!(items[0].layout_box.left, 0.0);
        assert_eq!(items[0].layout_box.right, 100.0);
        assert_eq!(items[1].layout_box.left, -200.0);
        assert_eq!(items[1].layout_box.right, 0.0);
        for item in items {
            assert!(item.layout_box.left <= item.layout_box.right);
        }
    }

    #[test]
    fn spread_reserves_full_screen_for_reflowable_items() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0).with_spread(true);
        let mut registry = reflowable(3);
        let mut renderer = FixedWidths {
            widths: vec![Some(50.0), Some(50.0), Some(50.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        let widths: Vec<f64> = layout
            .snapshot()
            .items()
            .iter()
            .map(|item| item.layout_box.width)
            .collect();
        // The last item also starts a new screen, so it reserves a spread too.
        assert_eq!(widths, vec![100.0, 100.0, 100.0]);
        assert_eq!(renderer.seen[0].minimum_width, 100.0);
        assert_eq!(renderer.seen[0].spread_position, SpreadPosition::Left);
    }

    #[test]
    fn right_spread_item_gets_blank_page_before() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0)
            .with_spread(true)
            .with_pre_paginated_book(true);
        let mut registry = registry(vec![
            ManifestItem::new("p0", "p0.xhtml")
                .with_layout(LayoutMode::PrePaginated)
                .with_page_spread(PageSpread::Right),
            ManifestItem::new("p1", "p1.xhtml").with_layout(LayoutMode::PrePaginated),
            ManifestItem::new("p2", "p2.xhtml").with_layout(LayoutMode::PrePaginated),
        ]);
        let mut renderer = FixedWidths {
            widths: vec![Some(50.0), Some(50.0), Some(50.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        let items = layout.snapshot().items();
        assert_eq!(items[0].blank_page, BlankPagePosition::Before);
        assert_eq!(items[0].layout_box.width, 100.0);
        assert_eq!(renderer.seen[0].spread_position, SpreadPosition::Right);
        // p1 starts a screen on the left page, p2 fills the right page.
        assert_eq!(lefts(&layout), vec![0.0, 100.0, 150.0]);
        assert_eq!(items[2].blank_page, BlankPagePosition::None);
        assert_eq!(layout.snapshot().page_count(&items[0]), 1);
    }

    #[test]
    fn trailing_pre_paginated_item_gets_blank_page_after() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0)
            .with_spread(true)
            .with_pre_paginated_book(true);
        let mut registry = registry(vec![
            ManifestItem::new("p0", "p0.xhtml").with_layout(LayoutMode::PrePaginated),
            ManifestItem::new("p1", "p1.xhtml").with_layout(LayoutMode::PrePaginated),
            ManifestItem::new("p2", "p2.xhtml").with_layout(LayoutMode::PrePaginated),
        ]);
        let mut renderer = FixedWidths {
            widths: vec![Some(50.0), Some(50.0), Some(50.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        let items = layout.snapshot().items();
        assert_eq!(items[2].blank_page, BlankPagePosition::After);
        assert_eq!(items[2].layout_box.width, 100.0);
        assert_eq!(items[2].layout_box.left, 100.0);
    }

    #[test]
    fn failed_measure_keeps_last_known_size() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0);
        let mut registry = reflowable(3);
        let mut renderer = FixedWidths {
            widths: vec![Some(100.0), None, Some(100.0)],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        // Never measured: zero size, neighbours stay contiguous.
        assert_eq!(lefts(&layout), vec![0.0, 100.0, 100.0]);
        assert_eq!(layout.snapshot().items()[1].layout_box.width, 0.0);

        renderer.widths[1] = Some(300.0);
        layout.layout(&mut registry, &settings, &mut renderer);
        renderer.widths[1] = None;
        let outcome = layout.layout(&mut registry, &settings, &mut renderer);
        assert!(!outcome.has_changed);
        assert_eq!(layout.snapshot().items()[1].layout_box.width, 300.0);
    }

    #[test]
    fn vertical_spread_places_pages_side_by_side() {
        let settings = ReaderSettings::for_viewport(100.0, 100.0)
            .with_spread(true)
            .with_pre_paginated_book(true)
            .with_page_turn_direction(crate::settings::PageTurnDirection::Vertical);
        let mut registry = registry(
            (0..4)
                .map(|idx| {
                    ManifestItem::new(format!("p{idx}"), format!("p{idx}.xhtml"))
                        .with_layout(LayoutMode::PrePaginated)
                })
                .collect(),
        );
        let mut renderer = FixedWidths {
            widths: vec![Some(50.0); 4],
            height: 100.0,
            seen: Vec::new(),
        };
        let mut layout = SpineLayout::new(settings);
        layout.layout(&mut registry, &settings, &mut renderer);
        let origins: Vec<(f64, f64)> = layout
            .snapshot()
            .items()
            .iter()
            .map(|item| (item.layout_box.left, item.layout_box.top))
            .collect();
        // Item 3 shares the second row with item 2.
        assert_eq!(
            origins,
            vec![(0.0, 0.0), (50.0, 0.0), (0.0, 100.0), (50.0, 100.0)]
        );
    }
}
