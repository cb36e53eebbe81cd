//! Recompute the current record after a layout pass changed item boxes.
//!
//! Restoration never fails: every case it cannot resolve lands on the item
//! origin.

use crate::cfi;
use crate::geometry::{LayoutBox, SafePosition, Size, SpineItemPosition, UnsafePosition};
use crate::locator::Locator;
use crate::renderer::{Animation, ItemRenderer, Lookup};
use crate::resolver::{ResolvedTarget, Resolver};
use crate::settings::PageTurnMode;

use super::record::{
    ItemSnapshot, NavigationDirection, NavigationId, NavigationMeta, NavigationRecord,
    TriggeredBy,
};

const EPSILON: f64 = 1e-6;

/// Restored copy of `record` against the current layout.
pub fn restore(
    record: &NavigationRecord,
    id: NavigationId,
    resolver: &Resolver<'_>,
    renderer: &dyn ItemRenderer,
) -> NavigationRecord {
    let target = restored_target(record, resolver, renderer);
    let locator = resolver.locator();
    let snapshot = locator
        .item(target.spine_item)
        .map(|item| ItemSnapshot::from(&item.layout_box));
    log::debug!(
        "restored record {:?} from ({}, {}) to ({}, {}) in item {}",
        record.id,
        record.position.x(),
        record.position.y(),
        target.position.x(),
        target.position.y(),
        target.spine_item
    );
    NavigationRecord {
        id,
        position: target.position,
        spine_item: target.spine_item,
        url: record.url.clone(),
        cfi: record.cfi.clone(),
        animation: Animation::None,
        kind: record.kind,
        meta: NavigationMeta {
            triggered_by: TriggeredBy::Restoration,
        },
        direction: record.direction,
        position_in_spine_item: local_position(&locator, target.position, target.spine_item),
        spine_item_width: snapshot.map(|s| s.width),
        spine_item_height: snapshot.map(|s| s.height),
        spine_item_top: snapshot.map(|s| s.top),
        spine_item_left: snapshot.map(|s| s.left),
    }
}

/// Position and item `record` should move to, by page-turn mode.
pub fn restored_target(
    record: &NavigationRecord,
    resolver: &Resolver<'_>,
    renderer: &dyn ItemRenderer,
) -> ResolvedTarget {
    let locator = resolver.locator();
    if locator.item_count() == 0 {
        return ResolvedTarget {
            position: resolver.clamp(UnsafePosition::ORIGIN),
            spine_item: 0,
        };
    }
    let spine_item = record.spine_item.min(locator.item_count() - 1);
    match locator.settings().page_turn_mode {
        PageTurnMode::Controlled => restore_paged(record, spine_item, resolver, renderer),
        PageTurnMode::Scrollable => restore_scroll(record, spine_item, resolver),
    }
}

/// Item-local position of a restored record: the start of the page under
/// the position when paging, the raw offset when scrolling.
pub fn local_position(
    locator: &Locator<'_>,
    position: SafePosition,
    spine_item: usize,
) -> Option<SpineItemPosition> {
    let local = locator.spine_item_position_from(position.to_unsafe(), spine_item)?;
    match locator.settings().page_turn_mode {
        PageTurnMode::Scrollable => Some(local),
        PageTurnMode::Controlled => {
            let page = locator.page_index_of(local, spine_item)?;
            locator.page_position(page, spine_item)
        }
    }
}

fn restore_paged(
    record: &NavigationRecord,
    spine_item: usize,
    resolver: &Resolver<'_>,
    renderer: &dyn ItemRenderer,
) -> ResolvedTarget {
    let locator = resolver.locator();
    let at = |position: SafePosition| ResolvedTarget {
        position,
        spine_item,
    };
    let origin = at(resolver.item_origin(spine_item));
    let Some(item) = locator.item(spine_item) else {
        return origin;
    };
    let current = item.layout_box;
    let along_y = locator.snapshot().pages_along_y(item);
    let snapshot = record.item_snapshot();
    let resized = snapshot
        .map(|old| !same(old.width, current.width) || !same(old.height, current.height))
        .unwrap_or(false);

    if resized {
        if let Some(target) = reanchor_address(record, resolver, renderer) {
            return target;
        }
    }

    if let (Some(old), Some(local)) = (snapshot, record.position_in_spine_item) {
        let old_box = LayoutBox::from_origin(old.left, old.top, Size::new(old.width, old.height));
        let was_within = within(&locator, &old_box, record.position.to_unsafe());
        if was_within && resized && record.direction == NavigationDirection::Backward {
            let local = if along_y {
                SpineItemPosition::new(local.x, local.y + (current.height - old.height))
            } else {
                SpineItemPosition::new(local.x + (current.width - old.width), local.y)
            };
            return at(resolver.for_spine_item_position(local, spine_item));
        }

        let page_size = locator.settings().page_size();
        let (offset, extent) = if along_y {
            (local.y, page_size.height)
        } else {
            (local.x, page_size.width)
        };
        let page = if extent > 0.0 && offset.is_finite() && offset > 0.0 {
            (offset / extent + 1e-9).floor() as usize
        } else {
            0
        };
        return at(resolver.for_item_page(spine_item, page));
    }

    let position = record.position.to_unsafe();
    if locator.is_position_within_item(position, spine_item) {
        return at(resolver.for_position(position));
    }
    origin
}

fn restore_scroll(
    record: &NavigationRecord,
    spine_item: usize,
    resolver: &Resolver<'_>,
) -> ResolvedTarget {
    let locator = resolver.locator();
    let at = |position: SafePosition| ResolvedTarget {
        position,
        spine_item,
    };
    let origin = at(resolver.item_origin(spine_item));
    let (Some(item), Some(old)) = (locator.item(spine_item), record.item_snapshot()) else {
        return origin;
    };
    let current = item.layout_box;
    let position = record.position.to_unsafe();

    if !same(old.top, current.top) {
        let local_y = record
            .position_in_spine_item
            .map(|local| local.y)
            .unwrap_or(position.y - old.top);
        return at(resolver.clamp(UnsafePosition::new(position.x, current.top + local_y)));
    }

    if same(old.height, current.height) {
        return if locator.is_position_within_item(position, spine_item) {
            at(resolver.clamp(position))
        } else {
            origin
        };
    }

    let from_bottom = old.top + old.height - position.y;
    let candidate = UnsafePosition::new(position.x, current.bottom - from_bottom);
    if locator.is_position_within_item(candidate, spine_item) {
        return at(resolver.clamp(candidate));
    }
    if record.direction == NavigationDirection::Backward {
        let viewport_height = locator.settings().viewport.height;
        let end = (current.bottom - viewport_height).max(current.top);
        return at(resolver.clamp(UnsafePosition::new(position.x, end)));
    }
    origin
}

/// Re-resolve an attached URL or non-root CFI.
fn reanchor_address(
    record: &NavigationRecord,
    resolver: &Resolver<'_>,
    renderer: &dyn ItemRenderer,
) -> Option<ResolvedTarget> {
    let lookup = if let Some(url) = record.url.as_deref() {
        resolver.for_url(url, renderer)
    } else {
        let parsed = record.cfi.as_deref().and_then(cfi::parse_lenient)?;
        if parsed.is_root() {
            return None;
        }
        resolver.for_cfi(&parsed, renderer)
    };
    match lookup {
        Lookup::Found(target) => Some(target),
        Lookup::Pending => {
            log::debug!("address of record {:?} still loading, restoring by geometry", record.id);
            None
        }
        Lookup::NotFound => None,
    }
}

fn within(locator: &Locator<'_>, layout_box: &LayoutBox, position: UnsafePosition) -> bool {
    if locator.settings().is_vertical() {
        layout_box.contains_y(position.y)
    } else {
        layout_box.contains_x(position.x)
    }
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}
