//! Navigation resolver: raw targets to clamped, spread-adjusted positions.
//!
//! Stateless. A resolver borrows the current layout snapshot (through a
//! [`Locator`]) and the item registry; renderer lookups are passed in per
//! call because they may report that content is still loading.

use serde::Serialize;

use crate::cfi::Cfi;
use crate::geometry::{SafePosition, SpineItemPosition, UnsafePosition};
use crate::locator::{Locator, PageRef};
use crate::renderer::{ItemRenderer, Lookup};
use crate::settings::PageTurnMode;
use crate::spine::{split_href_fragment, SpineItemRegistry, SpineItemTarget};

const EDGE_EPSILON: f64 = 1e-6;

/// Position and owning item of a resolved target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResolvedTarget {
    pub position: SafePosition,
    pub spine_item: usize,
}

/// One page step in reading order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// Physical side of a page turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnSide {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug)]
pub struct Resolver<'a> {
    locator: Locator<'a>,
    registry: &'a SpineItemRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(locator: Locator<'a>, registry: &'a SpineItemRegistry) -> Self {
        Self { locator, registry }
    }

    pub fn locator(&self) -> Locator<'a> {
        self.locator
    }

    /// Origin of an item. Index targets clamp; unknown ids fall back to the
    /// book origin.
    pub fn for_spine_item(&self, target: &SpineItemTarget) -> SafePosition {
        match self.registry.resolve(target) {
            Some(index) => self.item_origin(index),
            None => {
                log::debug!("unknown spine item target {:?}", target);
                self.clamp(UnsafePosition::ORIGIN)
            }
        }
    }

    /// Index of an item target; see [`SpineItemRegistry::resolve`].
    pub fn resolve_spine_item(&self, target: &SpineItemTarget) -> Option<usize> {
        self.registry.resolve(target)
    }

    /// Spread-adjusted, clamped origin of an item.
    pub fn item_origin(&self, item_index: usize) -> SafePosition {
        self.for_item_page(item_index, 0)
    }

    /// Position of a page; page and item indices clamp.
    pub fn for_item_page(&self, item_index: usize, page_index: usize) -> SafePosition {
        let item_index = item_index.min(self.locator.item_count().saturating_sub(1));
        let position = self
            .locator
            .page_position(page_index, item_index)
            .and_then(|local| self.locator.position_from_spine_item(local, item_index))
            .unwrap_or(UnsafePosition::ORIGIN);
        self.clamp(self.spread_adjust(position))
    }

    /// Position of the page containing an item-local position.
    pub fn for_spine_item_position(
        &self,
        local: SpineItemPosition,
        item_index: usize,
    ) -> SafePosition {
        let page = self.locator.page_index_of(local, item_index).unwrap_or(0);
        self.for_item_page(item_index, page)
    }

    /// Resolve a CFI.
    ///
    /// Root addresses land on the item origin. Other addresses ask the
    /// renderer for the node offset and fall back to the private offset hint.
    pub fn for_cfi(&self, cfi: &Cfi, renderer: &dyn ItemRenderer) -> Lookup<ResolvedTarget> {
        let Some(item_index) = self.item_for_cfi(cfi) else {
            log::debug!("cfi {} names no spine item of this book", cfi);
            return Lookup::NotFound;
        };
        let origin = ResolvedTarget {
            position: self.item_origin(item_index),
            spine_item: item_index,
        };
        if cfi.is_root() {
            return Lookup::Found(origin);
        }
        let Some(item) = self.registry.get(item_index) else {
            return Lookup::Found(origin);
        };
        let offset = match renderer.resolve_cfi_offset(item, cfi) {
            Lookup::Found(offset) => Some(offset),
            Lookup::Pending => return Lookup::Pending,
            Lookup::NotFound => cfi.offset_hint(),
        };
        Lookup::Found(match offset {
            Some(offset) => self.target_for_offset(offset, item_index),
            None => origin,
        })
    }

    /// Resolve a URL (`href#fragment`) against item hrefs.
    pub fn for_url(&self, url: &str, renderer: &dyn ItemRenderer) -> Lookup<ResolvedTarget> {
        let Some(item_index) = self.registry.find_by_href(url) else {
            log::debug!("url {:?} matches no spine item", url);
            return Lookup::NotFound;
        };
        let origin = ResolvedTarget {
            position: self.item_origin(item_index),
            spine_item: item_index,
        };
        let (_, fragment) = split_href_fragment(url);
        let (Some(fragment), Some(item)) = (fragment, self.registry.get(item_index)) else {
            return Lookup::Found(origin);
        };
        match renderer.element_offset_for_fragment(item, fragment) {
            Lookup::Found(offset) => Lookup::Found(self.target_for_offset(offset, item_index)),
            Lookup::Pending => Lookup::Pending,
            Lookup::NotFound => Lookup::Found(origin),
        }
    }

    /// Snap an arbitrary position to the nearest page in paged mode; clamp
    /// only when scrolling.
    pub fn for_position(&self, position: UnsafePosition) -> SafePosition {
        let settings = self.locator.settings();
        if settings.page_turn_mode == PageTurnMode::Scrollable {
            return self.clamp(position);
        }
        let clamped = self.clamp(position).to_unsafe();
        let Some(item_index) = self.locator.item_at(clamped) else {
            return self.clamp(position);
        };
        let page = self
            .locator
            .spine_item_position_from(clamped, item_index)
            .and_then(|local| self.locator.nearest_page_index(local, item_index))
            .unwrap_or(0);
        self.for_item_page(item_index, page)
    }

    /// Pull a position that does not start a screen back by one page, toward
    /// the reading start. No-op without spreads.
    pub fn spread_adjust(&self, position: UnsafePosition) -> UnsafePosition {
        let settings = self.locator.settings();
        if !settings.is_using_spread() {
            return position;
        }
        let viewport_width = settings.viewport.width;
        if viewport_width <= 0.0 || is_multiple_of(position.x, viewport_width) {
            return position;
        }
        let page_width = settings.page_size().width;
        if settings.is_rtl() {
            position.translated(page_width, 0.0)
        } else {
            position.translated(-page_width, 0.0)
        }
    }

    pub fn clamp(&self, position: UnsafePosition) -> SafePosition {
        self.locator.clamp(position)
    }

    /// One page step from the page under `position`, without spread
    /// adjustment. `None` at either end of the book.
    pub fn step_page(&self, page: &PageRef, direction: StepDirection) -> Option<PageRef> {
        match direction {
            StepDirection::Forward => {
                if page.page_index + 1 < self.locator.page_count(page.item_index) {
                    return self.locator.page_ref(page.item_index, page.page_index + 1);
                }
                let next = page.item_index + 1;
                (next < self.locator.item_count())
                    .then(|| self.locator.page_ref(next, 0))
                    .flatten()
            }
            StepDirection::Backward => {
                if page.page_index > 0 {
                    return self.locator.page_ref(page.item_index, page.page_index - 1);
                }
                let previous = page.item_index.checked_sub(1)?;
                let last = self.locator.page_count(previous).saturating_sub(1);
                self.locator.page_ref(previous, last)
            }
        }
    }

    /// Turn one screen from `position`.
    ///
    /// Takes single page steps until the adjusted position actually moves,
    /// which makes a spread turn two page steps. `None` when the book ends
    /// in that direction.
    pub fn step(&self, position: SafePosition, direction: StepDirection) -> Option<ResolvedTarget> {
        let mut page = self.locator.page_at(position.to_unsafe())?;
        for _ in 0..self.locator.total_pages() {
            page = self.step_page(&page, direction)?;
            let candidate = self.for_item_page(page.item_index, page.page_index);
            if !same_position(candidate, position) {
                return Some(ResolvedTarget {
                    position: candidate,
                    spine_item: page.item_index,
                });
            }
        }
        None
    }

    /// Reading direction of a physical turn.
    pub fn direction_for_side(&self, side: TurnSide) -> StepDirection {
        let rtl = self.locator.settings().is_rtl();
        match (side, rtl) {
            (TurnSide::Right, false) | (TurnSide::Left, true) => StepDirection::Forward,
            (TurnSide::Left, false) | (TurnSide::Right, true) => StepDirection::Backward,
        }
    }

    pub fn left_page(&self, position: SafePosition) -> Option<ResolvedTarget> {
        self.step(position, self.direction_for_side(TurnSide::Left))
    }

    pub fn right_page(&self, position: SafePosition) -> Option<ResolvedTarget> {
        self.step(position, self.direction_for_side(TurnSide::Right))
    }

    fn item_for_cfi(&self, cfi: &Cfi) -> Option<usize> {
        let hint = cfi.item_hint();
        if let Some(index) = hint.id.as_deref().and_then(|id| self.registry.index_of_id(id)) {
            return Some(index);
        }
        hint.index.filter(|index| *index < self.registry.len())
    }

    /// Item-local offset along the reading axis, snapped to its page.
    fn target_for_offset(&self, offset: f64, item_index: usize) -> ResolvedTarget {
        let along_y = self
            .locator
            .item(item_index)
            .map(|item| self.locator.snapshot().pages_along_y(item))
            .unwrap_or(false);
        let offset = if offset.is_finite() { offset.max(0.0) } else { 0.0 };
        let local = if along_y {
            SpineItemPosition::new(0.0, offset)
        } else {
            SpineItemPosition::new(offset, 0.0)
        };
        ResolvedTarget {
            position: self.for_spine_item_position(local, item_index),
            spine_item: item_index,
        }
    }
}

fn is_multiple_of(value: f64, step: f64) -> bool {
    let remainder = (value % step).abs();
    remainder < EDGE_EPSILON || (step - remainder) < EDGE_EPSILON
}

fn same_position(a: SafePosition, b: SafePosition) -> bool {
    (a.x() - b.x()).abs() < EDGE_EPSILON && (a.y() - b.y()).abs() < EDGE_EPSILON
}
