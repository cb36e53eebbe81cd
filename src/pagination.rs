//! What the reader currently shows, in pages and addresses.

use serde::Serialize;

use crate::cfi;
use crate::geometry::SafePosition;
use crate::locator::Locator;
use crate::renderer::ItemRenderer;
use crate::spine::SpineItemRegistry;

/// One visible page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub spine_item: usize,
    /// Page index within the item.
    pub page_index: usize,
    /// Pages in the item.
    pub page_count: usize,
    pub absolute_page_index: usize,
}

/// First and last visible page plus their addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationInfo {
    pub begin: PageInfo,
    pub end: PageInfo,
    pub total_pages: usize,
    pub begin_cfi: String,
    pub end_cfi: String,
}

impl PaginationInfo {
    /// Compute pagination for a viewport at `position`. `None` for an empty
    /// book.
    pub fn compute(
        position: SafePosition,
        locator: &Locator<'_>,
        registry: &SpineItemRegistry,
        renderer: &dyn ItemRenderer,
    ) -> Option<Self> {
        let position = position.to_unsafe();
        let threshold = locator.settings().visibility_threshold;
        let items = locator.visible_items_from(position, threshold, false)?;
        let begin_page = locator
            .visible_pages_from(position, items.begin, threshold, false)
            .map(|pages| pages.begin)
            .unwrap_or(0);
        let end_page = locator
            .visible_pages_from(position, items.end, threshold, false)
            .map(|pages| pages.end)
            .unwrap_or(0);

        let page_info = |spine_item: usize, page_index: usize| PageInfo {
            spine_item,
            page_index,
            page_count: locator.page_count(spine_item),
            absolute_page_index: locator
                .absolute_page_index(spine_item, page_index)
                .unwrap_or(0),
        };
        Some(Self {
            begin: page_info(items.begin, begin_page),
            end: page_info(items.end, end_page),
            total_pages: locator.total_pages(),
            begin_cfi: page_cfi(locator, registry, renderer, items.begin, begin_page),
            end_cfi: page_cfi(locator, registry, renderer, items.end, end_page),
        })
    }

    /// Begin address points at a node rather than a whole item.
    pub fn has_node_cfi(&self) -> bool {
        !cfi::is_root(&self.begin_cfi)
    }
}

/// Address of the node at the start of a page, or the item's root address
/// when the renderer knows no node there.
fn page_cfi(
    locator: &Locator<'_>,
    registry: &SpineItemRegistry,
    renderer: &dyn ItemRenderer,
    spine_item: usize,
    page_index: usize,
) -> String {
    let Some(item) = registry.get(spine_item) else {
        return cfi::generate_root(spine_item, "");
    };
    locator
        .page_position(page_index, spine_item)
        .and_then(|local| renderer.node_at_offset(item, local))
        .map(|node| cfi::generate(&node))
        .unwrap_or_else(|| cfi::generate_root(spine_item, &item.id))
}
