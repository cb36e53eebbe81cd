//! Consolidation pipeline.
//!
//! A request becomes a record by running ordered stages over a
//! [`NavigationDraft`]. Every stage is a plain function of the draft and a
//! read-only [`PipelineContext`], so stages can be exercised one at a time.
//!
//! 1. [`seed`]
//! 2. [`resolve_url`]
//! 3. [`resolve_cfi`]
//! 4. [`infer_direction`]
//! 5. [`resolve_spine_item`]
//! 6. [`resolve_position_in_spine_item`]
//! 7. [`snapshot_spine_item`]
//! 8. [`resolve_position`]
//! 9. [`restoration_pre_pass`]
//! 10. [`viewport_drive`], applied by the navigator when publishing

use crate::cfi;
use crate::geometry::UnsafePosition;
use crate::renderer::{Animation, ItemRenderer, Lookup, ViewportDrive};
use crate::resolver::{ResolvedTarget, Resolver};
use crate::settings::PageTurnMode;

use super::record::{
    ItemSnapshot, NavigationDirection, NavigationDraft, NavigationId, NavigationKind,
    NavigationRecord, NavigationRequest, TriggeredBy,
};
use super::restoration;

const EPSILON: f64 = 1e-6;

/// Everything a stage may read.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub resolver: Resolver<'a>,
    pub renderer: &'a dyn ItemRenderer,
    /// Current authoritative record; `None` before the first navigation.
    pub previous: Option<&'a NavigationRecord>,
    pub locked: bool,
}

impl PipelineContext<'_> {
    fn mode(&self) -> PageTurnMode {
        self.resolver.locator().settings().page_turn_mode
    }

    fn threshold(&self) -> f64 {
        self.resolver.locator().settings().visibility_threshold
    }
}

/// Outcome of running every stage.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOutcome {
    Ready(NavigationRecord),
    /// A renderer lookup is still loading.
    Deferred(NavigationId),
}

pub type Stage = fn(NavigationDraft, &PipelineContext<'_>) -> NavigationDraft;

/// Stages 2 to 9, in order.
pub const STAGES: [(&str, Stage); 8] = [
    ("url", resolve_url),
    ("cfi", resolve_cfi),
    ("direction", infer_direction),
    ("spine-item", resolve_spine_item),
    ("position-in-spine-item", resolve_position_in_spine_item),
    ("snapshot", snapshot_spine_item),
    ("position", resolve_position),
    ("restoration", restoration_pre_pass),
];

/// Run a request through every stage.
pub fn consolidate(
    id: NavigationId,
    request: NavigationRequest,
    context: &PipelineContext<'_>,
) -> PipelineOutcome {
    let mut draft = seed(id, request);
    for (name, stage) in STAGES {
        draft = stage(draft, context);
        log::trace!(
            "navigation {:?} after {}: item={:?} position={:?}",
            id,
            name,
            draft.spine_item,
            draft.position
        );
        if draft.pending {
            log::debug!("navigation {:?} deferred at stage {}", id, name);
            return PipelineOutcome::Deferred(id);
        }
    }
    PipelineOutcome::Ready(draft.into_record())
}

/// Stage 1: a fresh draft carrying the request's explicit values.
pub fn seed(id: NavigationId, request: NavigationRequest) -> NavigationDraft {
    NavigationDraft {
        id,
        position: request.position,
        safe_position: None,
        address_item: None,
        spine_item: None,
        url: request.url.clone(),
        cfi: request.cfi.clone(),
        animation: request.animation.unwrap_or_default(),
        kind: request.kind,
        triggered_by: TriggeredBy::User,
        direction: request.direction,
        position_in_spine_item: None,
        snapshot: None,
        pending: false,
        request,
    }
}

/// Stage 2: URL to position and item.
pub fn resolve_url(mut draft: NavigationDraft, context: &PipelineContext<'_>) -> NavigationDraft {
    let Some(url) = draft.url.as_deref() else {
        return draft;
    };
    let lookup = context.resolver.for_url(url, context.renderer);
    apply_address(&mut draft, lookup);
    draft
}

/// Stage 3: CFI to position and item, unless a URL already resolved.
pub fn resolve_cfi(mut draft: NavigationDraft, context: &PipelineContext<'_>) -> NavigationDraft {
    if draft.address_item.is_some() {
        return draft;
    }
    let Some(parsed) = draft.cfi.as_deref().and_then(cfi::parse_lenient) else {
        return draft;
    };
    let lookup = context.resolver.for_cfi(&parsed, context.renderer);
    apply_address(&mut draft, lookup);
    draft
}

fn apply_address(draft: &mut NavigationDraft, lookup: Lookup<ResolvedTarget>) {
    match lookup {
        Lookup::Found(target) => {
            draft.position = Some(target.position.to_unsafe());
            draft.address_item = Some(target.spine_item);
        }
        Lookup::Pending => draft.pending = true,
        Lookup::NotFound => {
            log::debug!("navigation {:?}: address did not resolve", draft.id);
        }
    }
}

/// Stage 4: travel direction.
pub fn infer_direction(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    if draft.direction.is_some() {
        return draft;
    }
    let direction = if draft.request.has_address() {
        NavigationDirection::Anchor
    } else if draft.request.spine_item.is_some() {
        NavigationDirection::Forward
    } else {
        match context.previous {
            None => NavigationDirection::Forward,
            Some(previous) => {
                let settings = context.resolver.locator().settings();
                let axis = |position: UnsafePosition| {
                    if settings.is_vertical() {
                        position.y
                    } else if settings.is_rtl() {
                        -position.x
                    } else {
                        position.x
                    }
                };
                let before = axis(previous.position.to_unsafe());
                match draft.position.map(axis) {
                    Some(after) if after > before + EPSILON => NavigationDirection::Forward,
                    Some(after) if after < before - EPSILON => NavigationDirection::Backward,
                    _ => match previous.direction {
                        NavigationDirection::Backward => NavigationDirection::Backward,
                        NavigationDirection::Forward | NavigationDirection::Anchor => {
                            NavigationDirection::Forward
                        }
                    },
                }
            }
        }
    };
    draft.direction = Some(direction);
    draft
}

/// Stage 5: owning item.
pub fn resolve_spine_item(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    let locator = context.resolver.locator();
    let count = locator.item_count();
    if count == 0 {
        return draft;
    }

    let explicit = draft.request.spine_item.as_ref().and_then(|target| {
        let resolved = context.resolver.resolve_spine_item(target);
        if resolved.is_none() {
            log::debug!("navigation {:?}: unknown spine item {:?}", draft.id, target);
        }
        resolved
    });

    let resolved = explicit.or(draft.address_item).or_else(|| {
        let position = context.resolver.clamp(draft.position?).to_unsafe();
        match context.mode() {
            PageTurnMode::Scrollable => locator.item_at(position),
            PageTurnMode::Controlled => {
                let backward = draft.direction == Some(NavigationDirection::Backward);
                let visible = locator.visible_items_from(position, context.threshold(), false)?;
                let farthest = if backward { visible.begin } else { visible.end };
                let pages =
                    locator.visible_pages_from(position, farthest, context.threshold(), false);
                let page = pages.map(|range| if backward { range.begin } else { range.end });
                let stable = page
                    .and_then(|page| locator.page_ref(farthest, page))
                    .and_then(|page| {
                        let page_box = page.layout_box;
                        let probe = UnsafePosition::new(page_box.left, page_box.top);
                        locator.item_at(probe)
                    });
                Some(stable.unwrap_or(farthest))
            }
        }
    });

    let fallback = context.previous.map(|previous| previous.spine_item).unwrap_or(0);
    draft.spine_item = Some(resolved.unwrap_or(fallback).min(count - 1));
    draft
}

/// Stage 6: position inside the item.
pub fn resolve_position_in_spine_item(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    let (Some(item), Some(position)) = (draft.spine_item, draft.position) else {
        return draft;
    };
    let position = context.resolver.clamp(position).to_unsafe();
    let locator = context.resolver.locator();
    let Some(local) = locator.spine_item_position_from(position, item) else {
        return draft;
    };
    if context.mode() == PageTurnMode::Scrollable {
        draft.position_in_spine_item = Some(local);
        return draft;
    }

    let backward = draft.direction == Some(NavigationDirection::Backward);
    let Some(visible) = locator.visible_pages_from(position, item, context.threshold(), false)
    else {
        return draft;
    };
    let along_y = locator
        .item(item)
        .map(|layout| locator.snapshot().pages_along_y(layout))
        .unwrap_or(false);
    let distance = |page: usize| {
        let start = locator.page_position(page, item).unwrap_or_default();
        if along_y {
            (start.y - local.y).abs()
        } else {
            (start.x - local.x).abs()
        }
    };

    // Walk from the farthest page in travel direction so ties keep it.
    let mut best = if backward { visible.begin } else { visible.end };
    let mut best_distance = distance(best);
    let mut candidates: Vec<usize> = (visible.begin..=visible.end).collect();
    if !backward {
        candidates.reverse();
    }
    for page in candidates {
        let candidate_distance = distance(page);
        if candidate_distance + EPSILON < best_distance {
            best = page;
            best_distance = candidate_distance;
        }
    }
    draft.position_in_spine_item = locator.page_position(best, item);
    draft
}

/// Stage 7: capture the item's current box.
pub fn snapshot_spine_item(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    draft.snapshot = draft
        .spine_item
        .and_then(|item| context.resolver.locator().item(item))
        .map(|layout| ItemSnapshot::from(&layout.layout_box));
    draft
}

/// Stage 8: final, safe position.
pub fn resolve_position(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    let resolver = &context.resolver;
    let safe = match (draft.position, draft.spine_item) {
        (Some(position), _) => resolver.clamp(position),
        (None, Some(item)) => resolver.item_origin(item),
        (None, None) => resolver.clamp(UnsafePosition::ORIGIN),
    };
    draft.safe_position = Some(safe);
    if draft.position_in_spine_item.is_none() {
        if let Some(item) = draft.spine_item {
            draft.position_in_spine_item =
                restoration::local_position(&resolver.locator(), safe, item);
        }
    }
    draft
}

/// Stage 9: re-run restoration on the provisional record so a position
/// about to be invalidated snaps to what restoration would pick.
pub fn restoration_pre_pass(
    mut draft: NavigationDraft,
    context: &PipelineContext<'_>,
) -> NavigationDraft {
    if draft.request.has_address()
        || draft.kind == NavigationKind::Scroll
        || context.mode() == PageTurnMode::Scrollable
        || context.locked
        || draft.spine_item.is_none()
    {
        return draft;
    }
    let provisional = draft.clone().into_record();
    let target = restoration::restored_target(&provisional, &context.resolver, context.renderer);
    draft.safe_position = Some(target.position);
    if target.spine_item != provisional.spine_item {
        draft.spine_item = Some(target.spine_item);
        draft.position_in_spine_item = restoration::local_position(
            &context.resolver.locator(),
            target.position,
            target.spine_item,
        );
        draft = snapshot_spine_item(draft, context);
    }
    draft
}

/// Stage 10: viewport move for a record about to be published, if any.
///
/// Nothing moves while locked, for passive records (scroll, pagination) or
/// when the position repeats the previous one.
pub fn viewport_drive(
    record: &NavigationRecord,
    previous: Option<&NavigationRecord>,
    locked: bool,
) -> Option<ViewportDrive> {
    if locked || record.is_passive() {
        return None;
    }
    if let Some(previous) = previous {
        let same_x = (previous.position.x() - record.position.x()).abs() < EPSILON;
        let same_y = (previous.position.y() - record.position.y()).abs() < EPSILON;
        if same_x && same_y {
            return None;
        }
    }
    Some(ViewportDrive {
        x: record.position.x(),
        y: record.position.y(),
        animation: record.animation,
    })
}

/// Re-emission after the last lock holder released.
pub fn snap_drive(record: &NavigationRecord) -> ViewportDrive {
    ViewportDrive {
        x: record.position.x(),
        y: record.position.y(),
        animation: Animation::Snap,
    }
}
