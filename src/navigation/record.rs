//! Navigation requests, in-flight drafts and published records.

use serde::{Deserialize, Serialize};

use crate::geometry::{LayoutBox, SafePosition, SpineItemPosition, UnsafePosition};
use crate::renderer::Animation;
use crate::spine::SpineItemTarget;

/// Unique id of one navigation request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NavigationId(pub u64);

/// Origin of a navigation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationKind {
    #[default]
    Api,
    /// Settled user scroll; the viewport is already there.
    Scroll,
}

/// Who produced a record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggeredBy {
    #[default]
    User,
    Restoration,
    Pagination,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NavigationMeta {
    pub triggered_by: TriggeredBy,
}

/// Travel direction relative to the previous navigation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationDirection {
    #[default]
    Forward,
    Backward,
    /// Jump to an address (URL or CFI).
    Anchor,
}

/// Raw navigation intent. Every field is optional; the pipeline fills the
/// gaps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NavigationRequest {
    pub position: Option<UnsafePosition>,
    pub spine_item: Option<SpineItemTarget>,
    pub url: Option<String>,
    pub cfi: Option<String>,
    pub animation: Option<Animation>,
    pub direction: Option<NavigationDirection>,
    pub kind: NavigationKind,
}

impl NavigationRequest {
    pub fn to_position(position: UnsafePosition) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn to_spine_item(target: impl Into<SpineItemTarget>) -> Self {
        Self {
            spine_item: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn to_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn to_cfi(cfi: impl Into<String>) -> Self {
        Self {
            cfi: Some(cfi.into()),
            ..Self::default()
        }
    }

    /// Settled scroll position.
    pub fn scroll(position: UnsafePosition) -> Self {
        Self {
            position: Some(position),
            animation: Some(Animation::None),
            kind: NavigationKind::Scroll,
            ..Self::default()
        }
    }

    pub fn with_spine_item(mut self, target: impl Into<SpineItemTarget>) -> Self {
        self.spine_item = Some(target.into());
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animation = Some(animation);
        self
    }

    pub fn with_direction(mut self, direction: NavigationDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Carries an address the pipeline resolves itself.
    pub fn has_address(&self) -> bool {
        self.url.is_some() || self.cfi.is_some()
    }
}

/// Item geometry captured when a record was consolidated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ItemSnapshot {
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
}

impl From<&LayoutBox> for ItemSnapshot {
    fn from(layout_box: &LayoutBox) -> Self {
        Self {
            width: layout_box.width,
            height: layout_box.height,
            top: layout_box.top,
            left: layout_box.left,
        }
    }
}

/// Record threaded through the pipeline stages.
///
/// Fields stay optional until the stage responsible for them ran.
#[derive(Clone, Debug, PartialEq)]
pub struct NavigationDraft {
    pub id: NavigationId,
    pub request: NavigationRequest,
    /// Candidate position; unchecked until the position stage clamps it.
    pub position: Option<UnsafePosition>,
    pub safe_position: Option<SafePosition>,
    /// Item named by a resolved URL or CFI.
    pub address_item: Option<usize>,
    pub spine_item: Option<usize>,
    pub url: Option<String>,
    pub cfi: Option<String>,
    pub animation: Animation,
    pub kind: NavigationKind,
    pub triggered_by: TriggeredBy,
    pub direction: Option<NavigationDirection>,
    pub position_in_spine_item: Option<SpineItemPosition>,
    pub snapshot: Option<ItemSnapshot>,
    /// A renderer lookup is still loading; the navigation must be retried.
    pub pending: bool,
}

impl NavigationDraft {
    /// Build a fully specified record. Missing parts read as the book origin.
    pub fn into_record(self) -> NavigationRecord {
        NavigationRecord {
            id: self.id,
            position: self.safe_position.unwrap_or_default(),
            spine_item: self.spine_item.unwrap_or(0),
            url: self.url,
            cfi: self.cfi,
            animation: self.animation,
            kind: self.kind,
            meta: NavigationMeta {
                triggered_by: self.triggered_by,
            },
            direction: self.direction.unwrap_or_default(),
            position_in_spine_item: self.position_in_spine_item,
            spine_item_width: self.snapshot.map(|snapshot| snapshot.width),
            spine_item_height: self.snapshot.map(|snapshot| snapshot.height),
            spine_item_top: self.snapshot.map(|snapshot| snapshot.top),
            spine_item_left: self.snapshot.map(|snapshot| snapshot.left),
        }
    }
}

/// Fully specified, published navigation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavigationRecord {
    pub id: NavigationId,
    pub position: SafePosition,
    pub spine_item: usize,
    pub url: Option<String>,
    pub cfi: Option<String>,
    pub animation: Animation,
    pub kind: NavigationKind,
    pub meta: NavigationMeta,
    pub direction: NavigationDirection,
    /// Position relative to the item's reading start.
    pub position_in_spine_item: Option<SpineItemPosition>,
    /// Item geometry at consolidation time, used by restoration.
    pub spine_item_width: Option<f64>,
    pub spine_item_height: Option<f64>,
    pub spine_item_top: Option<f64>,
    pub spine_item_left: Option<f64>,
}

impl NavigationRecord {
    /// Item geometry snapshot when every part of it was captured.
    pub fn item_snapshot(&self) -> Option<ItemSnapshot> {
        Some(ItemSnapshot {
            width: self.spine_item_width?,
            height: self.spine_item_height?,
            top: self.spine_item_top?,
            left: self.spine_item_left?,
        })
    }

    pub fn triggered_by(&self) -> TriggeredBy {
        self.meta.triggered_by
    }

    /// Records that only restate where the viewport already is: user scrolls
    /// and pagination updates. Restored scroll records still move it.
    pub fn is_passive(&self) -> bool {
        match self.meta.triggered_by {
            TriggeredBy::Pagination => true,
            TriggeredBy::User => self.kind == NavigationKind::Scroll,
            TriggeredBy::Restoration => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize_from_kebab_case() {
        let request: NavigationRequest = serde_json::from_str(
            r#"{"spine-item": "chapter-2", "direction": "backward", "animation": "snap"}"#,
        )
        .expect("request");
        assert_eq!(request.spine_item, Some(SpineItemTarget::Id("chapter-2".into())));
        assert_eq!(request.direction, Some(NavigationDirection::Backward));
        assert_eq!(request.animation, Some(Animation::Snap));
        assert_eq!(request.kind, NavigationKind::Api);

        let request: NavigationRequest =
            serde_json::from_str(r#"{"position": {"x": 10, "y": 0}, "spine-item": 3}"#)
                .expect("request");
        assert_eq!(request.position, Some(UnsafePosition::new(10.0, 0.0)));
        assert_eq!(request.spine_item, Some(SpineItemTarget::Index(3)));
    }

    #[test]
    fn scroll_requests_do_not_animate() {
        let request = NavigationRequest::scroll(UnsafePosition::new(0.0, 40.0));
        assert_eq!(request.kind, NavigationKind::Scroll);
        assert_eq!(request.animation, Some(Animation::None));
        assert!(!request.has_address());
        assert!(NavigationRequest::to_cfi("epubcfi(/6/2!/0)").has_address());
    }

    #[test]
    fn partial_snapshot_is_absent() {
        let mut record = NavigationDraft {
            id: NavigationId(1),
            request: NavigationRequest::default(),
            position: None,
            safe_position: None,
            address_item: None,
            spine_item: Some(2),
            url: None,
            cfi: None,
            animation: Animation::Turn,
            kind: NavigationKind::Api,
            triggered_by: TriggeredBy::User,
            direction: None,
            position_in_spine_item: None,
            snapshot: Some(ItemSnapshot {
                width: 100.0,
                height: 50.0,
                top: 0.0,
                left: 200.0,
            }),
            pending: false,
        }
        .into_record();
        assert_eq!(record.direction, NavigationDirection::Forward);
        assert_eq!(record.item_snapshot().map(|s| s.left), Some(200.0));
        record.spine_item_top = None;
        assert!(record.item_snapshot().is_none());
    }

    #[test]
    fn records_serialize_with_meta() {
        let record = NavigationDraft {
            id: NavigationId(7),
            request: NavigationRequest::default(),
            position: None,
            safe_position: None,
            address_item: None,
            spine_item: None,
            url: Some("c1.xhtml#n".into()),
            cfi: None,
            animation: Animation::None,
            kind: NavigationKind::Scroll,
            triggered_by: TriggeredBy::Restoration,
            direction: Some(NavigationDirection::Anchor),
            position_in_spine_item: None,
            snapshot: None,
            pending: false,
        }
        .into_record();
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value["id"], 7);
        assert_eq!(value["meta"]["triggered_by"], "restoration");
        assert_eq!(value["direction"], "anchor");
        assert_eq!(value["kind"], "scroll");
        assert_eq!(value["position"]["x"], 0.0);
        assert!(!record.is_passive());
    }
}
