//! Renderer and viewport hooks implemented outside the core.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::cfi::{Cfi, NodeLocation};
use crate::geometry::{Size, SpineItemPosition};
use crate::spine::SpineItem;

/// Where a blank page is inserted next to an item in spread mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlankPagePosition {
    #[default]
    None,
    Before,
    After,
}

/// Side of the spread an item starts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpreadPosition {
    None,
    Left,
    Right,
}

/// Constraints handed to [`ItemRenderer::measure`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConstraints {
    /// The realized width is never smaller than this.
    pub minimum_width: f64,
    pub blank_page: BlankPagePosition,
    pub page_size: Size,
    pub spread_position: SpreadPosition,
}

/// Realized geometry of a measured item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub size: Size,
    pub vertical_writing: bool,
}

impl Measurement {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            size: Size::new(width, height),
            vertical_writing: false,
        }
    }
}

/// Result of a lookup that may depend on content still loading.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// Content is not ready yet; retry after the renderer reports it loaded.
    Pending,
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Pending | Self::NotFound => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Pending => Lookup::Pending,
            Self::NotFound => Lookup::NotFound,
        }
    }
}

/// Renderer failure while measuring an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// Item content is not available (not fetched, unloaded).
    NotLoaded,
    /// Renderer specific failure.
    Failed(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "item content not loaded"),
            Self::Failed(reason) => write!(f, "render failed: {}", reason),
        }
    }
}

impl std::error::Error for RenderError {}

/// Per content type rendering hooks.
///
/// Offsets are item-local pixels along the reading axis (x for horizontal
/// reading, y for vertical), measured from the item's reading start edge.
pub trait ItemRenderer {
    /// Lay the item out under `constraints` and report its realized size.
    fn measure(
        &mut self,
        item: &SpineItem,
        constraints: &LayoutConstraints,
    ) -> Result<Measurement, RenderError>;

    /// Map a CFI inside `item` to an item-local offset.
    fn resolve_cfi_offset(&self, item: &SpineItem, cfi: &Cfi) -> Lookup<f64>;

    /// Map a URL fragment (`#id`) inside `item` to an item-local offset.
    fn element_offset_for_fragment(&self, item: &SpineItem, fragment: &str) -> Lookup<f64>;

    /// Node at an item-local position, used to generate CFIs for pagination.
    ///
    /// The default knows nothing about nodes, so callers fall back to root
    /// addresses.
    fn node_at_offset(
        &self,
        _item: &SpineItem,
        _position: SpineItemPosition,
    ) -> Option<NodeLocation> {
        None
    }
}

/// Animation the viewport driver should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Animation {
    None,
    #[default]
    Turn,
    Snap,
}

/// Instruction to move the visible area.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ViewportDrive {
    pub x: f64,
    pub y: f64,
    pub animation: Animation,
}

/// Applies viewport moves (transforms, scroll offsets) on the host side.
pub trait ViewportDriver {
    fn drive(&mut self, drive: &ViewportDrive);
}
