//! Reading-space geometry: boxes, sizes and the two position trust levels.
//!
//! Reading space is the shared coordinate system every spine item is laid out
//! in. A position is the top-left corner of the viewport in that space. In
//! right-to-left books x grows negative.
//!
//! Positions come in two trust levels that are never interchangeable:
//!
//! - [`UnsafePosition`]: arbitrary, possibly out of bounds (pan gestures,
//!   arithmetic on other positions, external input).
//! - [`SafePosition`]: guaranteed to lie inside [`SafeBounds`]. The only way to
//!   build one is [`SafeBounds::clamp`].

use serde::{Deserialize, Serialize};

/// Width/height pair in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Replace non-finite or negative components by zero.
    pub fn sanitized(self) -> Self {
        Self {
            width: sanitize_extent(self.width),
            height: sanitize_extent(self.height),
        }
    }
}

fn sanitize_extent(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Absolute box of a spine item (or page) in reading space.
///
/// `left <= right` and `top <= bottom` always hold, RTL included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutBox {
    pub fn from_origin(left: f64, top: f64, size: Size) -> Self {
        Self {
            left,
            top,
            right: left + size.width,
            bottom: top + size.height,
            width: size.width,
            height: size.height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.left && x < self.right
    }

    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.top && y < self.bottom
    }

    /// Overlap lengths `(horizontal, vertical)` with another box, never negative.
    pub fn overlap(&self, other: &LayoutBox) -> (f64, f64) {
        let horizontal = (self.right.min(other.right) - self.left.max(other.left)).max(0.0);
        let vertical = (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0);
        (horizontal, vertical)
    }
}

/// Arbitrary reading-space position. May lie outside the book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsafePosition {
    pub x: f64,
    pub y: f64,
}

impl UnsafePosition {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Reading-space position known to lie within [`SafeBounds`].
///
/// Serializable for reporting but deliberately not deserializable: a stored
/// position must be re-clamped against the current layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SafePosition {
    x: f64,
    y: f64,
}

impl SafePosition {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Widen back to an unchecked position.
    pub fn to_unsafe(self) -> UnsafePosition {
        UnsafePosition {
            x: self.x,
            y: self.y,
        }
    }
}

impl From<SafePosition> for UnsafePosition {
    fn from(value: SafePosition) -> Self {
        value.to_unsafe()
    }
}

/// Inclusive ranges a viewport position may take.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SafeBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl SafeBounds {
    /// Clamp any position into bounds. Total: non-finite components map to
    /// the lower bound.
    pub fn clamp(&self, position: UnsafePosition) -> SafePosition {
        SafePosition {
            x: clamp_component(position.x, self.min_x, self.max_x),
            y: clamp_component(position.y, self.min_y, self.max_y),
        }
    }

    pub fn contains(&self, position: UnsafePosition) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
    }
}

fn clamp_component(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    let max = max.max(min);
    value.clamp(min, max)
}

/// Position local to one spine item, measured from the item's reading start
/// edge (left edge in LTR, right edge in RTL).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpineItemPosition {
    pub x: f64,
    pub y: f64,
}

impl SpineItemPosition {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pulls_outside_positions_in() {
        let bounds = SafeBounds {
            min_x: 0.0,
            max_x: 100.0,
            min_y: 0.0,
            max_y: 0.0,
        };
        let safe = bounds.clamp(UnsafePosition::new(250.0, -3.0));
        assert_eq!(safe.x(), 100.0);
        assert_eq!(safe.y(), 0.0);
        let safe = bounds.clamp(UnsafePosition::new(f64::NAN, f64::INFINITY));
        assert_eq!(safe.x(), 0.0);
        assert_eq!(safe.y(), 0.0);
    }

    #[test]
    fn clamp_tolerates_inverted_bounds() {
        let bounds = SafeBounds {
            min_x: 0.0,
            max_x: -50.0,
            min_y: 0.0,
            max_y: 0.0,
        };
        assert_eq!(bounds.clamp(UnsafePosition::new(10.0, 0.0)).x(), 0.0);
    }

    #[test]
    fn overlap_is_never_negative() {
        let a = LayoutBox::from_origin(0.0, 0.0, Size::new(100.0, 100.0));
        let b = LayoutBox::from_origin(150.0, 0.0, Size::new(100.0, 100.0));
        assert_eq!(a.overlap(&b), (0.0, 100.0));
        let c = LayoutBox::from_origin(50.0, 20.0, Size::new(100.0, 100.0));
        assert_eq!(a.overlap(&c), (50.0, 80.0));
    }

    #[test]
    fn sanitized_size_drops_garbage() {
        let size = Size::new(f64::NAN, -4.0).sanitized();
        assert_eq!(size, Size::ZERO);
    }
}
