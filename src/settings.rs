//! Reader settings consumed by layout and navigation.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::geometry::Size;

/// Reading progression of the book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingDirection {
    #[default]
    Ltr,
    Rtl,
}

/// Axis along which pages turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageTurnDirection {
    #[default]
    Horizontal,
    Vertical,
}

/// Paged ("controlled") or free scrolling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageTurnMode {
    #[default]
    Controlled,
    Scrollable,
}

/// Settings shared by the layout accumulator, locator and navigator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Visible area in CSS pixels.
    pub viewport: Size,
    /// Book reading progression.
    pub reading_direction: ReadingDirection,
    /// Axis of page turns.
    pub page_turn_direction: PageTurnDirection,
    /// Paged or scrolling navigation.
    pub page_turn_mode: PageTurnMode,
    /// Show two pages per screen.
    pub spread: bool,
    /// Book-level `rendition:layout` is `pre-paginated`.
    pub pre_paginated_book: bool,
    /// Fraction of an item (or of the viewport) that must be covered for the
    /// item to count as visible.
    pub visibility_threshold: f64,
    /// Number of items kept loaded on each side of the visible range.
    pub preload_radius: usize,
    /// Quiet period after the last scroll tick before the position is
    /// published.
    #[serde(with = "duration_ms")]
    pub scroll_settle: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            viewport: Size::new(800.0, 600.0),
            reading_direction: ReadingDirection::Ltr,
            page_turn_direction: PageTurnDirection::Horizontal,
            page_turn_mode: PageTurnMode::Controlled,
            spread: false,
            pre_paginated_book: false,
            visibility_threshold: 0.5,
            preload_radius: 1,
            scroll_settle: Duration::from_millis(500),
        }
    }
}

impl ReaderSettings {
    /// Convenience for a viewport size with default behavior.
    pub fn for_viewport(width: f64, height: f64) -> Self {
        Self {
            viewport: Size::new(width, height),
            ..Self::default()
        }
    }

    pub fn with_reading_direction(mut self, direction: ReadingDirection) -> Self {
        self.reading_direction = direction;
        self
    }

    pub fn with_page_turn_direction(mut self, direction: PageTurnDirection) -> Self {
        self.page_turn_direction = direction;
        self
    }

    pub fn with_page_turn_mode(mut self, mode: PageTurnMode) -> Self {
        self.page_turn_mode = mode;
        self
    }

    pub fn with_spread(mut self, spread: bool) -> Self {
        self.spread = spread;
        self
    }

    pub fn with_pre_paginated_book(mut self, pre_paginated: bool) -> Self {
        self.pre_paginated_book = pre_paginated;
        self
    }

    pub fn with_visibility_threshold(mut self, threshold: f64) -> Self {
        self.visibility_threshold = threshold;
        self
    }

    pub fn with_preload_radius(mut self, radius: usize) -> Self {
        self.preload_radius = radius;
        self
    }

    pub fn with_scroll_settle(mut self, settle: Duration) -> Self {
        self.scroll_settle = settle;
        self
    }

    /// Reject sizes and thresholds the layout math cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let Size { width, height } = self.viewport;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(SettingsError::InvalidViewport { width, height });
        }
        let threshold = self.visibility_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::InvalidThreshold(threshold));
        }
        Ok(())
    }

    pub fn is_rtl(&self) -> bool {
        self.reading_direction == ReadingDirection::Rtl
    }

    /// Spreads only apply to paged reading.
    pub fn is_using_spread(&self) -> bool {
        self.spread && self.page_turn_mode == PageTurnMode::Controlled
    }

    /// Scroll mode always reads along the vertical axis.
    pub fn effective_page_turn_direction(&self) -> PageTurnDirection {
        match self.page_turn_mode {
            PageTurnMode::Scrollable => PageTurnDirection::Vertical,
            PageTurnMode::Controlled => self.page_turn_direction,
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.effective_page_turn_direction() == PageTurnDirection::Vertical
    }

    /// Size of one page: half the viewport width when spreads are active.
    pub fn page_size(&self) -> Size {
        let divisor = if self.is_using_spread() { 2.0 } else { 1.0 };
        Size::new(self.viewport.width / divisor, self.viewport.height)
    }
}

mod duration_ms {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
