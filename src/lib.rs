//! Positioning core for paginated EPUB readers.
//!
//! The crate turns a spine of measured items into a coordinate system and
//! keeps one authoritative [`NavigationRecord`] describing where the reader
//! is. It does not render anything: hosts plug in an [`ItemRenderer`] that
//! measures items and answers offset lookups, and optionally a
//! [`ViewportDriver`] that moves the visible area.
//!
//! - [`layout`] lays items out contiguously along the reading axis
//! - [`locator`] maps positions to items and pages and back
//! - [`cfi`] parses and generates EPUB CFI addresses
//! - [`resolver`] turns navigation targets into safe positions
//! - [`navigation`] consolidates requests and restores them after reflow
//! - [`navigator`] owns the session and wires everything together
//!
//! ```rust
//! use epub_stream_nav::{
//!     ItemRenderer, LayoutConstraints, Lookup, Manifest, ManifestItem, Measurement,
//!     Navigator, ReaderSettings, RenderError, SpineItem,
//! };
//! use epub_stream_nav::cfi::Cfi;
//!
//! struct FixedWidth;
//!
//! impl ItemRenderer for FixedWidth {
//!     fn measure(
//!         &mut self,
//!         _item: &SpineItem,
//!         constraints: &LayoutConstraints,
//!     ) -> Result<Measurement, RenderError> {
//!         Ok(Measurement::new(constraints.page_size.width * 3.0, constraints.page_size.height))
//!     }
//!
//!     fn resolve_cfi_offset(&self, _item: &SpineItem, _cfi: &Cfi) -> Lookup<f64> {
//!         Lookup::NotFound
//!     }
//!
//!     fn element_offset_for_fragment(&self, _item: &SpineItem, _fragment: &str) -> Lookup<f64> {
//!         Lookup::NotFound
//!     }
//! }
//!
//! let manifest = Manifest::new(vec![
//!     ManifestItem::new("ch1", "text/ch1.xhtml"),
//!     ManifestItem::new("ch2", "text/ch2.xhtml"),
//! ]);
//! let mut navigator =
//!     Navigator::new(&manifest, ReaderSettings::for_viewport(400.0, 600.0), FixedWidth)
//!         .expect("valid settings");
//! navigator.layout();
//! navigator.go_to_spine_item("ch2");
//! let record = navigator.current_record().expect("published");
//! assert_eq!(record.spine_item, 1);
//! assert_eq!(record.position.x(), 1200.0);
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod cfi;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod locator;
pub mod navigation;
pub mod navigator;
pub mod pagination;
pub mod renderer;
pub mod resolver;
pub mod settings;
pub mod spine;

pub use cfi::{Cfi, CfiError, NodeLocation};
pub use error::{NavigatorError, SettingsError};
pub use geometry::{LayoutBox, SafeBounds, SafePosition, Size, SpineItemPosition, UnsafePosition};
pub use layout::{ItemLayout, LayoutOutcome, LayoutSnapshot, SpineLayout};
pub use locator::{Locator, PageRef, VisibleRange};
pub use navigation::{
    LockToken, NavigationDirection, NavigationId, NavigationKind, NavigationRecord,
    NavigationRequest, TriggeredBy,
};
pub use navigator::{NavigateOutcome, Navigator, SubscriptionId};
pub use pagination::{PageInfo, PaginationInfo};
pub use renderer::{
    Animation, BlankPagePosition, ItemRenderer, LayoutConstraints, Lookup, Measurement,
    RenderError, SpreadPosition, ViewportDrive, ViewportDriver,
};
pub use resolver::{ResolvedTarget, Resolver, StepDirection, TurnSide};
pub use settings::{PageTurnDirection, PageTurnMode, ReaderSettings, ReadingDirection};
pub use spine::{
    LayoutMode, Manifest, ManifestItem, PageSpread, SpineItem, SpineItemRegistry, SpineItemTarget,
};
