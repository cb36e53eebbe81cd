#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use epub_stream_nav::cfi::{Cfi, CfiStep, NodeLocation};
use epub_stream_nav::{
    ItemRenderer, LayoutConstraints, Lookup, Manifest, ManifestItem, Measurement, Navigator,
    ReaderSettings, RenderError, Size, SpineItem, SpineItemPosition, ViewportDrive,
    ViewportDriver,
};

#[derive(Default)]
struct BookState {
    sizes: Vec<Option<Size>>,
    fragments: HashMap<(usize, String), Lookup<f64>>,
    cfi_offsets: HashMap<usize, Lookup<f64>>,
    paragraph_extent: Option<f64>,
    measure_calls: usize,
}

/// Scripted book content shared between a test and the renderer it hands
/// to the navigator.
#[derive(Clone, Default)]
pub struct BookFixture {
    state: Rc<RefCell<BookState>>,
}

impl BookFixture {
    /// Items of the given widths, one page tall.
    pub fn paged(widths: &[f64], height: f64) -> Self {
        let fixture = Self::default();
        fixture.state.borrow_mut().sizes = widths
            .iter()
            .map(|width| Some(Size::new(*width, height)))
            .collect();
        fixture
    }

    /// Items of the given heights, one viewport wide.
    pub fn scrolled(heights: &[f64], width: f64) -> Self {
        let fixture = Self::default();
        fixture.state.borrow_mut().sizes = heights
            .iter()
            .map(|height| Some(Size::new(width, *height)))
            .collect();
        fixture
    }

    pub fn renderer(&self) -> FixtureRenderer {
        FixtureRenderer {
            state: Rc::clone(&self.state),
        }
    }

    pub fn manifest(&self) -> Manifest {
        let count = self.state.borrow().sizes.len();
        Manifest::new(
            (0..count)
                .map(|index| {
                    ManifestItem::new(format!("ch{index}"), format!("text/ch{index}.xhtml"))
                })
                .collect(),
        )
    }

    /// `None` makes the item fail to measure.
    pub fn set_size(&self, index: usize, size: Option<Size>) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.sizes.get_mut(index) {
            *slot = size;
        }
    }

    pub fn set_fragment(&self, index: usize, fragment: &str, lookup: Lookup<f64>) {
        self.state
            .borrow_mut()
            .fragments
            .insert((index, fragment.to_string()), lookup);
    }

    pub fn set_cfi_offset(&self, index: usize, lookup: Lookup<f64>) {
        self.state.borrow_mut().cfi_offsets.insert(index, lookup);
    }

    /// Report one paragraph node per `extent` pixels along the reading axis.
    pub fn set_paragraph_extent(&self, extent: f64) {
        self.state.borrow_mut().paragraph_extent = Some(extent);
    }

    pub fn measure_calls(&self) -> usize {
        self.state.borrow().measure_calls
    }
}

pub struct FixtureRenderer {
    state: Rc<RefCell<BookState>>,
}

impl ItemRenderer for FixtureRenderer {
    fn measure(
        &mut self,
        item: &SpineItem,
        _constraints: &LayoutConstraints,
    ) -> Result<Measurement, RenderError> {
        let mut state = self.state.borrow_mut();
        state.measure_calls += 1;
        match state.sizes.get(item.index).copied().flatten() {
            Some(size) => Ok(Measurement::new(size.width, size.height)),
            None => Err(RenderError::NotLoaded),
        }
    }

    fn resolve_cfi_offset(&self, item: &SpineItem, _cfi: &Cfi) -> Lookup<f64> {
        self.state
            .borrow()
            .cfi_offsets
            .get(&item.index)
            .cloned()
            .unwrap_or(Lookup::NotFound)
    }

    fn element_offset_for_fragment(&self, item: &SpineItem, fragment: &str) -> Lookup<f64> {
        self.state
            .borrow()
            .fragments
            .get(&(item.index, fragment.to_string()))
            .cloned()
            .unwrap_or(Lookup::NotFound)
    }

    fn node_at_offset(
        &self,
        item: &SpineItem,
        position: SpineItemPosition,
    ) -> Option<NodeLocation> {
        let extent = self.state.borrow().paragraph_extent?;
        let offset = position.x.max(position.y);
        let paragraph = (offset / extent).floor() as u32;
        Some(
            NodeLocation::new(item.index, item.id.clone())
                .with_steps(vec![CfiStep::new(4), CfiStep::new(2 * (paragraph + 1))])
                .with_offset_hint(offset),
        )
    }
}

/// Collects every viewport move.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    drives: Rc<RefCell<Vec<ViewportDrive>>>,
}

impl RecordingDriver {
    pub fn drives(&self) -> Vec<ViewportDrive> {
        self.drives.borrow().clone()
    }

    pub fn last(&self) -> Option<ViewportDrive> {
        self.drives.borrow().last().copied()
    }

    pub fn len(&self) -> usize {
        self.drives.borrow().len()
    }
}

impl ViewportDriver for RecordingDriver {
    fn drive(&mut self, drive: &ViewportDrive) {
        self.drives.borrow_mut().push(*drive);
    }
}

/// Navigator over `book`, already laid out once.
pub fn navigator(book: &BookFixture, settings: ReaderSettings) -> Navigator {
    let mut navigator =
        Navigator::new(&book.manifest(), settings, book.renderer()).expect("valid settings");
    navigator.layout();
    navigator
}

/// Same as [`navigator`] with a recording viewport driver attached.
pub fn driven_navigator(
    book: &BookFixture,
    settings: ReaderSettings,
) -> (Navigator, RecordingDriver) {
    let driver = RecordingDriver::default();
    let mut navigator = Navigator::new(&book.manifest(), settings, book.renderer())
        .expect("valid settings")
        .with_viewport_driver(driver.clone());
    navigator.layout();
    (navigator, driver)
}
