//! Simulated item content: an indexed XHTML document, a fixed page or an
//! image, and the renderer that lays them out.

use core::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use epub_stream_nav::cfi::{Cfi, CfiStep, NodeLocation};
use epub_stream_nav::{
    ItemRenderer, LayoutConstraints, Lookup, Measurement, RenderError, Size, SpineItem,
    SpineItemPosition,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Deserialize;

/// Elements that start a new block of text.
const BLOCK_ELEMENTS: &[&[u8]] = &[
    b"p",
    b"h1",
    b"h2",
    b"h3",
    b"h4",
    b"h5",
    b"h6",
    b"li",
    b"blockquote",
    b"pre",
    b"figure",
    b"dt",
    b"dd",
];

/// XHTML parse failure.
#[derive(Debug)]
pub enum ContentError {
    Xml(quick_xml::Error),
    /// Document has no `<body>` content.
    EmptyDocument,
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml(err) => write!(f, "xml error: {}", err),
            Self::EmptyDocument => write!(f, "document has no block content"),
        }
    }
}

impl std::error::Error for ContentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Xml(err) => Some(err),
            Self::EmptyDocument => None,
        }
    }
}

impl From<quick_xml::Error> for ContentError {
    fn from(value: quick_xml::Error) -> Self {
        Self::Xml(value)
    }
}

/// Text metrics for flowing reflowable content.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Typography {
    pub line_height: f64,
    pub char_width: f64,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            line_height: 24.0,
            char_width: 10.0,
        }
    }
}

/// How reflowable content is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    /// Columns of one page each, side by side.
    #[default]
    Paged,
    /// One long column.
    Scrolled,
}

/// A block of text with its element path below `<html>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// CFI element steps (even indices) from the document element.
    pub steps: Vec<u32>,
    /// Id of the block element itself.
    pub id: Option<String>,
    pub chars: usize,
}

/// Block index of an XHTML document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XhtmlDocument {
    blocks: Vec<Block>,
    ids: HashMap<String, usize>,
}

impl XhtmlDocument {
    /// Index block elements, their CFI paths and every element id.
    pub fn parse(source: &str) -> Result<Self, ContentError> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);

        let mut doc = XhtmlDocument::default();
        // Child element counters, one per open element plus the document.
        let mut counters: Vec<u32> = vec![0];
        let mut path: Vec<u32> = Vec::with_capacity(16);
        // Depth of the path at which the current block element opened.
        let mut block_depth: Option<usize> = None;
        let mut pending_ids: Vec<String> = Vec::new();
        let mut buf = Vec::with_capacity(256);

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => {
                    doc.open_element(
                        &reader,
                        &start,
                        &mut counters,
                        &mut path,
                        &mut block_depth,
                        &mut pending_ids,
                    );
                    counters.push(0);
                }
                Event::Empty(start) => {
                    doc.open_element(
                        &reader,
                        &start,
                        &mut counters,
                        &mut path,
                        &mut block_depth,
                        &mut pending_ids,
                    );
                    doc.close_element(&mut path, &mut block_depth);
                }
                Event::End(_) => {
                    counters.pop();
                    doc.close_element(&mut path, &mut block_depth);
                }
                Event::Text(text) => {
                    if block_depth.is_some() {
                        let decoded = reader.decoder().decode(&text).unwrap_or_default();
                        if let Some(block) = doc.blocks.last_mut() {
                            block.chars += decoded.chars().count();
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if doc.blocks.is_empty() {
            return Err(ContentError::EmptyDocument);
        }
        let last = doc.blocks.len() - 1;
        for id in pending_ids {
            doc.ids.insert(id, last);
        }
        log::debug!(
            "indexed xhtml document: {} blocks, {} ids",
            doc.blocks.len(),
            doc.ids.len()
        );
        Ok(doc)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_of_id(&self, id: &str) -> Option<usize> {
        self.ids.get(id).copied()
    }

    fn open_element(
        &mut self,
        reader: &Reader<&[u8]>,
        start: &BytesStart<'_>,
        counters: &mut [u32],
        path: &mut Vec<u32>,
        block_depth: &mut Option<usize>,
        pending_ids: &mut Vec<String>,
    ) {
        if let Some(counter) = counters.last_mut() {
            *counter += 1;
            path.push(*counter * 2);
        }
        let id = start
            .attributes()
            .flatten()
            .find(|attr| attr.key.as_ref() == b"id")
            .map(|attr| {
                reader
                    .decoder()
                    .decode(attr.value.as_ref())
                    .unwrap_or_default()
                    .into_owned()
            });

        let name = start.local_name();
        let starts_block = block_depth.is_none() && BLOCK_ELEMENTS.contains(&name.as_ref());
        if starts_block {
            *block_depth = Some(path.len());
            self.blocks.push(Block {
                // Steps below the document element.
                steps: path.iter().skip(1).copied().collect(),
                id: id.clone(),
                chars: 0,
            });
            let index = self.blocks.len() - 1;
            for pending in pending_ids.drain(..) {
                self.ids.insert(pending, index);
            }
        }

        if let Some(id) = id {
            match block_depth {
                Some(_) => {
                    let index = self.blocks.len().saturating_sub(1);
                    self.ids.entry(id).or_insert(index);
                }
                // Wrappers name the next block.
                None => pending_ids.push(id),
            }
        }
    }

    fn close_element(&mut self, path: &mut Vec<u32>, block_depth: &mut Option<usize>) {
        if *block_depth == Some(path.len()) {
            *block_depth = None;
        }
        path.pop();
    }

    /// Line index each block starts on, plus the total line count.
    fn line_starts(&self, chars_per_line: usize) -> (Vec<usize>, usize) {
        let chars_per_line = chars_per_line.max(1);
        let mut starts = Vec::with_capacity(self.blocks.len());
        let mut line = 0usize;
        for block in &self.blocks {
            starts.push(line);
            line += block.chars.div_ceil(chars_per_line).max(1);
        }
        (starts, line)
    }
}

/// Content of one simulated spine item.
#[derive(Clone, Debug, PartialEq)]
pub enum SimItem {
    Xhtml(XhtmlDocument),
    /// Pre-paginated page with its intrinsic size.
    FixedPage { width: f64, height: f64 },
    Image { width: f64, height: f64 },
}

#[derive(Clone, Debug)]
struct SimEntry {
    content: SimItem,
    loaded: bool,
}

/// Renderer over simulated items, dispatching on content type.
#[derive(Clone, Debug)]
pub struct SimRenderer {
    entries: Vec<SimEntry>,
    typography: Typography,
    flow: Flow,
    /// Page size of the last measure pass.
    page: Size,
}

impl SimRenderer {
    pub fn new(typography: Typography, flow: Flow) -> Self {
        Self {
            entries: Vec::new(),
            typography,
            flow,
            page: Size::ZERO,
        }
    }

    /// Append an item; indices follow spine order.
    pub fn push(&mut self, content: SimItem, loaded: bool) {
        self.entries.push(SimEntry { content, loaded });
    }

    pub fn set_flow(&mut self, flow: Flow) {
        self.flow = flow;
    }

    /// Mark an item loaded. Returns false for unknown indices.
    pub fn load(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                entry.loaded = true;
                true
            }
            None => false,
        }
    }

    pub fn unload(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.loaded = false;
        }
    }

    fn loaded(&self, index: usize) -> Option<&SimItem> {
        self.entries
            .get(index)
            .filter(|entry| entry.loaded)
            .map(|entry| &entry.content)
    }

    fn is_known(&self, index: usize) -> bool {
        index < self.entries.len()
    }

    fn chars_per_line(&self) -> usize {
        if self.typography.char_width <= 0.0 {
            return 1;
        }
        (self.page.width / self.typography.char_width).floor().max(1.0) as usize
    }

    fn lines_per_page(&self) -> usize {
        if self.typography.line_height <= 0.0 {
            return 1;
        }
        (self.page.height / self.typography.line_height).floor().max(1.0) as usize
    }

    /// Offset of a line along the reading axis.
    fn line_offset(&self, line: usize) -> f64 {
        match self.flow {
            Flow::Paged => (line / self.lines_per_page()) as f64 * self.page.width,
            Flow::Scrolled => line as f64 * self.typography.line_height,
        }
    }

    fn block_offsets(&self, doc: &XhtmlDocument) -> Vec<f64> {
        let (starts, _) = doc.line_starts(self.chars_per_line());
        starts.into_iter().map(|line| self.line_offset(line)).collect()
    }

    fn lookup_offset(
        &self,
        item: &SpineItem,
        find: impl FnOnce(&XhtmlDocument) -> Option<usize>,
    ) -> Lookup<f64> {
        if !self.is_known(item.index) {
            return Lookup::NotFound;
        }
        match self.loaded(item.index) {
            None => Lookup::Pending,
            Some(SimItem::Xhtml(doc)) => match find(doc) {
                Some(block) => self
                    .block_offsets(doc)
                    .get(block)
                    .copied()
                    .map(Lookup::Found)
                    .unwrap_or(Lookup::NotFound),
                None => Lookup::NotFound,
            },
            Some(SimItem::FixedPage { .. } | SimItem::Image { .. }) => Lookup::Found(0.0),
        }
    }
}

impl ItemRenderer for SimRenderer {
    fn measure(
        &mut self,
        item: &SpineItem,
        constraints: &LayoutConstraints,
    ) -> Result<Measurement, RenderError> {
        self.page = constraints.page_size;
        let page = constraints.page_size;
        let content = self.loaded(item.index).ok_or(RenderError::NotLoaded)?;
        let size = match content {
            SimItem::Xhtml(doc) => {
                let (_, lines) = doc.line_starts(self.chars_per_line());
                match self.flow {
                    Flow::Paged => {
                        let pages = lines.div_ceil(self.lines_per_page()).max(1);
                        Size::new(page.width * pages as f64, page.height)
                    }
                    Flow::Scrolled => Size::new(
                        page.width,
                        (lines as f64 * self.typography.line_height).max(page.height),
                    ),
                }
            }
            // Scaled to the page width when scrolling, one page otherwise.
            SimItem::FixedPage { width, height } | SimItem::Image { width, height } => {
                match self.flow {
                    Flow::Scrolled if *width > 0.0 => {
                        Size::new(page.width, page.width * *height / *width)
                    }
                    Flow::Paged | Flow::Scrolled => page,
                }
            }
        };
        log::trace!("measured {} as {}x{}", item.id, size.width, size.height);
        Ok(Measurement::new(size.width, size.height))
    }

    fn resolve_cfi_offset(&self, item: &SpineItem, cfi: &Cfi) -> Lookup<f64> {
        let steps = cfi.content_steps();
        self.lookup_offset(item, |doc| {
            if let Some(block) = steps
                .iter()
                .rev()
                .filter_map(|step| step.id())
                .find_map(|id| doc.block_of_id(id))
            {
                return Some(block);
            }
            let indices: Vec<u32> = steps.iter().map(|step| step.index).collect();
            doc.blocks()
                .iter()
                .enumerate()
                .filter(|(_, block)| !block.steps.is_empty())
                .filter(|(_, block)| {
                    indices.starts_with(&block.steps) || block.steps.starts_with(&indices)
                })
                .max_by_key(|(_, block)| common_prefix(&block.steps, &indices))
                .map(|(index, _)| index)
        })
    }

    fn element_offset_for_fragment(&self, item: &SpineItem, fragment: &str) -> Lookup<f64> {
        self.lookup_offset(item, |doc| doc.block_of_id(fragment))
    }

    fn node_at_offset(
        &self,
        item: &SpineItem,
        position: SpineItemPosition,
    ) -> Option<NodeLocation> {
        let Some(SimItem::Xhtml(doc)) = self.loaded(item.index) else {
            return None;
        };
        let along = match self.flow {
            Flow::Paged => position.x,
            Flow::Scrolled => position.y,
        };
        let offsets = self.block_offsets(doc);
        let index = offsets
            .iter()
            .rposition(|offset| *offset <= along + 1e-6)
            .unwrap_or(0);
        let block = doc.blocks().get(index)?;
        let last = block.steps.len().saturating_sub(1);
        let steps = block
            .steps
            .iter()
            .enumerate()
            .map(|(depth, step)| match (&block.id, depth == last) {
                (Some(id), true) => CfiStep::with_id(*step, id.clone()),
                _ => CfiStep::new(*step),
            })
            .collect();
        Some(
            NodeLocation::new(item.index, item.id.clone())
                .with_steps(steps)
                .with_offset_hint(offsets.get(index).copied().unwrap_or(0.0)),
        )
    }
}

/// Cloneable handle to a [`SimRenderer`]; one clone goes into the
/// navigator, the host keeps another to load items.
#[derive(Clone, Debug)]
pub struct SharedRenderer(Rc<RefCell<SimRenderer>>);

impl SharedRenderer {
    pub fn new(renderer: SimRenderer) -> Self {
        Self(Rc::new(RefCell::new(renderer)))
    }

    pub fn load(&self, index: usize) -> bool {
        self.0.borrow_mut().load(index)
    }

    pub fn unload(&self, index: usize) {
        self.0.borrow_mut().unload(index);
    }

    pub fn set_flow(&self, flow: Flow) {
        self.0.borrow_mut().set_flow(flow);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemRenderer for SharedRenderer {
    fn measure(
        &mut self,
        item: &SpineItem,
        constraints: &LayoutConstraints,
    ) -> Result<Measurement, RenderError> {
        self.0.borrow_mut().measure(item, constraints)
    }

    fn resolve_cfi_offset(&self, item: &SpineItem, cfi: &Cfi) -> Lookup<f64> {
        self.0.borrow().resolve_cfi_offset(item, cfi)
    }

    fn element_offset_for_fragment(&self, item: &SpineItem, fragment: &str) -> Lookup<f64> {
        self.0.borrow().element_offset_for_fragment(item, fragment)
    }

    fn node_at_offset(
        &self,
        item: &SpineItem,
        position: SpineItemPosition,
    ) -> Option<NodeLocation> {
        self.0.borrow().node_at_offset(item, position)
    }
}

fn common_prefix(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
