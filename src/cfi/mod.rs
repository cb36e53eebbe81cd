//! EPUB CFI codec.
//!
//! Canonical Fragment Identifiers are the portable addresses of this crate:
//! plain strings that survive reload and reflow. Supported syntax:
//!
//! - steps `/N` with optional id assertions `/N[id]`
//! - indirection `!` into the content document of a spine item
//! - character offsets `:N` with optional text assertions `:N[before,after;s=b]`
//! - temporal `~S` and spatial `@X:Y` offsets
//! - ranges `epubcfi(parent,start,end)`
//! - `^` escapes inside assertions
//!
//! On top of the base grammar, this crate appends private segments
//! (`|[nav~item~3][nav~offset~120]`) that record the spine item index and an
//! in-item pixel offset hint. They are stripped before the base grammar runs
//! and re-attached by [`Cfi`]'s `Display`.
//!
//! # Usage
//!
//! ```rust
//! use epub_stream_nav::cfi::{self, CfiStep, NodeLocation};
//!
//! let location = NodeLocation::new(2, "chapter-3")
//!     .with_steps(vec![CfiStep::new(4), CfiStep::with_id(10, "para-5"), CfiStep::new(1)])
//!     .with_char_offset(17);
//! let address = cfi::generate(&location);
//! assert_eq!(
//!     address,
//!     "epubcfi(/6/6[chapter-3]!/4/10[para-5]/1:17|[nav~item~2])"
//! );
//! let parsed = cfi::parse(&address).expect("valid cfi");
//! assert_eq!(parsed.item_hint().index, Some(2));
//! assert_eq!(parsed.to_string(), address);
//! assert!(!cfi::is_root(&address));
//! assert!(cfi::is_root(&cfi::generate_root(2, "chapter-3")));
//! ```

mod extension;
mod parser;

use core::fmt;
use core::str::FromStr;

use smallvec::SmallVec;

pub use extension::PrivateSegment;

/// Step index of the package document's `<spine>` element.
const SPINE_STEP: u32 = 6;
/// Content step marking a root address: never produced for a real node.
const ROOT_CONTENT_STEP: u32 = 0;

const ITEM_KEY: &str = "item";
const OFFSET_KEY: &str = "offset";

/// Parse failure with the byte position it was detected at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CfiError {
    pub kind: CfiErrorKind,
    pub position: usize,
}

/// What went wrong while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CfiErrorKind {
    /// Input is neither `epubcfi(...)` nor a bare `/` path.
    MissingPrefix,
    /// `epubcfi(` without its closing parenthesis.
    UnbalancedParenthesis,
    /// A digit sequence was required.
    ExpectedInteger,
    /// A decimal number was required.
    ExpectedNumber,
    /// Input ended in the middle of a construct.
    UnexpectedEnd,
    /// A character that cannot appear here.
    UnexpectedCharacter(char),
    /// `[` without a matching `]`.
    UnterminatedAssertion,
    /// Private segment block that is not a list of `[nav~key~value]`.
    InvalidExtension,
}

impl fmt::Display for CfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CfiErrorKind::MissingPrefix => write!(f, "expected 'epubcfi(' or '/'"),
            CfiErrorKind::UnbalancedParenthesis => write!(f, "missing closing ')'"),
            CfiErrorKind::ExpectedInteger => write!(f, "expected integer"),
            CfiErrorKind::ExpectedNumber => write!(f, "expected number"),
            CfiErrorKind::UnexpectedEnd => write!(f, "unexpected end of input"),
            CfiErrorKind::UnexpectedCharacter(ch) => write!(f, "unexpected character {:?}", ch),
            CfiErrorKind::UnterminatedAssertion => write!(f, "unterminated assertion"),
            CfiErrorKind::InvalidExtension => write!(f, "invalid private segment"),
        }?;
        write!(f, " at byte {}", self.position)
    }
}

impl std::error::Error for CfiError {}

/// Bracketed assertion: comma separated values plus `;key=value` parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assertion {
    pub values: Vec<String>,
    pub params: Vec<(String, String)>,
}

impl Assertion {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            values: vec![id.into()],
            params: Vec::new(),
        }
    }

    /// First value, which is the element id for step assertions.
    pub fn first(&self) -> Option<&str> {
        self.values
            .first()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One `/N[assertion]` step. `indirection` marks a step reached through `!`.
#[derive(Clone, Debug, PartialEq)]
pub struct CfiStep {
    pub index: u32,
    pub assertion: Option<Assertion>,
    pub indirection: bool,
}

impl CfiStep {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            assertion: None,
            indirection: false,
        }
    }

    pub fn with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            index,
            assertion: Some(Assertion::id(id)),
            indirection: false,
        }
    }

    fn indirected(mut self) -> Self {
        self.indirection = true;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.assertion.as_ref().and_then(Assertion::first)
    }
}

/// Terminal offset of a path.
#[derive(Clone, Debug, PartialEq)]
pub enum CfiOffset {
    /// `:N` character offset into a text node.
    Character {
        offset: u32,
        assertion: Option<Assertion>,
    },
    /// `~S` media time, optionally with a spatial point.
    Temporal { seconds: f64, point: Option<(f64, f64)> },
    /// `@X:Y` point in an image or fixed-layout page.
    Spatial { x: f64, y: f64 },
}

/// Steps plus an optional terminal offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CfiPath {
    pub steps: SmallVec<[CfiStep; 8]>,
    pub offset: Option<CfiOffset>,
}

impl CfiPath {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.offset.is_none()
    }
}

/// `,start,end` part of a range CFI, relative to the parent path.
#[derive(Clone, Debug, PartialEq)]
pub struct CfiRange {
    pub start: CfiPath,
    pub end: CfiPath,
}

/// Parsed address.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cfi {
    pub path: CfiPath,
    pub range: Option<CfiRange>,
    pub private: Vec<PrivateSegment>,
}

/// Spine item identity carried by an address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemHint {
    pub index: Option<usize>,
    pub id: Option<String>,
}

impl ItemHint {
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.id.is_none()
    }
}

impl Cfi {
    /// Parsed from blank input: carries no information.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.range.is_none() && self.private.is_empty()
    }

    /// Itemref step of the package document path (`/6/N`), if present.
    pub fn itemref_step(&self) -> Option<&CfiStep> {
        let steps = &self.path.steps;
        match (steps.first(), steps.get(1)) {
            (Some(spine), Some(itemref)) if spine.index == SPINE_STEP && !itemref.indirection => {
                Some(itemref)
            }
            _ => None,
        }
    }

    /// Steps inside the content document, after the first indirection.
    pub fn content_steps(&self) -> &[CfiStep] {
        let steps = &self.path.steps;
        match steps.iter().position(|step| step.indirection) {
            Some(first) => &steps[first..],
            None => &[],
        }
    }

    /// Spine item identity from the private `item` key, the itemref step
    /// index and its id assertion.
    pub fn item_hint(&self) -> ItemHint {
        let itemref = self.itemref_step();
        let index = self
            .private_value(ITEM_KEY)
            .and_then(|value| value.parse::<usize>().ok())
            .or_else(|| {
                itemref
                    .map(|step| step.index)
                    .filter(|index| *index >= 2 && index % 2 == 0)
                    .map(|index| (index / 2 - 1) as usize)
            });
        ItemHint {
            index,
            id: itemref.and_then(CfiStep::id).map(ToOwned::to_owned),
        }
    }

    /// In-item pixel offset recorded by the private `offset` key.
    pub fn offset_hint(&self) -> Option<f64> {
        self.private_value(OFFSET_KEY)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    /// True for the placeholder produced by [`generate_root`].
    pub fn is_root(&self) -> bool {
        let content = self.content_steps();
        self.range.is_none()
            && self.path.offset.is_none()
            && content.len() == 1
            && content[0].index == ROOT_CONTENT_STEP
            && content[0].assertion.is_none()
    }

    pub fn private_value(&self, key: &str) -> Option<&str> {
        self.private
            .iter()
            .find(|segment| segment.key == key)
            .map(|segment| segment.value.as_str())
    }

    /// Replace or add a private segment.
    pub fn set_private(&mut self, key: &str, value: String) {
        match self.private.iter_mut().find(|segment| segment.key == key) {
            Some(segment) => segment.value = value,
            None => self.private.push(PrivateSegment {
                key: key.to_string(),
                value,
            }),
        }
    }
}

impl FromStr for Cfi {
    type Err = CfiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epubcfi(")?;
        write_path(f, &self.path)?;
        if let Some(range) = &self.range {
            f.write_str(",")?;
            write_path(f, &range.start)?;
            f.write_str(",")?;
            write_path(f, &range.end)?;
        }
        extension::write_segments(f, &self.private)?;
        f.write_str(")")
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &CfiPath) -> fmt::Result {
    for step in &path.steps {
        if step.indirection {
            f.write_str("!")?;
        }
        write!(f, "/{}", step.index)?;
        if let Some(assertion) = &step.assertion {
            write_assertion(f, assertion)?;
        }
    }
    match &path.offset {
        Some(CfiOffset::Character { offset, assertion }) => {
            write!(f, ":{}", offset)?;
            if let Some(assertion) = assertion {
                write_assertion(f, assertion)?;
            }
        }
        Some(CfiOffset::Temporal { seconds, point }) => {
            write!(f, "~{}", seconds)?;
            if let Some((x, y)) = point {
                write!(f, "@{}:{}", x, y)?;
            }
        }
        Some(CfiOffset::Spatial { x, y }) => write!(f, "@{}:{}", x, y)?,
        None => {}
    }
    Ok(())
}

fn write_assertion(f: &mut fmt::Formatter<'_>, assertion: &Assertion) -> fmt::Result {
    f.write_str("[")?;
    for (idx, value) in assertion.values.iter().enumerate() {
        if idx > 0 {
            f.write_str(",")?;
        }
        write_escaped(f, value)?;
    }
    for (key, value) in &assertion.params {
        f.write_str(";")?;
        write_escaped(f, key)?;
        f.write_str("=")?;
        write_escaped(f, value)?;
    }
    f.write_str("]")
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if matches!(ch, '^' | '[' | ']' | '(' | ')' | ',' | ';' | '=') {
            f.write_str("^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}

/// Location of a node inside a spine item, as reported by a renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeLocation {
    pub item_index: usize,
    pub item_id: String,
    /// Content document steps, already in CFI numbering (elements even,
    /// text nodes odd).
    pub steps: Vec<CfiStep>,
    pub char_offset: Option<u32>,
    /// In-item pixel offset along the reading axis.
    pub offset_hint: Option<f64>,
}

impl NodeLocation {
    pub fn new(item_index: usize, item_id: impl Into<String>) -> Self {
        Self {
            item_index,
            item_id: item_id.into(),
            steps: Vec::new(),
            char_offset: None,
            offset_hint: None,
        }
    }

    pub fn with_steps(mut self, steps: Vec<CfiStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_char_offset(mut self, offset: u32) -> Self {
        self.char_offset = Some(offset);
        self
    }

    pub fn with_offset_hint(mut self, offset: f64) -> Self {
        self.offset_hint = Some(offset);
        self
    }
}

/// Parse an address. Blank input yields an empty [`Cfi`]; only malformed
/// syntax is an error.
pub fn parse(input: &str) -> Result<Cfi, CfiError> {
    parser::parse(input)
}

/// Parse for consumers that treat malformed input as "no information".
pub fn parse_lenient(input: &str) -> Option<Cfi> {
    match parse(input) {
        Ok(cfi) if cfi.is_empty() => None,
        Ok(cfi) => Some(cfi),
        Err(err) => {
            log::debug!("ignoring unparseable cfi {:?}: {}", input, err);
            None
        }
    }
}

fn package_prefix(item_index: usize, item_id: &str) -> SmallVec<[CfiStep; 8]> {
    let itemref_index = (item_index as u32).saturating_add(1).saturating_mul(2);
    let mut steps: SmallVec<[CfiStep; 8]> = SmallVec::new();
    steps.push(CfiStep::new(SPINE_STEP));
    if item_id.is_empty() {
        steps.push(CfiStep::new(itemref_index));
    } else {
        steps.push(CfiStep::with_id(itemref_index, item_id));
    }
    steps
}

/// Build the address of a node.
pub fn generate(location: &NodeLocation) -> String {
    let mut steps = package_prefix(location.item_index, &location.item_id);
    let mut content = location.steps.iter().cloned();
    match content.next() {
        Some(first) => {
            steps.push(first.indirected());
            steps.extend(content.map(|mut step| {
                step.indirection = false;
                step
            }));
        }
        None => steps.push(CfiStep::new(ROOT_CONTENT_STEP).indirected()),
    }
    let mut cfi = Cfi {
        path: CfiPath {
            steps,
            offset: location.char_offset.map(|offset| CfiOffset::Character {
                offset,
                assertion: None,
            }),
        },
        range: None,
        private: Vec::new(),
    };
    cfi.set_private(ITEM_KEY, location.item_index.to_string());
    if let Some(hint) = location.offset_hint.filter(|value| value.is_finite()) {
        cfi.set_private(OFFSET_KEY, hint.to_string());
    }
    cfi.to_string()
}

/// Placeholder address for an item whose content is not loaded yet.
pub fn generate_root(item_index: usize, item_id: &str) -> String {
    let mut steps = package_prefix(item_index, item_id);
    steps.push(CfiStep::new(ROOT_CONTENT_STEP).indirected());
    let mut cfi = Cfi {
        path: CfiPath {
            steps,
            offset: None,
        },
        range: None,
        private: Vec::new(),
    };
    cfi.set_private(ITEM_KEY, item_index.to_string());
    cfi.to_string()
}

/// True iff `address` was produced by [`generate_root`]. Malformed input is
/// not a root address.
pub fn is_root(address: &str) -> bool {
    parse(address).map(|cfi| cfi.is_root()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_numbers_itemref_from_index() {
        let address = generate(&NodeLocation::new(0, "c0").with_steps(vec![CfiStep::new(4)]));
        assert_eq!(address, "epubcfi(/6/2[c0]!/4|[nav~item~0])");
        let address = generate(&NodeLocation::new(9, ""));
        assert_eq!(address, "epubcfi(/6/20!/0|[nav~item~9])");
    }

    #[test]
    fn node_without_steps_is_root() {
        // No node information means the item is all that is known.
        let address = generate(&NodeLocation::new(1, "c1"));
        assert!(is_root(&address));
        assert_eq!(address, generate_root(1, "c1"));
    }

    #[test]
    fn root_detection_requires_bare_zero_step() {
        assert!(is_root("epubcfi(/6/4[c1]!/0)"));
        assert!(!is_root("epubcfi(/6/4[c1]!/0:3)"));
        assert!(!is_root("epubcfi(/6/4[c1]!/0[x])"));
        assert!(!is_root("epubcfi(/6/4[c1]!/4/0)"));
        assert!(!is_root("epubcfi(/6/4[c1])"));
        assert!(!is_root("not a cfi"));
        assert!(!is_root(""));
    }

    #[test]
    fn item_hint_prefers_private_index() {
        let cfi = parse("epubcfi(/6/4[c1]!/4/2|[nav~item~7])").expect("cfi");
        assert_eq!(
            cfi.item_hint(),
            ItemHint {
                index: Some(7),
                id: Some("c1".to_string())
            }
        );
        let cfi = parse("epubcfi(/6/4!/4/2)").expect("cfi");
        assert_eq!(cfi.item_hint().index, Some(1));
        assert_eq!(cfi.item_hint().id, None);
        let cfi = parse("epubcfi(/4/2)").expect("cfi");
        assert!(cfi.item_hint().is_empty());
    }

    #[test]
    fn odd_itemref_step_has_no_index() {
        let cfi = parse("epubcfi(/6/3!/4)").expect("cfi");
        assert_eq!(cfi.item_hint().index, None);
    }

    #[test]
    fn offset_hint_round_trips() {
        let address = generate(
            &NodeLocation::new(3, "c3")
                .with_steps(vec![CfiStep::new(4), CfiStep::new(1)])
                .with_char_offset(5)
                .with_offset_hint(412.5),
        );
        assert_eq!(
            address,
            "epubcfi(/6/8[c3]!/4/1:5|[nav~item~3][nav~offset~412.5])"
        );
        let cfi = parse(&address).expect("cfi");
        assert_eq!(cfi.offset_hint(), Some(412.5));
        assert_eq!(cfi.to_string(), address);
    }

    #[test]
    fn escaped_ids_survive_display() {
        let address = generate(
            &NodeLocation::new(0, "a[b]").with_steps(vec![CfiStep::with_id(4, "x,y;z=1")]),
        );
        assert_eq!(
            address,
            "epubcfi(/6/2[a^[b^]]!/4[x^,y^;z^=1]|[nav~item~0])"
        );
        let cfi = parse(&address).expect("cfi");
        assert_eq!(cfi.item_hint().id.as_deref(), Some("a[b]"));
        assert_eq!(cfi.content_steps()[0].id(), Some("x,y;z=1"));
    }

    #[test]
    fn lenient_parse_swallows_garbage() {
        assert!(parse_lenient("epubcfi(/6/4").is_none());
        assert!(parse_lenient("   ").is_none());
        assert!(parse_lenient("epubcfi(/6/4[c1]!/4)").is_some());
    }
}
