//! Ordered spine item registry and the per-item geometry store.

use serde::{Deserialize, Serialize};

use crate::error::NavigatorError;
use crate::geometry::Size;

/// Declared `rendition:layout` of an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    #[default]
    Reflowable,
    PrePaginated,
}

/// `page-spread-*` affinity declared on the itemref.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageSpread {
    Left,
    Right,
    Center,
}

/// One manifest entry as delivered by the manifest loader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    #[serde(default)]
    pub layout: LayoutMode,
    #[serde(default)]
    pub page_spread: Option<PageSpread>,
}

impl ManifestItem {
    pub fn new(id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            layout: LayoutMode::Reflowable,
            page_spread: None,
        }
    }

    pub fn with_layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_page_spread(mut self, spread: PageSpread) -> Self {
        self.page_spread = Some(spread);
        self
    }
}

/// Ordered reading list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    pub fn new(items: Vec<ManifestItem>) -> Self {
        Self { items }
    }
}

/// A spine item known to the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct SpineItem {
    pub index: usize,
    pub id: String,
    pub href: String,
    pub layout: LayoutMode,
    pub page_spread: Option<PageSpread>,
    /// Last size reported by the renderer; `None` until measured once.
    pub measured: Option<Size>,
    /// Renderer reported vertical writing mode for this item.
    pub vertical_writing: bool,
}

impl SpineItem {
    pub fn is_reflowable(&self) -> bool {
        self.layout == LayoutMode::Reflowable
    }

    /// Size used for layout: zero until measured.
    pub fn known_size(&self) -> Size {
        self.measured.unwrap_or(Size::ZERO)
    }
}

/// How a caller names a spine item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpineItemTarget {
    Index(usize),
    Id(String),
}

impl From<usize> for SpineItemTarget {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl From<&str> for SpineItemTarget {
    fn from(value: &str) -> Self {
        Self::Id(value.to_string())
    }
}

/// Ordered items of the loaded manifest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpineItemRegistry {
    items: Vec<SpineItem>,
}

impl SpineItemRegistry {
    /// Build a registry from a manifest. Ids must be unique.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, NavigatorError> {
        let mut items: Vec<SpineItem> = Vec::with_capacity(manifest.items.len());
        for (index, entry) in manifest.items.iter().enumerate() {
            if items.iter().any(|item| item.id == entry.id) {
                return Err(NavigatorError::DuplicateItemId(entry.id.clone()));
            }
            items.push(SpineItem {
                index,
                id: entry.id.clone(),
                href: entry.href.clone(),
                layout: entry.layout,
                page_spread: entry.page_spread,
                measured: None,
                vertical_writing: false,
            });
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&SpineItem> {
        self.items.get(index)
    }

    pub fn index_of_id(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Resolve a target to an index. Index targets clamp into range; unknown
    /// ids resolve to `None`.
    pub fn resolve(&self, target: &SpineItemTarget) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        match target {
            SpineItemTarget::Index(index) => Some((*index).min(self.items.len() - 1)),
            SpineItemTarget::Id(id) => self.index_of_id(id),
        }
    }

    /// Record a renderer measurement.
    pub fn set_measurement(&mut self, index: usize, size: Size, vertical_writing: bool) {
        if let Some(item) = self.items.get_mut(index) {
            item.measured = Some(size.sanitized());
            item.vertical_writing = vertical_writing;
        }
    }

    /// Resolve an href (fragment ignored) against item hrefs.
    ///
    /// Matches exact hrefs first, then normalized relative paths, then a
    /// unique basename.
    pub fn find_by_href(&self, href: &str) -> Option<usize> {
        let (base_href, _) = split_href_fragment(href);
        if base_href.is_empty() {
            return None;
        }

        if let Some(item) = self.items.iter().find(|item| item.href == base_href) {
            return Some(item.index);
        }

        let normalized_target = normalize_rel_path(base_href);
        if let Some(item) = self
            .items
            .iter()
            .find(|item| normalize_rel_path(&item.href) == normalized_target)
        {
            return Some(item.index);
        }

        let target_basename = basename_of(&normalized_target);
        if target_basename.is_empty() {
            return None;
        }
        let mut candidate: Option<usize> = None;
        for item in &self.items {
            let normalized_item = normalize_rel_path(&item.href);
            if basename_of(&normalized_item) != target_basename {
                continue;
            }
            if candidate.is_some() {
                return None;
            }
            candidate = Some(item.index);
        }
        candidate
    }
}

/// Split `path#fragment`; empty fragments read as absent.
pub fn split_href_fragment(href: &str) -> (&str, Option<&str>) {
    let (base, fragment) = match href.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (href, None),
    };
    let fragment = fragment.filter(|value| !value.is_empty());
    (base, fragment)
}

fn normalize_rel_path(path: &str) -> String {
    let path = path
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(path)
        .replace('\\', "/");
    let mut parts: Vec<&str> = Vec::with_capacity(8);
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn basename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SpineItemRegistry {
        SpineItemRegistry::from_manifest(&Manifest::new(vec![
            ManifestItem::new("cover", "OEBPS/cover.xhtml"),
            ManifestItem::new("c1", "OEBPS/text/ch1.xhtml"),
            ManifestItem::new("c2", "OEBPS/text/ch2.xhtml"),
        ]))
        .expect("registry")
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = SpineItemRegistry::from_manifest(&Manifest::new(vec![
            ManifestItem::new("a", "a.xhtml"),
            ManifestItem::new("a", "b.xhtml"),
        ]))
        .expect_err("duplicate");
        assert!(matches!(err, NavigatorError::DuplicateItemId(id) if id == "a"));
    }

    #[test]
    fn index_targets_clamp() {
        let registry = registry();
        assert_eq!(registry.resolve(&SpineItemTarget::Index(99)), Some(2));
        assert_eq!(registry.resolve(&"c1".into()), Some(1));
        assert_eq!(registry.resolve(&"nope".into()), None);
    }

    #[test]
    fn href_lookup_ignores_fragment_and_normalizes() {
        let registry = registry();
        assert_eq!(registry.find_by_href("OEBPS/text/ch2.xhtml#sec"), Some(2));
        assert_eq!(registry.find_by_href("OEBPS/./text/../text/ch1.xhtml"), Some(1));
        assert_eq!(registry.find_by_href("ch1.xhtml#x"), Some(1));
        assert_eq!(registry.find_by_href("#only-fragment"), None);
        assert_eq!(registry.find_by_href("missing.xhtml"), None);
    }

    #[test]
    fn ambiguous_basename_does_not_match() {
        let registry = SpineItemRegistry::from_manifest(&Manifest::new(vec![
            ManifestItem::new("a", "one/index.xhtml"),
            ManifestItem::new("b", "two/index.xhtml"),
        ]))
        .expect("registry");
        assert_eq!(registry.find_by_href("index.xhtml"), None);
        assert_eq!(registry.find_by_href("two/index.xhtml"), Some(1));
    }

    #[test]
    fn measurements_are_sanitized() {
        let mut registry = registry();
        assert_eq!(registry.get(0).map(SpineItem::known_size), Some(Size::ZERO));
        registry.set_measurement(0, Size::new(-1.0, 20.0), true);
        let item = registry.get(0).expect("item");
        assert_eq!(item.known_size(), Size::new(0.0, 20.0));
        assert!(item.vertical_writing);
    }
}
