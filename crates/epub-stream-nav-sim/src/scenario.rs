//! JSON scenarios: a book, reader settings and a script of reader actions.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use epub_stream_nav::{
    LockToken, Manifest, ManifestItem, NavigateOutcome, NavigationRecord, NavigationRequest,
    Navigator, NavigatorError, PageTurnMode, PaginationInfo, ReaderSettings, Size,
    UnsafePosition, ViewportDrive,
};
use serde::{Deserialize, Serialize};

use crate::content::{
    ContentError, Flow, SharedRenderer, SimItem, SimRenderer, Typography, XhtmlDocument,
};

/// Scenario load or playback failure.
#[derive(Debug)]
pub enum ScenarioError {
    Json(serde_json::Error),
    Content { item: String, source: ContentError },
    Navigator(NavigatorError),
    /// `unlock` without a matching `lock`.
    NoLockHeld { step: usize },
    UnknownItem { step: usize, item: usize },
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid scenario: {}", err),
            Self::Content { item, source } => write!(f, "item {}: {}", item, source),
            Self::Navigator(err) => write!(f, "navigator error: {}", err),
            Self::NoLockHeld { step } => write!(f, "step {}: unlock without a held lock", step),
            Self::UnknownItem { step, item } => write!(f, "step {}: no spine item {}", step, item),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Content { source, .. } => Some(source),
            Self::Navigator(err) => Some(err),
            Self::NoLockHeld { .. } | Self::UnknownItem { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<NavigatorError> for ScenarioError {
    fn from(value: NavigatorError) -> Self {
        Self::Navigator(value)
    }
}

/// Item content as written in a scenario file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentSpec {
    Xhtml { source: String },
    FixedPage { width: f64, height: f64 },
    Image { width: f64, height: f64 },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ScenarioItem {
    #[serde(flatten)]
    pub manifest: ManifestItem,
    pub content: ContentSpec,
    /// Content is available from the start.
    #[serde(default = "loaded_by_default")]
    pub loaded: bool,
}

fn loaded_by_default() -> bool {
    true
}

/// One scripted reader action. Times are milliseconds since playback start.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Layout,
    Navigate { request: NavigationRequest },
    GoToItem { item: String },
    GoToCfi { cfi: String },
    GoToUrl { url: String },
    GoToPage { page: usize },
    TurnNext,
    TurnPrevious,
    TurnLeft,
    TurnRight,
    Scroll { x: f64, y: f64, at_ms: u64 },
    Settle { at_ms: u64 },
    Lock,
    Unlock,
    Load { item: usize },
    Unload { item: usize },
    Resize { width: f64, height: f64 },
    Configure { settings: ReaderSettings },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Navigate { .. } => "navigate",
            Self::GoToItem { .. } => "go-to-item",
            Self::GoToCfi { .. } => "go-to-cfi",
            Self::GoToUrl { .. } => "go-to-url",
            Self::GoToPage { .. } => "go-to-page",
            Self::TurnNext => "turn-next",
            Self::TurnPrevious => "turn-previous",
            Self::TurnLeft => "turn-left",
            Self::TurnRight => "turn-right",
            Self::Scroll { .. } => "scroll",
            Self::Settle { .. } => "settle",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Load { .. } => "load",
            Self::Unload { .. } => "unload",
            Self::Resize { .. } => "resize",
            Self::Configure { .. } => "configure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: ReaderSettings,
    #[serde(default)]
    pub typography: Typography,
    pub items: Vec<ScenarioItem>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(source: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(source)?)
    }
}

/// What happened during one step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: &'static str,
    /// `published`, `deferred`, `layout-changed`, `unchanged` or `none`.
    pub outcome: &'static str,
    pub drive: Option<ViewportDrive>,
    /// Records delivered to subscribers during the step, in order.
    pub published: Vec<NavigationRecord>,
    pub current: Option<NavigationRecord>,
    pub pagination: Option<PaginationInfo>,
}

/// Plays a scenario against a navigator over simulated content.
pub struct ScenarioRunner {
    navigator: Navigator,
    renderer: SharedRenderer,
    published: Rc<RefCell<Vec<NavigationRecord>>>,
    locks: Vec<LockToken>,
    started: Instant,
}

impl ScenarioRunner {
    /// Parse item content, build the navigator and run the initial layout.
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        let mut sim = SimRenderer::new(scenario.typography, flow_for(&scenario.settings));
        for item in &scenario.items {
            let content = match &item.content {
                ContentSpec::Xhtml { source } => {
                    SimItem::Xhtml(XhtmlDocument::parse(source).map_err(|source| {
                        ScenarioError::Content {
                            item: item.manifest.id.clone(),
                            source,
                        }
                    })?)
                }
                ContentSpec::FixedPage { width, height } => SimItem::FixedPage {
                    width: *width,
                    height: *height,
                },
                ContentSpec::Image { width, height } => SimItem::Image {
                    width: *width,
                    height: *height,
                },
            };
            sim.push(content, item.loaded);
        }

        let renderer = SharedRenderer::new(sim);
        let items = scenario.items.iter().map(|item| item.manifest.clone());
        let manifest = Manifest::new(items.collect());
        let mut navigator = Navigator::new(&manifest, scenario.settings, renderer.clone())?;
        let published = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&published);
        navigator.subscribe(move |record| sink.borrow_mut().push(record.clone()));
        navigator.layout();
        log::info!("scenario loaded: {} items", scenario.items.len());

        Ok(Self {
            navigator,
            renderer,
            published,
            locks: Vec::new(),
            started: Instant::now(),
        })
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Run every step, stopping at the first error.
    pub fn run(&mut self, steps: &[Step]) -> Result<Vec<StepReport>, ScenarioError> {
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.apply(index, step))
            .collect()
    }

    pub fn apply(&mut self, index: usize, step: &Step) -> Result<StepReport, ScenarioError> {
        log::debug!("step {}: {}", index, step.name());
        let (outcome, drive) = match step {
            Step::Layout => layout_result(self.navigator.layout().has_changed),
            Step::Navigate { request } => {
                navigate_result(Some(self.navigator.navigate(request.clone())))
            }
            Step::GoToItem { item } => {
                navigate_result(Some(self.navigator.go_to_spine_item(item.as_str())))
            }
            Step::GoToCfi { cfi } => navigate_result(Some(self.navigator.go_to_cfi(cfi.clone()))),
            Step::GoToUrl { url } => navigate_result(Some(self.navigator.go_to_url(url.clone()))),
            Step::GoToPage { page } => {
                navigate_result(self.navigator.go_to_absolute_page_index(*page))
            }
            Step::TurnNext => navigate_result(self.navigator.turn_next()),
            Step::TurnPrevious => navigate_result(self.navigator.turn_previous()),
            Step::TurnLeft => navigate_result(self.navigator.turn_left()),
            Step::TurnRight => navigate_result(self.navigator.turn_right()),
            Step::Scroll { x, y, at_ms } => {
                let at = self.at(*at_ms);
                self.navigator.scrolled(UnsafePosition::new(*x, *y), at);
                ("none", None)
            }
            Step::Settle { at_ms } => {
                let at = self.at(*at_ms);
                navigate_result(self.navigator.poll_scroll(at))
            }
            Step::Lock => {
                self.locks.push(self.navigator.lock());
                ("none", None)
            }
            Step::Unlock => {
                let token = self.locks.pop().ok_or(ScenarioError::NoLockHeld { step: index })?;
                match self.navigator.unlock(token) {
                    Some(drive) => ("published", Some(drive)),
                    None => ("none", None),
                }
            }
            Step::Load { item } => {
                if !self.renderer.load(*item) {
                    return Err(ScenarioError::UnknownItem {
                        step: index,
                        item: *item,
                    });
                }
                let changed = self.navigator.layout().has_changed;
                match self.navigator.notify_item_ready(*item) {
                    Some(outcome) => navigate_result(Some(outcome)),
                    None => layout_result(changed),
                }
            }
            Step::Unload { item } => {
                if *item >= self.renderer.len() {
                    return Err(ScenarioError::UnknownItem {
                        step: index,
                        item: *item,
                    });
                }
                self.renderer.unload(*item);
                ("none", None)
            }
            Step::Resize { width, height } => {
                let mut settings = *self.navigator.settings();
                settings.viewport = Size::new(*width, *height);
                self.configure(settings)?
            }
            Step::Configure { settings } => self.configure(*settings)?,
        };

        let published = core::mem::take(&mut *self.published.borrow_mut());
        Ok(StepReport {
            step: index,
            action: step.name(),
            outcome,
            drive,
            published,
            current: self.navigator.current_record().cloned(),
            pagination: self.navigator.pagination().cloned(),
        })
    }

    fn configure(
        &mut self,
        settings: ReaderSettings,
    ) -> Result<(&'static str, Option<ViewportDrive>), ScenarioError> {
        self.renderer.set_flow(flow_for(&settings));
        let outcome = self.navigator.set_settings(settings)?;
        Ok(layout_result(outcome.has_changed))
    }

    fn at(&self, millis: u64) -> Instant {
        self.started + Duration::from_millis(millis)
    }
}

fn flow_for(settings: &ReaderSettings) -> Flow {
    match settings.page_turn_mode {
        PageTurnMode::Controlled => Flow::Paged,
        PageTurnMode::Scrollable => Flow::Scrolled,
    }
}

fn navigate_result(outcome: Option<NavigateOutcome>) -> (&'static str, Option<ViewportDrive>) {
    match outcome {
        Some(NavigateOutcome::Published { drive, .. }) => ("published", drive),
        Some(NavigateOutcome::Deferred(_)) => ("deferred", None),
        None => ("none", None),
    }
}

fn layout_result(changed: bool) -> (&'static str, Option<ViewportDrive>) {
    if changed {
        ("layout-changed", None)
    } else {
        ("unchanged", None)
    }
}
