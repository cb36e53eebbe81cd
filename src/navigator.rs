//! Reader session: owns layout, the current record and the hooks.
//!
//! The navigator is the single owner of mutable positioning state. Every
//! other component reads an immutable snapshot or the current record.

use core::ops::Range;
use std::time::Instant;

use crate::error::NavigatorError;
use crate::geometry::UnsafePosition;
use crate::layout::{LayoutOutcome, LayoutSnapshot, SpineLayout};
use crate::locator::Locator;
use crate::navigation::lock::{LockRelease, LockToken, NavigationLock};
use crate::navigation::pipeline::{self, PipelineContext, PipelineOutcome};
use crate::navigation::record::{
    NavigationDirection, NavigationId, NavigationKind, NavigationRecord, NavigationRequest,
    TriggeredBy,
};
use crate::navigation::restoration;
use crate::navigation::scroll::ScrollSettler;
use crate::pagination::PaginationInfo;
use crate::renderer::{Animation, ItemRenderer, ViewportDrive, ViewportDriver};
use crate::resolver::{Resolver, StepDirection, TurnSide};
use crate::settings::ReaderSettings;
use crate::spine::{Manifest, SpineItemRegistry, SpineItemTarget};

/// Handle returned by [`Navigator::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&NavigationRecord)>;

/// Result of [`Navigator::navigate`].
#[derive(Clone, Debug, PartialEq)]
pub enum NavigateOutcome {
    /// The record is now authoritative. `drive` is the viewport move that
    /// was applied, if any.
    Published {
        record: NavigationRecord,
        drive: Option<ViewportDrive>,
    },
    /// Waiting for content; retried on the next layout or item-ready signal.
    Deferred(NavigationId),
}

impl NavigateOutcome {
    pub fn record(&self) -> Option<&NavigationRecord> {
        match self {
            Self::Published { record, .. } => Some(record),
            Self::Deferred(_) => None,
        }
    }

    pub fn drive(&self) -> Option<&ViewportDrive> {
        match self {
            Self::Published { drive, .. } => drive.as_ref(),
            Self::Deferred(_) => None,
        }
    }
}

pub struct Navigator {
    settings: ReaderSettings,
    registry: SpineItemRegistry,
    layout: SpineLayout,
    renderer: Box<dyn ItemRenderer>,
    driver: Option<Box<dyn ViewportDriver>>,
    current: Option<NavigationRecord>,
    pagination: Option<PaginationInfo>,
    next_id: u64,
    lock: NavigationLock,
    restoration_held: bool,
    deferred: Option<(NavigationId, NavigationRequest)>,
    scroll: ScrollSettler,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    #[cfg(feature = "async")]
    watch: tokio::sync::watch::Sender<Option<NavigationRecord>>,
}

impl Navigator {
    /// Build a session. Settings are validated once here.
    pub fn new(
        manifest: &Manifest,
        settings: ReaderSettings,
        renderer: impl ItemRenderer + 'static,
    ) -> Result<Self, NavigatorError> {
        settings.validate()?;
        let registry = SpineItemRegistry::from_manifest(manifest)?;
        log::debug!(
            "navigator over {} spine items, viewport {}x{}",
            registry.len(),
            settings.viewport.width,
            settings.viewport.height
        );
        #[cfg(feature = "async")]
        let (watch, _) = tokio::sync::watch::channel(None);
        Ok(Self {
            layout: SpineLayout::new(settings),
            scroll: ScrollSettler::new(settings.scroll_settle),
            settings,
            registry,
            renderer: Box::new(renderer),
            driver: None,
            current: None,
            pagination: None,
            next_id: 0,
            lock: NavigationLock::new(),
            restoration_held: false,
            deferred: None,
            subscribers: Vec::new(),
            next_subscription: 0,
            #[cfg(feature = "async")]
            watch,
        })
    }

    pub fn with_viewport_driver(mut self, driver: impl ViewportDriver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Replace settings and lay the book out again.
    pub fn set_settings(
        &mut self,
        settings: ReaderSettings,
    ) -> Result<LayoutOutcome, NavigatorError> {
        settings.validate()?;
        self.settings = settings;
        self.scroll.set_window(settings.scroll_settle);
        Ok(self.layout())
    }

    pub fn registry(&self) -> &SpineItemRegistry {
        &self.registry
    }

    pub fn layout_snapshot(&self) -> &LayoutSnapshot {
        self.layout.snapshot()
    }

    pub fn locator(&self) -> Locator<'_> {
        Locator::new(self.layout.snapshot())
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.locator(), &self.registry)
    }

    pub fn renderer(&self) -> &dyn ItemRenderer {
        self.renderer.as_ref()
    }

    /// Mutable renderer access, e.g. to hand it freshly loaded content.
    /// Call [`Navigator::layout`] or [`Navigator::notify_item_ready`] after.
    pub fn renderer_mut(&mut self) -> &mut dyn ItemRenderer {
        self.renderer.as_mut()
    }

    pub fn current_record(&self) -> Option<&NavigationRecord> {
        self.current.as_ref()
    }

    pub fn pagination(&self) -> Option<&PaginationInfo> {
        self.pagination.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn has_deferred_navigation(&self) -> bool {
        self.deferred.is_some()
    }

    /// Run a layout pass. When boxes changed, the current record is restored
    /// (or held until the lock is released) and deferred navigations retry.
    pub fn layout(&mut self) -> LayoutOutcome {
        let outcome = self
            .layout
            .layout(&mut self.registry, &self.settings, self.renderer.as_mut());
        if outcome.has_changed {
            if self.lock.is_locked() {
                log::debug!("layout changed while locked, holding restoration");
                self.restoration_held = true;
            } else if let Some(restored) = self.restored_record() {
                self.publish(restored);
            }
        }
        if self.retry_deferred().is_none() && !outcome.has_changed {
            self.refresh_pagination();
        }
        outcome
    }

    /// Consolidate and publish a request. Supersedes any deferred
    /// navigation and any restoration held by the lock.
    pub fn navigate(&mut self, request: NavigationRequest) -> NavigateOutcome {
        self.restoration_held = false;
        if let Some((id, _)) = self.deferred.take() {
            log::debug!("navigation {:?} superseded", id);
        }
        if request.kind == NavigationKind::Api {
            self.scroll.cancel();
        }
        let id = self.next_navigation_id();
        self.consolidate_and_publish(id, request)
    }

    /// Content for an item finished loading.
    pub fn notify_item_ready(&mut self, index: usize) -> Option<NavigateOutcome> {
        log::debug!("spine item {} ready", index);
        self.retry_deferred()
    }

    /// Take a lock. Records published while any lock is held do not move
    /// the viewport and restoration waits.
    pub fn lock(&mut self) -> LockToken {
        self.lock.acquire()
    }

    /// Release a lock. When the last holder leaves, held restoration runs
    /// and the current record is re-emitted with a snap.
    pub fn unlock(&mut self, token: LockToken) -> Option<ViewportDrive> {
        if self.lock.release(token) != LockRelease::Released {
            return None;
        }
        if std::mem::take(&mut self.restoration_held) {
            if let Some(restored) = self.restored_record() {
                self.set_current(restored);
            }
        }
        let mut snapped = self.current.clone()?;
        snapped.animation = Animation::Snap;
        let drive = pipeline::snap_drive(&snapped);
        if let Some(driver) = self.driver.as_mut() {
            driver.drive(&drive);
        }
        self.set_current(snapped);
        self.refresh_pagination();
        Some(drive)
    }

    /// Feed a raw scroll position. Nothing is published until the settle
    /// window passed; see [`Navigator::poll_scroll`].
    pub fn scrolled(&mut self, position: UnsafePosition, now: Instant) {
        self.scroll.push(position, now);
    }

    /// Publish the settled scroll position, if the burst is over.
    pub fn poll_scroll(&mut self, now: Instant) -> Option<NavigateOutcome> {
        let position = self.scroll.poll(now)?;
        Some(self.navigate(NavigationRequest::scroll(position)))
    }

    pub fn subscribe(
        &mut self,
        subscriber: impl FnMut(&NavigationRecord) + 'static,
    ) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(subscription, _)| *subscription != id);
        before != self.subscribers.len()
    }

    /// Receiver that always holds the latest record.
    #[cfg(feature = "async")]
    pub fn watch(&self) -> tokio::sync::watch::Receiver<Option<NavigationRecord>> {
        self.watch.subscribe()
    }

    /// Items to keep loaded around the current position.
    pub fn preload_window(&self) -> Range<usize> {
        let position = self
            .current
            .as_ref()
            .map(|record| record.position.to_unsafe())
            .unwrap_or(UnsafePosition::ORIGIN);
        self.locator()
            .preload_window(position, self.settings.preload_radius)
    }

    pub fn turn_next(&mut self) -> Option<NavigateOutcome> {
        self.turn(StepDirection::Forward)
    }

    pub fn turn_previous(&mut self) -> Option<NavigateOutcome> {
        self.turn(StepDirection::Backward)
    }

    pub fn turn_left(&mut self) -> Option<NavigateOutcome> {
        let direction = self.resolver().direction_for_side(TurnSide::Left);
        self.turn(direction)
    }

    pub fn turn_right(&mut self) -> Option<NavigateOutcome> {
        let direction = self.resolver().direction_for_side(TurnSide::Right);
        self.turn(direction)
    }

    pub fn go_to_spine_item(&mut self, target: impl Into<SpineItemTarget>) -> NavigateOutcome {
        self.navigate(NavigationRequest::to_spine_item(target))
    }

    pub fn go_to_page_of_spine_item(
        &mut self,
        item_index: usize,
        page_index: usize,
    ) -> NavigateOutcome {
        let position = self.resolver().for_item_page(item_index, page_index);
        self.navigate(
            NavigationRequest::to_position(position.to_unsafe()).with_spine_item(item_index),
        )
    }

    /// Jump to an absolute page; out of range indices clamp to the last page.
    pub fn go_to_absolute_page_index(
        &mut self,
        absolute_page_index: usize,
    ) -> Option<NavigateOutcome> {
        let locator = self.locator();
        let last = locator.total_pages().checked_sub(1)?;
        let page = locator.page_for_absolute_index(absolute_page_index.min(last))?;
        Some(self.go_to_page_of_spine_item(page.item_index, page.page_index))
    }

    pub fn go_to_cfi(&mut self, cfi: impl Into<String>) -> NavigateOutcome {
        self.navigate(NavigationRequest::to_cfi(cfi))
    }

    pub fn go_to_url(&mut self, url: impl Into<String>) -> NavigateOutcome {
        self.navigate(NavigationRequest::to_url(url))
    }

    fn turn(&mut self, direction: StepDirection) -> Option<NavigateOutcome> {
        let resolver = self.resolver();
        let from = self
            .current
            .as_ref()
            .map(|record| record.position.to_unsafe())
            .unwrap_or(UnsafePosition::ORIGIN);
        let Some(target) = resolver.step(resolver.clamp(from), direction) else {
            log::debug!("page turn {:?} stopped at the end of the book", direction);
            return None;
        };
        let direction = match direction {
            StepDirection::Forward => NavigationDirection::Forward,
            StepDirection::Backward => NavigationDirection::Backward,
        };
        Some(
            self.navigate(
                NavigationRequest::to_position(target.position.to_unsafe())
                    .with_spine_item(target.spine_item)
                    .with_direction(direction),
            ),
        )
    }

    fn next_navigation_id(&mut self) -> NavigationId {
        self.next_id += 1;
        NavigationId(self.next_id)
    }

    fn run_pipeline(&self, id: NavigationId, request: NavigationRequest) -> PipelineOutcome {
        let context = PipelineContext {
            resolver: self.resolver(),
            renderer: self.renderer.as_ref(),
            previous: self.current.as_ref(),
            locked: self.lock.is_locked(),
        };
        pipeline::consolidate(id, request, &context)
    }

    fn consolidate_and_publish(
        &mut self,
        id: NavigationId,
        request: NavigationRequest,
    ) -> NavigateOutcome {
        match self.run_pipeline(id, request.clone()) {
            PipelineOutcome::Ready(record) => {
                let drive = self.publish(record.clone());
                NavigateOutcome::Published { record, drive }
            }
            PipelineOutcome::Deferred(id) => {
                self.deferred = Some((id, request));
                NavigateOutcome::Deferred(id)
            }
        }
    }

    fn retry_deferred(&mut self) -> Option<NavigateOutcome> {
        let (id, request) = self.deferred.take()?;
        log::debug!("retrying deferred navigation {:?}", id);
        Some(self.consolidate_and_publish(id, request))
    }

    fn restored_record(&mut self) -> Option<NavigationRecord> {
        let id = self.next_navigation_id();
        let current = self.current.as_ref()?;
        Some(restoration::restore(
            current,
            id,
            &self.resolver(),
            self.renderer.as_ref(),
        ))
    }

    /// Stage 10: make `record` authoritative and drive the viewport.
    fn publish(&mut self, record: NavigationRecord) -> Option<ViewportDrive> {
        let drive = pipeline::viewport_drive(&record, self.current.as_ref(), self.lock.is_locked());
        if let (Some(drive), Some(driver)) = (drive.as_ref(), self.driver.as_mut()) {
            driver.drive(drive);
        }
        log::debug!(
            "published {:?} ({:?}) at ({}, {}) item {} direction {:?}",
            record.id,
            record.meta.triggered_by,
            record.position.x(),
            record.position.y(),
            record.spine_item,
            record.direction
        );
        self.set_current(record);
        self.refresh_pagination();
        drive
    }

    fn set_current(&mut self, record: NavigationRecord) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&record);
        }
        #[cfg(feature = "async")]
        self.watch.send_replace(Some(record.clone()));
        self.current = Some(record);
    }

    /// Recompute pagination; a node address at the start of the page is
    /// written back into the current record for later restoration.
    fn refresh_pagination(&mut self) {
        let Some(current) = self.current.as_ref() else {
            self.pagination = None;
            return;
        };
        let info = PaginationInfo::compute(
            current.position,
            &self.locator(),
            &self.registry,
            self.renderer.as_ref(),
        );
        let replacement = info
            .as_ref()
            .filter(|info| info.has_node_cfi())
            .filter(|info| current.cfi.as_deref() != Some(info.begin_cfi.as_str()))
            .map(|info| {
                let mut copy = current.clone();
                copy.cfi = Some(info.begin_cfi.clone());
                copy.meta.triggered_by = TriggeredBy::Pagination;
                copy
            });
        self.pagination = info;
        if let Some(copy) = replacement {
            self.set_current(copy);
        }
    }
}
