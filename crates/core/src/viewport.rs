//! Viewport controller
//!
//! Owns scroll offset, zoom scale, page geometry and the bitmap cache, and
//! decides when and at what resolution pages are rasterized. Gestures only
//! change the transform; rendering happens on settle:
//!
//! - scroll end / fling end: preload visible pages plus neighbours
//! - pinch end / animated zoom end: after the settle delay, upgrade blurry
//!   visible pages and preload
//!
//! Bitmaps are rendered at quality tiers that are multiples of the fit
//! scale, never at the instantaneous zoom, so a pinch costs no rasterization
//! until it settles.
//!
//! The host drives the controller from one thread: input handlers mutate
//! state, and [`tick`](ViewportController::tick) is called once per frame to
//! apply loads, render completions, animations and the settle timer.

use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, error, info, warn};
use pageview_cache::{BitmapCache, CacheStats, PageIndex};
use pageview_render::{Document, DocumentInfo, DocumentSource, PageRasterizer};
use pageview_scheduler::{
    CoordinatorConfig, CoordinatorStats, Debouncer, RenderCoordinator, RenderOutcome,
    RequestOutcome,
};

use crate::animation::{FlingAnimation, ZoomAnimation};
use crate::clock::{Clock, SystemClock};
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::events::ViewerEvent;
use crate::geometry::{PageGeometry, Point};
use crate::loader::{DocumentLayout, DocumentLoader, LoadOutcome};

/// Interaction state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GestureState {
    #[default]
    Idle,
    Scrolling,
    Scaling,
    AnimatingZoom,
}

/// Transform inputs read by the compositor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Horizontal pan, `[0, max_scroll_x]`
    pub scroll_x: f32,
    /// Vertical scroll offset, `[0, max_scroll_y]`
    pub scroll_y: f32,
    /// Display scale: screen pixels per document unit
    pub scale: f32,
    /// Scale at which the widest page fills the viewport width
    pub fit_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Resolution cached bitmaps are rendered at when not zoomed in
    pub base_render_scale: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_width: 0.0,
            viewport_height: 0.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            scale: 1.0,
            fit_scale: 1.0,
            min_scale: 0.5,
            max_scale: 4.0,
            base_render_scale: 2.0,
        }
    }
}

impl ViewportState {
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }

    pub fn viewport_center(&self) -> Point {
        Point::new(self.viewport_width / 2.0, self.viewport_height / 2.0)
    }
}

/// Borrowed inputs for one compositor pass
pub struct FrameInputs<'a> {
    pub state: &'a ViewportState,
    pub geometry: &'a PageGeometry,
    pub cache: &'a mut BitmapCache,
}

/// Relative scale differences below this are treated as "already there"
const SCALE_EPSILON: f32 = 1e-4;

pub struct ViewportController {
    config: ViewerConfig,
    clock: Arc<dyn Clock>,
    state: ViewportState,
    gesture: GestureState,
    geometry: PageGeometry,
    cache: BitmapCache,
    info: Option<DocumentInfo>,
    coordinator: Option<RenderCoordinator>,
    loader: DocumentLoader,
    current_page: Option<PageIndex>,
    settle: Debouncer,
    zoom_animation: Option<ZoomAnimation>,
    fling: Option<FlingAnimation>,
    events: Sender<ViewerEvent>,
    event_receiver: Receiver<ViewerEvent>,
    needs_redraw: bool,
}

impl ViewportController {
    pub fn new(config: ViewerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ViewerConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, event_receiver) = flume::unbounded();
        let state = ViewportState {
            min_scale: config.min_scale_factor,
            max_scale: config.max_scale_factor,
            base_render_scale: config.render_headroom,
            ..ViewportState::default()
        };

        Self {
            cache: BitmapCache::new(config.cache_capacity_bytes),
            geometry: PageGeometry::new(Vec::new(), config.page_gap),
            settle: Debouncer::new(config.settle_delay()),
            config,
            clock,
            state,
            gesture: GestureState::Idle,
            info: None,
            coordinator: None,
            loader: DocumentLoader::new(),
            current_page: None,
            zoom_animation: None,
            fling: None,
            events,
            event_receiver,
            needs_redraw: false,
        }
    }

    /// Receiver for host notifications; every clone sees each event once
    pub fn events(&self) -> Receiver<ViewerEvent> {
        self.event_receiver.clone()
    }

    // ---------------------------------------------------------------------
    // Document lifecycle
    // ---------------------------------------------------------------------

    /// Replace the displayed document
    ///
    /// The previous document is torn down first. Page dimensions are read in
    /// the background; the layout is installed by a later [`tick`](Self::tick).
    pub fn set_document<D>(&mut self, document: Arc<D>)
    where
        D: Document + 'static,
    {
        self.teardown();

        let rasterizer: Arc<dyn PageRasterizer> = document.clone();
        let coordinator_config =
            CoordinatorConfig { max_workers: self.config.render_workers, ..Default::default() };
        let coordinator = match RenderCoordinator::new(rasterizer, coordinator_config) {
            Ok(coordinator) => coordinator,
            Err(err) => {
                error!("failed to start render workers: {err}");
                self.emit(ViewerEvent::Error(ViewerError::DocumentUnavailable(err.to_string())));
                return;
            }
        };

        let source: Arc<dyn DocumentSource> = document;
        if let Err(err) = self.loader.start(source) {
            error!("failed to start document loader: {err}");
            self.emit(ViewerEvent::Error(ViewerError::DocumentUnavailable(err.to_string())));
            return;
        }

        self.coordinator = Some(coordinator);
        self.emit(ViewerEvent::LoadingStateChanged(true));
    }

    /// Release the document: cancel renders, clear the cache, stop timers
    pub fn teardown(&mut self) {
        let was_loading = self.loader.is_loading();
        self.loader.cancel();

        if let Some(mut coordinator) = self.coordinator.take() {
            coordinator.cancel_all();
        }
        self.cache.clear();
        self.settle.cancel();
        self.zoom_animation = None;
        self.fling = None;
        self.gesture = GestureState::Idle;
        self.geometry = PageGeometry::new(Vec::new(), self.config.page_gap);
        self.info = None;
        self.current_page = None;
        self.state.scroll_x = 0.0;
        self.state.scroll_y = 0.0;
        self.needs_redraw = true;

        if was_loading {
            self.emit(ViewerEvent::LoadingStateChanged(false));
        }
    }

    /// Block until the pending document scan finishes and apply it
    ///
    /// Returns false if nothing finished within `timeout`.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        match self.loader.wait(timeout) {
            Some(outcome) => {
                self.apply_load(outcome);
                true
            }
            None => false,
        }
    }

    /// Block until no render is in flight, applying completions
    pub fn wait_for_renders(&mut self, timeout: Duration) {
        if let Some(coordinator) = self.coordinator.as_mut() {
            let outcomes = coordinator.wait_for_idle(&mut self.cache, timeout);
            self.apply_render_outcomes(outcomes);
        }
    }

    fn apply_load(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded(layout) => self.install_layout(layout),
            LoadOutcome::Failed(err) => {
                error!("{err}");
                if let Some(mut coordinator) = self.coordinator.take() {
                    coordinator.cancel_all();
                }
                self.emit(ViewerEvent::Error(err));
                self.emit(ViewerEvent::LoadingStateChanged(false));
            }
        }
    }

    fn install_layout(&mut self, layout: DocumentLayout) {
        let DocumentLayout { info, page_sizes, geometry_errors } = layout;
        info!("document ready: {} pages", page_sizes.len());

        for err in geometry_errors {
            self.emit(ViewerEvent::Error(err));
        }

        self.geometry = PageGeometry::new(page_sizes, self.config.page_gap);
        self.info = Some(info);
        self.derive_scales();
        self.state.scale = self.state.fit_scale;
        self.geometry.set_scale(self.state.scale);
        self.state.scroll_x = 0.0;
        self.state.scroll_y = 0.0;
        self.current_page = None;
        self.needs_redraw = true;

        self.emit(ViewerEvent::LoadingStateChanged(false));
        self.update_current_page();
        self.preload();
    }

    // ---------------------------------------------------------------------
    // Frame pump
    // ---------------------------------------------------------------------

    /// Advance the controller by one frame; returns whether to redraw
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now();

        if let Some(outcome) = self.loader.poll() {
            self.apply_load(outcome);
        }

        if let Some(coordinator) = self.coordinator.as_mut() {
            let outcomes = coordinator.drain_completions(&mut self.cache);
            self.apply_render_outcomes(outcomes);
        }

        if let Some(animation) = self.zoom_animation {
            self.apply_scale(animation.scale_at(now), animation.focal);
            if animation.is_finished(now) {
                self.zoom_animation = None;
                self.gesture = GestureState::Idle;
                self.settle.schedule(now);
            }
        }

        if let Some(mut fling) = self.fling.take() {
            let delta = fling.step(now);
            let moved = self.scroll_by(delta.x, delta.y);
            // A zero-length step (no time elapsed) is not a scroll bound.
            let blocked = (delta.x != 0.0 || delta.y != 0.0) && !moved;
            if fling.is_finished() || blocked {
                self.gesture = GestureState::Idle;
                self.on_settle_scroll();
            } else {
                self.fling = Some(fling);
            }
        }

        if self.settle.poll(now).is_some() {
            self.on_settle_timer();
        }

        std::mem::take(&mut self.needs_redraw)
    }

    fn apply_render_outcomes(&mut self, outcomes: Vec<RenderOutcome>) {
        for outcome in outcomes {
            match outcome {
                RenderOutcome::Cached { page, scale, evicted } => {
                    if !evicted.is_empty() {
                        debug!("caching page {page} evicted {evicted:?}");
                    }
                    self.needs_redraw = true;
                    self.emit(ViewerEvent::CacheChanged { page });
                    self.follow_up_render(page, scale);
                }
                RenderOutcome::Uncached { page, scale } => {
                    warn!("page {page} at {scale:.2}x does not fit in the cache");
                }
                RenderOutcome::Failed { page, error, .. } => {
                    self.emit(ViewerEvent::Error(ViewerError::page_render_failure(page, &error)));
                }
            }
        }
    }

    /// Re-request a page whose render finished too coarse for the zoom the
    /// user settled on while it was running
    fn follow_up_render(&mut self, page: PageIndex, rendered: f32) {
        if self.gesture != GestureState::Idle || self.settle.is_pending() {
            return;
        }
        if rendered * self.config.upgrade_threshold >= self.state.scale {
            return;
        }
        if self.visible_pages().contains(&page) {
            self.request_render(page, self.render_scale_for(self.state.scale));
        }
    }

    // ---------------------------------------------------------------------
    // Host input
    // ---------------------------------------------------------------------

    pub fn on_resize(&mut self, width: f32, height: f32) {
        if !(width > 0.0 && height > 0.0) {
            debug!("ignoring degenerate viewport {width}x{height}");
            return;
        }

        let old_fit = self.state.fit_scale;
        let old_scale = self.state.scale;
        self.state.viewport_width = width;
        self.state.viewport_height = height;

        if self.geometry.is_empty() {
            self.derive_scales();
            return;
        }

        self.zoom_animation = None;
        self.derive_scales();

        let relative = old_scale / old_fit;
        let scale = self.state.clamp_scale(relative * self.state.fit_scale);
        self.state.scale = scale;
        self.geometry.set_scale(scale);

        // Keep the same document position at the top edge.
        let ratio = scale / old_scale;
        self.state.scroll_y *= ratio;
        self.state.scroll_x *= ratio;
        self.clamp_scroll();
        self.needs_redraw = true;

        if self.gesture == GestureState::AnimatingZoom {
            self.gesture = GestureState::Idle;
        }
        self.update_current_page();
        self.preload();
        self.settle.schedule(self.clock.now());
    }

    /// Scroll by a delta in screen pixels
    pub fn on_scroll(&mut self, dx: f32, dy: f32) {
        if self.geometry.is_empty() {
            return;
        }
        if self.gesture != GestureState::Scrolling {
            self.begin_gesture();
            self.gesture = GestureState::Scrolling;
        }
        self.fling = None;
        self.scroll_by(dx, dy);
    }

    pub fn on_scroll_end(&mut self) {
        if self.gesture == GestureState::Scrolling && self.fling.is_none() {
            self.gesture = GestureState::Idle;
            self.on_settle_scroll();
        }
    }

    /// Continue scrolling with decaying velocity (pixels per second)
    pub fn on_fling(&mut self, velocity_x: f32, velocity_y: f32) {
        if self.geometry.is_empty() {
            return;
        }
        self.begin_gesture();
        self.gesture = GestureState::Scrolling;
        self.fling = Some(FlingAnimation::new(
            Point::new(velocity_x, velocity_y),
            self.config.fling_decay,
            self.clock.now(),
        ));
    }

    pub fn on_pinch_begin(&mut self) {
        self.begin_gesture();
        self.gesture = GestureState::Scaling;
    }

    /// Apply one pinch frame: multiply the scale by `factor` around `focal`
    pub fn on_pinch(&mut self, factor: f32, focal: Point) {
        if self.geometry.is_empty() || !(factor.is_finite() && factor > 0.0) {
            return;
        }
        if self.gesture != GestureState::Scaling {
            self.on_pinch_begin();
        }
        self.apply_scale(self.state.scale * factor, focal);
    }

    pub fn on_pinch_end(&mut self) {
        if self.gesture == GestureState::Scaling {
            self.gesture = GestureState::Idle;
            self.settle.schedule(self.clock.now());
        }
    }

    /// Toggle between fit and a magnified reading zoom around `point`
    pub fn on_double_tap(&mut self, point: Point) {
        let fit = self.state.fit_scale;
        let target = if self.state.scale < self.config.double_tap_threshold * fit {
            (self.config.double_tap_target * fit).min(self.state.max_scale)
        } else {
            fit
        };
        self.animate_zoom(target, point);
    }

    pub fn zoom_in(&mut self) {
        let target = self.zoom_base() * self.config.zoom_step;
        self.animate_zoom(target, self.state.viewport_center());
    }

    pub fn zoom_out(&mut self) {
        let target = self.zoom_base() / self.config.zoom_step;
        self.animate_zoom(target, self.state.viewport_center());
    }

    /// Scale the next button step compounds from: the pending animation
    /// target if one is running, else the current scale
    fn zoom_base(&self) -> f32 {
        self.zoom_animation.map_or(self.state.scale, |animation| animation.to)
    }

    pub fn reset_zoom(&mut self) {
        self.animate_zoom(self.state.fit_scale, self.state.viewport_center());
    }

    /// Scroll so `page` starts at the top of the viewport
    pub fn go_to_page(&mut self, page: PageIndex) {
        let Some(top) = self.geometry.page_top(page) else {
            warn!("go_to_page({page}) out of range ({} pages)", self.geometry.page_count());
            return;
        };
        self.begin_gesture();
        self.gesture = GestureState::Idle;
        self.state.scroll_y = top;
        self.clamp_scroll();
        self.needs_redraw = true;
        self.update_current_page();
        self.preload();
        self.settle.schedule(self.clock.now());
    }

    // ---------------------------------------------------------------------
    // Transform math
    // ---------------------------------------------------------------------

    /// Stop whatever the previous gesture left running
    fn begin_gesture(&mut self) {
        self.settle.cancel();
        self.fling = None;
        if self.zoom_animation.take().is_some() {
            debug!("zoom animation interrupted at {:.3}", self.state.scale);
        }
    }

    fn animate_zoom(&mut self, target: f32, focal: Point) {
        if self.geometry.is_empty() {
            return;
        }
        let target = self.state.clamp_scale(target);
        self.begin_gesture();

        if ((target - self.state.scale) / self.state.scale).abs() < SCALE_EPSILON {
            self.gesture = GestureState::Idle;
            return;
        }

        let now = self.clock.now();
        let duration = self.config.zoom_animation();
        if duration.is_zero() {
            self.apply_scale(target, focal);
            self.gesture = GestureState::Idle;
            self.settle.schedule(now);
            return;
        }

        self.zoom_animation =
            Some(ZoomAnimation::new(self.state.scale, target, focal, now, duration));
        self.gesture = GestureState::AnimatingZoom;
    }

    /// Change the scale keeping the content under `focal` fixed on screen
    fn apply_scale(&mut self, scale: f32, focal: Point) {
        let old = self.state.scale;
        let new = self.state.clamp_scale(scale);
        if new == old {
            return;
        }

        let ratio = new / old;
        self.state.scale = new;
        self.geometry.set_scale(new);
        self.state.scroll_y = (self.state.scroll_y + focal.y) * ratio - focal.y;
        self.state.scroll_x = (self.state.scroll_x + focal.x) * ratio - focal.x;
        self.clamp_scroll();
        self.needs_redraw = true;
        self.update_current_page();
    }

    /// Returns whether the offset actually changed
    fn scroll_by(&mut self, dx: f32, dy: f32) -> bool {
        let before = (self.state.scroll_x, self.state.scroll_y);
        self.state.scroll_x += dx;
        self.state.scroll_y += dy;
        self.clamp_scroll();

        let moved = before != (self.state.scroll_x, self.state.scroll_y);
        if moved {
            self.needs_redraw = true;
            self.update_current_page();
        }
        moved
    }

    fn clamp_scroll(&mut self) {
        let (max_x, max_y) = self.max_scroll();
        self.state.scroll_x = self.state.scroll_x.clamp(0.0, max_x);
        self.state.scroll_y = self.state.scroll_y.clamp(0.0, max_y);
    }

    /// Largest valid `(scroll_x, scroll_y)` at the current scale
    pub fn max_scroll(&self) -> (f32, f32) {
        let max_x = (self.geometry.content_width(self.state.viewport_width)
            - self.state.viewport_width)
            .max(0.0);
        let max_y = (self.geometry.content_height() - self.state.viewport_height).max(0.0);
        (max_x, max_y)
    }

    /// Fit, min, max and base render scales from the viewport and widest page
    fn derive_scales(&mut self) {
        let widest = self.geometry.max_page_width();
        let fit = if widest > 0.0 && self.state.viewport_width > 0.0 {
            self.state.viewport_width / widest
        } else {
            1.0
        };

        self.state.fit_scale = fit;
        self.state.min_scale = fit * self.config.min_scale_factor;
        self.state.max_scale = fit * self.config.max_scale_factor;
        self.state.base_render_scale = fit * self.config.render_headroom;
    }

    /// Quality tier for displaying at `scale`: the base render scale, or the
    /// next whole multiple of the fit scale when zoomed in further
    pub fn render_scale_for(&self, scale: f32) -> f32 {
        let fit = self.state.fit_scale;
        let multiple = (scale / fit - SCALE_EPSILON).ceil();
        fit * multiple.max(self.config.render_headroom)
    }

    fn update_current_page(&mut self) {
        let total = self.geometry.page_count();
        let reference = self.state.scroll_y + self.state.viewport_height / 3.0;
        let Some(page) = self.geometry.page_at_offset(reference) else {
            return;
        };

        if self.current_page != Some(page) {
            self.current_page = Some(page);
            self.emit(ViewerEvent::PageChanged { current: page, total });
        }
    }

    // ---------------------------------------------------------------------
    // Render policy
    // ---------------------------------------------------------------------

    fn on_settle_scroll(&mut self) {
        self.preload();
        // Pages scrolled into view may hold bitmaps from a lower zoom.
        self.settle.schedule(self.clock.now());
    }

    fn on_settle_timer(&mut self) {
        debug!("settled at scale {:.3}", self.state.scale);
        self.upgrade_visible();
        self.preload();
    }

    /// Re-render visible pages whose bitmaps are too coarse for the zoom
    fn upgrade_visible(&mut self) {
        let scale = self.state.scale;
        let target = self.render_scale_for(scale);
        for page in self.visible_pages() {
            let busy = self.coordinator.as_ref().is_some_and(|c| c.is_in_flight(page));
            if !busy && self.cache.needs_upgrade(page, scale, self.config.upgrade_threshold) {
                self.request_render(page, target);
            }
        }
    }

    /// Render uncached pages in and next to the visible range
    fn preload(&mut self) {
        let target = self.render_scale_for(self.state.scale);
        for page in self.preload_pages() {
            let busy = self.coordinator.as_ref().is_some_and(|c| c.is_in_flight(page));
            if !busy && !self.cache.contains(page) {
                self.request_render(page, target);
            }
        }
    }

    /// Visible pages plus `preload_neighbors` on each side
    pub fn preload_pages(&self) -> Vec<PageIndex> {
        let visible = self.visible_pages();
        let (Some(&first), Some(&last)) = (visible.first(), visible.last()) else {
            return Vec::new();
        };
        let neighbors = self.config.preload_neighbors;
        let end = (last + neighbors).min(self.geometry.page_count().saturating_sub(1));
        (first.saturating_sub(neighbors)..=end).collect()
    }

    fn request_render(&mut self, page: PageIndex, scale: f32) {
        let Some(coordinator) = self.coordinator.as_mut() else {
            return;
        };
        match coordinator.request_render(page, scale) {
            Ok(RequestOutcome::Started(_)) | Ok(RequestOutcome::AlreadyInFlight) => {}
            Err(err) => error!("cannot render page {page}: {err}"),
        }
    }

    fn emit(&self, event: ViewerEvent) {
        // The controller holds a receiver itself, so sending cannot fail.
        let _ = self.events.send(event);
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn cache(&self) -> &BitmapCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn render_stats(&self) -> CoordinatorStats {
        self.coordinator.as_ref().map(RenderCoordinator::stats).unwrap_or_default()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.info.as_ref()
    }

    pub fn current_page(&self) -> Option<PageIndex> {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.geometry.page_count()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn is_settle_pending(&self) -> bool {
        self.settle.is_pending()
    }

    pub fn is_render_in_flight(&self, page: PageIndex) -> bool {
        self.coordinator.as_ref().is_some_and(|c| c.is_in_flight(page))
    }

    pub fn visible_pages(&self) -> Vec<PageIndex> {
        self.geometry.visible_pages(self.state.scroll_y, self.state.viewport_height)
    }

    /// Split borrow for a compositor pass
    pub fn frame_inputs(&mut self) -> FrameInputs<'_> {
        FrameInputs { state: &self.state, geometry: &self.geometry, cache: &mut self.cache }
    }
}
