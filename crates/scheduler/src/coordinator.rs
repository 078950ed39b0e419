//! Render coordination between the cache owner and the worker pool
//!
//! The [`RenderCoordinator`] lives on the owner's thread next to the
//! [`BitmapCache`]. It keeps at most one render in flight per page, hands
//! jobs to a [`WorkerPool`], and applies finished renders to the cache when
//! the owner drains completions. Completions are tagged with the generation
//! they were issued in; anything issued before the last
//! [`cancel_all`](RenderCoordinator::cancel_all) is discarded on arrival.

use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use pageview_cache::{Bitmap, BitmapCache, PageIndex, PutOutcome};
use pageview_render::{PageRasterizer, RenderError};

use crate::cancel::{CancellationToken, Generation};
use crate::worker::{JobExecutor, PoolClosed, WorkerPool, WorkerPoolConfig};

/// Unique id of a submitted render
pub type JobId = u64;

/// A render handed to a worker
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: JobId,
    pub page: PageIndex,
    pub scale: f32,
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
enum RenderResult {
    Rendered(Bitmap),
    Failed(RenderError),
    Cancelled,
}

#[derive(Debug)]
struct RenderCompletion {
    id: JobId,
    page: PageIndex,
    scale: f32,
    generation: u64,
    result: RenderResult,
}

#[derive(Debug)]
struct InFlight {
    id: JobId,
    scale: f32,
    token: CancellationToken,
}

/// What `request_render` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Started(JobId),
    /// A render for the page is already running; nothing was queued
    AlreadyInFlight,
}

/// A completion that was applied to the cache
#[derive(Debug)]
pub enum RenderOutcome {
    /// The bitmap was cached; `evicted` pages were dropped to make room
    Cached { page: PageIndex, scale: f32, evicted: Vec<PageIndex> },
    /// The bitmap was too large for the cache and was dropped
    Uncached { page: PageIndex, scale: f32 },
    /// The rasterizer failed; any earlier bitmap for the page is untouched
    Failed { page: PageIndex, scale: f32, error: RenderError },
}

impl RenderOutcome {
    pub fn page(&self) -> PageIndex {
        match self {
            RenderOutcome::Cached { page, .. }
            | RenderOutcome::Uncached { page, .. }
            | RenderOutcome::Failed { page, .. } => *page,
        }
    }

    /// Whether the cache contents changed and a redraw is worthwhile
    pub fn changed_cache(&self) -> bool {
        matches!(self, RenderOutcome::Cached { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on worker threads; only used when the rasterizer
    /// advertises concurrent rendering, otherwise a single worker runs.
    pub max_workers: usize,
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { max_workers: crate::worker::num_cpus(), poll_interval: Duration::from_millis(50) }
    }
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub requested: u64,
    pub deduplicated: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
}

pub struct RenderCoordinator {
    pool: WorkerPool<RenderJob>,
    completions: Receiver<RenderCompletion>,
    in_flight: HashMap<PageIndex, InFlight>,
    generation: Generation,
    next_id: JobId,
    stats: CoordinatorStats,
}

impl RenderCoordinator {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, config: CoordinatorConfig) -> io::Result<Self> {
        let workers =
            if rasterizer.supports_concurrent_render() { config.max_workers.max(1) } else { 1 };

        let (sender, completions) = flume::unbounded();
        let executor = render_executor(rasterizer, sender);
        let pool = WorkerPool::new(
            executor,
            WorkerPoolConfig::new(workers).with_poll_interval(config.poll_interval),
        )?;

        Ok(Self {
            pool,
            completions,
            in_flight: HashMap::new(),
            generation: Generation::new(),
            next_id: 0,
            stats: CoordinatorStats::default(),
        })
    }

    /// Start rendering `page` at `scale` unless a render for it is running
    ///
    /// A running render is never cancelled or re-targeted; re-request after
    /// it completes if its scale turns out insufficient.
    pub fn request_render(
        &mut self,
        page: PageIndex,
        scale: f32,
    ) -> Result<RequestOutcome, PoolClosed> {
        if self.in_flight.contains_key(&page) {
            self.stats.deduplicated += 1;
            return Ok(RequestOutcome::AlreadyInFlight);
        }

        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        let job = RenderJob {
            id,
            page,
            scale,
            generation: self.generation.current(),
            token: token.clone(),
        };

        self.pool.submit(job)?;
        self.in_flight.insert(page, InFlight { id, scale, token });
        self.stats.requested += 1;
        debug!("render {id} queued for page {page} at {scale:.2}x");

        Ok(RequestOutcome::Started(id))
    }

    pub fn is_in_flight(&self, page: PageIndex) -> bool {
        self.in_flight.contains_key(&page)
    }

    /// Scale of the render currently running for `page`
    pub fn in_flight_scale(&self, page: PageIndex) -> Option<f32> {
        self.in_flight.get(&page).map(|render| render.scale)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.in_flight.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Cancel every outstanding render
    ///
    /// Queued jobs are skipped by the workers; renders already running finish
    /// but their results are discarded when they arrive.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.in_flight.len();
        for (_, render) in self.in_flight.drain() {
            render.token.cancel();
        }
        self.generation.advance();

        if cancelled > 0 {
            debug!("cancelled {cancelled} in-flight renders");
        }
        cancelled
    }

    /// Apply every completion that has arrived so far
    pub fn drain_completions(&mut self, cache: &mut BitmapCache) -> Vec<RenderOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.completions.try_recv() {
                Ok(completion) => outcomes.extend(self.apply(completion, cache)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Block until nothing is in flight or `timeout` elapses, applying
    /// completions as they arrive
    pub fn wait_for_idle(
        &mut self,
        cache: &mut BitmapCache,
        timeout: Duration,
    ) -> Vec<RenderOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = self.drain_completions(cache);

        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.completions.recv_timeout(remaining) {
                Ok(completion) => outcomes.extend(self.apply(completion, cache)),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        outcomes
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    fn apply(
        &mut self,
        completion: RenderCompletion,
        cache: &mut BitmapCache,
    ) -> Option<RenderOutcome> {
        let RenderCompletion { id, page, scale, generation, result } = completion;

        if !self.generation.is_current(generation) {
            debug!("discarding stale render {id} for page {page}");
            self.stats.discarded += 1;
            return None;
        }

        if self.in_flight.get(&page).is_some_and(|render| render.id == id) {
            self.in_flight.remove(&page);
        }

        match result {
            RenderResult::Rendered(bitmap) => {
                self.stats.completed += 1;
                match cache.put(page, scale, bitmap) {
                    PutOutcome::Stored { evicted } => {
                        Some(RenderOutcome::Cached { page, scale, evicted })
                    }
                    PutOutcome::TooLarge { .. } => Some(RenderOutcome::Uncached { page, scale }),
                }
            }
            RenderResult::Failed(error) => {
                self.stats.failed += 1;
                warn!("render of page {page} at {scale:.2}x failed: {error}");
                Some(RenderOutcome::Failed { page, scale, error })
            }
            RenderResult::Cancelled => {
                self.stats.discarded += 1;
                None
            }
        }
    }
}

/// Worker-side body: rasterize unless cancelled and report back
fn render_executor(
    rasterizer: Arc<dyn PageRasterizer>,
    completions: Sender<RenderCompletion>,
) -> JobExecutor<RenderJob> {
    Arc::new(move |job: RenderJob| {
        let result = if job.token.is_cancelled() {
            RenderResult::Cancelled
        } else {
            let rendered =
                panic::catch_unwind(AssertUnwindSafe(|| rasterizer.render(job.page, job.scale)));
            match rendered {
                Ok(Ok(bitmap)) => RenderResult::Rendered(bitmap),
                Ok(Err(error)) => RenderResult::Failed(error),
                Err(_) => RenderResult::Failed(RenderError::Backend(format!(
                    "rasterizer panicked on page {}",
                    job.page
                ))),
            }
        };

        // The owner may already be gone; nothing to report to then.
        let _ = completions.send(RenderCompletion {
            id: job.id,
            page: job.page,
            scale: job.scale,
            generation: job.generation,
            result,
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    /// Renders solid bitmaps, optionally blocking until released and
    /// failing for selected pages.
    #[derive(Default)]
    struct TestRasterizer {
        calls: AtomicUsize,
        failing: Mutex<Vec<PageIndex>>,
        gate: Option<Receiver<()>>,
        started: Option<Sender<PageIndex>>,
    }

    impl TestRasterizer {
        fn gated() -> (Self, Sender<()>, Receiver<PageIndex>) {
            let (release_tx, release_rx) = flume::unbounded();
            let (started_tx, started_rx) = flume::unbounded();
            let rasterizer =
                Self { gate: Some(release_rx), started: Some(started_tx), ..Default::default() };
            (rasterizer, release_tx, started_rx)
        }

        fn fail_page(&self, page: PageIndex) {
            self.failing.lock().unwrap().push(page);
        }
    }

    impl PageRasterizer for TestRasterizer {
        fn render(&self, page: usize, scale: f32) -> Result<Bitmap, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(started) = &self.started {
                let _ = started.send(page);
            }
            if let Some(gate) = &self.gate {
                let _ = gate.recv_timeout(WAIT);
            }
            if self.failing.lock().unwrap().contains(&page) {
                return Err(RenderError::Backend(format!("page {page} is corrupt")));
            }
            let side = (10.0 * scale).round() as u32;
            Ok(Bitmap::filled(side, side, [255, 255, 255, 255])?)
        }
    }

    fn coordinator(rasterizer: Arc<TestRasterizer>) -> RenderCoordinator {
        let config = CoordinatorConfig { max_workers: 4, poll_interval: Duration::from_millis(5) };
        RenderCoordinator::new(rasterizer, config).unwrap()
    }

    #[test]
    fn renders_land_in_the_cache() {
        let rasterizer = Arc::new(TestRasterizer::default());
        let mut coordinator = coordinator(rasterizer.clone());
        let mut cache = BitmapCache::new(1024 * 1024);

        assert!(matches!(coordinator.request_render(0, 2.0), Ok(RequestOutcome::Started(_))));
        let outcomes = coordinator.wait_for_idle(&mut cache, WAIT);

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].changed_cache());
        assert_eq!(cache.rendered_scale(0), Some(2.0));
        assert!(!coordinator.is_in_flight(0));
    }

    #[test]
    fn serial_rasterizer_gets_one_worker() {
        let coordinator = coordinator(Arc::new(TestRasterizer::default()));
        assert_eq!(coordinator.num_workers(), 1);
    }

    #[test]
    fn second_request_for_a_running_page_is_dropped() {
        let (rasterizer, release, started) = TestRasterizer::gated();
        let rasterizer = Arc::new(rasterizer);
        let mut coordinator = coordinator(rasterizer.clone());
        let mut cache = BitmapCache::new(1024 * 1024);

        coordinator.request_render(0, 1.0).unwrap();
        started.recv_timeout(WAIT).unwrap();

        assert_eq!(coordinator.request_render(0, 3.0).unwrap(), RequestOutcome::AlreadyInFlight);
        assert_eq!(coordinator.in_flight_scale(0), Some(1.0));

        release.send(()).unwrap();
        coordinator.wait_for_idle(&mut cache, WAIT);

        assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.rendered_scale(0), Some(1.0));
        assert_eq!(coordinator.stats().deduplicated, 1);

        // Once finished, the page can be requested again
        assert!(matches!(coordinator.request_render(0, 3.0), Ok(RequestOutcome::Started(_))));
        release.send(()).unwrap();
        coordinator.wait_for_idle(&mut cache, WAIT);
        assert_eq!(cache.rendered_scale(0), Some(3.0));
    }

    #[test]
    fn failure_keeps_previous_bitmap_and_reports_once() {
        let rasterizer = Arc::new(TestRasterizer::default());
        let mut coordinator = coordinator(rasterizer.clone());
        let mut cache = BitmapCache::new(1024 * 1024);

        coordinator.request_render(4, 1.0).unwrap();
        coordinator.wait_for_idle(&mut cache, WAIT);
        assert!(cache.contains(4));

        rasterizer.fail_page(4);
        coordinator.request_render(4, 2.0).unwrap();
        let outcomes = coordinator.wait_for_idle(&mut cache, WAIT);

        let failures: Vec<_> =
            outcomes.iter().filter(|o| matches!(o, RenderOutcome::Failed { .. })).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].page(), 4);

        assert_eq!(cache.rendered_scale(4), Some(1.0), "old bitmap must stay displayable");
        assert!(!coordinator.is_in_flight(4), "failed render must leave the in-flight set");
        assert!(coordinator.drain_completions(&mut cache).is_empty());
    }

    #[test]
    fn panicking_rasterizer_is_reported_as_failure() {
        struct Panicky;
        impl PageRasterizer for Panicky {
            fn render(&self, _page: usize, _scale: f32) -> Result<Bitmap, RenderError> {
                panic!("backend blew up");
            }
        }

        let config = CoordinatorConfig { max_workers: 1, poll_interval: Duration::from_millis(5) };
        let mut coordinator = RenderCoordinator::new(Arc::new(Panicky), config).unwrap();
        let mut cache = BitmapCache::new(1024);

        coordinator.request_render(1, 1.0).unwrap();
        let outcomes = coordinator.wait_for_idle(&mut cache, WAIT);

        assert!(matches!(outcomes.as_slice(), [RenderOutcome::Failed { page: 1, .. }]));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[test]
    fn late_completion_after_cancel_does_not_touch_cache() {
        let (rasterizer, release, started) = TestRasterizer::gated();
        let mut coordinator = coordinator(Arc::new(rasterizer));
        let mut cache = BitmapCache::new(1024 * 1024);

        coordinator.request_render(2, 1.0).unwrap();
        started.recv_timeout(WAIT).unwrap();

        assert_eq!(coordinator.cancel_all(), 1);
        cache.clear();

        release.send(()).unwrap();
        // Give the worker time to deliver its (stale) result
        let deadline = Instant::now() + WAIT;
        while coordinator.stats().discarded == 0 && Instant::now() < deadline {
            coordinator.drain_completions(&mut cache);
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(coordinator.stats().discarded, 1);
        assert!(cache.is_empty());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[test]
    fn oversized_render_is_reported_uncached() {
        let rasterizer = Arc::new(TestRasterizer::default());
        let mut coordinator = coordinator(rasterizer);
        let mut cache = BitmapCache::new(100);

        coordinator.request_render(0, 1.0).unwrap();
        let outcomes = coordinator.wait_for_idle(&mut cache, WAIT);

        assert!(matches!(outcomes.as_slice(), [RenderOutcome::Uncached { page: 0, .. }]));
        assert!(cache.is_empty());
    }
}
