//! Render scheduling for the page viewer
//!
//! Runs page rasterization on a worker pool and feeds the results back into
//! the owner's [`BitmapCache`](pageview_cache::BitmapCache), at most one
//! render per page at a time.
//!
//! # Example
//!
//! ```
//! use pageview_cache::BitmapCache;
//! use pageview_render::{PageSize, SyntheticDocument};
//! use pageview_scheduler::{CoordinatorConfig, RenderCoordinator};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let document = Arc::new(SyntheticDocument::uniform(3, PageSize::new(612.0, 792.0)));
//! let mut coordinator = RenderCoordinator::new(document, CoordinatorConfig::default()).unwrap();
//! let mut cache = BitmapCache::default();
//!
//! coordinator.request_render(0, 1.0).unwrap();
//! coordinator.wait_for_idle(&mut cache, Duration::from_secs(5));
//!
//! assert_eq!(cache.rendered_scale(0), Some(1.0));
//! ```

mod cancel;
mod coordinator;
mod debounce;
mod worker;

// Re-export public API
pub use cancel::{CancellationToken, Generation};
pub use coordinator::{
    CoordinatorConfig, CoordinatorStats, JobId, RenderCoordinator, RenderJob, RenderOutcome,
    RequestOutcome,
};
pub use debounce::Debouncer;
pub use worker::{num_cpus, JobExecutor, PoolClosed, WorkerPool, WorkerPoolConfig};
