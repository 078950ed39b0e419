//! Document viewport core
//!
//! Continuous vertical page layout, zoom and scroll handling, and the
//! render policy that keeps page bitmaps sharp without rasterizing during
//! gestures. The host forwards input to a [`ViewportController`], calls
//! [`ViewportController::tick`] once per frame and listens for
//! [`ViewerEvent`]s.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pageview_core::{ViewerConfig, ViewportController};
//! use pageview_render::{PageSize, SyntheticDocument};
//!
//! let mut viewer = ViewportController::new(ViewerConfig::default());
//! viewer.on_resize(612.0, 800.0);
//! viewer.set_document(Arc::new(SyntheticDocument::uniform(3, PageSize::new(612.0, 792.0))));
//! assert!(viewer.wait_for_load(Duration::from_secs(5)));
//!
//! assert_eq!(viewer.page_count(), 3);
//! assert_eq!(viewer.visible_pages(), vec![0, 1]);
//! ```

pub mod animation;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod loader;
pub mod viewport;

pub use animation::{ease_out, FlingAnimation, ZoomAnimation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ViewerConfig};
pub use error::ViewerError;
pub use events::ViewerEvent;
pub use geometry::{PageGeometry, Point};
pub use loader::{DocumentLayout, DocumentLoader, LoadOutcome};
pub use viewport::{FrameInputs, GestureState, ViewportController, ViewportState};
