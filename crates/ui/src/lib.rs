//! Page compositing
//!
//! Converts the viewport transform and cached page bitmaps into a flat
//! draw list that any host toolkit can paint.

pub mod compositor;
pub mod scene;

pub use compositor::{page_rect, Compositor, DEFAULT_BACKGROUND, DEFAULT_PLACEHOLDER};
pub use scene::{Color, DrawCommand, DrawList, Rect, Transform};
