// Viewport compositor - turns viewport state and cached page bitmaps into a draw list
//
// Each frame the compositor walks the visible pages and emits either the
// cached bitmap, stretched from its rendered pixel size to the page's
// on-screen size, or a placeholder fill. It never requests renders: the
// controller fills cache gaps on settle and the next frame picks them up.

use log::trace;
use pageview_cache::BitmapCache;
use pageview_core::{FrameInputs, PageGeometry, ViewportState};

use crate::scene::{Color, DrawCommand, DrawList, Rect, Transform};

/// Fill behind and between pages
pub const DEFAULT_BACKGROUND: Color = Color::rgb(0.32, 0.33, 0.35);

/// Fill for pages still waiting on their first render
pub const DEFAULT_PLACEHOLDER: Color = Color::rgb(0.93, 0.93, 0.93);

#[derive(Debug, Clone)]
pub struct Compositor {
    background: Color,
    placeholder: Color,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self { background: DEFAULT_BACKGROUND, placeholder: DEFAULT_PLACEHOLDER }
    }

    pub fn with_colors(background: Color, placeholder: Color) -> Self {
        Self { background, placeholder }
    }

    /// Compose from a controller's split borrow
    pub fn compose_frame(&self, frame: FrameInputs<'_>) -> DrawList {
        self.compose(frame.state, frame.geometry, frame.cache)
    }

    /// Build the draw list for one frame
    ///
    /// Reading a page from the cache refreshes its recency, so pages on
    /// screen are the last to be evicted.
    pub fn compose(
        &self,
        state: &ViewportState,
        geometry: &PageGeometry,
        cache: &mut BitmapCache,
    ) -> DrawList {
        let mut list = DrawList::new(self.background);

        for page in geometry.visible_pages(state.scroll_y, state.viewport_height) {
            let Some(rect) = page_rect(state, geometry, page) else {
                continue;
            };

            match cache.get(page) {
                Some((bitmap, rendered_scale)) => {
                    let transform = Transform {
                        translation: [rect.x, rect.y],
                        scale: [
                            rect.width / bitmap.width() as f32,
                            rect.height / bitmap.height() as f32,
                        ],
                    };
                    list.push(DrawCommand::Bitmap {
                        page,
                        bitmap,
                        rendered_scale,
                        transform,
                        dest: rect,
                    });
                }
                None => list.push(DrawCommand::Placeholder {
                    page,
                    rect,
                    color: self.placeholder,
                }),
            }
        }

        trace!(
            "composed {} pages ({} placeholders)",
            list.len(),
            list.placeholder_count()
        );
        list
    }
}

/// On-screen rectangle of a page at the current scroll and scale
pub fn page_rect(state: &ViewportState, geometry: &PageGeometry, page: usize) -> Option<Rect> {
    let size = geometry.scaled_size(page)?;
    let left = geometry.page_left(page, state.viewport_width)?;
    let top = geometry.page_top(page)?;
    Some(Rect::new(left - state.scroll_x, top - state.scroll_y, size.width, size.height))
}
