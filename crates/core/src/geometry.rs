//! Continuous-scroll page layout
//!
//! Pages are stacked vertically in document order, separated by a gap, and
//! centered horizontally. All lengths are in document units multiplied by
//! the current zoom scale; the gap scales with the pages.

use pageview_render::PageSize;

/// A point in screen (viewport) pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-page dimensions plus cumulative offsets at one zoom scale
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    sizes: Vec<PageSize>,
    gap: f32,
    scale: f32,
    /// `tops[i]` is the top of page i at `scale`
    tops: Vec<f32>,
    content_height: f32,
    max_width: f32,
}

impl PageGeometry {
    pub fn new(sizes: Vec<PageSize>, gap: f32) -> Self {
        let max_width = sizes.iter().map(|size| size.width).fold(0.0, f32::max);
        let mut geometry = Self {
            sizes,
            gap: gap.max(0.0),
            scale: 1.0,
            tops: Vec::new(),
            content_height: 0.0,
            max_width,
        };
        geometry.recompute();
        geometry
    }

    /// Recompute every offset for a new scale
    pub fn set_scale(&mut self, scale: f32) {
        if scale != self.scale {
            self.scale = scale;
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        self.tops.clear();
        self.tops.reserve(self.sizes.len());

        let mut cursor = 0.0;
        for (index, size) in self.sizes.iter().enumerate() {
            if index > 0 {
                cursor += self.gap * self.scale;
            }
            self.tops.push(cursor);
            cursor += size.height * self.scale;
        }
        self.content_height = cursor;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn page_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn gap(&self) -> f32 {
        self.gap
    }

    /// Unscaled size of a page in document units
    pub fn page_size(&self, page: usize) -> Option<PageSize> {
        self.sizes.get(page).copied()
    }

    /// Width of the widest page in document units
    pub fn max_page_width(&self) -> f32 {
        self.max_width
    }

    pub fn page_top(&self, page: usize) -> Option<f32> {
        self.tops.get(page).copied()
    }

    /// Size of a page at the current scale
    pub fn scaled_size(&self, page: usize) -> Option<PageSize> {
        self.page_size(page)
            .map(|size| PageSize::new(size.width * self.scale, size.height * self.scale))
    }

    /// Bottom edge of a page at the current scale (excluding the gap)
    pub fn page_bottom(&self, page: usize) -> Option<f32> {
        Some(self.page_top(page)? + self.sizes.get(page)?.height * self.scale)
    }

    /// Total height of the stacked pages at the current scale
    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    /// Width of the content strip: the viewport, or the widest page if wider
    pub fn content_width(&self, viewport_width: f32) -> f32 {
        viewport_width.max(self.max_width * self.scale)
    }

    /// Left edge of a page in content coordinates (pages are centered)
    pub fn page_left(&self, page: usize, viewport_width: f32) -> Option<f32> {
        let width = self.sizes.get(page)?.width * self.scale;
        Some((self.content_width(viewport_width) - width) / 2.0)
    }

    /// Pages whose span intersects `[offset, offset + height]`
    ///
    /// A page's span runs from the gap above it to its bottom edge, so a page
    /// whose gap has scrolled into view already counts as visible. Scans in
    /// layout order and stops at the first span starting below the window.
    pub fn visible_pages(&self, offset: f32, height: f32) -> Vec<usize> {
        if height <= 0.0 {
            return Vec::new();
        }

        let bottom = offset + height;
        let gap = self.gap * self.scale;
        let mut visible = Vec::new();
        for (page, &top) in self.tops.iter().enumerate() {
            if top - gap > bottom {
                break;
            }
            let page_bottom = top + self.sizes[page].height * self.scale;
            if page_bottom >= offset {
                visible.push(page);
            }
        }
        visible
    }

    /// Page containing the content offset `y`; a gap belongs to the page below
    pub fn page_at_offset(&self, y: f32) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let last = self.sizes.len() - 1;
        for page in 0..last {
            if y <= self.page_bottom(page)? {
                return Some(page);
            }
        }
        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter_pages(count: usize) -> PageGeometry {
        PageGeometry::new(vec![PageSize::new(612.0, 792.0); count], 16.0)
    }

    #[test]
    fn visible_set_matches_worked_example() {
        let geometry = letter_pages(3);

        assert_eq!(geometry.page_bottom(0), Some(792.0));
        assert_eq!(geometry.page_top(1), Some(808.0));
        assert_eq!(geometry.visible_pages(0.0, 800.0), vec![0, 1]);
        assert_eq!(geometry.visible_pages(0.0, 700.0), vec![0]);
        assert_eq!(geometry.visible_pages(1700.0, 800.0), vec![2]);
    }

    #[test]
    fn visible_set_is_exactly_the_intersecting_pages() {
        let mut geometry = PageGeometry::new(
            vec![
                PageSize::new(600.0, 300.0),
                PageSize::new(600.0, 900.0),
                PageSize::new(400.0, 120.0),
                PageSize::new(600.0, 800.0),
            ],
            10.0,
        );

        for scale in [0.5, 1.0, 1.7, 3.0] {
            geometry.set_scale(scale);
            for step in 0..80 {
                let offset = step as f32 * 37.0;
                let height = 450.0;
                let expected: Vec<usize> = (0..geometry.page_count())
                    .filter(|&page| {
                        let top = geometry.page_top(page).unwrap() - geometry.gap() * scale;
                        let bottom = geometry.page_bottom(page).unwrap();
                        top <= offset + height && bottom >= offset
                    })
                    .collect();
                assert_eq!(geometry.visible_pages(offset, height), expected);
            }
        }
    }

    #[test]
    fn offsets_scale_with_zoom_including_gap() {
        let mut geometry = letter_pages(3);
        geometry.set_scale(2.0);

        assert_eq!(geometry.page_top(1), Some(1616.0));
        assert_eq!(geometry.page_top(2), Some(3232.0));
        assert_eq!(geometry.content_height(), 3.0 * 1584.0 + 2.0 * 32.0);
    }

    #[test]
    fn tops_are_monotonic() {
        let geometry = PageGeometry::new(
            vec![PageSize::new(10.0, 0.0), PageSize::new(10.0, 5.0), PageSize::new(10.0, 0.0)],
            0.0,
        );
        let tops: Vec<f32> = (0..3).map(|p| geometry.page_top(p).unwrap()).collect();
        assert!(tops.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn page_at_offset_assigns_gap_to_next_page() {
        let geometry = letter_pages(3);

        assert_eq!(geometry.page_at_offset(0.0), Some(0));
        assert_eq!(geometry.page_at_offset(792.0), Some(0));
        assert_eq!(geometry.page_at_offset(800.0), Some(1));
        assert_eq!(geometry.page_at_offset(100_000.0), Some(2));
        assert_eq!(PageGeometry::new(Vec::new(), 16.0).page_at_offset(0.0), None);
    }

    #[test]
    fn narrow_pages_are_centered() {
        let geometry =
            PageGeometry::new(vec![PageSize::new(600.0, 800.0), PageSize::new(400.0, 800.0)], 0.0);

        assert_eq!(geometry.content_width(1000.0), 1000.0);
        assert_eq!(geometry.page_left(0, 1000.0), Some(200.0));
        assert_eq!(geometry.page_left(1, 1000.0), Some(300.0));
        assert_eq!(geometry.content_width(300.0), 600.0);
    }

    #[test]
    fn empty_document_has_nothing_visible() {
        let geometry = PageGeometry::new(Vec::new(), 16.0);
        assert!(geometry.visible_pages(0.0, 800.0).is_empty());
        assert_eq!(geometry.content_height(), 0.0);
        assert_eq!(geometry.max_page_width(), 0.0);
    }
}
