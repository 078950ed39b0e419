//! In-memory document with fixed page sizes
//!
//! Useful for headless simulation and for exercising the viewer without a
//! PDF on disk. Each page renders as a solid tinted sheet.

use log::debug;
use pageview_cache::Bitmap;

use crate::document::{
    check_scale, DocumentError, DocumentInfo, DocumentSource, PageInfo, PageRasterizer, PageSize,
    RenderError, Rotation,
};

#[derive(Debug, Clone)]
pub struct SyntheticDocument {
    pages: Vec<PageSize>,
    title: Option<String>,
    concurrent: bool,
}

impl SyntheticDocument {
    pub fn new(pages: Vec<PageSize>) -> Self {
        Self { pages, title: None, concurrent: false }
    }

    /// `count` pages of the same size
    pub fn uniform(count: usize, size: PageSize) -> Self {
        Self::new(vec![size; count])
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Advertise that pages may be rasterized in parallel
    pub fn with_concurrent_render(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    fn size(&self, page: usize) -> Option<PageSize> {
        self.pages.get(page).copied()
    }
}

impl DocumentSource for SyntheticDocument {
    fn page_count(&self) -> Result<usize, DocumentError> {
        Ok(self.pages.len())
    }

    fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
        let size = self
            .size(page)
            .ok_or(DocumentError::PageOutOfRange { page, page_count: self.pages.len() })?;
        Ok(PageInfo { index: page, size, rotation: Rotation::None })
    }

    fn info(&self) -> Result<DocumentInfo, DocumentError> {
        Ok(DocumentInfo { page_count: self.pages.len(), title: self.title.clone(), author: None })
    }
}

impl PageRasterizer for SyntheticDocument {
    fn render(&self, page: usize, scale: f32) -> Result<Bitmap, RenderError> {
        let scale = check_scale(scale)?;
        let size = self
            .size(page)
            .ok_or(RenderError::PageOutOfRange { page, page_count: self.pages.len() })?;

        let (width, height) = size.pixel_size(scale);
        debug!("synthetic render of page {page} at {scale:.2}x ({width}x{height})");

        // Alternate tints so neighbouring pages are distinguishable.
        let shade = if page % 2 == 0 { 250 } else { 235 };
        Ok(Bitmap::filled(width, height, [shade, shade, shade, 255])?)
    }

    fn supports_concurrent_render(&self) -> bool {
        self.concurrent
    }
}
