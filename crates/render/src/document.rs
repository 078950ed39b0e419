//! Document-side contracts consumed by the viewer
//!
//! A viewer needs two capabilities from a document: page metadata
//! ([`DocumentSource`]) and rasterization ([`PageRasterizer`]). Backends
//! implement both; [`Document`] is the combined bound.

use pageview_cache::{Bitmap, BitmapError};

/// US Letter, substituted when a page's dimensions cannot be read
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize { width: 612.0, height: 792.0 };

/// Page dimensions in document units (points)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Dimensions after applying a page rotation
    pub fn rotated(self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::None | Rotation::Half => self,
            Rotation::Quarter | Rotation::ThreeQuarters => {
                Self { width: self.height, height: self.width }
            }
        }
    }

    /// Pixel dimensions of a rendering at `scale`, never smaller than 1x1
    pub fn pixel_size(self, scale: f32) -> (u32, u32) {
        let width = (self.width * scale).round().max(1.0) as u32;
        let height = (self.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// Clockwise page rotation as stored in the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// Normalise a rotation in degrees; anything off the 90° grid is ignored
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Quarter,
            180 => Rotation::Half,
            270 => Rotation::ThreeQuarters,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }
}

/// Per-page metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    pub index: usize,
    /// Unrotated MediaBox size
    pub size: PageSize,
    pub rotation: Rotation,
}

impl PageInfo {
    /// Size as displayed, with rotation applied
    pub fn display_size(&self) -> PageSize {
        self.size.rotated(self.rotation)
    }
}

/// Document-level metadata
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("page {page} has no usable MediaBox")]
    MissingMediaBox { page: usize },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    Empty,
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("invalid bitmap: {0}")]
    Bitmap(#[from] BitmapError),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Page count and per-page dimensions
pub trait DocumentSource: Send + Sync {
    fn page_count(&self) -> Result<usize, DocumentError>;

    fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError>;

    /// Displayed dimensions of a page (rotation applied)
    fn page_dimensions(&self, page: usize) -> Result<PageSize, DocumentError> {
        self.page_info(page).map(|info| info.display_size())
    }

    fn info(&self) -> Result<DocumentInfo, DocumentError> {
        Ok(DocumentInfo { page_count: self.page_count()?, ..Default::default() })
    }
}

/// Produces a bitmap of one page at a resolution scale
///
/// `render` blocks until the bitmap is ready and is called from worker
/// threads. Unless [`supports_concurrent_render`](Self::supports_concurrent_render)
/// returns true, callers must not invoke it for two pages at once.
pub trait PageRasterizer: Send + Sync {
    /// Rasterize `page` so one document unit maps to `scale` pixels
    fn render(&self, page: usize, scale: f32) -> Result<Bitmap, RenderError>;

    fn supports_concurrent_render(&self) -> bool {
        false
    }
}

/// A backend that can both describe and rasterize its pages
pub trait Document: DocumentSource + PageRasterizer {}

impl<T: DocumentSource + PageRasterizer + ?Sized> Document for T {}

/// Reject non-finite or non-positive scales before touching a backend
pub(crate) fn check_scale(scale: f32) -> Result<f32, RenderError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(RenderError::InvalidScale(scale))
    }
}
