//! PDFium-backed rasterizer (`pdfium` feature)
//!
//! Page geometry comes from the lopdf parser; only rasterization goes through
//! PDFium. The library is bound for each render and calls are serialized
//! behind a mutex because PDFium is not thread-safe.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::debug;
use pageview_cache::Bitmap;
use pdfium_render::prelude::*;

use crate::document::{
    check_scale, DocumentError, DocumentInfo, DocumentSource, PageInfo, PageRasterizer,
    RenderError,
};
use crate::lopdf_backend::LopdfDocument;

pub struct PdfiumDocument {
    bytes: Vec<u8>,
    layout: LopdfDocument,
    render_lock: Mutex<()>,
}

impl PdfiumDocument {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DocumentError> {
        // Fail early if the library is missing rather than on the first render.
        bind().map_err(|err| DocumentError::Backend(err.to_string()))?;
        let layout = LopdfDocument::from_bytes(&bytes)?;
        Ok(Self { bytes, layout, render_lock: Mutex::new(()) })
    }
}

fn bind() -> Result<Pdfium, RenderError> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|err| RenderError::Backend(format!("failed to bind pdfium: {err}")))
}

impl DocumentSource for PdfiumDocument {
    fn page_count(&self) -> Result<usize, DocumentError> {
        self.layout.page_count()
    }

    fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
        self.layout.page_info(page)
    }

    fn info(&self) -> Result<DocumentInfo, DocumentError> {
        self.layout.info()
    }
}

impl PageRasterizer for PdfiumDocument {
    fn render(&self, page: usize, scale: f32) -> Result<Bitmap, RenderError> {
        let scale = check_scale(scale)?;
        let size = self
            .layout
            .page_dimensions(page)
            .map_err(|err| RenderError::Backend(err.to_string()))?;
        let (width, height) = size.pixel_size(scale);

        let _guard = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let pdfium = bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|err| RenderError::Backend(err.to_string()))?;
        let index = u16::try_from(page)
            .map_err(|_| RenderError::PageOutOfRange { page, page_count: usize::from(u16::MAX) })?;
        let pdf_page =
            document.pages().get(index).map_err(|err| RenderError::Backend(err.to_string()))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);

        debug!("pdfium render of page {page} at {scale:.2}x ({width}x{height})");
        let rendered = pdf_page
            .render_with_config(&config)
            .map_err(|err| RenderError::Backend(err.to_string()))?;

        let pixels = rendered.as_rgba_bytes().to_vec();
        Ok(Bitmap::from_rgba(rendered.width() as u32, rendered.height() as u32, pixels)?)
    }
}
