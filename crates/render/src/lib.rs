//! Document backends for the page viewer
//!
//! Defines the [`DocumentSource`] and [`PageRasterizer`] contracts and ships
//! a lopdf-based backend, an in-memory synthetic backend and, behind the
//! `pdfium` feature, a PDFium rasterizer.

pub mod document;
pub mod lopdf_backend;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod synthetic;

pub use document::{
    Document, DocumentError, DocumentInfo, DocumentSource, PageInfo, PageRasterizer, PageSize,
    RenderError, Rotation, DEFAULT_PAGE_SIZE,
};
pub use lopdf_backend::LopdfDocument;
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumDocument;
pub use synthetic::SyntheticDocument;
