//! Pure-Rust PDF backend built on `lopdf`
//!
//! Reads page geometry and document info from the PDF structure. Its
//! rasterizer draws the page frame (white sheet with a light border) at the
//! requested scale without interpreting content streams; enable the
//! `pdfium` feature for real page content.

use std::fs;
use std::path::Path;

use image::{ImageBuffer, Rgba};
use log::{debug, info};
use lopdf::{Dictionary, Object};
use pageview_cache::Bitmap;

use crate::document::{
    check_scale, DocumentError, DocumentInfo, DocumentSource, PageInfo, PageRasterizer, PageSize,
    RenderError, Rotation,
};

type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Inherited attributes are looked up at most this many `/Parent` levels up
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy)]
struct PageRecord {
    size: Option<PageSize>,
    rotation: Rotation,
}

/// A PDF opened with `lopdf`
#[derive(Debug)]
pub struct LopdfDocument {
    pages: Vec<PageRecord>,
    title: Option<String>,
    author: Option<String>,
}

impl LopdfDocument {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let document = Self::from_bytes(&bytes)?;
        info!("opened {} ({} pages)", path.display(), document.pages.len());
        Ok(document)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(DocumentError::EncryptedUnsupported);
        }

        let doc = lopdf::Document::load_mem(bytes)?;
        let page_ids = doc.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());

        for (_, object_id) in page_ids {
            let dict = doc.get_dictionary(object_id)?;
            let size = inherited(&doc, dict, b"MediaBox").and_then(media_box_size);
            let rotation = inherited(&doc, dict, b"Rotate")
                .and_then(|obj| obj.as_i64().ok())
                .map(Rotation::from_degrees)
                .unwrap_or_default();

            pages.push(PageRecord { size, rotation });
        }

        if pages.is_empty() {
            return Err(DocumentError::Empty);
        }

        Ok(Self {
            pages,
            title: info_string(&doc, b"Title"),
            author: info_string(&doc, b"Author"),
        })
    }

    fn record(&self, page: usize) -> Result<&PageRecord, DocumentError> {
        self.pages
            .get(page)
            .ok_or(DocumentError::PageOutOfRange { page, page_count: self.pages.len() })
    }
}

impl DocumentSource for LopdfDocument {
    fn page_count(&self) -> Result<usize, DocumentError> {
        Ok(self.pages.len())
    }

    fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
        let record = self.record(page)?;
        let size = record.size.ok_or(DocumentError::MissingMediaBox { page })?;
        Ok(PageInfo { index: page, size, rotation: record.rotation })
    }

    fn info(&self) -> Result<DocumentInfo, DocumentError> {
        Ok(DocumentInfo {
            page_count: self.pages.len(),
            title: self.title.clone(),
            author: self.author.clone(),
        })
    }
}

impl PageRasterizer for LopdfDocument {
    fn render(&self, page: usize, scale: f32) -> Result<Bitmap, RenderError> {
        let scale = check_scale(scale)?;
        let page_count = self.pages.len();
        let record =
            self.pages.get(page).ok_or(RenderError::PageOutOfRange { page, page_count })?;
        let size = record.size.unwrap_or(crate::DEFAULT_PAGE_SIZE).rotated(record.rotation);

        let (width, height) = size.pixel_size(scale);
        debug!("rendering page {page} frame at {scale:.2}x ({width}x{height})");

        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(Bitmap::from_rgba(width, height, image.into_raw())?)
    }

    fn supports_concurrent_render(&self) -> bool {
        // Rendering only reads the parsed page table.
        true
    }
}

/// Look up a page attribute, following `/Parent` for inheritable keys
fn inherited<'a>(doc: &'a lopdf::Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn media_box_size(object: &Object) -> Option<PageSize> {
    let array = object.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    let size = PageSize::new((x1 - x0).abs(), (y1 - y0).abs());
    (size.width > 0.0 && size.height > 0.0).then_some(size)
}

fn info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
    let info = resolve(doc, doc.trailer.get(b"Info").ok()?)?.as_dict().ok()?;
    match resolve(doc, info.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// PDF text strings are UTF-16BE when they carry a byte order mark
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> =
                rest.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}
