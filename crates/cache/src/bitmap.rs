//! Rendered page bitmaps
//!
//! A [`Bitmap`] is the pixel output of one page rasterization, always stored
//! as tightly packed RGBA8.

/// Bytes per pixel of every cached bitmap (RGBA8)
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors raised when constructing a bitmap from raw pixels
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitmapError {
    #[error("bitmap dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    LengthMismatch { width: u32, height: u32, expected: usize, actual: usize },
}

/// An RGBA8 pixel buffer produced by the page rasterizer
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Wrap an RGBA8 buffer, checking that its length matches the dimensions
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BitmapError> {
        if width == 0 || height == 0 {
            return Err(BitmapError::EmptyDimensions { width, height });
        }

        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(BitmapError::LengthMismatch { width, height, expected, actual: pixels.len() });
        }

        Ok(Self { width, height, pixels })
    }

    /// A bitmap filled with a single RGBA color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, BitmapError> {
        let count = width as usize * height as usize;
        let pixels = rgba.iter().copied().cycle().take(count * BYTES_PER_PIXEL).collect();
        Self::from_rgba(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume the bitmap and return its pixel buffer
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Memory footprint in bytes (width × height × bytes per pixel)
    pub fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

// Pixel buffers are large; keep Debug output to the dimensions.
impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
