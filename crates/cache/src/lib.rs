//! Page bitmap cache
//!
//! Byte-bounded LRU store of rendered page bitmaps, one entry per page.

pub mod bitmap;
pub mod ram;

pub use bitmap::{Bitmap, BitmapError, BYTES_PER_PIXEL};
pub use ram::{BitmapCache, CacheStats, PageEntry, PageIndex, PutOutcome, DEFAULT_CAPACITY_BYTES};
