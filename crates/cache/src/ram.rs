//! In-memory page bitmap cache with LRU eviction
//!
//! Holds at most one rendered bitmap per page, bounded by a byte capacity.
//! When an insertion would exceed the capacity, the least recently used
//! entries for *other* pages are evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, warn};

use crate::bitmap::Bitmap;

/// Zero-based page index, the unique cache key
pub type PageIndex = usize;

/// Default capacity: 128 MiB
pub const DEFAULT_CAPACITY_BYTES: usize = 128 * 1024 * 1024;

/// A cached page: one bitmap plus the scale it was rasterized at
#[derive(Debug, Clone)]
pub struct PageEntry {
    bitmap: Arc<Bitmap>,
    scale: f32,
}

impl PageEntry {
    /// The rendered bitmap
    pub fn bitmap(&self) -> &Arc<Bitmap> {
        &self.bitmap
    }

    /// Scale (pixels per document unit) the bitmap was rendered at
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Memory footprint of the bitmap in bytes
    pub fn memory_size(&self) -> usize {
        self.bitmap.memory_size()
    }
}

/// Result of [`BitmapCache::put`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The bitmap is now cached; `evicted` lists pages dropped to make room
    Stored { evicted: Vec<PageIndex> },
    /// The bitmap alone exceeds the capacity; the cache was left unchanged
    TooLarge { size: usize, capacity: usize },
}

impl PutOutcome {
    /// Whether the page is cached after the call
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored { .. })
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of pages currently cached
    pub entry_count: usize,

    /// Total bytes held by cached bitmaps
    pub memory_used: usize,

    /// Capacity in bytes
    pub memory_limit: usize,

    /// Number of `get` calls that found an entry
    pub hits: u64,

    /// Number of `get` calls that found nothing
    pub misses: u64,

    /// Number of entries evicted due to memory pressure
    pub evictions: u64,

    /// Number of `put` calls refused because the bitmap exceeded capacity
    pub rejected: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

/// Byte-bounded LRU cache of rendered pages
///
/// The cache has a single owner; every mutation goes through `&mut self`.
/// Replacing, evicting, removing or clearing an entry drops the cache's
/// reference to the bitmap immediately.
///
/// # Example
///
/// ```
/// use pageview_cache::{Bitmap, BitmapCache};
///
/// let mut cache = BitmapCache::new(1024 * 1024);
///
/// let bitmap = Bitmap::filled(64, 64, [255, 255, 255, 255]).unwrap();
/// assert!(cache.put(0, 2.0, bitmap).is_stored());
///
/// if let Some((bitmap, scale)) = cache.get(0) {
///     println!("page 0 cached at {scale}x: {}x{}", bitmap.width(), bitmap.height());
/// }
///
/// // A 1.5x display needs nothing better than a 2x bitmap
/// assert!(!cache.needs_upgrade(0, 1.5, 1.4));
/// assert!(cache.needs_upgrade(1, 1.5, 1.4));
/// ```
#[derive(Debug)]
pub struct BitmapCache {
    /// Map from page index to its entry
    entries: HashMap<PageIndex, PageEntry>,

    /// LRU queue (most recently used at back, least recently used at front)
    lru_queue: VecDeque<PageIndex>,

    /// Current memory usage in bytes
    memory_used: usize,

    /// Maximum memory allowed in bytes
    memory_limit: usize,

    stats: CacheStats,
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl BitmapCache {
    /// Create a cache bounded to `memory_limit` bytes
    pub fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats { memory_limit, ..Default::default() },
        }
    }

    /// Create a cache with a capacity in megabytes
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Store the bitmap for `page`, rendered at `scale`
    ///
    /// Any previous entry for the page is released first. Least recently
    /// used entries for other pages are then evicted until the new bitmap
    /// fits. A bitmap larger than the whole capacity is refused and the
    /// cache is left untouched.
    pub fn put(&mut self, page: PageIndex, scale: f32, bitmap: Bitmap) -> PutOutcome {
        let size = bitmap.memory_size();
        if size > self.memory_limit {
            warn!(
                "page {page} bitmap ({size} bytes at {scale:.2}x) exceeds cache capacity of {} bytes",
                self.memory_limit
            );
            self.stats.rejected += 1;
            return PutOutcome::TooLarge { size, capacity: self.memory_limit };
        }

        self.release(page);

        let mut evicted = Vec::new();
        while self.memory_used + size > self.memory_limit {
            match self.evict_lru() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }

        self.memory_used += size;
        self.entries.insert(page, PageEntry { bitmap: Arc::new(bitmap), scale });
        self.lru_queue.push_back(page);
        self.sync_stats();

        if !evicted.is_empty() {
            debug!("evicted pages {evicted:?} to cache page {page}");
        }

        PutOutcome::Stored { evicted }
    }

    /// Look up a page, marking it most recently used
    pub fn get(&mut self, page: PageIndex) -> Option<(Arc<Bitmap>, f32)> {
        match self.entries.get(&page) {
            Some(entry) => {
                let hit = (Arc::clone(&entry.bitmap), entry.scale);
                self.touch(page);
                self.stats.hits += 1;
                Some(hit)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up a page without affecting recency or statistics
    pub fn peek(&self, page: PageIndex) -> Option<&PageEntry> {
        self.entries.get(&page)
    }

    /// Check whether a page is cached without affecting recency
    pub fn contains(&self, page: PageIndex) -> bool {
        self.entries.contains_key(&page)
    }

    /// Scale the cached bitmap for `page` was rendered at
    pub fn rendered_scale(&self, page: PageIndex) -> Option<f32> {
        self.entries.get(&page).map(|entry| entry.scale)
    }

    /// Whether `page` should be re-rendered to display at `target_scale`
    ///
    /// True when nothing is cached for the page, or when the target exceeds
    /// the rendered scale by more than `threshold` times.
    pub fn needs_upgrade(&self, page: PageIndex, target_scale: f32, threshold: f32) -> bool {
        match self.entries.get(&page) {
            Some(entry) => target_scale > entry.scale * threshold,
            None => true,
        }
    }

    /// Remove a page from the cache, returning whether it was present
    pub fn remove(&mut self, page: PageIndex) -> bool {
        let removed = self.release(page);
        self.sync_stats();
        removed
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.memory_used = 0;
        self.sync_stats();
    }

    /// Change the capacity, evicting least recently used entries to fit
    pub fn set_capacity(&mut self, memory_limit: usize) {
        self.memory_limit = memory_limit;
        while self.memory_used > self.memory_limit {
            if self.evict_lru().is_none() {
                break;
            }
        }
        self.sync_stats();
    }

    pub fn capacity(&self) -> usize {
        self.memory_limit
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached page indices, least recently used first
    pub fn pages_by_recency(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.lru_queue.iter().copied()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Move a page to the back of the LRU queue (mark as most recently used)
    fn touch(&mut self, page: PageIndex) {
        self.lru_queue.retain(|&p| p != page);
        self.lru_queue.push_back(page);
    }

    /// Drop the entry for `page` and its accounting
    fn release(&mut self, page: PageIndex) -> bool {
        match self.entries.remove(&page) {
            Some(entry) => {
                self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
                self.lru_queue.retain(|&p| p != page);
                true
            }
            None => false,
        }
    }

    /// Evict the least recently used page
    fn evict_lru(&mut self) -> Option<PageIndex> {
        let page = self.lru_queue.pop_front()?;
        if let Some(entry) = self.entries.remove(&page) {
            self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
            self.stats.evictions += 1;
        }
        Some(page)
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
        self.stats.memory_limit = self.memory_limit;
    }
}
