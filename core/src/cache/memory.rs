//! In-memory cache for decoded pages with count and byte ceilings.
//!
//! Eviction is distance-aware: when a ceiling is exceeded the entry furthest from the focused
//! page goes first, and among equally distant entries the least recently used one.

use std::sync::Arc;
use std::time::Instant;

use hashlink::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::codec::DecodedImage;
use crate::types::CacheLimits;

/// Resident decoded page.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub index: usize,
    pub image: Arc<DecodedImage>,
    pub size_bytes: usize,
    pub last_access: Instant,
}

/// Point-in-time view of the cache bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheState {
    pub resident_bytes: usize,
    pub entries: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
}

/// Result of offering a page to the cache.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The image callers should use: the resident copy when another request won the race.
    pub image: Arc<DecodedImage>,
    pub resident: bool,
    pub evicted: Vec<usize>,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<usize, CachedPage>,
    resident_bytes: usize,
    focus: usize,
}

#[derive(Debug)]
pub struct PageCache {
    limits: CacheLimits,
    inner: Mutex<Inner>,
}

impl PageCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(Inner {
                entries: LruCache::new_unbounded(),
                resident_bytes: 0,
                focus: 0,
            }),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Look up a page and mark it as the focus of reading.
    pub fn get(&self, index: usize) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        inner.focus = index;
        let entry = inner.entries.get_mut(&index)?;
        entry.last_access = Instant::now();
        Some(Arc::clone(&entry.image))
    }

    /// Look up a page without moving the focus or refreshing recency.
    pub fn peek(&self, index: usize) -> Option<Arc<DecodedImage>> {
        let inner = self.inner.lock();
        inner.entries.peek(&index).map(|entry| Arc::clone(&entry.image))
    }

    pub fn contains(&self, index: usize) -> bool {
        self.inner.lock().entries.contains_key(&index)
    }

    pub fn set_focus(&self, index: usize) {
        self.inner.lock().focus = index;
    }

    /// Offer a decoded page. Pages larger than the byte ceiling are handed back without being
    /// stored, and an already resident copy of the same page is kept.
    pub fn insert(&self, index: usize, image: Arc<DecodedImage>) -> Admission {
        let size_bytes = image.size_bytes();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.entries.get_mut(&index) {
            existing.last_access = Instant::now();
            let image = Arc::clone(&existing.image);
            return Admission { image, resident: true, evicted: Vec::new() };
        }

        if size_bytes > self.limits.max_bytes {
            trace!(target: "cache::memory", index, size_bytes, "page exceeds byte ceiling");
            return Admission { image, resident: false, evicted: Vec::new() };
        }

        let last_access = Instant::now();
        let page = CachedPage { index, image: Arc::clone(&image), size_bytes, last_access };
        inner.entries.insert(index, page);
        inner.resident_bytes += size_bytes;
        let evicted = self.evict(&mut inner, index);
        Admission { image, resident: true, evicted }
    }

    /// Drop a single page.
    pub fn remove(&self, index: usize) -> Option<CachedPage> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(&index)?;
        inner.resident_bytes -= removed.size_bytes;
        Some(removed)
    }

    /// Drop every resident page.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.resident_bytes = 0;
        dropped
    }

    pub fn state(&self) -> CacheState {
        let inner = self.inner.lock();
        CacheState {
            resident_bytes: inner.resident_bytes,
            entries: inner.entries.len(),
            max_entries: self.limits.max_entries,
            max_bytes: self.limits.max_bytes,
        }
    }

    /// Indices currently resident, least recently used first.
    pub fn resident_indices(&self) -> Vec<usize> {
        self.inner.lock().entries.iter().map(|(index, _)| *index).collect()
    }

    fn evict(&self, inner: &mut Inner, keep: usize) -> Vec<usize> {
        let mut evicted = Vec::new();
        while inner.entries.len() > self.limits.max_entries
            || inner.resident_bytes > self.limits.max_bytes
        {
            let Some(victim) = pick_victim(inner, keep) else {
                break;
            };
            if let Some(page) = inner.entries.remove(&victim) {
                inner.resident_bytes -= page.size_bytes;
                evicted.push(victim);
            }
        }
        if !evicted.is_empty() {
            trace!(target: "cache::memory", ?evicted, focus = inner.focus, "evicted pages");
        }
        evicted
    }
}

/// Furthest page from the focus; iteration runs from least to most recently used, so the first
/// candidate at the maximum distance is also the least recent one.
fn pick_victim(inner: &Inner, keep: usize) -> Option<usize> {
    let mut victim: Option<(usize, usize)> = None;
    for (index, _) in inner.entries.iter() {
        if *index == keep {
            continue;
        }
        let distance = index.abs_diff(inner.focus);
        if victim.is_none_or(|(_, best)| distance > best) {
            victim = Some((*index, distance));
        }
    }
    victim.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageDimensions;

    fn image(bytes: usize) -> Arc<DecodedImage> {
        Arc::new(DecodedImage {
            dimensions: ImageDimensions { width: 1, height: 1 },
            pixels: vec![0; bytes],
        })
    }

    #[test]
    fn evicts_furthest_from_focus() {
        let cache = PageCache::new(CacheLimits { max_entries: 3, max_bytes: 1_000 });
        for index in [0, 1, 2] {
            cache.insert(index, image(10));
        }
        cache.set_focus(2);
        let admission = cache.insert(3, image(10));
        assert_eq!(admission.evicted, vec![0]);
        assert_eq!(cache.state().entries, 3);
    }

    #[test]
    fn equal_distance_prefers_least_recent() {
        let cache = PageCache::new(CacheLimits { max_entries: 2, max_bytes: 1_000 });
        cache.insert(4, image(10));
        cache.insert(6, image(10));
        cache.set_focus(5);
        let admission = cache.insert(5, image(10));
        assert_eq!(admission.evicted, vec![4]);
    }

    #[test]
    fn oversized_page_is_not_cached() {
        let cache = PageCache::new(CacheLimits { max_entries: 4, max_bytes: 16 });
        let admission = cache.insert(0, image(32));
        assert!(!admission.resident);
        assert_eq!(admission.image.size_bytes(), 32);
        assert_eq!(cache.state().resident_bytes, 0);
    }

    #[test]
    fn racing_insert_keeps_resident_copy() {
        let cache = PageCache::new(CacheLimits::default());
        let first = cache.insert(1, image(8)).image;
        let second = cache.insert(1, image(8)).image;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.state().resident_bytes, 8);
    }

    #[test]
    fn clear_resets_bookkeeping() {
        let cache = PageCache::new(CacheLimits::default());
        cache.insert(0, image(8));
        cache.insert(1, image(8));
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.state(), CacheState {
            resident_bytes: 0,
            entries: 0,
            max_entries: 8,
            max_bytes: 50 * 1024 * 1024
        });
    }
}
