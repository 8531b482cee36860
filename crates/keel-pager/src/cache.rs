//! LRU page cache for the pager.

use keel_common::{Page, PageId};
use std::collections::{HashMap, VecDeque};

/// A cached page plus its dirty flag.
#[derive(Debug)]
pub struct Frame {
    /// Cached copy of the page.
    pub page: Page,
    /// True if the cached copy is newer than the on-disk copy.
    pub dirty: bool,
}

/// Least-recently-used page cache.
///
/// Recency is tracked in a deque of page ids: front = most recently used,
/// back = eviction candidate. The cache never does I/O itself; the pager
/// decides when to flush or evict.
#[derive(Debug, Default)]
pub struct LruCache {
    frames: HashMap<PageId, Frame>,
    // Front is the most recently used entry.
    order: VecDeque<PageId>,
}

impl LruCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.frames.contains_key(&id)
    }

    /// Looks up a page, promoting it to most recently used.
    pub fn get(&mut self, id: PageId) -> Option<&Frame> {
        if !self.frames.contains_key(&id) {
            return None;
        }
        self.touch(id);
        self.frames.get(&id)
    }

    /// Inserts or replaces a page and promotes it to most recently used.
    ///
    /// An already-dirty entry stays dirty even if the new copy is clean.
    pub fn insert(&mut self, page: Page, dirty: bool) {
        let id = page.id;
        match self.frames.get_mut(&id) {
            Some(frame) => {
                frame.page = page;
                frame.dirty |= dirty;
                self.touch(id);
            }
            None => {
                self.frames.insert(id, Frame { page, dirty });
                self.order.push_front(id);
            }
        }
    }

    /// Removes and returns the least recently used frame.
    pub fn pop_lru(&mut self) -> Option<Frame> {
        let id = self.order.pop_back()?;
        self.frames.remove(&id)
    }

    /// Iterates over every frame mutably, in no particular order.
    pub fn frames_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.values_mut()
    }

    fn touch(&mut self, id: PageId) {
        if let Some(pos) = self.order.iter().position(|&p| p == id) {
            if self.order.remove(pos).is_some() {
                self.order.push_front(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: u32, fill: u8) -> Page {
        let mut p = Page::new(PageId(id));
        p.data[0] = fill;
        p
    }

    #[test]
    fn test_cache_empty() {
        let mut cache = LruCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.get(PageId(1)).is_none());
        assert!(cache.pop_lru().is_none());
    }

    #[test]
    fn test_cache_insert_get() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 0xAA), false);

        let frame = cache.get(PageId(1)).unwrap();
        assert_eq!(frame.page.data[0], 0xAA);
        assert!(!frame.dirty);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_insert_replaces() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 0xAA), false);
        cache.insert(page(1, 0xBB), true);

        assert_eq!(cache.len(), 1);
        let frame = cache.get(PageId(1)).unwrap();
        assert_eq!(frame.page.data[0], 0xBB);
        assert!(frame.dirty);
    }

    #[test]
    fn test_cache_dirty_is_sticky() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 0xAA), true);
        // A clean re-insert must not lose the pending write.
        cache.insert(page(1, 0xBB), false);
        assert!(cache.get(PageId(1)).unwrap().dirty);
    }

    #[test]
    fn test_cache_pop_lru_order() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 1), false);
        cache.insert(page(2, 2), false);
        cache.insert(page(3, 3), false);

        let victim = cache.pop_lru().unwrap();
        assert_eq!(victim.page.id, PageId(1));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(PageId(1)));
    }

    #[test]
    fn test_cache_get_promotes() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 1), false);
        cache.insert(page(2, 2), false);
        cache.insert(page(3, 3), false);

        // Touch page 1 so page 2 becomes the eviction candidate.
        cache.get(PageId(1)).unwrap();
        let victim = cache.pop_lru().unwrap();
        assert_eq!(victim.page.id, PageId(2));
    }

    #[test]
    fn test_cache_insert_promotes() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 1), false);
        cache.insert(page(2, 2), false);
        cache.insert(page(1, 9), true);

        let victim = cache.pop_lru().unwrap();
        assert_eq!(victim.page.id, PageId(2));
    }

    #[test]
    fn test_cache_frames_mut() {
        let mut cache = LruCache::new();
        cache.insert(page(1, 1), true);
        cache.insert(page(2, 2), true);

        for frame in cache.frames_mut() {
            frame.dirty = false;
        }
        assert!(!cache.get(PageId(1)).unwrap().dirty);
        assert!(!cache.get(PageId(2)).unwrap().dirty);
    }
}
