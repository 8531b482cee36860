//! Page definitions for KeelDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for a page within a paged file.
///
/// Page 0 of the index file is the meta page. The zero id also serves as
/// the nil link in the free-page list and the leaf chain, so `INVALID`
/// doubles as "no page".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PageId(pub u32);

impl PageId {
    /// The nil page id (also the meta page of an index file).
    pub const INVALID: PageId = PageId(0);

    /// Returns true if this id refers to an actual page link.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Byte offset of this page within its file.
    pub fn file_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-size page buffer.
///
/// Pages are value objects: the caller owns this buffer between read and
/// write, and the pager cache keeps its own copies.
#[derive(Debug, Clone)]
pub struct Page {
    /// Identifier of this page.
    pub id: PageId,
    /// Raw page contents.
    pub data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Creates a new zeroed page with the given id.
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Creates a page from an existing buffer.
    pub fn from_data(id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self { id, data }
    }

    /// Zeroes the page contents in place.
    pub fn zero(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_page_id_validity() {
        assert!(!PageId::INVALID.is_valid());
        assert!(!PageId(0).is_valid());
        assert!(PageId(1).is_valid());
        assert!(PageId(u32::MAX).is_valid());
    }

    #[test]
    fn test_page_id_file_offset() {
        assert_eq!(PageId(0).file_offset(), 0);
        assert_eq!(PageId(1).file_offset(), 4096);
        assert_eq!(PageId(10).file_offset(), 40960);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId(5).to_string(), "5");
        assert_eq!(PageId(0).to_string(), "0");
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId(1) < PageId(2));
        assert!(PageId(0) < PageId(u32::MAX));
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId(1));
        set.insert(PageId(2));
        set.insert(PageId(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_new_is_zeroed() {
        let page = Page::new(PageId(3));
        assert_eq!(page.id, PageId(3));
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_zero() {
        let mut page = Page::new(PageId(1));
        page.data[0] = 0xAB;
        page.data[PAGE_SIZE - 1] = 0xCD;
        page.zero();
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_clone_is_deep() {
        let mut page = Page::new(PageId(1));
        page.data[0] = 0x11;
        let copy = page.clone();
        page.data[0] = 0x22;
        assert_eq!(copy.data[0], 0x11);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
