//! Forward range cursor over the leaf chain.

use crate::index::Index;
use bytes::Bytes;
use keel_common::{PageId, Result};

/// Forward-only, single-use cursor yielding `(key, value)` pairs in
/// ascending key order.
///
/// The cursor walks the leaf chain through `next` links and observes a
/// consistent view only if no writes occur while it is live.
pub struct Cursor<'a> {
    index: &'a Index,
    page_id: PageId,
    key_num: usize,
    end_key: Option<Bytes>,
    at_end: bool,
}

impl Index {
    /// Opens a cursor over `[start, end)`. A missing `start` begins at the
    /// first key in the tree; a missing `end` scans to the last.
    pub fn cursor(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Cursor<'_>> {
        let mut page_id = self.root;
        let mut node = self.read_node(page_id)?;
        let mut key_num = 0;

        match start {
            None => {
                while !node.is_leaf() {
                    page_id = node.children[0];
                    node = self.read_node(page_id)?;
                }
            }
            Some(start) => {
                while !node.is_leaf() {
                    let i = node.keys.partition_point(|k| k.as_ref() <= start);
                    page_id = node.children[i];
                    node = self.read_node(page_id)?;
                }
                key_num = node.keys.partition_point(|k| k.as_ref() < start);
                if key_num >= node.keys.len() {
                    // Start lies past this leaf; resume at the next one.
                    page_id = node.next;
                    key_num = 0;
                }
            }
        }

        Ok(Cursor {
            index: self,
            page_id,
            key_num,
            end_key: end.map(Bytes::copy_from_slice),
            at_end: !page_id.is_valid(),
        })
    }
}

impl Cursor<'_> {
    /// Returns the next entry, or `None` once the range is exhausted.
    pub fn next(&mut self) -> Result<Option<(Bytes, u64)>> {
        loop {
            if self.at_end {
                return Ok(None);
            }

            let node = self.index.read_node(self.page_id)?;
            if self.key_num < node.keys.len() {
                let key = node.keys[self.key_num].clone();
                if let Some(end) = &self.end_key {
                    if key.as_ref() >= end.as_ref() {
                        self.at_end = true;
                        return Ok(None);
                    }
                }
                let value = node.values[self.key_num];
                self.key_num += 1;
                return Ok(Some((key, value)));
            }

            self.page_id = node.next;
            self.key_num = 0;
            if !self.page_id.is_valid() {
                self.at_end = true;
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::test_pager_config;
    use crate::insert::InsertMode;
    use keel_pager::Pager;

    fn open_test_index(dir: &tempfile::TempDir) -> Index {
        let pager =
            Pager::open(dir.path().join("index.db"), test_pager_config()).unwrap();
        Index::open(pager).unwrap()
    }

    fn fill(index: &mut Index, n: u64) {
        for i in 0..n {
            let key = format!("key_{i:04}");
            index.insert(key.as_bytes(), i, InsertMode::Upsert).unwrap();
        }
    }

    fn collect(cursor: &mut Cursor<'_>) -> Vec<(Bytes, u64)> {
        let mut items = Vec::new();
        while let Some(item) = cursor.next().unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_cursor_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_test_index(&dir);

        let mut cursor = index.cursor(None, None).unwrap();
        assert!(cursor.next().unwrap().is_none());
        // A finished cursor stays finished.
        assert!(cursor.next().unwrap().is_none());
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_full_scan_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 2000);

        let mut cursor = index.cursor(None, None).unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 2000);
        for (i, (key, value)) in items.iter().enumerate() {
            assert_eq!(key.as_ref(), format!("key_{i:04}").as_bytes());
            assert_eq!(*value, i as u64);
        }
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_start_bound_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 100);

        let mut cursor = index.cursor(Some(b"key_0050"), None).unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 50);
        assert_eq!(items[0].0.as_ref(), b"key_0050");
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_end_bound_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 100);

        let mut cursor = index.cursor(Some(b"key_0010"), Some(b"key_0020")).unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 10);
        assert_eq!(items[0].0.as_ref(), b"key_0010");
        assert_eq!(items[9].0.as_ref(), b"key_0019");
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_start_between_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 200);

        // "key_0100a" sorts between key_0100 and key_0101.
        let mut cursor = index
            .cursor(Some(b"key_0100a"), Some(b"key_0102"))
            .unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0.as_ref(), b"key_0101");
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_start_past_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 50);

        let mut cursor = index.cursor(Some(b"zzz"), None).unwrap();
        assert!(cursor.next().unwrap().is_none());
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_range_across_many_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 2000);

        let mut cursor = index
            .cursor(Some(b"key_0055"), Some(b"key_1709"))
            .unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 1654);
        assert_eq!(items[0].0.as_ref(), b"key_0055");
        assert_eq!(items[items.len() - 1].0.as_ref(), b"key_1708");
        index.close().unwrap();
    }

    #[test]
    fn test_cursor_after_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = open_test_index(&dir);
        fill(&mut index, 1000);

        for i in (0..1000u64).step_by(2) {
            let key = format!("key_{i:04}");
            index.delete(key.as_bytes()).unwrap();
        }

        let mut cursor = index.cursor(None, None).unwrap();
        let items = collect(&mut cursor);
        assert_eq!(items.len(), 500);
        for (key, value) in &items {
            assert_eq!(*value % 2, 1);
            assert_eq!(key.as_ref(), format!("key_{value:04}").as_bytes());
        }
        index.close().unwrap();
    }
}
