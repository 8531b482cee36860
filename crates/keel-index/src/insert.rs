//! Insert path: recursive descent with leaf/internal splits and root
//! promotion.

use crate::index::Index;
use crate::node::{Node, SPLIT_THRESHOLD};
use bytes::Bytes;
use keel_common::{KeelError, PageId, Result};

/// How an insert treats an existing (or missing) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Insert or overwrite.
    Upsert,
    /// Fail with `KeyAlreadyExists` if the key is present.
    InsertOnly,
    /// Fail with `KeyNotFound` if the key is absent.
    UpdateOnly,
}

/// A completed split: the separator to promote and the new right sibling.
type Promotion = Option<(Bytes, PageId)>;

impl Index {
    /// Inserts `key -> value` according to `mode`, splitting oversize nodes
    /// on the way back up. A root split allocates a new internal root and
    /// persists it to the meta page before returning.
    pub fn insert(&mut self, key: &[u8], value: u64, mode: InsertMode) -> Result<()> {
        if let Some((promoted, right_id)) = self.insert_into(self.root, key, value, mode)? {
            let mut new_root = Node::new_internal();
            new_root.keys.push(promoted);
            new_root.children.push(self.root);
            new_root.children.push(right_id);

            let page = self.pager.new_page()?;
            self.write_node(page.id, &new_root)?;
            self.root = page.id;
            self.sync_meta()?;
        }
        Ok(())
    }

    fn insert_into(
        &mut self,
        id: PageId,
        key: &[u8],
        value: u64,
        mode: InsertMode,
    ) -> Result<Promotion> {
        let mut node = self.read_node(id)?;

        if node.is_leaf() {
            match node.keys.binary_search_by(|k| k.as_ref().cmp(key)) {
                Ok(i) => {
                    if mode == InsertMode::InsertOnly {
                        return Err(KeelError::KeyAlreadyExists);
                    }
                    node.values[i] = value;
                    self.write_node(id, &node)?;
                    return Ok(None);
                }
                Err(i) => {
                    if mode == InsertMode::UpdateOnly {
                        return Err(KeelError::KeyNotFound);
                    }
                    node.keys.insert(i, Bytes::copy_from_slice(key));
                    node.values.insert(i, value);
                }
            }
        } else {
            let i = node.keys.partition_point(|k| k.as_ref() <= key);
            match self.insert_into(node.children[i], key, value, mode)? {
                Some((promoted, right_id)) => {
                    node.keys.insert(i, promoted);
                    node.children.insert(i + 1, right_id);
                }
                None => return Ok(None),
            }
        }

        // A single entry larger than the threshold has nothing to split
        // off; splitting it would only fabricate an empty sibling. The
        // node keeps its page to itself instead.
        if node.encoded_size() > SPLIT_THRESHOLD && node.keys.len() > 1 {
            return self.split_node(id, node).map(Some);
        }

        self.write_node(id, &node)?;
        Ok(None)
    }

    /// Splits an oversize node in place, writing both halves. For leaves
    /// the separator is a copy of the right half's first key and the leaf
    /// chain is re-linked; for internals the separator leaves both halves.
    /// Callers guarantee at least two keys, so neither half ends up empty.
    fn split_node(&mut self, id: PageId, mut node: Node) -> Result<(Bytes, PageId)> {
        let right_page = self.pager.new_page()?;
        let right_id = right_page.id;
        let mid = node.keys.len() / 2;

        let (promoted, right) = if node.is_leaf() {
            let mut right = Node::new_leaf();
            right.keys = node.keys.split_off(mid);
            right.values = node.values.split_off(mid);
            right.next = node.next;
            node.next = right_id;
            (right.keys[0].clone(), right)
        } else {
            let promoted = node.keys[mid].clone();
            let mut right = Node::new_internal();
            right.keys = node.keys.split_off(mid + 1);
            right.children = node.children.split_off(mid + 1);
            node.keys.truncate(mid);
            (promoted, right)
        };

        self.write_node(right_id, &right)?;
        self.write_node(id, &node)?;
        Ok((promoted, right_id))
    }
}
