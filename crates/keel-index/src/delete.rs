//! Delete path: recursive removal with borrow/merge rebalancing and root
//! collapse.
//!
//! Parent context is carried as the parent's page id plus the child's slot
//! index; sibling relationships are resolved through the parent's child
//! array, never through in-memory back-pointers.

use crate::index::Index;
use crate::node::{Node, MERGE_THRESHOLD};
use keel_common::{KeelError, PageId, Result};

impl Index {
    /// Removes `key`, rebalancing underfull nodes on the way back up. An
    /// internal root left with zero keys collapses to its sole child; a
    /// leaf root may legally become empty.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.delete_from(self.root, key)?;

        let root = self.read_node(self.root)?;
        if !root.is_leaf() && root.keys.is_empty() {
            let old_root = self.root;
            self.root = root.children[0];
            self.pager.free_page(old_root)?;
            self.sync_meta()?;
        }
        Ok(())
    }

    fn delete_from(&mut self, id: PageId, key: &[u8]) -> Result<()> {
        let mut node = self.read_node(id)?;

        if node.is_leaf() {
            return match node.keys.binary_search_by(|k| k.as_ref().cmp(key)) {
                Ok(i) => {
                    node.keys.remove(i);
                    node.values.remove(i);
                    self.write_node(id, &node)
                }
                Err(_) => Err(KeelError::KeyNotFound),
            };
        }

        let i = node.keys.partition_point(|k| k.as_ref() <= key);
        let child_id = node.children[i];
        self.delete_from(child_id, key)?;

        let child = self.read_node(child_id)?;
        if child.encoded_size() < MERGE_THRESHOLD {
            self.fix_underflow(id, i)?;
        }
        Ok(())
    }

    /// Rebalances the underfull child at `child_idx` of `parent_id`:
    /// borrow from the left sibling, else from the right, else merge a
    /// sibling pair and return the absorbed page to the free list.
    fn fix_underflow(&mut self, parent_id: PageId, child_idx: usize) -> Result<()> {
        let mut parent = self.read_node(parent_id)?;
        let child_id = parent.children[child_idx];
        let mut child = self.read_node(child_id)?;

        if child_idx > 0 {
            let left_id = parent.children[child_idx - 1];
            let mut left = self.read_node(left_id)?;
            if left.encoded_size() > MERGE_THRESHOLD {
                borrow_left(&mut parent, &mut left, &mut child, child_idx - 1);
                self.write_node(left_id, &left)?;
                self.write_node(parent_id, &parent)?;
                return self.write_node(child_id, &child);
            }
        }

        if child_idx + 1 < parent.children.len() {
            let right_id = parent.children[child_idx + 1];
            let mut right = self.read_node(right_id)?;
            if right.encoded_size() > MERGE_THRESHOLD {
                borrow_right(&mut parent, &mut right, &mut child, child_idx);
                self.write_node(right_id, &right)?;
                self.write_node(parent_id, &parent)?;
                return self.write_node(child_id, &child);
            }
        }

        if child_idx > 0 {
            // Absorb the child into its left sibling.
            let left_id = parent.children[child_idx - 1];
            let mut left = self.read_node(left_id)?;
            merge(&mut parent, &mut left, &child, child_idx - 1);
            self.pager.free_page(child_id)?;
            self.write_node(left_id, &left)?;
            self.write_node(parent_id, &parent)?;
        } else {
            // Absorb the right sibling into the child.
            let right_id = parent.children[child_idx + 1];
            let right = self.read_node(right_id)?;
            merge(&mut parent, &mut child, &right, child_idx);
            self.pager.free_page(right_id)?;
            self.write_node(child_id, &child)?;
            self.write_node(parent_id, &parent)?;
        }
        // The free-list head moved; keep the meta page in step.
        self.sync_meta()
    }
}

/// Moves the last entry of the left sibling to the front of `child`.
///
/// For leaves the moved key becomes the new separator; for internals the
/// old separator rotates down into `child` and the left sibling's last key
/// rotates up into the parent, carrying its right child along.
fn borrow_left(parent: &mut Node, left: &mut Node, child: &mut Node, sep_idx: usize) {
    let last = left.keys.len() - 1;
    if child.is_leaf() {
        let key = left.keys.remove(last);
        let value = left.values.remove(last);
        child.keys.insert(0, key);
        child.values.insert(0, value);
        parent.keys[sep_idx] = child.keys[0].clone();
    } else {
        let new_separator = left.keys.remove(last);
        let moved_child = left.children.remove(last + 1);
        let old_separator =
            std::mem::replace(&mut parent.keys[sep_idx], new_separator);
        child.keys.insert(0, old_separator);
        child.children.insert(0, moved_child);
    }
}

/// Moves the first entry of the right sibling to the back of `child`,
/// mirroring [`borrow_left`].
fn borrow_right(parent: &mut Node, right: &mut Node, child: &mut Node, sep_idx: usize) {
    if child.is_leaf() {
        child.keys.push(right.keys.remove(0));
        child.values.push(right.values.remove(0));
        parent.keys[sep_idx] = right.keys[0].clone();
    } else {
        let new_separator = right.keys.remove(0);
        let moved_child = right.children.remove(0);
        let old_separator =
            std::mem::replace(&mut parent.keys[sep_idx], new_separator);
        child.keys.push(old_separator);
        child.children.push(moved_child);
    }
}

/// Concatenates `right` into `left` and drops the separator (and the
/// right-hand child pointer) from the parent. Leaves inherit the right
/// sibling's chain link; internals pull the separator down between the two
/// key runs.
fn merge(parent: &mut Node, left: &mut Node, right: &Node, sep_idx: usize) {
    if left.is_leaf() {
        left.keys.extend(right.keys.iter().cloned());
        left.values.extend(right.values.iter().copied());
        left.next = right.next;
    } else {
        left.keys.push(parent.keys[sep_idx].clone());
        left.keys.extend(right.keys.iter().cloned());
        left.children.extend(right.children.iter().copied());
    }

    parent.keys.remove(sep_idx);
    parent.children.remove(sep_idx + 1);
}
