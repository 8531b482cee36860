//! Tree consistency checker for tests.
//!
//! Walks the whole structure after mutation batches and asserts the node
//! ordering, width, size, and leaf-chain properties the tree must maintain
//! after every public operation.

use crate::index::Index;
use crate::node::{MERGE_THRESHOLD, SPLIT_THRESHOLD};
use bytes::Bytes;
use keel_common::{PageId, PAGE_SIZE};

/// Asserts structural consistency of the whole tree.
pub(crate) fn check_tree(index: &Index) {
    let mut leaves = Vec::new();
    check_node(index, index.root(), None, None, true, &mut leaves);

    // All leaves sit at the same depth by construction of the recursion;
    // now verify the chain visits exactly the in-order leaves.
    let mut chain_id = leaves[0].0;
    for (expected_id, _) in &leaves {
        assert_eq!(chain_id, *expected_id, "leaf chain out of order");
        let leaf = index.read_node(chain_id).unwrap();
        chain_id = leaf.next;
    }
    assert_eq!(chain_id, PageId::INVALID, "leaf chain has a dangling tail");

    // Keys across the chain are globally ascending with no duplicates.
    let all_keys: Vec<&Bytes> = leaves.iter().flat_map(|(_, keys)| keys).collect();
    for pair in all_keys.windows(2) {
        assert!(pair[0] < pair[1], "keys not globally ascending");
    }
}

/// Recursively validates one node and returns its leaf depth.
fn check_node(
    index: &Index,
    id: PageId,
    lower: Option<Bytes>,
    upper: Option<Bytes>,
    is_root: bool,
    leaves: &mut Vec<(PageId, Vec<Bytes>)>,
) -> usize {
    let node = index.read_node(id).unwrap();

    for pair in node.keys.windows(2) {
        assert!(pair[0] < pair[1], "node {id}: keys not strictly sorted");
    }
    for key in &node.keys {
        if let Some(lower) = &lower {
            assert!(key >= lower, "node {id}: key below subtree bound");
        }
        if let Some(upper) = &upper {
            assert!(key < upper, "node {id}: key above subtree bound");
        }
    }

    let size = node.encoded_size();
    assert!(size <= PAGE_SIZE, "node {id}: overflows its page");
    // A node holding a single maximal entry legitimately exceeds the
    // split bound; anything with two or more keys must have been split.
    assert!(
        size <= SPLIT_THRESHOLD || node.keys.len() <= 1,
        "node {id}: above split threshold"
    );
    if !is_root {
        assert!(size >= MERGE_THRESHOLD, "node {id}: below merge threshold");
    }

    if node.is_leaf() {
        assert_eq!(
            node.keys.len(),
            node.values.len(),
            "node {id}: leaf width mismatch"
        );
        assert!(node.children.is_empty(), "node {id}: leaf has children");
        leaves.push((id, node.keys.clone()));
        return 1;
    }

    assert_eq!(
        node.children.len(),
        node.keys.len() + 1,
        "node {id}: internal width mismatch"
    );
    assert!(node.values.is_empty(), "node {id}: internal has values");
    assert_eq!(node.next, PageId::INVALID, "node {id}: internal has next link");

    let mut depth = None;
    for (i, child) in node.children.iter().enumerate() {
        let child_lower = if i == 0 {
            lower.clone()
        } else {
            Some(node.keys[i - 1].clone())
        };
        let child_upper = if i == node.keys.len() {
            upper.clone()
        } else {
            Some(node.keys[i].clone())
        };
        let child_depth = check_node(index, *child, child_lower, child_upper, false, leaves);
        match depth {
            None => depth = Some(child_depth),
            Some(d) => assert_eq!(d, child_depth, "node {id}: uneven leaf depth"),
        }
    }
    depth.unwrap() + 1
}
