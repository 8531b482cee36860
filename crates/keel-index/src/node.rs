//! B+tree node representation and slotted-page encoding.
//!
//! On-page layout (little-endian throughout):
//!
//! ```text
//! offset  len  field
//! 0       2    node type (0 = internal, 1 = leaf)
//! 2       2    num_slots
//! 4       2    free_space_ptr (lowest key-heap offset)
//! 6       4    next leaf page id (0 for internals)
//! 10      4    CRC32 checksum
//! 14      2    reserved
//! 16      2*n  slot directory: key start offsets
//! ...          pointer section: leaf 8*n values, internal 4*(n+1) children
//! ...          free space
//! ...          key heap, growing down from the page end
//! ```
//!
//! Key `i` spans `slot[i] .. end_i`, where `end_i` is `slot[i-1]` for
//! `i > 0` and the page end for `i == 0`. The checksum covers the whole
//! page with bytes 10..14 treated as zero.

use bytes::Bytes;
use keel_common::{KeelError, Page, PageId, Result, PAGE_SIZE};

/// Fixed node header size in bytes.
pub const HEADER_SIZE: usize = 16;
/// Size of one slot-directory entry.
pub const SLOT_SIZE: usize = 2;
/// Size of one leaf value (a log-file offset).
pub const VALUE_SIZE: usize = 8;
/// Size of one child page id.
pub const CHILD_SIZE: usize = 4;

/// A node whose encoded size exceeds this must split.
pub const SPLIT_THRESHOLD: usize = PAGE_SIZE / 2;
/// A non-root node whose encoded size drops below this must be rebalanced.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

const CHECKSUM_RANGE: std::ops::Range<usize> = 10..14;

/// Node variants, stored in the header's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

/// In-memory form of one B+tree node.
///
/// Leaves carry `values` (one per key) and the `next` link of the leaf
/// chain; internals carry `children` (one more than keys). The two variants
/// share the page container and differ only in their pointer section.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_type: NodeType,
    pub keys: Vec<Bytes>,
    pub values: Vec<u64>,
    pub children: Vec<PageId>,
    pub next: PageId,
}

impl Node {
    pub fn new_leaf() -> Self {
        Self {
            node_type: NodeType::Leaf,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            next: PageId::INVALID,
        }
    }

    pub fn new_internal() -> Self {
        Self {
            node_type: NodeType::Internal,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            next: PageId::INVALID,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.node_type == NodeType::Leaf
    }

    /// Bytes this node occupies when encoded: header, key heap, slot
    /// directory, and pointer section. Drives the split/merge decisions.
    pub fn encoded_size(&self) -> usize {
        let key_bytes: usize = self.keys.iter().map(|k| k.len()).sum();
        let pointer_bytes = if self.is_leaf() {
            self.values.len() * VALUE_SIZE
        } else {
            self.children.len() * CHILD_SIZE
        };
        HEADER_SIZE + key_bytes + self.keys.len() * SLOT_SIZE + pointer_bytes
    }

    /// Serializes this node into `page` and stamps the checksum.
    pub fn encode_into(&self, page: &mut Page) {
        page.zero();
        let data = &mut page.data[..];

        let num_slots = self.keys.len() as u16;
        data[0..2].copy_from_slice(&(self.node_type as u16).to_le_bytes());
        data[2..4].copy_from_slice(&num_slots.to_le_bytes());
        data[6..10].copy_from_slice(&self.next.0.to_le_bytes());

        // Keys grow down from the page end; slots record their starts.
        let mut free_space_ptr = PAGE_SIZE;
        let mut slot_offset = HEADER_SIZE;
        for key in &self.keys {
            free_space_ptr -= key.len();
            data[free_space_ptr..free_space_ptr + key.len()].copy_from_slice(key);
            data[slot_offset..slot_offset + SLOT_SIZE]
                .copy_from_slice(&(free_space_ptr as u16).to_le_bytes());
            slot_offset += SLOT_SIZE;
        }
        data[4..6].copy_from_slice(&(free_space_ptr as u16).to_le_bytes());

        let mut pointer_offset = slot_offset;
        if self.is_leaf() {
            for value in &self.values {
                data[pointer_offset..pointer_offset + VALUE_SIZE]
                    .copy_from_slice(&value.to_le_bytes());
                pointer_offset += VALUE_SIZE;
            }
        } else {
            for child in &self.children {
                data[pointer_offset..pointer_offset + CHILD_SIZE]
                    .copy_from_slice(&child.0.to_le_bytes());
                pointer_offset += CHILD_SIZE;
            }
        }

        let checksum = page_checksum(data);
        data[CHECKSUM_RANGE].copy_from_slice(&checksum.to_le_bytes());
    }

    /// Decodes a node from a page, verifying the checksum first.
    pub fn decode(page: &Page) -> Result<Node> {
        let data = &page.data[..];

        let stored = read_u32(data, CHECKSUM_RANGE.start);
        let computed = page_checksum(data);
        if stored != computed {
            return Err(KeelError::ChecksumMismatch {
                page_id: page.id.0,
                stored,
                computed,
            });
        }

        let raw_type = read_u16(data, 0);
        let node_type = if raw_type == NodeType::Leaf as u16 {
            NodeType::Leaf
        } else {
            NodeType::Internal
        };
        let num_slots = read_u16(data, 2) as usize;
        let next = PageId(read_u32(data, 6));

        let mut keys = Vec::with_capacity(num_slots);
        let mut slot_offset = HEADER_SIZE;
        let mut end = PAGE_SIZE;
        for _ in 0..num_slots {
            let start = read_u16(data, slot_offset) as usize;
            keys.push(Bytes::copy_from_slice(&data[start..end]));
            slot_offset += SLOT_SIZE;
            end = start;
        }

        let mut node = Node {
            node_type,
            keys,
            values: Vec::new(),
            children: Vec::new(),
            next,
        };

        let mut pointer_offset = slot_offset;
        if node.is_leaf() {
            node.values.reserve(num_slots);
            for _ in 0..num_slots {
                node.values.push(read_u64(data, pointer_offset));
                pointer_offset += VALUE_SIZE;
            }
        } else {
            node.children.reserve(num_slots + 1);
            for _ in 0..num_slots + 1 {
                node.children.push(PageId(read_u32(data, pointer_offset)));
                pointer_offset += CHILD_SIZE;
            }
        }

        Ok(node)
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// CRC32 (IEEE) over the page with the checksum field treated as zero.
fn page_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..CHECKSUM_RANGE.start]);
    hasher.update(&[0u8; 4]);
    hasher.update(&data[CHECKSUM_RANGE.end..]);
    hasher.finalize()
}
