//! Index lifecycle, meta-page handling, and point lookup.

use crate::node::Node;
use keel_common::{KeelError, Page, PageId, Result};
use keel_pager::Pager;

/// Meta page id in the index file.
pub(crate) const META_PAGE_ID: PageId = PageId(0);

/// Ordered map from byte-string keys to 64-bit values, persisted in one
/// paged file.
///
/// The meta page (page 0) records the root page id and the pager's
/// free-list head; both are re-synced whenever they change structurally and
/// again at close.
pub struct Index {
    pub(crate) pager: Pager,
    pub(crate) root: PageId,
}

impl Index {
    /// Opens an index over the given pager, bootstrapping a fresh file with
    /// a meta page and an empty leaf root.
    pub fn open(pager: Pager) -> Result<Self> {
        if pager.num_pages()? == 0 {
            // Page 0 becomes the meta page, page 1 the initial leaf root.
            pager.new_page()?;
            let root_page = pager.new_page()?;

            let index = Index {
                root: root_page.id,
                pager,
            };
            index.sync_meta()?;
            index.write_node(root_page.id, &Node::new_leaf())?;
            return Ok(index);
        }

        let meta = pager.read_page(META_PAGE_ID)?;
        let root = PageId(u32::from_le_bytes([
            meta.data[0],
            meta.data[1],
            meta.data[2],
            meta.data[3],
        ]));
        let free_list = PageId(u32::from_le_bytes([
            meta.data[4],
            meta.data[5],
            meta.data[6],
            meta.data[7],
        ]));
        pager.set_free_list_id(free_list)?;

        Ok(Index { root, pager })
    }

    /// Current root page id.
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Point lookup: returns the value stored for `key`.
    pub fn search(&self, key: &[u8]) -> Result<u64> {
        let mut node = self.read_node(self.root)?;

        while !node.is_leaf() {
            let i = node.keys.partition_point(|k| k.as_ref() <= key);
            node = self.read_node(node.children[i])?;
        }

        match node.keys.binary_search_by(|k| k.as_ref().cmp(key)) {
            Ok(i) => Ok(node.values[i]),
            Err(_) => Err(KeelError::KeyNotFound),
        }
    }

    /// Syncs the meta page, then closes the pager.
    pub fn close(&self) -> Result<()> {
        self.sync_meta()?;
        self.pager.close()
    }

    /// Reads and verifies the node stored at `id`.
    pub(crate) fn read_node(&self, id: PageId) -> Result<Node> {
        let page = self.pager.read_page(id)?;
        Node::decode(&page)
    }

    /// Encodes `node` into page `id` through the cache.
    pub(crate) fn write_node(&self, id: PageId, node: &Node) -> Result<()> {
        let mut page = Page::new(id);
        node.encode_into(&mut page);
        self.pager.write_page(&page)
    }

    /// Persists the root id and free-list head to the meta page.
    pub(crate) fn sync_meta(&self) -> Result<()> {
        let mut meta = self.pager.read_page(META_PAGE_ID)?;
        meta.data[0..4].copy_from_slice(&self.root.0.to_le_bytes());
        meta.data[4..8].copy_from_slice(&self.pager.free_list_id()?.0.to_le_bytes());
        self.pager.write_page(&meta)
    }
}
