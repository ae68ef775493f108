//! Page storage: maps page identifiers to nodes.
//!
//! The page file is the exclusive owner of every node of a tree. Nodes refer
//! to their children only by [`PageId`], so the tree is an arena without
//! ownership cycles.

use crate::error::{IndexError, Result};
use crate::statistics::Statistics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a page in a [`MemoryPageFile`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageId(pub u32);

impl PageId {
    /// Marker for nodes that have not been written yet.
    pub const UNASSIGNED: PageId = PageId(u32::MAX);

    /// Reserved for tree metadata; never holds a node.
    pub const HEADER: PageId = PageId(0);

    /// The root node always lives here.
    pub const ROOT: PageId = PageId(1);
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can be stored in a page file.
pub trait Page {
    fn page_id(&self) -> PageId;
    fn set_page_id(&mut self, id: PageId);
}

/// In-memory page file with id allocation, a free list and access counters.
#[derive(Debug)]
pub struct MemoryPageFile<N> {
    /// Slot `i` holds page `i`. Slot 0 is the header page.
    pages: Vec<Option<N>>,
    free: Vec<PageId>,
    statistics: Statistics,
}

impl<N: Page> MemoryPageFile<N> {
    /// Create an empty page file with the header page reserved.
    pub fn new() -> Self {
        Self {
            pages: vec![None],
            free: Vec::new(),
            statistics: Statistics::new(),
        }
    }

    /// Allocate a fresh page id. Freed ids are reused first.
    pub fn next_page_id(&mut self) -> PageId {
        if let Some(id) = self.free.pop() {
            return id;
        }
        let id = PageId(self.pages.len() as u32);
        self.pages.push(None);
        id
    }

    /// Read a node. A missing page means the tree is corrupted.
    pub fn get_node(&self, id: PageId) -> Result<&N> {
        self.statistics.count_page_read();
        self.pages
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(IndexError::PageNotFound(id))
    }

    /// Persist a node, assigning a fresh id if it has none. Returns its id.
    pub fn write_node(&mut self, mut node: N) -> PageId {
        self.statistics.count_page_write();
        let mut id = node.page_id();
        if id == PageId::UNASSIGNED {
            id = self.next_page_id();
            node.set_page_id(id);
        }
        let slot = id.0 as usize;
        if slot >= self.pages.len() {
            self.pages.resize_with(slot + 1, || None);
        }
        self.pages[slot] = Some(node);
        id
    }

    /// Remove a node and recycle its id.
    pub fn delete_node(&mut self, id: PageId) -> Result<N> {
        let node = self
            .pages
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(IndexError::PageNotFound(id))?;
        self.free.push(id);
        Ok(node)
    }

    pub fn root_id(&self) -> PageId {
        PageId::ROOT
    }

    /// Number of live nodes.
    pub fn num_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// Iterate over live nodes in page id order.
    pub fn iter(&self) -> impl Iterator<Item = &N> {
        self.pages.iter().filter_map(Option::as_ref)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Rebuild a page file from previously saved nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> Result<Self> {
        let mut file = Self::new();
        for node in nodes {
            let id = node.page_id();
            if id == PageId::HEADER || id == PageId::UNASSIGNED {
                return Err(IndexError::corrupted(format!(
                    "node record carries reserved page id {}",
                    id
                )));
            }
            if file.pages.get(id.0 as usize).is_some_and(Option::is_some) {
                return Err(IndexError::corrupted(format!("duplicate page id {}", id)));
            }
            file.write_node(node);
        }
        file.free = (1..file.pages.len() as u32)
            .map(PageId)
            .filter(|id| file.pages[id.0 as usize].is_none())
            .collect();
        file.statistics.clear();
        Ok(file)
    }
}

impl<N: Page> Default for MemoryPageFile<N> {
    fn default() -> Self {
        Self::new()
    }
}
