//! Tree state and the operations shared by every tree family.

use log::debug;
use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::page::{MemoryPageFile, Page, PageId};
use crate::relation::Oid;
use crate::statistics::Statistics;

use super::node::{Node, TreeEntry, TreeHeader};
use super::path::TreePath;

/// Structural summary of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub height: usize,
    pub leaf_nodes: usize,
    pub directory_nodes: usize,
    pub objects: usize,
}

/// Header plus page file: the state every tree family is built on.
///
/// Families supply entry construction, split policy and bound computation;
/// the core handles page access, path navigation, deletion with
/// condensation, and the level-by-level scaffolding of bulk loads.
#[derive(Debug)]
pub struct TreeCore<E> {
    file: MemoryPageFile<Node<E>>,
    header: TreeHeader,
}

impl<E: TreeEntry> TreeCore<E> {
    /// Create a tree consisting of one empty root leaf.
    pub fn new(header: TreeHeader) -> Self {
        let mut core = Self {
            file: MemoryPageFile::new(),
            header,
        };
        core.initialize();
        core
    }

    /// Reassemble a tree from a header and its nodes.
    pub fn from_parts(header: TreeHeader, file: MemoryPageFile<Node<E>>) -> Result<Self> {
        if header.root != PageId::ROOT {
            return Err(IndexError::corrupted(format!(
                "header names root page {}, expected {}",
                header.root,
                PageId::ROOT
            )));
        }
        file.get_node(PageId::ROOT)?;
        Ok(Self { file, header })
    }

    fn initialize(&mut self) {
        let id = self.file.next_page_id();
        debug_assert_eq!(id, PageId::ROOT);
        let mut root = Node::new_leaf();
        root.set_page_id(id);
        self.file.write_node(root);
        self.header.height = 1;
        self.header.size = 0;
    }

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut TreeHeader {
        &mut self.header
    }

    pub fn height(&self) -> usize {
        self.header.height
    }

    pub fn size(&self) -> usize {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    pub fn statistics(&self) -> &Statistics {
        self.file.statistics()
    }

    pub fn page_file(&self) -> &MemoryPageFile<Node<E>> {
        &self.file
    }

    pub fn node(&self, id: PageId) -> Result<&Node<E>> {
        self.file.get_node(id)
    }

    pub fn root(&self) -> Result<&Node<E>> {
        self.file.get_node(PageId::ROOT)
    }

    /// Write a node, assigning a page id if it is new.
    pub fn write_node(&mut self, node: Node<E>) -> PageId {
        self.file.write_node(node)
    }

    pub fn delete_node(&mut self, id: PageId) -> Result<Node<E>> {
        self.file.delete_node(id)
    }

    pub fn has_overflow(&self, node: &Node<E>) -> bool {
        node.len() > self.header.capacity(node.is_leaf())
    }

    pub fn has_underflow(&self, node: &Node<E>) -> bool {
        node.len() < self.header.minimum(node.is_leaf())
    }

    /// Child page of a directory entry; a leaf entry here means corruption.
    pub fn child_of(entry: &E) -> Result<PageId> {
        entry
            .child()
            .ok_or_else(|| IndexError::corrupted("leaf entry found in directory node"))
    }

    /// Search the subtree at `subtree` for the leaf entry of `oid`.
    ///
    /// `may_contain` decides whether a directory entry's bound could cover
    /// the object. Returns `Ok(None)` if the object is not in the tree.
    pub fn find_path_to_object(
        &self,
        subtree: &TreePath,
        oid: Oid,
        may_contain: &impl Fn(&E) -> bool,
    ) -> Result<Option<TreePath>> {
        let node = self.node(subtree.node())?;
        if node.is_leaf() {
            return Ok(node
                .entries
                .iter()
                .position(|e| e.oid() == Some(oid))
                .map(|slot| subtree.with_entry(slot)));
        }
        for (slot, entry) in node.entries.iter().enumerate() {
            if may_contain(entry) {
                let child = subtree.descend(slot, Self::child_of(entry)?);
                if let Some(path) = self.find_path_to_object(&child, oid, may_contain)? {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// Refresh the directory entries along `path` bottom-up, stopping as
    /// soon as a bound no longer changes.
    pub fn adjust_path(&mut self, path: &TreePath) -> Result<()> {
        let mut current = path.node_path();
        while let Some(parent_path) = current.parent() {
            let slot = current
                .slot_in_parent()
                .ok_or_else(|| IndexError::corrupted("path without parent slot"))?;
            let node = self.node(current.node())?.clone();
            let mut parent = self.node(parent_path.node())?.clone();
            let entry = parent
                .entries
                .get_mut(slot)
                .ok_or_else(|| IndexError::corrupted("stale path slot"))?;
            if !entry.adjust_to(&node) {
                break;
            }
            self.write_node(parent);
            current = parent_path;
        }
        Ok(())
    }

    /// Replace the root by a directory over `left` and `right`.
    ///
    /// Both halves are written to fresh pages; `make_entry(i, node)` builds
    /// the directory entry for half `i` once its page id is known.
    pub fn grow_root(
        &mut self,
        left: Node<E>,
        right: Node<E>,
        mut make_entry: impl FnMut(usize, &Node<E>) -> Result<E>,
    ) -> Result<()> {
        let mut root = Node::new_directory();
        for (i, mut half) in [left, right].into_iter().enumerate() {
            half.set_page_id(PageId::UNASSIGNED);
            let id = self.write_node(half);
            let half = self.node(id)?;
            root.entries.push(make_entry(i, half)?);
        }
        root.set_page_id(PageId::ROOT);
        self.write_node(root);
        self.header.height += 1;
        debug!("new root, height {}", self.header.height);
        Ok(())
    }

    /// Remove the leaf entry at `path` and condense the tree.
    ///
    /// Nodes left underflowing are dissolved; the leaf entries of dissolved
    /// subtrees are returned for the caller to reinsert. A directory root
    /// with a single child is replaced by that child.
    pub fn delete_path(&mut self, path: &TreePath) -> Result<(E, Vec<E>)> {
        let slot = path
            .entry_slot()
            .ok_or_else(|| IndexError::invalid("delete path does not point at an entry"))?;
        let mut leaf = self.node(path.node())?.clone();
        if slot >= leaf.len() {
            return Err(IndexError::corrupted("stale delete path"));
        }
        let removed = leaf.entries.remove(slot);
        self.write_node(leaf);
        self.header.size -= 1;

        let mut orphans = Vec::new();
        let mut current = path.node_path();
        while let Some(parent_path) = current.parent() {
            let slot = current
                .slot_in_parent()
                .ok_or_else(|| IndexError::corrupted("path without parent slot"))?;
            let node = self.node(current.node())?.clone();
            let mut parent = self.node(parent_path.node())?.clone();
            if self.has_underflow(&node) {
                parent.entries.remove(slot);
                self.dissolve(node.page_id(), &mut orphans)?;
            } else {
                parent.entries[slot].adjust_to(&node);
            }
            self.write_node(parent);
            current = parent_path;
        }
        self.condense_root()?;

        if !orphans.is_empty() {
            debug!("delete dissolved nodes, {} entries to reinsert", orphans.len());
        }
        Ok((removed, orphans))
    }

    /// Delete the subtree at `id`, collecting its leaf entries.
    fn dissolve(&mut self, id: PageId, out: &mut Vec<E>) -> Result<()> {
        let node = self.delete_node(id)?;
        if node.is_leaf() {
            out.extend(node.entries);
        } else {
            for entry in &node.entries {
                self.dissolve(Self::child_of(entry)?, out)?;
            }
        }
        Ok(())
    }

    fn condense_root(&mut self) -> Result<()> {
        loop {
            let root = self.root()?;
            if root.is_leaf() {
                return Ok(());
            }
            match root.len() {
                0 => {
                    let mut leaf = Node::new_leaf();
                    leaf.set_page_id(PageId::ROOT);
                    self.write_node(leaf);
                    self.header.height = 1;
                    return Ok(());
                }
                1 => {
                    let child_id = Self::child_of(&root.entries[0])?;
                    let mut child = self.delete_node(child_id)?;
                    child.set_page_id(PageId::ROOT);
                    self.write_node(child);
                    self.header.height -= 1;
                    debug!("root condensed, height {}", self.header.height);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Bulk-load an empty tree bottom-up.
    ///
    /// `partition(entries, capacity)` groups one level's entries into nodes;
    /// `make_entry` builds the directory entry for a written node.
    pub fn bulk_load_levels(
        &mut self,
        entries: Vec<E>,
        mut partition: impl FnMut(Vec<E>, usize) -> Vec<Vec<E>>,
        mut make_entry: impl FnMut(&Node<E>) -> Result<E>,
    ) -> Result<()> {
        if !self.is_empty() {
            return Err(IndexError::Unsupported {
                operation: "bulk load into a non-empty tree",
                index: "tree",
            });
        }
        let size = entries.len();
        let mut level = entries;
        let mut leaf = true;
        let mut height = 1;
        while level.len() > self.header.capacity(leaf) {
            let groups = partition(level, self.header.capacity(leaf));
            let mut next = Vec::with_capacity(groups.len());
            for group in groups {
                let node = if leaf {
                    Node::new_leaf()
                } else {
                    Node::new_directory()
                };
                let id = self.write_node(node.sibling(group));
                next.push(make_entry(self.node(id)?)?);
            }
            debug!(
                "bulk load level {}: {} nodes",
                height,
                next.len()
            );
            level = next;
            leaf = false;
            height += 1;
        }
        let mut root = if leaf {
            Node::new_leaf()
        } else {
            Node::new_directory()
        }
        .sibling(level);
        root.set_page_id(PageId::ROOT);
        self.write_node(root);
        self.header.height = height;
        self.header.size = size;
        Ok(())
    }

    /// All leaf entries, in tree order.
    pub fn leaf_entries(&self) -> Result<Vec<E>> {
        let mut out = Vec::with_capacity(self.header.size);
        self.collect_leaf_entries(PageId::ROOT, &mut out)?;
        Ok(out)
    }

    fn collect_leaf_entries(&self, id: PageId, out: &mut Vec<E>) -> Result<()> {
        let node = self.node(id)?;
        if node.is_leaf() {
            out.extend(node.entries.iter().cloned());
        } else {
            for entry in &node.entries {
                self.collect_leaf_entries(Self::child_of(entry)?, out)?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> TreeStats {
        let (leaf_nodes, directory_nodes) = self
            .file
            .iter()
            .fold((0, 0), |(l, d), n| if n.is_leaf() { (l + 1, d) } else { (l, d + 1) });
        TreeStats {
            height: self.header.height,
            leaf_nodes,
            directory_nodes,
            objects: self.header.size,
        }
    }

    /// Verify the structural invariants of the whole tree.
    ///
    /// Checks capacities, minimum fill (root exempt), uniform leaf depth and
    /// the object count; `check_entry(entry, child)` verifies each directory
    /// entry's family-specific bound against the node it points to.
    pub fn check_integrity(
        &self,
        check_entry: &mut impl FnMut(&E, &Node<E>) -> Result<()>,
    ) -> Result<()> {
        let objects = self.check_subtree(PageId::ROOT, 1, check_entry)?;
        if objects != self.header.size {
            return Err(IndexError::corrupted(format!(
                "header records {} objects, tree holds {}",
                self.header.size, objects
            )));
        }
        Ok(())
    }

    fn check_subtree(
        &self,
        id: PageId,
        depth: usize,
        check_entry: &mut impl FnMut(&E, &Node<E>) -> Result<()>,
    ) -> Result<usize> {
        let node = self.node(id)?;
        if node.page_id() != id {
            return Err(IndexError::corrupted(format!(
                "node stored at page {} believes it is page {}",
                id,
                node.page_id()
            )));
        }
        if node.len() > self.header.capacity(node.is_leaf()) {
            return Err(IndexError::corrupted(format!(
                "page {} holds {} entries, capacity {}",
                id,
                node.len(),
                self.header.capacity(node.is_leaf())
            )));
        }
        if id != PageId::ROOT && self.has_underflow(node) {
            return Err(IndexError::corrupted(format!(
                "page {} holds {} entries, minimum {}",
                id,
                node.len(),
                self.header.minimum(node.is_leaf())
            )));
        }
        if node.is_leaf() {
            if depth != self.header.height {
                return Err(IndexError::corrupted(format!(
                    "leaf page {} at depth {}, tree height {}",
                    id, depth, self.header.height
                )));
            }
            if node.entries.iter().any(|e| !e.is_leaf_entry()) {
                return Err(IndexError::corrupted(format!(
                    "directory entry in leaf page {}",
                    id
                )));
            }
            return Ok(node.len());
        }
        let mut objects = 0;
        for entry in &node.entries {
            let child = self.node(Self::child_of(entry)?)?;
            check_entry(entry, child)?;
            objects += self.check_subtree(child.page_id(), depth + 1, check_entry)?;
        }
        Ok(objects)
    }
}
