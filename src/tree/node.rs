//! Nodes, entries and the tree header record.

use crate::page::{Page, PageId};
use crate::relation::Oid;
use serde::{Deserialize, Serialize};

/// The polymorphic part of an entry that the skeleton needs.
///
/// Entries are sum types (`Leaf | Directory`) per tree family; this trait
/// exposes the few operations the shared tree code performs on both.
pub trait TreeEntry: Clone {
    /// Child page of a directory entry, `None` for leaf entries.
    fn child(&self) -> Option<PageId>;

    /// Object of a leaf entry, `None` for directory entries.
    fn oid(&self) -> Option<Oid>;

    /// Recompute a directory entry's bound from the node it points to.
    ///
    /// Returns `true` if the bound changed.
    fn adjust_to(&mut self, node: &Node<Self>) -> bool;

    fn is_leaf_entry(&self) -> bool {
        self.child().is_none()
    }
}

/// A tree node: an ordered list of entries stored in one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<E> {
    page_id: PageId,
    leaf: bool,
    pub entries: Vec<E>,
}

impl<E> Node<E> {
    pub fn new_leaf() -> Self {
        Self {
            page_id: PageId::UNASSIGNED,
            leaf: true,
            entries: Vec::new(),
        }
    }

    pub fn new_directory() -> Self {
        Self {
            page_id: PageId::UNASSIGNED,
            leaf: false,
            entries: Vec::new(),
        }
    }

    /// A node of the same kind (leaf or directory) holding `entries`.
    pub fn sibling(&self, entries: Vec<E>) -> Self {
        Self {
            page_id: PageId::UNASSIGNED,
            leaf: self.leaf,
            entries,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Page for Node<E> {
    fn page_id(&self) -> PageId {
        self.page_id
    }

    fn set_page_id(&mut self, id: PageId) {
        self.page_id = id;
    }
}

/// Tree metadata, stored in the header page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeHeader {
    /// Number of levels; a lone root leaf has height 1.
    pub height: usize,
    pub root: PageId,
    pub leaf_capacity: usize,
    pub dir_capacity: usize,
    pub leaf_minimum: usize,
    pub dir_minimum: usize,
    /// Number of indexed objects.
    pub size: usize,
}

impl TreeHeader {
    pub fn new(
        leaf_capacity: usize,
        dir_capacity: usize,
        leaf_minimum: usize,
        dir_minimum: usize,
    ) -> Self {
        Self {
            height: 1,
            root: PageId::ROOT,
            leaf_capacity,
            dir_capacity,
            leaf_minimum,
            dir_minimum,
            size: 0,
        }
    }

    pub fn capacity(&self, leaf: bool) -> usize {
        if leaf {
            self.leaf_capacity
        } else {
            self.dir_capacity
        }
    }

    pub fn minimum(&self, leaf: bool) -> usize {
        if leaf {
            self.leaf_minimum
        } else {
            self.dir_minimum
        }
    }
}
