//! Root-to-node paths.

use crate::page::PageId;

/// A path from the root down to a node, or to an entry within a leaf.
///
/// `slots[i]` is the index of the entry in `pages[i]` that leads to
/// `pages[i + 1]`. A path to an entry carries one extra slot: the entry's
/// index in the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    pages: Vec<PageId>,
    slots: Vec<usize>,
}

impl TreePath {
    /// The path consisting of the root only.
    pub fn root() -> Self {
        Self {
            pages: vec![PageId::ROOT],
            slots: Vec::new(),
        }
    }

    /// Descend through entry `slot` of the current node into `child`.
    pub fn descend(&self, slot: usize, child: PageId) -> Self {
        debug_assert!(!self.points_to_entry());
        let mut path = self.clone();
        path.slots.push(slot);
        path.pages.push(child);
        path
    }

    /// Point at entry `slot` of the last node.
    pub fn with_entry(&self, slot: usize) -> Self {
        debug_assert!(!self.points_to_entry());
        let mut path = self.clone();
        path.slots.push(slot);
        path
    }

    /// The last node on the path.
    pub fn node(&self) -> PageId {
        *self.pages.last().unwrap_or(&PageId::ROOT)
    }

    /// Entry index within the last node, for entry paths.
    pub fn entry_slot(&self) -> Option<usize> {
        if self.points_to_entry() {
            self.slots.last().copied()
        } else {
            None
        }
    }

    /// Index of the last node within its parent. `None` at the root.
    pub fn slot_in_parent(&self) -> Option<usize> {
        if self.pages.len() < 2 {
            return None;
        }
        Some(self.slots[self.pages.len() - 2])
    }

    /// The path to the parent of the last node. `None` at the root.
    pub fn parent(&self) -> Option<TreePath> {
        if self.pages.len() < 2 {
            return None;
        }
        let n = self.pages.len() - 1;
        Some(Self {
            pages: self.pages[..n].to_vec(),
            slots: self.slots[..n - 1].to_vec(),
        })
    }

    /// The node path without the trailing entry slot.
    pub fn node_path(&self) -> TreePath {
        Self {
            pages: self.pages.clone(),
            slots: self.slots[..self.pages.len() - 1].to_vec(),
        }
    }

    /// Number of nodes on the path; the root alone has depth 1.
    pub fn depth(&self) -> usize {
        self.pages.len()
    }

    pub fn is_root(&self) -> bool {
        self.pages.len() == 1
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    fn points_to_entry(&self) -> bool {
        self.slots.len() == self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descend_and_parent() {
        let root = TreePath::root();
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.slot_in_parent(), None);

        let child = root.descend(2, PageId(5));
        let grandchild = child.descend(0, PageId(9));
        assert_eq!(grandchild.node(), PageId(9));
        assert_eq!(grandchild.depth(), 3);
        assert_eq!(grandchild.slot_in_parent(), Some(0));
        assert_eq!(grandchild.parent(), Some(child.clone()));
        assert_eq!(child.parent(), Some(root));
    }

    #[test]
    fn test_entry_path() {
        let leaf = TreePath::root().descend(1, PageId(3));
        let entry = leaf.with_entry(4);
        assert_eq!(entry.entry_slot(), Some(4));
        assert_eq!(entry.node(), PageId(3));
        assert_eq!(entry.node_path(), leaf);
        assert_eq!(leaf.entry_slot(), None);
        assert_eq!(entry.pages(), &[PageId::ROOT, PageId(3)]);
    }
}
