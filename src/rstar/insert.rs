//! R*-tree insertion: choose-subtree, forced reinsertion and split propagation.

use super::entry::{node_mbr, SpatialEntry};
use super::{directory_entry, split, RStarTree};
use crate::error::{IndexError, Result};
use crate::page::Page;
use crate::spatial::Mbr;
use crate::tree::{TreeCore, TreePath};
use log::{debug, trace};

impl RStarTree {
    /// Insert `entry` into a node at `level` (0 = leaves) and treat any overflow.
    ///
    /// `reinserted[l]` records whether level `l` already had its forced
    /// reinsertion during the current top-level insertion.
    pub(super) fn insert_at_level(
        &mut self,
        entry: SpatialEntry,
        level: usize,
        reinserted: &mut Vec<bool>,
    ) -> Result<()> {
        let path = self.choose_path(&entry.mbr(), level)?;
        let mut node = self.core.node(path.node())?.clone();
        node.entries.push(entry);
        self.core.write_node(node);
        self.treat_overflow(path, level, reinserted)
    }

    fn choose_path(&self, mbr: &Mbr, level: usize) -> Result<TreePath> {
        let target = self.core.height().saturating_sub(level).max(1);
        let mut path = TreePath::root();
        while path.depth() < target {
            let node = self.core.node(path.node())?;
            let slot = choose_subtree(&node.entries, mbr)
                .ok_or_else(|| IndexError::corrupted("empty directory node on insertion path"))?;
            let child = TreeCore::child_of(&node.entries[slot])?;
            trace!("depth {}: descend into page {}", path.depth(), child);
            path = path.descend(slot, child);
        }
        Ok(path)
    }

    fn treat_overflow(
        &mut self,
        path: TreePath,
        level: usize,
        reinserted: &mut Vec<bool>,
    ) -> Result<()> {
        let node = self.core.node(path.node())?;
        if !self.core.has_overflow(node) {
            return self.core.adjust_path(&path);
        }
        if reinserted.len() <= level {
            reinserted.resize(level + 1, false);
        }
        if !path.is_root() && !reinserted[level] && self.settings.reinsert_fraction > 0.0 {
            reinserted[level] = true;
            return self.reinsert(path, level, reinserted);
        }
        self.split_node(path, level, reinserted)
    }

    /// Remove the entries farthest from the node centre and insert them
    /// again from the root, nearest first.
    fn reinsert(&mut self, path: TreePath, level: usize, reinserted: &mut Vec<bool>) -> Result<()> {
        let mut node = self.core.node(path.node())?.clone();
        let center = node_mbr(&node.entries)
            .ok_or_else(|| IndexError::corrupted("overflowing node without entries"))?
            .centroid();
        let keep = self.core.header().minimum(node.is_leaf());
        let count = ((node.len() as f64 * self.settings.reinsert_fraction).ceil() as usize)
            .min(node.len().saturating_sub(keep));
        if count == 0 {
            return self.split_node(path, level, reinserted);
        }

        node.entries.sort_by(|a, b| {
            center_distance(a, &center).total_cmp(&center_distance(b, &center))
        });
        let removed = node.entries.split_off(node.len() - count);
        debug!(
            "forced reinsertion of {} entries from page {} (level {})",
            removed.len(),
            node.page_id(),
            level
        );
        self.core.write_node(node);
        self.core.adjust_path(&path)?;

        for entry in removed {
            self.insert_at_level(entry, level, reinserted)?;
        }
        Ok(())
    }

    fn split_node(&mut self, path: TreePath, level: usize, reinserted: &mut Vec<bool>) -> Result<()> {
        let node = self.core.node(path.node())?.clone();
        let page = node.page_id();
        let minimum = self.core.header().minimum(node.is_leaf());
        let template = node.sibling(Vec::new());
        let (left, right) = split::split(node.entries, minimum);

        let mut left = template.sibling(left);
        left.set_page_id(page);
        let right = template.sibling(right);
        debug!(
            "split page {} into {} + {} entries",
            page,
            left.len(),
            right.len()
        );

        let (Some(parent_path), Some(slot)) = (path.parent(), path.slot_in_parent()) else {
            return self.core.grow_root(left, right, |_, half| directory_entry(half));
        };
        self.core.write_node(left);
        let right_id = self.core.write_node(right);

        let mut parent = self.core.node(parent_path.node())?.clone();
        parent.entries[slot] = directory_entry(self.core.node(page)?)?;
        parent
            .entries
            .push(directory_entry(self.core.node(right_id)?)?);
        self.core.write_node(parent);
        self.treat_overflow(parent_path, level + 1, reinserted)
    }
}

/// Pick the child to descend into for an entry covering `mbr`.
///
/// A child that already contains the rectangle wins, the smallest such one
/// first. Otherwise the child needing the least volume enlargement, ties
/// broken by smaller volume.
pub(super) fn choose_subtree(entries: &[SpatialEntry], mbr: &Mbr) -> Option<usize> {
    let containing = entries
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            SpatialEntry::Directory { mbr: own, .. } if own.contains(mbr) => Some((i, own.volume())),
            _ => None,
        })
        .min_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((i, _)) = containing {
        return Some(i);
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let own = e.mbr();
            (i, own.enlargement(mbr), own.volume())
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.2.total_cmp(&b.2)))
        .map(|(i, _, _)| i)
}

fn center_distance(entry: &SpatialEntry, center: &[f64]) -> f64 {
    center
        .iter()
        .enumerate()
        .map(|(d, c)| {
            let diff = entry.center(d) - c;
            diff * diff
        })
        .sum()
}
