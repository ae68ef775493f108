//! Sort-tile-recursive packing for bulk loads.

use super::entry::SpatialEntry;
use rayon::slice::ParallelSliceMut;

/// Group one level's entries into nodes of at most `capacity` entries.
///
/// The number of nodes is the smallest possible, and entries are spread as
/// evenly as possible: node sizes differ by at most one, so every node is
/// at least half full. Entries are tiled axis by axis, sorted on their
/// centres, so that each node covers a compact region.
pub fn str_partition(entries: Vec<SpatialEntry>, capacity: usize) -> Vec<Vec<SpatialEntry>> {
    let nodes = entries.len().div_ceil(capacity.max(1)).max(1);
    let dims = entries.first().map_or(1, SpatialEntry::dimension).max(1);
    let sizes = even_sizes(entries.len(), nodes);
    let mut out = Vec::with_capacity(nodes);
    tile(entries, &sizes, 0, dims, &mut out);
    out
}

/// Split `n` into `parts` sizes differing by at most one.
fn even_sizes(n: usize, parts: usize) -> Vec<usize> {
    (0..parts)
        .map(|i| n / parts + usize::from(i < n % parts))
        .collect()
}

fn tile(
    mut entries: Vec<SpatialEntry>,
    sizes: &[usize],
    axis: usize,
    dims: usize,
    out: &mut Vec<Vec<SpatialEntry>>,
) {
    entries.par_sort_by(|a, b| a.center(axis).total_cmp(&b.center(axis)));

    if axis + 1 >= dims || sizes.len() == 1 {
        for &size in sizes {
            let rest = entries.split_off(size);
            out.push(entries);
            entries = rest;
        }
        return;
    }

    // slabs along this axis, each holding a run of whole nodes
    let remaining = (dims - axis) as f64;
    let root = (sizes.len() as f64).powf(1.0 / remaining);
    let slabs = ((root - 1e-9).ceil() as usize).clamp(1, sizes.len());
    let mut start = 0;
    for nodes in even_sizes(sizes.len(), slabs) {
        let slab = &sizes[start..start + nodes];
        let rest = entries.split_off(slab.iter().sum());
        tile(entries, slab, axis + 1, dims, out);
        entries = rest;
        start += nodes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Oid;
    use crate::tree::TreeEntry;
    use std::collections::HashSet;

    fn grid(n: u32) -> Vec<SpatialEntry> {
        (0..n * n)
            .map(|i| SpatialEntry::leaf(Oid(i), vec![(i % n) as f64, (i / n) as f64]))
            .collect()
    }

    #[test]
    fn test_even_sizes() {
        assert_eq!(even_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(even_sizes(9, 3), vec![3, 3, 3]);
        assert_eq!(even_sizes(0, 1), vec![0]);
    }

    #[test]
    fn test_partition_sizes() {
        let groups = str_partition(grid(10), 16);
        // 100 entries into ceil(100 / 16) = 7 nodes
        assert_eq!(groups.len(), 7);
        assert!(groups.iter().all(|g| g.len() == 14 || g.len() == 15));

        let seen: HashSet<Oid> = groups.iter().flatten().filter_map(|e| e.oid()).collect();
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_partition_tiles_space() {
        // 16 points on a 4x4 grid into 4 nodes: each node is one 2x2 quadrant
        let groups = str_partition(grid(4), 4);
        assert_eq!(groups.len(), 4);
        for group in &groups {
            let xs: Vec<f64> = group.iter().map(|e| e.center(0)).collect();
            let ys: Vec<f64> = group.iter().map(|e| e.center(1)).collect();
            let spread = |v: &[f64]| {
                v.iter().cloned().fold(f64::MIN, f64::max) - v.iter().cloned().fold(f64::MAX, f64::min)
            };
            assert_eq!(spread(&xs), 1.0);
            assert_eq!(spread(&ys), 1.0);
        }
    }

    #[test]
    fn test_single_node() {
        let groups = str_partition(grid(2), 8);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 4);
    }
}
