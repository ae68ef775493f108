//! Topological R*-tree split: margin-based axis choice, overlap-minimising distribution.

use super::entry::SpatialEntry;
use crate::spatial::Mbr;

/// Split `entries` into two groups of at least `minimum` entries each.
///
/// For every axis the entries are sorted by lower and by upper bound; the
/// axis with the smallest margin sum over all admissible distributions
/// wins. Along that axis the distribution with the least overlap between
/// the two groups is taken, ties broken by the smaller combined volume.
pub fn split(mut entries: Vec<SpatialEntry>, minimum: usize) -> (Vec<SpatialEntry>, Vec<SpatialEntry>) {
    let n = entries.len();
    let minimum = minimum.min(n / 2).max(1);
    let dims = entries.first().map_or(0, SpatialEntry::dimension);

    let mut best_axis = (f64::INFINITY, 0);
    for axis in 0..dims {
        let mut margin = 0.0;
        for by_upper in [false, true] {
            sort_along(&mut entries, axis, by_upper);
            margin += Distributions::new(&entries, minimum)
                .map(|(left, right, _)| left.margin() + right.margin())
                .sum::<f64>();
        }
        if margin < best_axis.0 {
            best_axis = (margin, axis);
        }
    }
    let axis = best_axis.1;

    // (overlap, volume, sorted by upper, split index)
    let mut best: Option<(f64, f64, bool, usize)> = None;
    for by_upper in [false, true] {
        sort_along(&mut entries, axis, by_upper);
        for (left, right, k) in Distributions::new(&entries, minimum) {
            let overlap = left.overlap(&right);
            let volume = left.volume() + right.volume();
            let better = match best {
                None => true,
                Some((o, v, _, _)) => overlap < o || (overlap == o && volume < v),
            };
            if better {
                best = Some((overlap, volume, by_upper, k));
            }
        }
    }
    let (_, _, by_upper, k) = best.unwrap_or((0.0, 0.0, false, n / 2));
    sort_along(&mut entries, axis, by_upper);
    let right = entries.split_off(k);
    (entries, right)
}

fn sort_along(entries: &mut [SpatialEntry], axis: usize, by_upper: bool) {
    if by_upper {
        entries.sort_by(|a, b| {
            a.upper(axis)
                .total_cmp(&b.upper(axis))
                .then_with(|| a.lower(axis).total_cmp(&b.lower(axis)))
        });
    } else {
        entries.sort_by(|a, b| {
            a.lower(axis)
                .total_cmp(&b.lower(axis))
                .then_with(|| a.upper(axis).total_cmp(&b.upper(axis)))
        });
    }
}

/// Iterates over the admissible cut points `minimum..=n - minimum` of a
/// sorted entry list, yielding both groups' rectangles and the cut index.
struct Distributions {
    prefix: Vec<Mbr>,
    suffix: Vec<Mbr>,
    k: usize,
    last: usize,
}

impl Distributions {
    fn new(entries: &[SpatialEntry], minimum: usize) -> Self {
        let n = entries.len();
        // prefix[i] covers entries[..=i], suffix[i] covers entries[i..]
        let mut prefix: Vec<Mbr> = Vec::with_capacity(n);
        for e in entries {
            let mbr = match prefix.last() {
                Some(acc) => acc.union(&e.mbr()),
                None => e.mbr(),
            };
            prefix.push(mbr);
        }
        let mut suffix: Vec<Mbr> = Vec::with_capacity(n);
        for e in entries.iter().rev() {
            let mbr = match suffix.last() {
                Some(acc) => acc.union(&e.mbr()),
                None => e.mbr(),
            };
            suffix.push(mbr);
        }
        suffix.reverse();
        Self {
            prefix,
            suffix,
            k: minimum,
            last: n.saturating_sub(minimum),
        }
    }
}

impl Iterator for Distributions {
    type Item = (Mbr, Mbr, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.k > self.last || self.k == 0 {
            return None;
        }
        let k = self.k;
        self.k += 1;
        Some((self.prefix[k - 1].clone(), self.suffix[k].clone(), k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::Oid;
    use crate::tree::TreeEntry;

    fn points(coords: &[(f64, f64)]) -> Vec<SpatialEntry> {
        coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| SpatialEntry::leaf(Oid(i as u32), vec![x, y]))
            .collect()
    }

    #[test]
    fn test_split_separates_clusters() {
        // two clusters far apart along y
        let entries = points(&[
            (0.0, 0.0),
            (1.0, 100.0),
            (0.5, 0.5),
            (0.2, 101.0),
            (0.9, 0.1),
            (0.4, 100.5),
        ]);
        let (left, right) = split(entries, 2);
        let mut low: Vec<u32> = left.iter().map(|e| e.oid().unwrap().0).collect();
        let mut high: Vec<u32> = right.iter().map(|e| e.oid().unwrap().0).collect();
        low.sort();
        high.sort();
        assert_eq!(low, vec![0, 2, 4]);
        assert_eq!(high, vec![1, 3, 5]);
    }

    #[test]
    fn test_split_respects_minimum() {
        // one outlier: without a minimum it would end up alone
        let mut coords: Vec<(f64, f64)> = (0..9).map(|i| (i as f64 * 0.01, 0.0)).collect();
        coords.push((50.0, 0.0));
        let (left, right) = split(points(&coords), 4);
        assert!(left.len() >= 4 && right.len() >= 4);
        assert_eq!(left.len() + right.len(), 10);
    }

    #[test]
    fn test_split_minimal_node() {
        let (left, right) = split(points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]), 1);
        assert_eq!(left.len() + right.len(), 3);
        assert!(!left.is_empty() && !right.is_empty());
    }

    #[test]
    fn test_distributions_range() {
        let entries = points(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0)]);
        let cuts: Vec<usize> = Distributions::new(&entries, 2).map(|(_, _, k)| k).collect();
        assert_eq!(cuts, vec![2, 3]);
        let (left, right, _) = Distributions::new(&entries, 2).next().unwrap();
        assert_eq!(left.max(), &[1.0, 0.0]);
        assert_eq!(right.min(), &[2.0, 0.0]);
    }
}
