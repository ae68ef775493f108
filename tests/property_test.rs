//! Property tests for bulk loading and range queries

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tree_index::tree::TreeEntry;
use tree_index::{
    DistanceMetric, LinearScan, MTree, MTreeSettings, MemoryRelation, Oid, RStarTree,
    RStarTreeSettings, Relation, Vector,
};

fn points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-50.0..50.0f64, -50.0..50.0f64), 1..150)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bulk_load_is_order_independent(coords in points(), seed in any::<u64>()) {
        let relation: MemoryRelation<Vector> = coords
            .iter()
            .map(|&(x, y)| Vector::new(vec![x, y]))
            .collect();

        let mut ids = relation.ids();
        ids.shuffle(&mut StdRng::seed_from_u64(seed));
        let n = ids.len();

        let mut tree = RStarTree::new(RStarTreeSettings::new(6, 6)).unwrap();
        tree.bulk_load(ids.iter().map(|&id| (id, relation.get(id).unwrap()))).unwrap();
        tree.check_integrity().unwrap();
        prop_assert_eq!(tree.len(), n);

        for id in relation.ids() {
            let v = relation.get(id).unwrap();
            prop_assert!(tree.find_path(id, v).unwrap().is_some());
        }
        let mut stored: Vec<Oid> = tree
            .leaf_entries()
            .unwrap()
            .iter()
            .filter_map(|e| e.oid())
            .collect();
        stored.sort();
        prop_assert_eq!(stored, relation.ids());
    }

    #[test]
    fn range_matches_linear_scan(
        coords in points(),
        (qx, qy) in (-60.0..60.0f64, -60.0..60.0f64),
        radius in 0.0..40.0f64,
    ) {
        let relation: MemoryRelation<Vector> = coords
            .iter()
            .map(|&(x, y)| Vector::new(vec![x, y]))
            .collect();
        let query = Vector::new(vec![qx, qy]);
        let metric = DistanceMetric::Euclidean;
        let expected = LinearScan::new(&relation, &metric).range(&query, radius).unwrap();

        let rstar = RStarTree::from_relation(&relation, RStarTreeSettings::new(5, 5)).unwrap();
        prop_assert_eq!(rstar.range(&metric, query.as_slice(), radius).unwrap(), expected.clone());

        let mtree = MTree::from_relation(&relation, metric, MTreeSettings::new(5, 5)).unwrap();
        prop_assert_eq!(mtree.range(&relation, &query, radius).unwrap(), expected);
    }
}
