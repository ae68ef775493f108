//! Object identifiers and the read-only relation the indexes are built over

use crate::error::{IndexError, Result};
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;

/// Opaque, totally ordered handle of an object in a [`Relation`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Oid(pub u32);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable mapping from object identifiers to objects.
///
/// Indexes only ever read from a relation; they store identifiers, never the
/// objects themselves.
pub trait Relation {
    type Object;

    /// Look up an object. `None` if the identifier is unknown.
    fn get(&self, id: Oid) -> Option<&Self::Object>;

    /// All identifiers, in ascending order.
    fn ids(&self) -> Vec<Oid>;

    /// Number of objects.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory relation backed by an ordered map.
#[derive(Debug, Clone)]
pub struct MemoryRelation<O> {
    objects: BTreeMap<Oid, O>,
    next_id: u32,
}

impl<O> MemoryRelation<O> {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Append an object under the next free identifier.
    pub fn push(&mut self, object: O) -> Oid {
        let id = Oid(self.next_id);
        self.insert(id, object);
        id
    }

    /// Store an object under an explicit identifier, replacing any previous one.
    pub fn insert(&mut self, id: Oid, object: O) -> Option<O> {
        self.next_id = self.next_id.max(id.0 + 1);
        self.objects.insert(id, object)
    }

    /// Iterate over all (id, object) pairs in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (Oid, &O)> {
        self.objects.iter().map(|(&id, o)| (id, o))
    }
}

impl<O> Default for MemoryRelation<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> FromIterator<O> for MemoryRelation<O> {
    fn from_iter<T: IntoIterator<Item = O>>(iter: T) -> Self {
        let mut relation = MemoryRelation::new();
        for object in iter {
            relation.push(object);
        }
        relation
    }
}

impl MemoryRelation<Vector> {
    /// Build a vector relation, enforcing that every vector has the same dimension.
    pub fn from_vectors(vectors: impl IntoIterator<Item = Vector>) -> Result<Self> {
        let mut relation = MemoryRelation::new();
        let mut dimension = None;
        for v in vectors {
            match dimension {
                Some(dim) => v.check_dimension(dim)?,
                None => dimension = Some(v.dimension()),
            }
            relation.push(v);
        }
        Ok(relation)
    }

    /// Read one comma-separated vector per line; the object id is the
    /// zero-based line number. Blank lines and `#` comments are skipped.
    pub fn from_csv(reader: impl BufRead) -> Result<Self> {
        let mut relation = MemoryRelation::new();
        let mut dimension = None;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let vector: Vector = line.parse()?;
            match dimension {
                Some(dim) => vector.check_dimension(dim)?,
                None => dimension = Some(vector.dimension()),
            }
            let id = u32::try_from(line_no)
                .map_err(|_| IndexError::invalid("too many lines for 32-bit object ids"))?;
            relation.insert(Oid(id), vector);
        }
        Ok(relation)
    }

    /// Dimension of the stored vectors (if any).
    pub fn dimension(&self) -> Option<usize> {
        self.objects.values().next().map(Vector::dimension)
    }
}

impl<O> Relation for MemoryRelation<O> {
    type Object = O;

    fn get(&self, id: Oid) -> Option<&O> {
        self.objects.get(&id)
    }

    fn ids(&self) -> Vec<Oid> {
        self.objects.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_sequential_ids() {
        let mut rel = MemoryRelation::new();
        assert_eq!(rel.push("a"), Oid(0));
        assert_eq!(rel.push("b"), Oid(1));
        assert_eq!(rel.len(), 2);
        assert_eq!(rel.get(Oid(1)), Some(&"b"));
        assert_eq!(rel.get(Oid(7)), None);
    }

    #[test]
    fn test_insert_explicit_id() {
        let mut rel = MemoryRelation::new();
        rel.insert(Oid(10), 1.0);
        assert_eq!(rel.push(2.0), Oid(11));
        assert_eq!(rel.ids(), vec![Oid(10), Oid(11)]);
    }

    #[test]
    fn test_from_vectors_dimension_consistency() {
        let ok = MemoryRelation::from_vectors(vec![
            Vector::new(vec![1.0, 2.0]),
            Vector::new(vec![3.0, 4.0]),
        ])
        .unwrap();
        assert_eq!(ok.dimension(), Some(2));

        let bad = MemoryRelation::from_vectors(vec![
            Vector::new(vec![1.0, 2.0]),
            Vector::new(vec![3.0]),
        ]);
        assert!(matches!(bad, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_from_csv_uses_line_numbers() {
        let csv = "1.0,2.0\n\n# comment\n3.0, 4.0\n";
        let rel = MemoryRelation::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(rel.ids(), vec![Oid(0), Oid(3)]);
        assert_eq!(rel.get(Oid(3)).unwrap().as_slice(), &[3.0, 4.0]);

        assert!(MemoryRelation::from_csv("1.0,2.0\n3.0\n".as_bytes()).is_err());
    }
}
