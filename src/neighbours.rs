use kiddo::{KdTree, SquaredEuclidean};
use std::fmt;

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    /// Position of the stored vector in the index.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f32,
}

/// k-nearest-neighbour search over a fixed set of vectors.
pub trait NeighbourIndex: Send + Sync {
    /// Up to `k` neighbours, nearest first. Equal distances are ordered by
    /// stored index.
    fn search(&self, query: &[f32], k: usize) -> ClassifierResult<Vec<Neighbour>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact search over `K`-dimensional vectors stored in a KD-tree.
pub struct KdTreeIndex<const K: usize> {
    tree: KdTree<f32, K>,
    len: usize,
}

fn as_point<const K: usize>(vector: &[f32]) -> ClassifierResult<&[f32; K]> {
    vector.try_into().map_err(|_| ClassifierErr::DimensionMismatch {
        expected: K,
        found: vector.len(),
    })
}

impl<const K: usize> KdTreeIndex<K> {
    /// Index `vectors`; each must have exactly `K` values.
    pub fn build(vectors: &[Vec<f32>]) -> ClassifierResult<Self> {
        let mut tree = KdTree::new();
        for (idx, vector) in vectors.iter().enumerate() {
            tree.add(as_point::<K>(vector)?, idx as u64);
        }
        Ok(Self {
            tree,
            len: vectors.len(),
        })
    }
}

impl<const K: usize> NeighbourIndex for KdTreeIndex<K> {
    fn search(&self, query: &[f32], k: usize) -> ClassifierResult<Vec<Neighbour>> {
        let query = as_point::<K>(query)?;
        let k = k.min(self.len);
        if k == 0 {
            return Ok(Vec::new());
        }

        // widen the query until no stored vector ties with the k-th one
        // outside the returned set, so ties can be ordered by index
        let mut qty = k;
        let mut found = loop {
            let found = self.tree.nearest_n::<SquaredEuclidean>(query, qty);
            if found.len() < qty || qty >= self.len || found[qty - 1].distance > found[k - 1].distance {
                break found;
            }
            qty = (qty * 2).min(self.len);
        };
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.item.cmp(&b.item)));
        found.truncate(k);
        Ok(found
            .into_iter()
            .map(|n| Neighbour {
                index: n.item as usize,
                distance: n.distance.sqrt(),
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl<const K: usize> fmt::Debug for KdTreeIndex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdTreeIndex")
            .field("dimension", &K)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_first_ties_by_index() {
        let index = KdTreeIndex::<2>::build(&[vec![2., 0.], vec![0., 1.], vec![1., 0.], vec![0., -1.]]).unwrap();
        let found = index.search(&[0., 0.], 3).unwrap();
        let ids: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(found[0].distance, 1.);
    }

    #[test]
    fn ties_across_the_cutoff_keep_the_lowest_indices() {
        // ten copies of one point, the nearest five are the first five copies
        let vectors: Vec<Vec<f32>> = std::iter::once(vec![9., 9.])
            .chain((0..10).map(|_| vec![1., 1.]))
            .collect();
        let index = KdTreeIndex::<2>::build(&vectors).unwrap();
        let found = index.search(&[0., 0.], 5).unwrap();
        let ids: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn k_larger_than_index() {
        let index = KdTreeIndex::<1>::build(&[vec![0.], vec![3.]]).unwrap();
        let found = index.search(&[1.], 5).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].distance, 2.);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        assert!(matches!(
            KdTreeIndex::<3>::build(&[vec![0., 1.]]),
            Err(ClassifierErr::DimensionMismatch { expected: 3, found: 2 })
        ));
        let index = KdTreeIndex::<2>::build(&[vec![0., 1.]]).unwrap();
        assert!(index.search(&[0.], 1).is_err());
    }
}
