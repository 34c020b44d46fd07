//! A fixed-size chained hash table keyed by tile coordinates.
//!
//! Buckets are chosen by [calc_tile_hash], so that a horizontal scan walks neighbouring buckets.  Iteration order is
//! bucket order, then insertion order within a bucket, which makes it deterministic for a given set of inserts.
use crate::coords::*;

pub(crate) struct TileTable<V> {
    buckets: Vec<Vec<(TileCoord, V)>>,
    len: usize,
}

impl<V> TileTable<V> {
    pub(crate) fn new() -> TileTable<V> {
        TileTable {
            buckets: (0..HASH_TABLE_SIZE).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, coord: TileCoord) -> Option<&V> {
        self.buckets[coord.bucket()]
            .iter()
            .find(|(c, _)| *c == coord)
            .map(|(_, v)| v)
    }

    pub(crate) fn get_mut(&mut self, coord: TileCoord) -> Option<&mut V> {
        self.buckets[coord.bucket()]
            .iter_mut()
            .find(|(c, _)| *c == coord)
            .map(|(_, v)| v)
    }

    pub(crate) fn contains(&self, coord: TileCoord) -> bool {
        self.get(coord).is_some()
    }

    /// Insert a value, returning the one it replaced.
    pub(crate) fn insert(&mut self, coord: TileCoord, value: V) -> Option<V> {
        let bucket = &mut self.buckets[coord.bucket()];
        if let Some((_, v)) = bucket.iter_mut().find(|(c, _)| *c == coord) {
            return Some(std::mem::replace(v, value));
        }

        bucket.push((coord, value));
        self.len += 1;
        None
    }

    pub(crate) fn remove(&mut self, coord: TileCoord) -> Option<V> {
        let bucket = &mut self.buckets[coord.bucket()];
        let index = bucket.iter().position(|(c, _)| *c == coord)?;
        self.len -= 1;
        Some(bucket.remove(index).1)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (TileCoord, &V)> {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|(c, v)| (*c, v)))
    }

    pub(crate) fn coords(&self) -> Vec<TileCoord> {
        self.iter().map(|(c, _)| c).collect()
    }

    /// Remove everything, in iteration order.
    pub(crate) fn drain(&mut self) -> Vec<(TileCoord, V)> {
        self.len = 0;
        self.buckets.iter_mut().flat_map(|b| b.drain(..)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn fuzz_table_impl(ops: Vec<(i32, i32, Option<u32>)>) -> proptest::test_runner::TestCaseResult {
        let mut authoritative = HashMap::new();
        let mut testing = TileTable::new();

        for (col, row, op) in ops {
            let coord = TileCoord::new(col, row);
            match op {
                Some(v) => {
                    prop_assert_eq!(authoritative.insert(coord, v), testing.insert(coord, v));
                }
                None => {
                    prop_assert_eq!(authoritative.remove(&coord), testing.remove(coord));
                }
            }
            prop_assert_eq!(authoritative.get(&coord), testing.get(coord));
            prop_assert_eq!(authoritative.len(), testing.len());
        }

        let mut from_table: Vec<(TileCoord, u32)> = testing.iter().map(|(c, v)| (c, *v)).collect();
        let mut from_map: Vec<(TileCoord, u32)> = authoritative.into_iter().collect();
        from_table.sort();
        from_map.sort();
        prop_assert_eq!(from_table, from_map);

        let count = testing.len();
        let drained = testing.drain();
        prop_assert_eq!(testing.len(), 0);
        prop_assert!(testing.iter().next().is_none());
        prop_assert_eq!(drained.len(), count);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 1000,
            ..Default::default()
        })]
        #[test]
        fn fuzz_tile_table(
            ops in proptest::collection::vec((-40..40i32, -40..40i32, proptest::option::of(0..1000u32)), 0..500usize),
        ) {
            return fuzz_table_impl(ops);
        }
    }

    #[test]
    fn test_iteration_is_bucket_ordered() {
        let mut table = TileTable::new();
        // Same bucket: column differs by 32.
        table.insert(TileCoord::new(0, 0), 'a');
        table.insert(TileCoord::new(32, 0), 'b');
        table.insert(TileCoord::new(1, 0), 'c');
        let order: Vec<char> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(order, vec!['a', 'b', 'c']);
    }
}
