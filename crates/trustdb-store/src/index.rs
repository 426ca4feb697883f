//! Per-kind version index over `(scope, version)` keys.

use std::collections::BTreeMap;

/// Outcome of probing the index for a prospective insert.
#[derive(Debug, PartialEq, Eq)]
pub enum Slot<'a, V> {
    /// Nothing is stored at the key.
    Vacant,
    /// The key already holds exactly this value.
    Identical,
    /// The key holds a different value.
    Conflict(&'a V),
}

/// Ordered map from `(scope, version)` to an immutable value.
///
/// Ordering by scope first keeps each scope's versions contiguous, so the
/// max-version lookup is a reverse range scan and full enumeration comes out
/// sorted by (scope, version).
#[derive(Debug, Clone)]
pub struct VersionIndex<S, V> {
    entries: BTreeMap<(S, u64), V>,
}

impl<S, V> Default for VersionIndex<S, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: Ord + Copy, V: PartialEq> VersionIndex<S, V> {
    pub fn get(&self, scope: S, version: u64) -> Option<&V> {
        self.entries.get(&(scope, version))
    }

    /// The value with the numerically greatest version for `scope`.
    pub fn max(&self, scope: S) -> Option<&V> {
        self.entries
            .range((scope, 0)..=(scope, u64::MAX))
            .next_back()
            .map(|(_, v)| v)
    }

    pub fn probe(&self, scope: S, version: u64, value: &V) -> Slot<'_, V> {
        match self.entries.get(&(scope, version)) {
            None => Slot::Vacant,
            Some(existing) if existing == value => Slot::Identical,
            Some(existing) => Slot::Conflict(existing),
        }
    }

    /// Insert into a vacant slot. An occupied slot is left untouched and
    /// `false` is returned; callers probe first.
    pub fn insert(&mut self, scope: S, version: u64, value: V) -> bool {
        match self.entries.entry((scope, version)) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn max_picks_greatest_version_per_scope() {
        let mut idx = VersionIndex::default();
        for v in [1u64, 2, 5] {
            idx.insert(7u16, v, format!("s7-v{v}"));
        }
        idx.insert(8u16, 9, "s8-v9".to_string());
        idx.insert(6u16, 10, "s6-v10".to_string());

        assert_eq!(idx.max(7).map(String::as_str), Some("s7-v5"));
        assert_eq!(idx.max(8).map(String::as_str), Some("s8-v9"));
        assert_eq!(idx.max(9), None);
    }

    #[test]
    fn probe_distinguishes_identical_and_conflicting() {
        let mut idx = VersionIndex::default();
        idx.insert(1u16, 3, "a".to_string());

        assert_eq!(idx.probe(1, 3, &"a".to_string()), Slot::Identical);
        assert_eq!(idx.probe(1, 3, &"b".to_string()), Slot::Conflict(&"a".to_string()));
        assert_eq!(idx.probe(1, 4, &"a".to_string()), Slot::Vacant);
    }

    #[test]
    fn insert_never_overwrites() {
        let mut idx = VersionIndex::default();
        assert!(idx.insert(1u16, 1, 10));
        assert!(!idx.insert(1u16, 1, 20));
        assert_eq!(idx.get(1, 1), Some(&10));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn values_are_sorted_by_scope_then_version() {
        let mut idx = VersionIndex::default();
        idx.insert(2u16, 1, (2, 1));
        idx.insert(1u16, 3, (1, 3));
        idx.insert(1u16, 1, (1, 1));
        let order: Vec<_> = idx.values().copied().collect();
        assert_eq!(order, vec![(1, 1), (1, 3), (2, 1)]);
    }

    proptest! {
        #[test]
        fn max_equals_largest_inserted(
            versions in proptest::collection::vec(1u64..u64::MAX, 1..32),
            noise in proptest::collection::vec((0u16..4, 1u64..1000), 0..32),
        ) {
            let mut idx = VersionIndex::default();
            for &v in &versions {
                idx.insert(10u16, v, v);
            }
            for &(scope, v) in &noise {
                idx.insert(scope, v, v);
            }
            let expected = versions.iter().copied().max();
            prop_assert_eq!(idx.max(10).copied(), expected);
        }
    }
}
