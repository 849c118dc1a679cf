//! Composite-key configuration maps with wildcard segments.
//!
//! Every configuration table is keyed by a fixed number of dimensions
//! (stratum, state class, group, ...) plus iteration and timestep. Any
//! segment may be stored as [`KeySegment::Any`]. A lookup resolves to the
//! single most specific stored record whose concrete segments all equal the
//! query.
//!
//! # Specificity
//!
//! Wildcard patterns ("masks") are ranked by, in order:
//!
//! 1. fewest wildcard segments;
//! 2. timestep specified over timestep wildcarded;
//! 3. iteration specified over iteration wildcarded;
//! 4. leftmost key dimension specified over wildcarded.
//!
//! The ranking is total, so resolution never depends on insertion order.
//! Only masks that actually occur in the map are tried.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Key segments
// ---------------------------------------------------------------------------

/// One segment of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySegment {
    Any,
    Is(i32),
}

impl KeySegment {
    /// `None` becomes a wildcard.
    pub fn of<I: Into<i32>>(value: Option<I>) -> Self {
        match value {
            Some(v) => KeySegment::Is(v.into()),
            None => KeySegment::Any,
        }
    }

    pub fn is_any(self) -> bool {
        matches!(self, KeySegment::Any)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Any => write!(f, "*"),
            KeySegment::Is(v) => write!(f, "{v}"),
        }
    }
}

/// A stored key: `N` table dimensions plus iteration and timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositeKey<const N: usize> {
    pub dims: [KeySegment; N],
    pub iteration: KeySegment,
    pub timestep: KeySegment,
}

impl<const N: usize> CompositeKey<N> {
    pub fn new(dims: [KeySegment; N], iteration: Option<i32>, timestep: Option<i32>) -> Self {
        Self {
            dims,
            iteration: KeySegment::of(iteration),
            timestep: KeySegment::of(timestep),
        }
    }

    /// Bit `i < N` marks dimension `i` as wildcard, bit `N` the iteration,
    /// bit `N + 1` the timestep.
    fn mask(&self) -> u32 {
        let mut mask = 0u32;
        for (i, seg) in self.dims.iter().enumerate() {
            if seg.is_any() {
                mask |= 1 << i;
            }
        }
        if self.iteration.is_any() {
            mask |= 1 << N;
        }
        if self.timestep.is_any() {
            mask |= 1 << (N + 1);
        }
        mask
    }
}

impl<const N: usize> fmt::Display for CompositeKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, seg) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{seg}")?;
        }
        write!(f, "] iteration={} timestep={}", self.iteration, self.timestep)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// Two records have indistinguishable keys.
    #[error("duplicate configuration for key {key}")]
    Duplicate { key: String },
}

// ---------------------------------------------------------------------------
// KeyMap
// ---------------------------------------------------------------------------

/// Ranking tuple for a wildcard mask. Smaller is more specific.
fn mask_rank<const N: usize>(mask: u32) -> (u32, bool, bool, [bool; N]) {
    let mut dims = [false; N];
    for (i, d) in dims.iter_mut().enumerate() {
        *d = mask & (1 << i) != 0;
    }
    (
        mask.count_ones(),
        mask & (1 << (N + 1)) != 0,
        mask & (1 << N) != 0,
        dims,
    )
}

/// A wildcard-aware configuration map.
#[derive(Debug, Clone)]
pub struct KeyMap<T, const N: usize> {
    items: HashMap<CompositeKey<N>, T>,
    /// Masks present in `items`, most specific first.
    mask_order: Vec<u32>,
}

impl<T, const N: usize> Default for KeyMap<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> KeyMap<T, N> {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            mask_order: Vec::new(),
        }
    }

    /// Insert a record. Fails if a record with an identical key exists.
    pub fn insert(&mut self, key: CompositeKey<N>, item: T) -> Result<(), MapError> {
        if self.items.contains_key(&key) {
            return Err(MapError::Duplicate {
                key: key.to_string(),
            });
        }
        self.note_mask(key.mask());
        self.items.insert(key, item);
        Ok(())
    }

    /// Get the record stored under exactly `key`, creating it if absent.
    /// Used by tables that accumulate several rows per key.
    pub fn get_or_insert_with(&mut self, key: CompositeKey<N>, f: impl FnOnce() -> T) -> &mut T {
        if !self.items.contains_key(&key) {
            self.note_mask(key.mask());
        }
        self.items.entry(key).or_insert_with(f)
    }

    fn note_mask(&mut self, mask: u32) {
        if self.mask_order.contains(&mask) {
            return;
        }
        self.mask_order.push(mask);
        self.mask_order.sort_by_key(|&m| mask_rank::<N>(m));
    }

    /// Exact-key access, no wildcard resolution.
    pub fn get_exact(&self, key: &CompositeKey<N>) -> Option<&T> {
        self.items.get(key)
    }

    /// Resolve the most specific record for a query. A `None` query
    /// dimension only matches wildcard segments.
    pub fn lookup(&self, dims: [Option<i32>; N], iteration: i32, timestep: i32) -> Option<&T> {
        'masks: for &mask in &self.mask_order {
            let mut key_dims = [KeySegment::Any; N];
            for i in 0..N {
                if mask & (1 << i) != 0 {
                    continue;
                }
                match dims[i] {
                    Some(v) => key_dims[i] = KeySegment::Is(v),
                    None => continue 'masks,
                }
            }
            let key = CompositeKey {
                dims: key_dims,
                iteration: if mask & (1 << N) != 0 {
                    KeySegment::Any
                } else {
                    KeySegment::Is(iteration)
                },
                timestep: if mask & (1 << (N + 1)) != 0 {
                    KeySegment::Any
                } else {
                    KeySegment::Is(timestep)
                },
            };
            if let Some(item) = self.items.get(&key) {
                return Some(item);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey<N>, &T)> {
        self.items.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key2(a: Option<i32>, b: Option<i32>, it: Option<i32>, ts: Option<i32>) -> CompositeKey<2> {
        CompositeKey::new([KeySegment::of(a), KeySegment::of(b)], it, ts)
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let mut map = KeyMap::new();
        map.insert(key2(None, Some(1), None, None), "any-stratum").unwrap();
        map.insert(key2(Some(5), Some(1), None, None), "stratum-5").unwrap();
        assert_eq!(map.lookup([Some(5), Some(1)], 1, 1), Some(&"stratum-5"));
        assert_eq!(map.lookup([Some(6), Some(1)], 1, 1), Some(&"any-stratum"));
    }

    #[test]
    fn timestep_specific_beats_iteration_specific() {
        let mut map = KeyMap::new();
        map.insert(key2(Some(1), Some(1), Some(2), None), "iteration").unwrap();
        map.insert(key2(Some(1), Some(1), None, Some(3)), "timestep").unwrap();
        assert_eq!(map.lookup([Some(1), Some(1)], 2, 3), Some(&"timestep"));
        assert_eq!(map.lookup([Some(1), Some(1)], 2, 4), Some(&"iteration"));
    }

    #[test]
    fn leftmost_dimension_breaks_remaining_ties() {
        let mut map = KeyMap::new();
        map.insert(key2(None, Some(2), None, None), "state-class").unwrap();
        map.insert(key2(Some(1), None, None, None), "stratum").unwrap();
        assert_eq!(map.lookup([Some(1), Some(2)], 1, 1), Some(&"stratum"));
    }

    #[test]
    fn resolution_ignores_insertion_order() {
        let mut a = KeyMap::new();
        a.insert(key2(None, Some(2), None, None), 1).unwrap();
        a.insert(key2(Some(1), None, None, None), 2).unwrap();
        let mut b = KeyMap::new();
        b.insert(key2(Some(1), None, None, None), 2).unwrap();
        b.insert(key2(None, Some(2), None, None), 1).unwrap();
        assert_eq!(a.lookup([Some(1), Some(2)], 1, 1), b.lookup([Some(1), Some(2)], 1, 1));
    }

    #[test]
    fn none_query_only_matches_wildcard() {
        let mut map = KeyMap::new();
        map.insert(key2(Some(1), Some(4), None, None), "secondary-4").unwrap();
        assert_eq!(map.lookup([Some(1), None], 1, 1), None);
        map.insert(key2(Some(1), None, None, None), "any-secondary").unwrap();
        assert_eq!(map.lookup([Some(1), None], 1, 1), Some(&"any-secondary"));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut map = KeyMap::new();
        map.insert(key2(Some(1), None, None, Some(5)), 1).unwrap();
        let err = map.insert(key2(Some(1), None, None, Some(5)), 2).unwrap_err();
        assert_eq!(
            err,
            MapError::Duplicate {
                key: "[1, *] iteration=* timestep=5".into()
            }
        );
    }

    #[test]
    fn get_or_insert_with_accumulates() {
        let mut map: KeyMap<Vec<u32>, 1> = KeyMap::new();
        let key = CompositeKey::new([KeySegment::Is(3)], None, None);
        map.get_or_insert_with(key, Vec::new).push(1);
        map.get_or_insert_with(key, Vec::new).push(2);
        assert_eq!(map.lookup([Some(3)], 9, 9), Some(&vec![1, 2]));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn empty_map_finds_nothing() {
        let map: KeyMap<u8, 3> = KeyMap::new();
        assert!(map.is_empty());
        assert_eq!(map.lookup([Some(1), Some(2), Some(3)], 1, 1), None);
    }
}
