//! Interval Index
//!
//! Keyed collection of `[begin, end]` frame intervals supporting insert,
//! exact-entry removal, and range/point overlap queries. The annotation
//! stores keep one entry per live annotation, keyed by its id.

use std::collections::BTreeSet;

use crate::core::{AnnotationId, Bounds, FrameNumber};

// =============================================================================
// Interval Index
// =============================================================================

/// Ordered index over annotation intervals.
///
/// Entries are kept sorted by `(begin, end, key)`, so overlap queries scan
/// only entries whose `begin` does not exceed the query's upper bound.
/// Removal matches by key and the original range; removing with a stale
/// range reports `false`, which the stores treat as an invariant violation.
#[derive(Clone, Debug, Default)]
pub struct IntervalIndex {
    entries: BTreeSet<(FrameNumber, FrameNumber, AnnotationId)>,
}

impl IntervalIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an interval under the given key.
    ///
    /// Returns `false` if the exact entry was already present.
    pub fn insert(&mut self, range: Bounds, key: AnnotationId) -> bool {
        self.entries.insert((range.begin, range.end, key))
    }

    /// Removes the entry matching both the key and the original range.
    ///
    /// Returns `true` if a matching entry was found and removed.
    pub fn remove(&mut self, range: Bounds, key: AnnotationId) -> bool {
        self.entries.remove(&(range.begin, range.end, key))
    }

    /// Returns the keys of all intervals overlapping `range`, in
    /// `(begin, end, key)` order.
    pub fn overlapping(&self, range: Bounds) -> Vec<AnnotationId> {
        self.entries
            .range(..=(range.end, FrameNumber::MAX, AnnotationId::MAX))
            .filter(|(_, end, _)| *end >= range.begin)
            .map(|(_, _, key)| *key)
            .collect()
    }

    /// Returns the keys of all intervals containing the given frame
    pub fn containing(&self, frame: FrameNumber) -> Vec<AnnotationId> {
        self.overlapping(Bounds::new(frame, frame))
    }

    /// Checks if the exact entry is present
    pub fn contains(&self, range: Bounds, key: AnnotationId) -> bool {
        self.entries.contains(&(range.begin, range.end, key))
    }

    /// Returns the number of indexed intervals
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates all `(range, key)` entries in `(begin, end, key)` order
    pub fn iter(&self) -> impl Iterator<Item = (Bounds, AnnotationId)> + '_ {
        self.entries
            .iter()
            .map(|(begin, end, key)| (Bounds::new(*begin, *end), *key))
    }
}

// =============================================================================
// Tests
// =============================================================================
