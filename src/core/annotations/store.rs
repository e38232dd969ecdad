//! Annotation Store
//!
//! Single source of truth for one camera namespace's annotations of one
//! kind (tracks or groups). Keeps the id map, the insertion-ordered id
//! list, and the interval index in lockstep, and advances a revision
//! counter on every accepted mutation so derived views know when to
//! recompute.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{
    intervals::IntervalIndex, AnnotationId, Bounds, ChangeAction, CoreError, CoreResult,
    FrameNumber,
};

use super::models::{Annotation, AnnotationData};

// =============================================================================
// Change Sink
// =============================================================================

/// Injected collaborator the store reports accepted mutations to.
///
/// The dirty tracker implements this; stores never talk to the persistence
/// layer directly.
pub trait ChangeSink: Send + Sync {
    fn record(&self, camera: &str, action: ChangeAction, data: AnnotationData) -> CoreResult<()>;
}

// =============================================================================
// Options
// =============================================================================

/// Options for [`AnnotationStore::insert`]
#[derive(Clone, Debug, Default)]
pub struct InsertOptions {
    /// Place the new id immediately after this one in the ordered-id list
    pub after_id: Option<AnnotationId>,
    /// Skip dirty-tracking (bulk import / reload path)
    pub imported: bool,
}

/// Options for [`AnnotationStore::remove`]
#[derive(Clone, Debug, Default)]
pub struct RemoveOptions {
    /// Skip dirty-tracking
    pub silent: bool,
}

// =============================================================================
// Annotation Store
// =============================================================================

/// Keyed annotation collection with interval synchronization.
///
/// Invariant: every live entry in the id map has exactly one entry in the
/// interval index keyed by its current `[begin, end]`. Any bounds mutation
/// removes the old interval entry and inserts the new one before the
/// revision counter advances.
pub struct AnnotationStore<T: Annotation> {
    /// Camera namespace this store belongs to
    camera: String,
    /// Authoritative id → annotation map
    items: HashMap<AnnotationId, T>,
    /// Ids in insertion order (`after_id` placement preserved)
    order: Vec<AnnotationId>,
    /// Interval index over `[begin, end]`, keyed by id
    intervals: IntervalIndex,
    /// Strictly increasing on every accepted mutation
    revision: u64,
    /// Dirty tracker, when wired
    sink: Option<Arc<dyn ChangeSink>>,
}

impl<T: Annotation> AnnotationStore<T> {
    /// Creates a store with no dirty tracking
    pub fn new(camera: &str) -> Self {
        Self {
            camera: camera.to_string(),
            items: HashMap::new(),
            order: Vec::new(),
            intervals: IntervalIndex::new(),
            revision: 0,
            sink: None,
        }
    }

    /// Creates a store that reports mutations to the given sink
    pub fn with_sink(camera: &str, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(camera)
        }
    }

    /// Returns the camera namespace name
    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Returns the number of live annotations
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the current revision.
    ///
    /// Strictly increases on insert, remove, and mutation; equal values
    /// mean "no change since last observation".
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the interval index (read-only)
    pub fn intervals(&self) -> &IntervalIndex {
        &self.intervals
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Gets an annotation by id
    pub fn get(&self, id: AnnotationId) -> CoreResult<&T> {
        self.items.get(&id).ok_or(CoreError::NotFound(id))
    }

    /// Gets an annotation by id, if present
    pub fn get_if_present(&self, id: AnnotationId) -> Option<&T> {
        self.items.get(&id)
    }

    /// Iterates annotations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Returns the ids in insertion order
    pub fn ids(&self) -> &[AnnotationId] {
        &self.order
    }

    /// Returns the ids of annotations overlapping the given range
    pub fn overlapping(&self, range: Bounds) -> Vec<AnnotationId> {
        self.intervals.overlapping(range)
    }

    /// Returns the ids of annotations whose interval contains the frame
    pub fn at_frame(&self, frame: FrameNumber) -> Vec<AnnotationId> {
        self.intervals.containing(frame)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Registers a new annotation.
    ///
    /// Fails with `DuplicateId` if the id is already present. Unless
    /// `imported`, the mutation is recorded as a pending upsert.
    pub fn insert(&mut self, annotation: T, options: InsertOptions) -> CoreResult<()> {
        let id = annotation.id();
        let bounds = annotation.bounds();
        if self.items.contains_key(&id) {
            return Err(CoreError::DuplicateId(id));
        }
        if bounds.begin > bounds.end {
            return Err(CoreError::InvalidArgument(format!(
                "invalid bounds [{}, {}] for annotation {}",
                bounds.begin, bounds.end, id
            )));
        }

        let position = options
            .after_id
            .and_then(|after| self.order.iter().position(|x| *x == after));
        match position {
            Some(pos) => self.order.insert(pos + 1, id),
            None => self.order.push(id),
        }
        self.intervals.insert(bounds, id);
        let data = annotation.to_data();
        self.items.insert(id, annotation);
        self.revision += 1;

        if !options.imported {
            if let Some(sink) = &self.sink {
                sink.record(&self.camera, ChangeAction::Upsert, data)?;
            }
        }
        Ok(())
    }

    /// Removes an annotation. Removal is terminal: removed ids are not
    /// reinserted by the editing flow.
    ///
    /// Fails with `NotFound` if absent, or `IndexDesync` if the interval
    /// index holds no matching entry (invariant violation, not recoverable).
    pub fn remove(&mut self, id: AnnotationId, options: RemoveOptions) -> CoreResult<T> {
        let bounds = self.items.get(&id).ok_or(CoreError::NotFound(id))?.bounds();
        if !self.intervals.remove(bounds, id) {
            return Err(CoreError::IndexDesync(id));
        }
        let annotation = self.items.remove(&id).ok_or(CoreError::NotFound(id))?;
        self.order.retain(|x| *x != id);
        self.revision += 1;

        if !options.silent {
            if let Some(sink) = &self.sink {
                sink.record(&self.camera, ChangeAction::Delete, annotation.to_data())?;
            }
        }
        Ok(annotation)
    }

    /// Applies an in-place mutation and synchronizes the interval index.
    ///
    /// The old interval is captured before the closure runs; when the
    /// bounds changed, the old entry is removed and the new one inserted,
    /// in that order, within this same operation. Every accepted mutation
    /// bumps the revision and records a pending upsert.
    pub fn mutate<F>(&mut self, id: AnnotationId, f: F) -> CoreResult<()>
    where
        F: FnOnce(&mut T),
    {
        let item = self.items.get_mut(&id).ok_or(CoreError::NotFound(id))?;
        let old = item.bounds();
        f(item);
        let new = item.bounds();
        if new.begin > new.end {
            item.set_bounds(old);
            return Err(CoreError::InvalidArgument(format!(
                "invalid bounds [{}, {}] for annotation {}",
                new.begin, new.end, id
            )));
        }

        if new != old {
            if !self.intervals.remove(old, id) {
                return Err(CoreError::IndexDesync(id));
            }
            self.intervals.insert(new, id);
        }
        self.revision += 1;

        let data = self.items[&id].to_data();
        if let Some(sink) = &self.sink {
            sink.record(&self.camera, ChangeAction::Upsert, data)?;
        }
        Ok(())
    }

    /// Sets an annotation's bounds
    pub fn set_bounds(&mut self, id: AnnotationId, bounds: Bounds) -> CoreResult<()> {
        self.mutate(id, |a| a.set_bounds(bounds))
    }

    /// Empties the store without recording changes (full reload path).
    ///
    /// Bumps the revision so derived views recompute.
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.order.clear();
        self.intervals.clear();
        self.revision += 1;
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Returns all annotations ordered by ascending `begin`, recomputed
    /// fresh. Stable: ties keep their insertion order.
    pub fn iter_sorted(&self) -> Vec<&T> {
        let mut sorted: Vec<&T> = self.iter().collect();
        sorted.sort_by_key(|a| a.bounds().begin);
        sorted
    }

    /// Clones all annotations in insertion order (serialization round trip)
    pub fn export_all(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

// =============================================================================
// Sorted View
// =============================================================================

/// Cached begin-sorted id list that recomputes only when the store's
/// revision has advanced past the one it last observed.
#[derive(Clone, Debug, Default)]
pub struct SortedView {
    seen: Option<u64>,
    ids: Vec<AnnotationId>,
}

impl SortedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the cached order if the store changed.
    ///
    /// Returns `true` when a recompute happened.
    pub fn refresh<T: Annotation>(&mut self, store: &AnnotationStore<T>) -> bool {
        if self.seen == Some(store.revision()) {
            return false;
        }
        self.ids = store.iter_sorted().iter().map(|a| a.id()).collect();
        self.seen = Some(store.revision());
        true
    }

    /// Returns the cached begin-sorted ids
    pub fn ids(&self) -> &[AnnotationId] {
        &self.ids
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::annotations::models::Track;

    fn track(id: AnnotationId, begin: FrameNumber, end: FrameNumber) -> Track {
        Track::new(id, Bounds::new(begin, end))
    }

    /// Sink that records every call for assertions
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, ChangeAction, AnnotationId)>>,
    }

    impl ChangeSink for RecordingSink {
        fn record(
            &self,
            camera: &str,
            action: ChangeAction,
            data: AnnotationData,
        ) -> CoreResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push((camera.to_string(), action, data.id()));
            Ok(())
        }
    }

    /// Asserts the id map and the interval index agree entry-for-entry
    fn assert_index_in_sync(store: &AnnotationStore<Track>) {
        assert_eq!(store.intervals().len(), store.len());
        for (bounds, id) in store.intervals().iter() {
            let annotation = store.get(id).unwrap();
            assert_eq!(annotation.bounds(), bounds);
        }
    }

    // -------------------------------------------------------------------------
    // Basic Operations
    // -------------------------------------------------------------------------

    #[test]
    fn test_insert_and_get() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap().id, 1);
        assert!(store.get_if_present(2).is_none());
        assert!(matches!(store.get(2), Err(CoreError::NotFound(2))));
    }

    #[test]
    fn test_insert_duplicate_id() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();

        let result = store.insert(track(1, 5, 15), InsertOptions::default());
        assert!(matches!(result, Err(CoreError::DuplicateId(1))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_invalid_bounds() {
        let mut store = AnnotationStore::new("main");
        let result = store.insert(track(1, 10, 5), InsertOptions::default());
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_after_id() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();
        store.insert(track(2, 0, 10), InsertOptions::default()).unwrap();
        store
            .insert(
                track(3, 0, 10),
                InsertOptions {
                    after_id: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(store.ids(), &[1, 3, 2]);
    }

    #[test]
    fn test_remove() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();

        let removed = store.remove(1, RemoveOptions::default()).unwrap();
        assert_eq!(removed.id, 1);
        assert!(store.is_empty());
        assert!(store.intervals().is_empty());
    }

    #[test]
    fn test_remove_twice_fails_not_found() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();
        store.remove(1, RemoveOptions::default()).unwrap();

        // Never succeeds silently
        assert!(matches!(
            store.remove(1, RemoveOptions::default()),
            Err(CoreError::NotFound(1))
        ));
    }

    // -------------------------------------------------------------------------
    // Interval Synchronization
    // -------------------------------------------------------------------------

    #[test]
    fn test_mutate_bounds_resyncs_interval() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();

        store.set_bounds(1, Bounds::new(1, 20)).unwrap();

        // Old entry gone, new entry present
        assert!(!store.intervals().contains(Bounds::new(10, 20), 1));
        assert!(store.intervals().contains(Bounds::new(1, 20), 1));
        assert_index_in_sync(&store);
    }

    #[test]
    fn test_mutate_invalid_bounds_restores_old() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();

        let result = store.set_bounds(1, Bounds::new(30, 20));
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));

        // Map and index both still hold the old interval
        assert_eq!(store.get(1).unwrap().bounds(), Bounds::new(10, 20));
        assert_index_in_sync(&store);
    }

    #[test]
    fn test_mutate_without_bounds_change() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();
        let before = store.revision();

        store
            .mutate(1, |t| {
                t.attributes.insert("species".to_string(), "seal".into());
            })
            .unwrap();

        assert!(store.revision() > before);
        assert_index_in_sync(&store);
    }

    #[test]
    fn test_index_in_sync_across_operation_sequence() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();
        store.insert(track(2, 5, 8), InsertOptions::default()).unwrap();
        store.insert(track(3, 0, 100), InsertOptions::default()).unwrap();
        assert_index_in_sync(&store);

        store.set_bounds(2, Bounds::new(50, 60)).unwrap();
        assert_index_in_sync(&store);

        store.remove(1, RemoveOptions::default()).unwrap();
        assert_index_in_sync(&store);

        store.set_bounds(3, Bounds::new(0, 1)).unwrap();
        store.insert(track(4, 7, 7), InsertOptions::default()).unwrap();
        assert_index_in_sync(&store);
    }

    #[test]
    fn test_overlap_queries() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();
        store.insert(track(2, 5, 8), InsertOptions::default()).unwrap();

        assert_eq!(store.overlapping(Bounds::new(6, 12)), vec![2, 1]);
        assert_eq!(store.at_frame(15), vec![1]);
    }

    // -------------------------------------------------------------------------
    // Revision and Sorted Views
    // -------------------------------------------------------------------------

    #[test]
    fn test_revision_strictly_increases() {
        let mut store = AnnotationStore::new("main");
        let r0 = store.revision();

        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();
        let r1 = store.revision();
        assert!(r1 > r0);

        store.set_bounds(1, Bounds::new(0, 11)).unwrap();
        let r2 = store.revision();
        assert!(r2 > r1);

        store.remove(1, RemoveOptions::default()).unwrap();
        assert!(store.revision() > r2);
    }

    #[test]
    fn test_sorted_view_scenario() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap(); // A
        store.insert(track(2, 5, 8), InsertOptions::default()).unwrap(); // B

        let ids: Vec<_> = store.iter_sorted().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);

        // Mutate A's begin to 1: order flips, old interval entry is gone
        store.set_bounds(1, Bounds::new(1, 20)).unwrap();
        let ids: Vec<_> = store.iter_sorted().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!store.intervals().contains(Bounds::new(10, 20), 1));
    }

    #[test]
    fn test_sorted_ties_keep_insertion_order() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(9, 5, 10), InsertOptions::default()).unwrap();
        store.insert(track(4, 5, 10), InsertOptions::default()).unwrap();
        store.insert(track(7, 5, 10), InsertOptions::default()).unwrap();

        let ids: Vec<_> = store.iter_sorted().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![9, 4, 7]);
    }

    #[test]
    fn test_sorted_view_recomputes_only_when_behind() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();

        let mut view = SortedView::new();
        assert!(view.refresh(&store));
        assert!(!view.refresh(&store));

        store.insert(track(2, 0, 5), InsertOptions::default()).unwrap();
        assert!(view.refresh(&store));
        assert_eq!(view.ids(), &[2, 1]);
    }

    #[test]
    fn test_clear_all_bumps_revision() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();
        let before = store.revision();

        store.clear_all();
        assert!(store.is_empty());
        assert!(store.intervals().is_empty());
        assert!(store.revision() > before);
    }

    // -------------------------------------------------------------------------
    // Round Trip
    // -------------------------------------------------------------------------

    #[test]
    fn test_export_clear_reinsert_round_trip() {
        let mut store = AnnotationStore::new("main");
        store.insert(track(1, 10, 20), InsertOptions::default()).unwrap();
        store.insert(track(2, 5, 8), InsertOptions::default()).unwrap();
        store.insert(track(3, 5, 8), InsertOptions::default()).unwrap();

        let sorted_before: Vec<_> = store.iter_sorted().iter().map(|t| t.id).collect();
        let json = serde_json::to_string(&store.export_all()).unwrap();

        store.clear_all();
        let restored: Vec<Track> = serde_json::from_str(&json).unwrap();
        for t in restored {
            store
                .insert(
                    t,
                    InsertOptions {
                        imported: true,
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let sorted_after: Vec<_> = store.iter_sorted().iter().map(|t| t.id).collect();
        assert_eq!(sorted_before, sorted_after);
        assert_index_in_sync(&store);
    }

    // -------------------------------------------------------------------------
    // Dirty-Tracking Wiring
    // -------------------------------------------------------------------------

    #[test]
    fn test_sink_records_mutations() {
        let sink = Arc::new(RecordingSink::default());
        let mut store: AnnotationStore<Track> =
            AnnotationStore::with_sink("cam2", sink.clone());

        store.insert(track(1, 0, 10), InsertOptions::default()).unwrap();
        store.set_bounds(1, Bounds::new(0, 12)).unwrap();
        store.remove(1, RemoveOptions::default()).unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("cam2".to_string(), ChangeAction::Upsert, 1),
                ("cam2".to_string(), ChangeAction::Upsert, 1),
                ("cam2".to_string(), ChangeAction::Delete, 1),
            ]
        );
    }

    #[test]
    fn test_imported_and_silent_skip_sink() {
        let sink = Arc::new(RecordingSink::default());
        let mut store: AnnotationStore<Track> =
            AnnotationStore::with_sink("main", sink.clone());

        store
            .insert(
                track(1, 0, 10),
                InsertOptions {
                    imported: true,
                    ..Default::default()
                },
            )
            .unwrap();
        store.remove(1, RemoveOptions { silent: true }).unwrap();

        assert!(sink.calls.lock().unwrap().is_empty());
    }
}
