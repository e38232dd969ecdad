//! Pending Change Tracker
//!
//! Records pending local mutations since the last successful flush,
//! namespaced per camera. Each entity kind keeps an upsert map and a
//! delete set with last-action-wins semantics: staging a delete removes a
//! pending upsert for that id, and a re-upsert cancels a staged delete.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::core::annotations::{AnnotationData, ChangeSink, Group, Track};
use crate::core::{AnnotationId, ChangeAction, CoreError, CoreResult};

use super::models::{Attribute, AttributeFilter, SwimlaneConfig, TimelineConfig};

// =============================================================================
// Change Map
// =============================================================================

/// Upsert map + delete set for one entity kind.
///
/// Delete and upsert of the same id are mutually exclusive; the last
/// staged action wins.
#[derive(Clone, Debug)]
pub(crate) struct ChangeMap<K, V> {
    pub(crate) upsert: HashMap<K, V>,
    pub(crate) delete: HashSet<K>,
}

impl<K, V> Default for ChangeMap<K, V> {
    fn default() -> Self {
        Self {
            upsert: HashMap::new(),
            delete: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone + PartialEq> ChangeMap<K, V> {
    fn stage_upsert(&mut self, key: K, value: V) {
        self.delete.remove(&key);
        self.upsert.insert(key, value);
    }

    fn stage_delete(&mut self, key: K) {
        self.upsert.remove(&key);
        self.delete.insert(key);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.delete.is_empty()
    }

    fn clear(&mut self) {
        self.upsert.clear();
        self.delete.clear();
    }

    /// Clones the current upserts and delete ids for a flush
    pub(crate) fn snapshot(&self) -> (Vec<(K, V)>, Vec<K>) {
        let upserts = self
            .upsert
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let deletes = self.delete.iter().cloned().collect();
        (upserts, deletes)
    }

    /// Clears only what a completed flush covered.
    ///
    /// An upsert entry survives when its live value no longer equals the
    /// flushed snapshot, so a mutation recorded while the flush was in
    /// flight stays pending.
    pub(crate) fn clear_flushed(&mut self, upserts: &[(K, V)], deletes: &[K]) {
        for (key, value) in upserts {
            if self.upsert.get(key) == Some(value) {
                self.upsert.remove(key);
            }
        }
        for key in deletes {
            self.delete.remove(key);
        }
    }
}

// =============================================================================
// Camera Namespace
// =============================================================================

/// Pending change sets for one camera namespace
#[derive(Debug, Default)]
pub(crate) struct CameraPending {
    pub(crate) tracks: ChangeMap<AnnotationId, Track>,
    pub(crate) groups: ChangeMap<AnnotationId, Group>,
    pub(crate) attributes: ChangeMap<String, Attribute>,
    pub(crate) timelines: ChangeMap<String, TimelineConfig>,
    pub(crate) swimlanes: ChangeMap<String, SwimlaneConfig>,
    pub(crate) filters: ChangeMap<String, AttributeFilter>,
    /// Dataset-level metadata edits observed by this namespace
    pub(crate) meta_changes: u64,
}

pub(crate) struct PendingState {
    pub(crate) cameras: HashMap<String, CameraPending>,
    pub(crate) primary: String,
    pub(crate) read_only: bool,
    /// Monotonic count of accepted mutations since the last flush
    pub(crate) pending: u64,
}

// =============================================================================
// Change Requests
// =============================================================================

/// Entity payload carried by one change request
#[derive(Clone, Debug)]
pub enum Entity {
    Track(Track),
    Group(Group),
    Attribute(Attribute),
    Timeline(TimelineConfig),
    Swimlane(SwimlaneConfig),
    Filter(AttributeFilter),
}

/// One mutation routed to the tracker
#[derive(Clone, Debug)]
pub struct ChangeRequest {
    pub action: ChangeAction,
    /// Required for `Upsert` and `Delete`; ignored for `Meta`
    pub entity: Option<Entity>,
    /// Camera namespace; the primary camera when absent
    pub camera: Option<String>,
}

impl ChangeRequest {
    pub fn upsert(entity: Entity) -> Self {
        Self {
            action: ChangeAction::Upsert,
            entity: Some(entity),
            camera: None,
        }
    }

    pub fn delete(entity: Entity) -> Self {
        Self {
            action: ChangeAction::Delete,
            entity: Some(entity),
            camera: None,
        }
    }

    pub fn meta() -> Self {
        Self {
            action: ChangeAction::Meta,
            entity: None,
            camera: None,
        }
    }

    pub fn for_camera(mut self, camera: &str) -> Self {
        self.camera = Some(camera.to_string());
        self
    }
}

/// Pending-state snapshot for "unsaved changes" UIs and tests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingSummary {
    pub track_upserts: Vec<AnnotationId>,
    pub track_deletes: Vec<AnnotationId>,
    pub group_upserts: Vec<AnnotationId>,
    pub group_deletes: Vec<AnnotationId>,
    pub attribute_upserts: Vec<String>,
    pub attribute_deletes: Vec<String>,
    pub timeline_upserts: Vec<String>,
    pub swimlane_upserts: Vec<String>,
    pub filter_upserts: Vec<String>,
    pub meta_changes: u64,
}

// =============================================================================
// Pending Changes
// =============================================================================

/// Per-camera dirty tracker shared by every store of one dataset
pub struct PendingChanges {
    pub(crate) state: Mutex<PendingState>,
    /// Broadcasts the pending counter to "unsaved changes" observers
    pub(crate) pending_tx: watch::Sender<u64>,
}

impl PendingChanges {
    /// Creates a tracker with the given primary camera namespace
    pub fn new(primary_camera: &str) -> Self {
        let mut cameras = HashMap::new();
        cameras.insert(primary_camera.to_string(), CameraPending::default());
        let (pending_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(PendingState {
                cameras,
                primary: primary_camera.to_string(),
                read_only: false,
                pending: 0,
            }),
            pending_tx,
        }
    }

    /// Returns the primary camera name
    pub fn primary_camera(&self) -> String {
        self.state.lock().unwrap().primary.clone()
    }

    /// Returns the camera namespace names, sorted
    pub fn camera_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.cameras.keys().cloned().collect();
        names.sort();
        names
    }

    /// Creates an empty change namespace for a new camera stream
    pub fn add_camera(&self, name: &str) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.cameras.contains_key(name) {
            return Err(CoreError::InvalidArgument(format!(
                "camera already registered: {name}"
            )));
        }
        state.cameras.insert(name.to_string(), CameraPending::default());
        Ok(())
    }

    /// Drops a camera namespace and its staged changes
    pub fn remove_camera(&self, name: &str) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.primary == name {
            return Err(CoreError::InvalidArgument(format!(
                "cannot remove primary camera: {name}"
            )));
        }
        state
            .cameras
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::UnknownCamera(name.to_string()))
    }

    /// Toggles read-only mode; `save` refuses while set
    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().unwrap().read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.state.lock().unwrap().read_only
    }

    /// Observable count of accepted mutations since the last successful
    /// flush. A successful `save` resets it to 0.
    pub fn pending_count(&self) -> u64 {
        self.state.lock().unwrap().pending
    }

    /// Subscribes to pending-counter updates.
    ///
    /// The receiver observes every accepted mutation and the reset to 0
    /// after a successful flush; navigation-away warnings watch this.
    pub fn watch_pending(&self) -> watch::Receiver<u64> {
        self.pending_tx.subscribe()
    }

    /// Routes one mutation to the per-namespace per-kind change map.
    ///
    /// Fails with `InvalidArgument` when `Upsert`/`Delete` carries no
    /// entity, and `UnknownCamera` for an unregistered namespace. The
    /// pending counter increments once per accepted call even when the
    /// staged content was coalesced.
    pub fn mark_changes_pending(&self, request: ChangeRequest) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();

        match request.action {
            ChangeAction::Meta => {
                for camera in state.cameras.values_mut() {
                    camera.meta_changes += 1;
                }
            }
            action => {
                let entity = request.entity.ok_or_else(|| {
                    CoreError::InvalidArgument(
                        "markChangesPending requires an entity for upsert/delete".to_string(),
                    )
                })?;
                let camera_name = request.camera.unwrap_or_else(|| state.primary.clone());
                let camera = state
                    .cameras
                    .get_mut(&camera_name)
                    .ok_or(CoreError::UnknownCamera(camera_name))?;
                Self::route(camera, action, entity);
            }
        }

        state.pending += 1;
        self.pending_tx.send_replace(state.pending);
        Ok(())
    }

    fn route(camera: &mut CameraPending, action: ChangeAction, entity: Entity) {
        match entity {
            Entity::Track(track) => match action {
                ChangeAction::Delete => camera.tracks.stage_delete(track.id),
                _ => camera.tracks.stage_upsert(track.id, track),
            },
            Entity::Group(group) => match action {
                ChangeAction::Delete => camera.groups.stage_delete(group.id),
                _ => camera.groups.stage_upsert(group.id, group),
            },
            Entity::Attribute(attribute) => match action {
                ChangeAction::Delete => camera.attributes.stage_delete(attribute.key.clone()),
                _ => camera.attributes.stage_upsert(attribute.key.clone(), attribute),
            },
            Entity::Timeline(timeline) => match action {
                ChangeAction::Delete => camera.timelines.stage_delete(timeline.name.clone()),
                _ => camera.timelines.stage_upsert(timeline.name.clone(), timeline),
            },
            Entity::Swimlane(swimlane) => match action {
                ChangeAction::Delete => camera.swimlanes.stage_delete(swimlane.name.clone()),
                _ => camera.swimlanes.stage_upsert(swimlane.name.clone(), swimlane),
            },
            Entity::Filter(filter) => match action {
                ChangeAction::Delete => camera.filters.stage_delete(filter.derived_key()),
                _ => camera.filters.stage_upsert(filter.derived_key(), filter),
            },
        }
    }

    /// Clears every change set and resets the counters without flushing
    pub fn discard_changes(&self) {
        let mut state = self.state.lock().unwrap();
        for camera in state.cameras.values_mut() {
            camera.tracks.clear();
            camera.groups.clear();
            camera.attributes.clear();
            camera.timelines.clear();
            camera.swimlanes.clear();
            camera.filters.clear();
            camera.meta_changes = 0;
        }
        state.pending = 0;
        self.pending_tx.send_replace(0);
    }

    /// Snapshots one camera's staged ids for inspection
    pub fn summary(&self, camera: &str) -> CoreResult<PendingSummary> {
        let state = self.state.lock().unwrap();
        let pending = state
            .cameras
            .get(camera)
            .ok_or_else(|| CoreError::UnknownCamera(camera.to_string()))?;

        fn sorted_keys<K: Ord + Clone, V>(map: &ChangeMap<K, V>) -> (Vec<K>, Vec<K>) {
            let mut upserts: Vec<K> = map.upsert.keys().cloned().collect();
            let mut deletes: Vec<K> = map.delete.iter().cloned().collect();
            upserts.sort();
            deletes.sort();
            (upserts, deletes)
        }

        let (track_upserts, track_deletes) = sorted_keys(&pending.tracks);
        let (group_upserts, group_deletes) = sorted_keys(&pending.groups);
        let (attribute_upserts, attribute_deletes) = sorted_keys(&pending.attributes);
        let (timeline_upserts, _) = sorted_keys(&pending.timelines);
        let (swimlane_upserts, _) = sorted_keys(&pending.swimlanes);
        let (filter_upserts, _) = sorted_keys(&pending.filters);

        Ok(PendingSummary {
            track_upserts,
            track_deletes,
            group_upserts,
            group_deletes,
            attribute_upserts,
            attribute_deletes,
            timeline_upserts,
            swimlane_upserts,
            filter_upserts,
            meta_changes: pending.meta_changes,
        })
    }
}

impl ChangeSink for PendingChanges {
    fn record(&self, camera: &str, action: ChangeAction, data: AnnotationData) -> CoreResult<()> {
        let entity = match data {
            AnnotationData::Track(track) => Entity::Track(track),
            AnnotationData::Group(group) => Entity::Group(group),
        };
        self.mark_changes_pending(ChangeRequest {
            action,
            entity: Some(entity),
            camera: Some(camera.to_string()),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::{ClauseValue, FilterOp};
    use crate::core::pending::models::{AttributeDatatype, AttributeScope};
    use crate::core::Bounds;

    fn track(id: AnnotationId) -> Track {
        Track::new(id, Bounds::new(0, 10))
    }

    // -------------------------------------------------------------------------
    // Last-Action-Wins
    // -------------------------------------------------------------------------

    #[test]
    fn test_delete_supersedes_pending_upsert() {
        let pending = PendingChanges::new("main");
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(5))))
            .unwrap();
        pending
            .mark_changes_pending(ChangeRequest::delete(Entity::Track(track(5))))
            .unwrap();

        let summary = pending.summary("main").unwrap();
        assert!(summary.track_upserts.is_empty());
        assert_eq!(summary.track_deletes, vec![5]);
    }

    #[test]
    fn test_reupsert_cancels_staged_delete() {
        let pending = PendingChanges::new("main");
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(5))))
            .unwrap();
        pending
            .mark_changes_pending(ChangeRequest::delete(Entity::Track(track(5))))
            .unwrap();
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(5))))
            .unwrap();

        let summary = pending.summary("main").unwrap();
        assert_eq!(summary.track_upserts, vec![5]);
        assert!(summary.track_deletes.is_empty());
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    #[test]
    fn test_upsert_without_entity_fails() {
        let pending = PendingChanges::new("main");
        let result = pending.mark_changes_pending(ChangeRequest {
            action: ChangeAction::Upsert,
            entity: None,
            camera: None,
        });
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));

        let result = pending.mark_changes_pending(ChangeRequest {
            action: ChangeAction::Delete,
            entity: None,
            camera: None,
        });
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
        assert_eq!(pending.pending_count(), 0);
    }

    #[test]
    fn test_unknown_camera_fails() {
        let pending = PendingChanges::new("main");
        let result = pending.mark_changes_pending(
            ChangeRequest::upsert(Entity::Track(track(1))).for_camera("ghost"),
        );
        assert!(matches!(result, Err(CoreError::UnknownCamera(_))));
    }

    // -------------------------------------------------------------------------
    // Cameras and Meta
    // -------------------------------------------------------------------------

    #[test]
    fn test_add_and_remove_camera() {
        let pending = PendingChanges::new("main");
        pending.add_camera("left").unwrap();
        assert_eq!(pending.camera_names(), vec!["left", "main"]);

        assert!(pending.add_camera("left").is_err());
        pending.remove_camera("left").unwrap();
        assert_eq!(pending.camera_names(), vec!["main"]);

        assert!(matches!(
            pending.remove_camera("left"),
            Err(CoreError::UnknownCamera(_))
        ));
        assert!(pending.remove_camera("main").is_err());
    }

    #[test]
    fn test_meta_broadcasts_to_all_cameras() {
        let pending = PendingChanges::new("main");
        pending.add_camera("left").unwrap();

        pending.mark_changes_pending(ChangeRequest::meta()).unwrap();

        assert_eq!(pending.summary("main").unwrap().meta_changes, 1);
        assert_eq!(pending.summary("left").unwrap().meta_changes, 1);
        assert_eq!(pending.pending_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Counters and Discard
    // -------------------------------------------------------------------------

    #[test]
    fn test_pending_count_increments_even_when_coalesced() {
        let pending = PendingChanges::new("main");
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(1))))
            .unwrap();
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(1))))
            .unwrap();

        // One staged entry, two observed mutations
        assert_eq!(pending.summary("main").unwrap().track_upserts, vec![1]);
        assert_eq!(pending.pending_count(), 2);
    }

    #[test]
    fn test_watch_pending_observes_counter() {
        let pending = PendingChanges::new("main");
        let rx = pending.watch_pending();
        assert_eq!(*rx.borrow(), 0);

        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(1))))
            .unwrap();
        assert_eq!(*rx.borrow(), 1);

        pending.discard_changes();
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn test_discard_changes() {
        let pending = PendingChanges::new("main");
        pending
            .mark_changes_pending(ChangeRequest::upsert(Entity::Track(track(1))))
            .unwrap();
        pending.mark_changes_pending(ChangeRequest::meta()).unwrap();

        pending.discard_changes();

        let summary = pending.summary("main").unwrap();
        assert_eq!(summary, PendingSummary::default());
        assert_eq!(pending.pending_count(), 0);
    }

    // -------------------------------------------------------------------------
    // Filter Identity
    // -------------------------------------------------------------------------

    #[test]
    fn test_filters_with_same_derived_key_coalesce() {
        let pending = PendingChanges::new("main");
        let filter = |threshold: f64| {
            Entity::Filter(AttributeFilter {
                belongs: AttributeScope::Track,
                datatype: AttributeDatatype::Number,
                applied_to: vec!["speed".to_string()],
                op: FilterOp::GreaterThan,
                val: ClauseValue::Single(threshold.into()),
            })
        };

        pending
            .mark_changes_pending(ChangeRequest::upsert(filter(1.0)))
            .unwrap();
        pending
            .mark_changes_pending(ChangeRequest::upsert(filter(2.0)))
            .unwrap();

        let summary = pending.summary("main").unwrap();
        assert_eq!(summary.filter_upserts, vec!["track_number_speed"]);
    }
}
