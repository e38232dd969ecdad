//! Flush Engine
//!
//! Sends accumulated pending changes to the injected persistence backend
//! as batched calls, all issued concurrently and awaited together. Change
//! sets are snapshotted under the lock before any call is issued; after a
//! fully successful flush only the snapshotted subset is cleared, so
//! mutations recorded while the flush was in flight stay pending.

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use tracing::{debug, warn};

use crate::core::annotations::{Group, Track};
use crate::core::{AnnotationId, CoreError, CoreResult};

use super::models::{
    Attribute, AttributeFilter, ChangePayload, DetectionsPayload, SwimlaneConfig, TimelineConfig,
};
use super::tracker::PendingChanges;

// =============================================================================
// Persistence Backend
// =============================================================================

/// Injected persistence collaborator.
///
/// The engine never retries; a rejected call fails the whole `save` and
/// retry is the caller's responsibility.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn save_detections(
        &self,
        namespace_id: &str,
        payload: DetectionsPayload,
    ) -> CoreResult<()>;

    async fn save_metadata(&self, namespace_id: &str, metadata: serde_json::Value)
        -> CoreResult<()>;

    async fn save_attributes(
        &self,
        config_id: &str,
        payload: ChangePayload<Attribute, String>,
    ) -> CoreResult<()>;

    async fn save_timelines(
        &self,
        config_id: &str,
        payload: ChangePayload<TimelineConfig, String>,
    ) -> CoreResult<()>;

    async fn save_swimlanes(
        &self,
        config_id: &str,
        payload: ChangePayload<SwimlaneConfig, String>,
    ) -> CoreResult<()>;

    async fn save_filters(
        &self,
        config_id: &str,
        payload: ChangePayload<AttributeFilter, String>,
    ) -> CoreResult<()>;
}

// =============================================================================
// Flush Plan
// =============================================================================

/// Snapshot of one camera's track/group changes
struct DetectionsFlush {
    camera: String,
    namespace: String,
    tracks: Vec<(AnnotationId, Track)>,
    track_deletes: Vec<AnnotationId>,
    groups: Vec<(AnnotationId, Group)>,
    group_deletes: Vec<AnnotationId>,
}

/// Snapshot of one camera's changes for one config kind
struct ConfigFlush<V> {
    camera: String,
    upserts: Vec<(String, V)>,
    deletes: Vec<String>,
}

#[derive(Default)]
struct FlushPlan {
    detections: Vec<DetectionsFlush>,
    /// `(camera, namespace)` pairs whose metadata counter is flushed
    metadata: Vec<(String, String)>,
    /// One consolidated dataset-level metadata save is owed
    global_metadata: bool,
    attributes: Vec<ConfigFlush<Attribute>>,
    timelines: Vec<ConfigFlush<TimelineConfig>>,
    swimlanes: Vec<ConfigFlush<SwimlaneConfig>>,
    filters: Vec<ConfigFlush<AttributeFilter>>,
}

impl FlushPlan {
    fn is_empty(&self) -> bool {
        self.detections.is_empty()
            && self.metadata.is_empty()
            && !self.global_metadata
            && self.attributes.is_empty()
            && self.timelines.is_empty()
            && self.swimlanes.is_empty()
            && self.filters.is_empty()
    }
}

fn namespace_id(dataset_id: &str, camera: &str, primary: &str) -> String {
    if camera == primary {
        dataset_id.to_string()
    } else {
        format!("{dataset_id}/{camera}")
    }
}

// =============================================================================
// Save
// =============================================================================

impl PendingChanges {
    /// Flushes every pending change set through the backend.
    ///
    /// Fails with `ReadOnlyViolation` before any call is issued when the
    /// engine is read-only. All batched calls run concurrently and are
    /// awaited together; a single failure fails the whole save and nothing
    /// is cleared. On success only the flushed snapshot is cleared and the
    /// pending counter resets to 0.
    pub async fn save(
        &self,
        backend: &dyn PersistenceBackend,
        dataset_id: &str,
        config_id: &str,
        metadata: Option<&serde_json::Value>,
    ) -> CoreResult<()> {
        let plan = self.build_plan(dataset_id, metadata.is_some())?;
        if plan.is_empty() {
            self.state.lock().unwrap().pending = 0;
            self.pending_tx.send_replace(0);
            return Ok(());
        }

        let mut calls: Vec<BoxFuture<'_, CoreResult<()>>> = Vec::new();

        for flush in &plan.detections {
            let namespace = flush.namespace.clone();
            let payload = DetectionsPayload {
                tracks: ChangePayload {
                    upsert: flush.tracks.iter().map(|(_, t)| t.clone()).collect(),
                    delete: flush.track_deletes.clone(),
                },
                groups: ChangePayload {
                    upsert: flush.groups.iter().map(|(_, g)| g.clone()).collect(),
                    delete: flush.group_deletes.clone(),
                },
            };
            calls.push(Box::pin(async move {
                backend.save_detections(&namespace, payload).await
            }));
        }

        if let Some(metadata) = metadata {
            for (_, namespace) in &plan.metadata {
                let namespace = namespace.clone();
                let metadata = metadata.clone();
                calls.push(Box::pin(async move {
                    backend.save_metadata(&namespace, metadata).await
                }));
            }
            if plan.global_metadata {
                let namespace = dataset_id.to_string();
                let metadata = metadata.clone();
                calls.push(Box::pin(async move {
                    backend.save_metadata(&namespace, metadata).await
                }));
            }
        }

        for flush in &plan.attributes {
            let payload = config_payload(flush);
            let config_id = config_id.to_string();
            calls.push(Box::pin(async move {
                backend.save_attributes(&config_id, payload).await
            }));
        }
        for flush in &plan.timelines {
            let payload = config_payload(flush);
            let config_id = config_id.to_string();
            calls.push(Box::pin(async move {
                backend.save_timelines(&config_id, payload).await
            }));
        }
        for flush in &plan.swimlanes {
            let payload = config_payload(flush);
            let config_id = config_id.to_string();
            calls.push(Box::pin(async move {
                backend.save_swimlanes(&config_id, payload).await
            }));
        }
        for flush in &plan.filters {
            let payload = config_payload(flush);
            let config_id = config_id.to_string();
            calls.push(Box::pin(async move {
                backend.save_filters(&config_id, payload).await
            }));
        }

        debug!(dataset = dataset_id, calls = calls.len(), "flushing pending changes");

        if let Err(error) = try_join_all(calls).await {
            warn!(dataset = dataset_id, "flush failed: {error}");
            return Err(error);
        }

        self.clear_flushed(plan);
        Ok(())
    }

    /// Snapshots every non-empty change set under the lock
    fn build_plan(&self, dataset_id: &str, metadata_supplied: bool) -> CoreResult<FlushPlan> {
        let state = self.state.lock().unwrap();
        if state.read_only {
            return Err(CoreError::ReadOnlyViolation);
        }

        let mut plan = FlushPlan::default();
        let mut camera_names: Vec<&String> = state.cameras.keys().collect();
        camera_names.sort();

        for name in camera_names {
            let camera = &state.cameras[name];
            let namespace = namespace_id(dataset_id, name, &state.primary);

            if !camera.tracks.is_empty() || !camera.groups.is_empty() {
                let (tracks, track_deletes) = camera.tracks.snapshot();
                let (groups, group_deletes) = camera.groups.snapshot();
                plan.detections.push(DetectionsFlush {
                    camera: name.clone(),
                    namespace: namespace.clone(),
                    tracks,
                    track_deletes,
                    groups,
                    group_deletes,
                });
            }

            if camera.meta_changes > 0 && metadata_supplied {
                if *name != state.primary {
                    plan.global_metadata = true;
                }
                plan.metadata.push((name.clone(), namespace));
            }

            if !camera.attributes.is_empty() {
                let (upserts, deletes) = camera.attributes.snapshot();
                plan.attributes.push(ConfigFlush {
                    camera: name.clone(),
                    upserts,
                    deletes,
                });
            }
            if !camera.timelines.is_empty() {
                let (upserts, deletes) = camera.timelines.snapshot();
                plan.timelines.push(ConfigFlush {
                    camera: name.clone(),
                    upserts,
                    deletes,
                });
            }
            if !camera.swimlanes.is_empty() {
                let (upserts, deletes) = camera.swimlanes.snapshot();
                plan.swimlanes.push(ConfigFlush {
                    camera: name.clone(),
                    upserts,
                    deletes,
                });
            }
            if !camera.filters.is_empty() {
                let (upserts, deletes) = camera.filters.snapshot();
                plan.filters.push(ConfigFlush {
                    camera: name.clone(),
                    upserts,
                    deletes,
                });
            }
        }

        Ok(plan)
    }

    /// Clears only the flushed snapshot and resets the pending counter
    fn clear_flushed(&self, plan: FlushPlan) {
        let mut state = self.state.lock().unwrap();

        for flush in plan.detections {
            if let Some(camera) = state.cameras.get_mut(&flush.camera) {
                camera.tracks.clear_flushed(&flush.tracks, &flush.track_deletes);
                camera.groups.clear_flushed(&flush.groups, &flush.group_deletes);
            }
        }
        for (camera_name, _) in plan.metadata {
            if let Some(camera) = state.cameras.get_mut(&camera_name) {
                camera.meta_changes = 0;
            }
        }
        for flush in plan.attributes {
            if let Some(camera) = state.cameras.get_mut(&flush.camera) {
                camera.attributes.clear_flushed(&flush.upserts, &flush.deletes);
            }
        }
        for flush in plan.timelines {
            if let Some(camera) = state.cameras.get_mut(&flush.camera) {
                camera.timelines.clear_flushed(&flush.upserts, &flush.deletes);
            }
        }
        for flush in plan.swimlanes {
            if let Some(camera) = state.cameras.get_mut(&flush.camera) {
                camera.swimlanes.clear_flushed(&flush.upserts, &flush.deletes);
            }
        }
        for flush in plan.filters {
            if let Some(camera) = state.cameras.get_mut(&flush.camera) {
                camera.filters.clear_flushed(&flush.upserts, &flush.deletes);
            }
        }

        state.pending = 0;
        self.pending_tx.send_replace(0);
    }
}

fn config_payload<V: Clone>(flush: &ConfigFlush<V>) -> ChangePayload<V, String> {
    ChangePayload {
        upsert: flush.upserts.iter().map(|(_, v)| v.clone()).collect(),
        delete: flush.deletes.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================
