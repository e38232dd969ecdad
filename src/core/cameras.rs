//! Camera Store
//!
//! Aggregates one track store and one group store per camera namespace in
//! a multi-camera dataset and wires every store to the shared dirty
//! tracker. Stores never share their maps or interval indexes; the only
//! cross-namespace state is the tracker itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::annotations::{AnnotationStore, Group, Track};
use crate::core::pending::PendingChanges;
use crate::core::{AnnotationId, CoreError, CoreResult};

// =============================================================================
// Camera Annotations
// =============================================================================

/// One camera namespace's annotation stores
pub struct CameraAnnotations {
    pub tracks: AnnotationStore<Track>,
    pub groups: AnnotationStore<Group>,
}

impl CameraAnnotations {
    fn new(camera: &str, sink: Arc<PendingChanges>) -> Self {
        Self {
            tracks: AnnotationStore::with_sink(camera, sink.clone()),
            groups: AnnotationStore::with_sink(camera, sink),
        }
    }
}

// =============================================================================
// Camera Store
// =============================================================================

/// Multi-camera aggregator owning the per-namespace stores
pub struct CameraStore {
    cameras: HashMap<String, CameraAnnotations>,
    primary: String,
    pending: Arc<PendingChanges>,
}

impl CameraStore {
    /// Creates a store with one primary camera namespace
    pub fn new(primary_camera: &str) -> Self {
        let pending = Arc::new(PendingChanges::new(primary_camera));
        let mut cameras = HashMap::new();
        cameras.insert(
            primary_camera.to_string(),
            CameraAnnotations::new(primary_camera, pending.clone()),
        );
        Self {
            cameras,
            primary: primary_camera.to_string(),
            pending,
        }
    }

    /// Returns the shared dirty tracker
    pub fn pending(&self) -> &Arc<PendingChanges> {
        &self.pending
    }

    /// Returns the primary camera name
    pub fn primary_camera(&self) -> &str {
        &self.primary
    }

    /// Returns the camera names, primary first, the rest sorted
    pub fn camera_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .cameras
            .keys()
            .map(String::as_str)
            .filter(|n| *n != self.primary)
            .collect();
        names.sort_unstable();
        names.insert(0, &self.primary);
        names
    }

    /// Registers a new camera stream with empty stores and an empty
    /// change namespace
    pub fn add_camera(&mut self, name: &str) -> CoreResult<()> {
        if self.cameras.contains_key(name) {
            return Err(CoreError::InvalidArgument(format!(
                "camera already registered: {name}"
            )));
        }
        self.pending.add_camera(name)?;
        self.cameras
            .insert(name.to_string(), CameraAnnotations::new(name, self.pending.clone()));
        Ok(())
    }

    /// Drops a camera stream, its stores, and its staged changes
    pub fn remove_camera(&mut self, name: &str) -> CoreResult<()> {
        if name == self.primary {
            return Err(CoreError::InvalidArgument(format!(
                "cannot remove primary camera: {name}"
            )));
        }
        if self.cameras.remove(name).is_none() {
            return Err(CoreError::UnknownCamera(name.to_string()));
        }
        self.pending.remove_camera(name)
    }

    /// Gets one camera's stores
    pub fn camera(&self, name: &str) -> CoreResult<&CameraAnnotations> {
        self.cameras
            .get(name)
            .ok_or_else(|| CoreError::UnknownCamera(name.to_string()))
    }

    /// Gets one camera's stores for mutation
    pub fn camera_mut(&mut self, name: &str) -> CoreResult<&mut CameraAnnotations> {
        self.cameras
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownCamera(name.to_string()))
    }

    /// Gets the primary camera's stores.
    ///
    /// The primary namespace exists for the lifetime of the store.
    pub fn primary(&self) -> &CameraAnnotations {
        &self.cameras[&self.primary]
    }

    /// Finds a track by id across cameras, primary first
    pub fn any_track(&self, id: AnnotationId) -> Option<(&str, &Track)> {
        for name in self.camera_names() {
            if let Some(track) = self.cameras[name].tracks.get_if_present(id) {
                return Some((name, track));
            }
        }
        None
    }

    /// Returns the name of the camera holding the given track id
    pub fn camera_of(&self, id: AnnotationId) -> Option<&str> {
        self.any_track(id).map(|(name, _)| name)
    }

    /// Empties every camera's stores without recording changes
    pub fn clear_all(&mut self) {
        for camera in self.cameras.values_mut() {
            camera.tracks.clear_all();
            camera.groups.clear_all();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
