//! Annotation Data Models
//!
//! Defines the track and group entities, their per-frame features, and the
//! wire representations sent to the persistence layer. Field names on the
//! wire (`confidencePairs`, `userAttributes`, …) are preserved exactly for
//! compatibility with the external persistence layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{AnnotationId, AttrValue, Bounds, FrameNumber};

// =============================================================================
// Confidence Pairs
// =============================================================================

/// One (type-label, confidence-score) pair.
///
/// Serializes as a two-element array `["label", score]`. Pair order is
/// significant: index 0 of an annotation's pair list is its primary type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePair(pub String, pub f64);

impl ConfidencePair {
    pub fn new(label: &str, confidence: f64) -> Self {
        Self(label.to_string(), confidence)
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn confidence(&self) -> f64 {
        self.1
    }
}

// =============================================================================
// Feature
// =============================================================================

/// Per-frame geometric/attribute record belonging to a track.
///
/// Only keyframes are stored; intermediate frames are derived by external
/// interpolation logic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Frame number this feature is keyed on
    pub frame: FrameNumber,
    /// Geometry bounds `[x1, y1, x2, y2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    /// Whether interpolation runs through this keyframe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframe: Option<bool>,
    /// Per-frame attribute overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, AttrValue>>,
}

impl Feature {
    /// Creates a keyframe feature at the given frame
    pub fn new(frame: FrameNumber) -> Self {
        Self {
            frame,
            bounds: None,
            interpolate: None,
            keyframe: Some(true),
            attributes: None,
        }
    }

    /// Sets the geometry bounds
    pub fn with_bounds(mut self, bounds: [f64; 4]) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Sets one per-frame attribute
    pub fn with_attribute(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into());
        self
    }
}

// =============================================================================
// Track
// =============================================================================

/// Annotation with an ordered sparse sequence of per-frame features
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: AnnotationId,
    pub begin: FrameNumber,
    pub end: FrameNumber,
    #[serde(default)]
    pub confidence_pairs: Vec<ConfidencePair>,
    #[serde(default)]
    pub attributes: HashMap<String, AttrValue>,
    /// Per-user attribute overrides, keyed by user then attribute
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_attributes: HashMap<String, HashMap<String, AttrValue>>,
    /// Keyframe features, kept sorted by frame
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Track {
    /// Creates an empty track spanning the given bounds
    pub fn new(id: AnnotationId, bounds: Bounds) -> Self {
        Self {
            id,
            begin: bounds.begin,
            end: bounds.end,
            confidence_pairs: Vec::new(),
            attributes: HashMap::new(),
            user_attributes: HashMap::new(),
            features: Vec::new(),
        }
    }

    /// Sets the confidence pairs
    pub fn with_confidence_pairs(mut self, pairs: Vec<ConfidencePair>) -> Self {
        self.confidence_pairs = pairs;
        self
    }

    /// Sets one track-level attribute
    pub fn with_attribute(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Returns the primary (index 0) confidence pair
    pub fn primary_pair(&self) -> Option<&ConfidencePair> {
        self.confidence_pairs.first()
    }

    /// Inserts or replaces the keyframe feature at its frame, widening the
    /// track bounds to include it.
    pub fn set_feature(&mut self, feature: Feature) {
        let frame = feature.frame;
        match self.features.binary_search_by_key(&frame, |f| f.frame) {
            Ok(pos) => self.features[pos] = feature,
            Err(pos) => self.features.insert(pos, feature),
        }
        let mut bounds = Bounds::new(self.begin, self.end);
        bounds.extend_to(frame);
        self.begin = bounds.begin;
        self.end = bounds.end;
    }

    /// Removes the keyframe feature at the given frame, if present
    pub fn remove_feature(&mut self, frame: FrameNumber) -> Option<Feature> {
        match self.features.binary_search_by_key(&frame, |f| f.frame) {
            Ok(pos) => Some(self.features.remove(pos)),
            Err(_) => None,
        }
    }

    /// Returns the feature exactly at the given frame
    pub fn feature_at(&self, frame: FrameNumber) -> Option<&Feature> {
        self.features
            .binary_search_by_key(&frame, |f| f.frame)
            .ok()
            .map(|pos| &self.features[pos])
    }

    /// Returns the nearest feature at or before the given frame
    pub fn feature_at_or_before(&self, frame: FrameNumber) -> Option<&Feature> {
        match self.features.binary_search_by_key(&frame, |f| f.frame) {
            Ok(pos) => Some(&self.features[pos]),
            Err(0) => None,
            Err(pos) => Some(&self.features[pos - 1]),
        }
    }

    /// Returns a track-level attribute, preferring the user's override when
    /// a user scope is requested and an override exists.
    pub fn attribute(&self, key: &str, user: Option<&str>) -> Option<&AttrValue> {
        if let Some(user) = user {
            if let Some(value) = self.user_attributes.get(user).and_then(|m| m.get(key)) {
                return Some(value);
            }
        }
        self.attributes.get(key)
    }

    /// Sets a user-scoped attribute override
    pub fn set_user_attribute(&mut self, user: &str, key: &str, value: impl Into<AttrValue>) {
        self.user_attributes
            .entry(user.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }
}

// =============================================================================
// Group
// =============================================================================

/// One member of a group, with its own confidence pairs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: AnnotationId,
    #[serde(default)]
    pub confidence_pairs: Vec<ConfidencePair>,
}

/// Annotation grouping member annotations under a spanning interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: AnnotationId,
    pub begin: FrameNumber,
    pub end: FrameNumber,
    #[serde(default)]
    pub confidence_pairs: Vec<ConfidencePair>,
    #[serde(default)]
    pub attributes: HashMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_attributes: HashMap<String, HashMap<String, AttrValue>>,
    pub members: Vec<GroupMember>,
}

impl Group {
    /// Creates an empty group spanning the given bounds
    pub fn new(id: AnnotationId, bounds: Bounds) -> Self {
        Self {
            id,
            begin: bounds.begin,
            end: bounds.end,
            confidence_pairs: Vec::new(),
            attributes: HashMap::new(),
            user_attributes: HashMap::new(),
            members: Vec::new(),
        }
    }

    /// Adds a member, replacing an existing entry with the same id
    pub fn add_member(&mut self, member: GroupMember) {
        self.members.retain(|m| m.id != member.id);
        self.members.push(member);
    }

    /// Removes the member with the given id
    pub fn remove_member(&mut self, id: AnnotationId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        self.members.len() != before
    }

    /// Recomputes `[begin, end]` as the span of the members' bounds.
    ///
    /// Members the lookup cannot resolve are skipped; the bounds are left
    /// unchanged when no member resolves.
    pub fn recompute_bounds<F>(&mut self, bounds_of: F)
    where
        F: Fn(AnnotationId) -> Option<Bounds>,
    {
        let mut span: Option<Bounds> = None;
        for member in &self.members {
            if let Some(b) = bounds_of(member.id) {
                span = Some(match span {
                    Some(s) => Bounds::new(s.begin.min(b.begin), s.end.max(b.end)),
                    None => b,
                });
            }
        }
        if let Some(s) = span {
            self.begin = s.begin;
            self.end = s.end;
        }
    }
}

// =============================================================================
// Annotation Trait
// =============================================================================

/// Serialized annotation payload routed to the dirty tracker.
///
/// Tagged dispatch over the two entity kinds; the original duck-typed
/// track-or-group union is expressed as this sum type.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationData {
    Track(Track),
    Group(Group),
}

impl AnnotationData {
    pub fn id(&self) -> AnnotationId {
        match self {
            AnnotationData::Track(t) => t.id,
            AnnotationData::Group(g) => g.id,
        }
    }
}

/// Capability set shared by tracks and groups.
///
/// The stores are generic over this trait; everything they need from an
/// annotation is its identity, its interval, and its dirty-tracker payload.
pub trait Annotation: Clone {
    fn id(&self) -> AnnotationId;
    fn bounds(&self) -> Bounds;
    fn set_bounds(&mut self, bounds: Bounds);
    fn confidence_pairs(&self) -> &[ConfidencePair];
    fn attributes(&self) -> &HashMap<String, AttrValue>;
    fn to_data(&self) -> AnnotationData;
}

impl Annotation for Track {
    fn id(&self) -> AnnotationId {
        self.id
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(self.begin, self.end)
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.begin = bounds.begin;
        self.end = bounds.end;
    }

    fn confidence_pairs(&self) -> &[ConfidencePair] {
        &self.confidence_pairs
    }

    fn attributes(&self) -> &HashMap<String, AttrValue> {
        &self.attributes
    }

    fn to_data(&self) -> AnnotationData {
        AnnotationData::Track(self.clone())
    }
}

impl Annotation for Group {
    fn id(&self) -> AnnotationId {
        self.id
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(self.begin, self.end)
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.begin = bounds.begin;
        self.end = bounds.end;
    }

    fn confidence_pairs(&self) -> &[ConfidencePair] {
        &self.confidence_pairs
    }

    fn attributes(&self) -> &HashMap<String, AttrValue> {
        &self.attributes
    }

    fn to_data(&self) -> AnnotationData {
        AnnotationData::Group(self.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
