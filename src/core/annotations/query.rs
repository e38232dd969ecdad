//! Predicate Query Engine
//!
//! Locates the Nth annotation satisfying a structured multi-clause
//! predicate, used for "select next track matching criteria" style
//! navigation driven by keyboard shortcuts and automation.

use serde::{Deserialize, Serialize};

use crate::core::{AnnotationId, FrameNumber};

use super::filters::{evaluate_all, AttributeClause};
use super::models::{Feature, Track};
use super::store::AnnotationStore;

// =============================================================================
// Query Model
// =============================================================================

/// Temporal scan direction relative to the query frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Next,
    Previous,
}

/// Structured selection criteria; all present fields are AND-combined
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationQuery {
    /// Only consider annotations with `id >= min_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_id: Option<AnnotationId>,
    /// Frame threshold for temporal position and detection scans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameNumber>,
    #[serde(default)]
    pub direction: Direction,
    /// Type-label inclusion set; a track matches when any confidence pair
    /// label is in the set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// Clauses tested against track-level attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_attrs: Vec<AttributeClause>,
    /// Clauses tested against per-frame feature attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detection_attrs: Vec<AttributeClause>,
    /// Index selector: 0 = first match, -1 = last match (from the end)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<i64>,
}

/// Query result; `-1` sentinels mean "no result"
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatch {
    pub id: AnnotationId,
    pub frame: FrameNumber,
}

impl QueryMatch {
    /// Sentinel pair returned by an exhausted search
    pub const NONE: QueryMatch = QueryMatch { id: -1, frame: -1 };

    pub fn is_none(&self) -> bool {
        self.id == -1
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Finds the Nth track satisfying the query.
///
/// Iterates the store in map insertion order (not sorted order) and
/// short-circuits once enough matches are collected: `nth + 1` for
/// `nth >= 0`, one match when `nth` is absent. Negative `nth` indexes the
/// full match list from the end and therefore scans it all.
pub fn find_annotation(store: &AnnotationStore<Track>, query: &AnnotationQuery) -> QueryMatch {
    let nth = query.nth.unwrap_or(0);
    let needed = if nth >= 0 { Some(nth as usize + 1) } else { None };

    let mut matches: Vec<QueryMatch> = Vec::new();
    for track in store.iter() {
        let Some(found) = evaluate_track(track, query) else {
            continue;
        };
        matches.push(found);
        if needed.is_some_and(|n| matches.len() >= n) {
            break;
        }
    }

    let index = if nth >= 0 {
        nth as usize
    } else {
        let back = nth.unsigned_abs() as usize;
        if back > matches.len() {
            return QueryMatch::NONE;
        }
        matches.len() - back
    };
    matches.get(index).copied().unwrap_or(QueryMatch::NONE)
}

/// Evaluates every clause against one track, returning the matched frame
/// (or `-1` when no detection clause constrained it)
fn evaluate_track(track: &Track, query: &AnnotationQuery) -> Option<QueryMatch> {
    if query.min_id.is_some_and(|min| track.id < min) {
        return None;
    }
    if !type_matches(track, query) {
        return None;
    }
    if !evaluate_all(&query.track_attrs, &track.attributes) {
        return None;
    }

    if query.detection_attrs.is_empty() {
        // Track-level temporal position only
        if let Some(frame) = query.frame {
            let in_position = match query.direction {
                Direction::Next => track.begin >= frame,
                Direction::Previous => track.end <= frame,
            };
            if !in_position {
                return None;
            }
        }
        return Some(QueryMatch {
            id: track.id,
            frame: -1,
        });
    }

    // Detection-level clauses: scan features from the threshold frame in
    // the requested direction
    let frame = scan_features(track, &query.detection_attrs, query.frame, query.direction)?;
    Some(QueryMatch {
        id: track.id,
        frame,
    })
}

fn type_matches(track: &Track, query: &AnnotationQuery) -> bool {
    match (&query.types, query.min_confidence) {
        (Some(types), min) => track.confidence_pairs.iter().any(|pair| {
            types.iter().any(|t| t == pair.label()) && min.is_none_or(|m| pair.confidence() >= m)
        }),
        (None, Some(min)) => track
            .primary_pair()
            .is_some_and(|pair| pair.confidence() >= min),
        (None, None) => true,
    }
}

/// Returns the frame of the first qualifying feature in scan order
fn scan_features(
    track: &Track,
    clauses: &[AttributeClause],
    frame: Option<FrameNumber>,
    direction: Direction,
) -> Option<FrameNumber> {
    match direction {
        Direction::Next => {
            let start = frame.unwrap_or(FrameNumber::MIN);
            track
                .features
                .iter()
                .filter(|f| f.frame >= start)
                .find(|f| feature_matches(f, clauses))
                .map(|f| f.frame)
        }
        Direction::Previous => {
            let end = frame.unwrap_or(FrameNumber::MAX);
            track
                .features
                .iter()
                .rev()
                .filter(|f| f.frame <= end)
                .find(|f| feature_matches(f, clauses))
                .map(|f| f.frame)
        }
    }
}

fn feature_matches(feature: &Feature, clauses: &[AttributeClause]) -> bool {
    match &feature.attributes {
        Some(bag) => evaluate_all(clauses, bag),
        None => clauses.is_empty(),
    }
}

// =============================================================================
// Tests
// =============================================================================
