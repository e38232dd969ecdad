//! Sightline Core Type Definitions
//!
//! Defines fundamental types used throughout the engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Annotation unique identifier.
///
/// Non-negative for live annotations; `-1` is the query sentinel meaning
/// "no result".
pub type AnnotationId = i64;

/// Frame number on the media timeline (integer)
pub type FrameNumber = i64;

// =============================================================================
// Bounds
// =============================================================================

/// Temporal interval of an annotation, inclusive at both ends.
///
/// Invariant: `begin <= end`. The stores validate this on insert and on
/// every bounds mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub begin: FrameNumber,
    pub end: FrameNumber,
}

impl Bounds {
    pub fn new(begin: FrameNumber, end: FrameNumber) -> Self {
        Self { begin, end }
    }

    /// Checks if a frame lies within the interval
    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame >= self.begin && frame <= self.end
    }

    /// Checks if two intervals overlap (inclusive ends)
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.begin <= other.end && self.end >= other.begin
    }

    /// Extends the interval so it contains the given frame
    pub fn extend_to(&mut self, frame: FrameNumber) {
        if frame < self.begin {
            self.begin = frame;
        }
        if frame > self.end {
            self.end = frame;
        }
    }
}

// =============================================================================
// Attribute Values
// =============================================================================

/// Scalar attribute value attached to annotations and features.
///
/// Untagged on the wire: `true`, `3.5`, and `"left"` all round-trip to the
/// matching variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Returns the numeric value, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text value, if this is a string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Number(v as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

// =============================================================================
// Change Actions
// =============================================================================

/// Action recorded against the dirty tracker for one mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeAction {
    /// Insert-or-replace the entity's latest state
    Upsert,
    /// Stage the entity for deletion (supersedes a pending upsert)
    Delete,
    /// Dataset-level metadata edit, broadcast to every camera namespace
    Meta,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains() {
        let b = Bounds::new(10, 20);
        assert!(b.contains(10));
        assert!(b.contains(15));
        assert!(b.contains(20));
        assert!(!b.contains(9));
        assert!(!b.contains(21));
    }

    #[test]
    fn test_bounds_overlaps() {
        let b = Bounds::new(10, 20);
        assert!(b.overlaps(&Bounds::new(20, 30)));
        assert!(b.overlaps(&Bounds::new(0, 10)));
        assert!(b.overlaps(&Bounds::new(12, 18)));
        assert!(!b.overlaps(&Bounds::new(21, 30)));
        assert!(!b.overlaps(&Bounds::new(0, 9)));
    }

    #[test]
    fn test_bounds_extend_to() {
        let mut b = Bounds::new(10, 20);
        b.extend_to(5);
        assert_eq!(b, Bounds::new(5, 20));
        b.extend_to(25);
        assert_eq!(b, Bounds::new(5, 25));
        b.extend_to(15);
        assert_eq!(b, Bounds::new(5, 25));
    }

    #[test]
    fn test_attr_value_untagged_serde() {
        let v: AttrValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, AttrValue::Bool(true));

        let v: AttrValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(v, AttrValue::Number(3.5));

        let v: AttrValue = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(v, AttrValue::Text("left".to_string()));

        assert_eq!(
            serde_json::to_string(&AttrValue::Number(2.0)).unwrap(),
            "2.0"
        );
    }
}
