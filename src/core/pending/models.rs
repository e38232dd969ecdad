//! Pending Change Models
//!
//! Defines the configuration entities tracked alongside annotations and
//! the batched wire payloads sent to the persistence layer. Payload field
//! names (`upsert`, `delete`, `tracks`, `groups`, …) are preserved exactly
//! for compatibility with the external persistence layer.

use serde::{Deserialize, Serialize};

use crate::core::annotations::{ClauseValue, FilterOp, Group, Track};
use crate::core::AnnotationId;

// =============================================================================
// Attribute Definitions
// =============================================================================

/// Which level of an annotation an attribute applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeScope {
    Track,
    Detection,
}

impl AttributeScope {
    fn as_str(&self) -> &'static str {
        match self {
            AttributeScope::Track => "track",
            AttributeScope::Detection => "detection",
        }
    }
}

/// Declared value type of an attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeDatatype {
    Text,
    Number,
    Boolean,
}

impl AttributeDatatype {
    fn as_str(&self) -> &'static str {
        match self {
            AttributeDatatype::Text => "text",
            AttributeDatatype::Number => "number",
            AttributeDatatype::Boolean => "boolean",
        }
    }
}

/// Attribute schema definition, keyed by `key`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub key: String,
    pub name: String,
    pub belongs: AttributeScope,
    pub datatype: AttributeDatatype,
    /// Predefined values offered by editing UIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

// =============================================================================
// Graph Configurations
// =============================================================================

/// Timeline graph configuration, keyed by `name`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineConfig {
    pub name: String,
    /// Attribute keys plotted on this graph
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<[f64; 2]>,
}

/// Swimlane graph configuration, keyed by `name`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwimlaneConfig {
    pub name: String,
    /// Attribute keys rendered as swimlanes
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// =============================================================================
// Attribute Filters
// =============================================================================

/// Saved attribute filter applied by external filtering UIs.
///
/// A filter has no natural single-field id; its identity is the derived
/// key of scope, datatype, and the sorted fields it applies to. Two
/// filters resolving to the same key are the same entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeFilter {
    pub belongs: AttributeScope,
    pub datatype: AttributeDatatype,
    /// Attribute keys the filter applies to
    pub applied_to: Vec<String>,
    pub op: FilterOp,
    pub val: ClauseValue,
}

impl AttributeFilter {
    /// Derives the identity key: `belongs_datatype_sortedAppliedFields`
    pub fn derived_key(&self) -> String {
        let mut fields = self.applied_to.clone();
        fields.sort();
        format!(
            "{}_{}_{}",
            self.belongs.as_str(),
            self.datatype.as_str(),
            fields.join("-")
        )
    }
}

// =============================================================================
// Wire Payloads
// =============================================================================

/// Batched upsert list + delete-id list for one entity kind
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangePayload<V, K> {
    pub upsert: Vec<V>,
    pub delete: Vec<K>,
}

impl<V, K> Default for ChangePayload<V, K> {
    fn default() -> Self {
        Self {
            upsert: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<V, K> ChangePayload<V, K> {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.delete.is_empty()
    }
}

/// Per-namespace batched save of track and group changes
#[derive(Clone, Debug, Serialize)]
pub struct DetectionsPayload {
    pub tracks: ChangePayload<Track, AnnotationId>,
    pub groups: ChangePayload<Group, AnnotationId>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_derived_key_sorts_fields() {
        let filter = AttributeFilter {
            belongs: AttributeScope::Track,
            datatype: AttributeDatatype::Number,
            applied_to: vec!["speed".to_string(), "length".to_string()],
            op: FilterOp::GreaterThan,
            val: ClauseValue::Single(1.0.into()),
        };
        assert_eq!(filter.derived_key(), "track_number_length-speed");

        // Field order does not change identity
        let reordered = AttributeFilter {
            applied_to: vec!["length".to_string(), "speed".to_string()],
            ..filter.clone()
        };
        assert_eq!(filter.derived_key(), reordered.derived_key());
    }

    #[test]
    fn test_change_payload_wire_field_names() {
        let payload: ChangePayload<Attribute, String> = ChangePayload {
            upsert: vec![],
            delete: vec!["k".to_string()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("upsert").is_some());
        assert_eq!(json["delete"][0], "k");
    }

    #[test]
    fn test_detections_payload_wire_shape() {
        let payload = DetectionsPayload {
            tracks: ChangePayload {
                upsert: vec![],
                delete: vec![4],
            },
            groups: ChangePayload::default(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["tracks"]["delete"][0], 4);
        assert!(json["groups"]["upsert"].as_array().unwrap().is_empty());
    }
}
