//! Dirty-Tracking / Flush Engine
//!
//! Aggregates pending upserts and deletes per entity kind, namespaced per
//! camera, and flushes them as batched concurrent calls to an injected
//! persistence backend. Between flush cycles the engine guarantees
//! at-most-one outstanding representation of each entity's latest state:
//! a delete supersedes a pending upsert for the same id and vice versa.

pub mod flush;
pub mod models;
pub mod tracker;

pub use flush::PersistenceBackend;
pub use models::{
    Attribute, AttributeDatatype, AttributeFilter, AttributeScope, ChangePayload,
    DetectionsPayload, SwimlaneConfig, TimelineConfig,
};
pub use tracker::{ChangeRequest, Entity, PendingChanges, PendingSummary};
