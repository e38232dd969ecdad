//! Annotation System
//!
//! Authoritative in-memory storage and querying for temporal annotations.
//!
//! One [`store::AnnotationStore`] instance exists per camera namespace and
//! entity kind (tracks or groups). Stores keep the interval index in
//! lockstep with every annotation's `[begin, end]` range and expose a
//! reactive revision counter that derived views observe.

pub mod filters;
pub mod models;
pub mod query;
pub mod store;

pub use filters::{evaluate_all, evaluate_all_scoped, AttributeClause, ClauseValue, FilterOp};
pub use models::{
    Annotation, AnnotationData, ConfidencePair, Feature, Group, GroupMember, Track,
};
pub use query::{find_annotation, AnnotationQuery, Direction, QueryMatch};
pub use store::{AnnotationStore, ChangeSink, InsertOptions, RemoveOptions, SortedView};
