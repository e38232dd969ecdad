//! Sightline Error Definitions
//!
//! Defines error types used throughout the engine.

use thiserror::Error;

use super::AnnotationId;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Annotation not found: {0}")]
    NotFound(AnnotationId),

    #[error("Duplicate annotation id: {0}")]
    DuplicateId(AnnotationId),

    #[error("Interval index out of sync for annotation: {0}")]
    IndexDesync(AnnotationId),

    // =========================================================================
    // Dirty-Tracking Errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("Mutation attempted while store is read-only")]
    ReadOnlyViolation,

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    #[error("Save failed: {0}")]
    SaveFailed(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;
