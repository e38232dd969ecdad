//! Sightline Core Library
//!
//! In-memory temporal annotation engine for multi-camera media timelines.
//! Maintains the authoritative collection of tracks and groups, keeps an
//! interval index in lockstep with every annotation's `[begin, end]` range,
//! answers structured predicate queries used for keyboard- and
//! automation-driven navigation, and synchronizes local mutations to a
//! remote persistence layer via batched, deduplicated writes.
//!
//! Rendering, persistence endpoints, and media decoding are external
//! collaborators; the engine only calls the injected
//! [`core::pending::PersistenceBackend`] and awaits its outcome.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
