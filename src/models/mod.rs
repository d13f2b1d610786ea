//! Core data models for the batch image conversion service.
//!
//! These entities describe one conversion request end to end: the uploaded
//! inputs, the shared transform parameters, and the artifacts a finished
//! batch produces. They serialize naturally as JSON via `serde` where the
//! HTTP surface needs them.

pub mod artifact;
pub mod transform;
pub mod upload;
