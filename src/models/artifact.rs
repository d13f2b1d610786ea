//! Converted outputs produced by a finished batch.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// One converted output image plus its metadata.
#[derive(Debug, Clone)]
pub struct ConvertedArtifact {
    /// Output filename inside the batch directory, already disambiguated.
    pub name: String,
    /// Absolute (or root-relative) storage path of the written file.
    pub path: PathBuf,
    /// Encoded size in bytes.
    pub size: u64,
    /// Public retrieval URL for the `/downloads/...` route.
    pub url: String,
}

/// One `/convert` call's full set of outputs, stored together under one id.
///
/// The batch directory under the upload root *is* the on-disk representation
/// of the batch; the registry entry mirrors it in memory.
#[derive(Debug, Clone)]
pub struct ConversionBatch {
    pub id: String,
    /// Artifacts in input order, regardless of transform completion order.
    pub artifacts: Vec<ConvertedArtifact>,
    pub created_at: DateTime<Utc>,
}
