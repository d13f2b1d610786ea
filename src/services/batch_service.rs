//! src/services/batch_service.rs
//!
//! ConvertService — the batch conversion pipeline. Fans one request's images
//! out to concurrent transforms, joins the results in input order, and owns
//! the isolated per-batch directory under the upload root plus the registry
//! entry that mirrors it. All transforms for a batch must succeed before a
//! single byte reaches disk, so a failed batch leaves no orphan files.

use crate::models::artifact::{ConversionBatch, ConvertedArtifact};
use crate::models::transform::{CropRectangle, OutputFormat, TransformParams};
use crate::models::upload::UploadedImage;
use crate::services::registry::{ConversionRegistry, RegistryError};
use crate::services::transform_service::{transform_image, TransformError};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::{fs, task, time};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0}")]
    Validation(String),
    #[error("conversion `{0}` not found")]
    NotFound(String),
    #[error("requested file resolves outside the upload root: {0}")]
    PathEscape(String),
    #[error("{}", batch_failure_summary(.0))]
    Batch(Vec<ImageFailure>),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Why one image of a batch failed, tagged with its input position.
#[derive(Debug)]
pub struct ImageFailure {
    pub index: usize,
    pub name: String,
    pub error: ImageTaskError,
}

#[derive(Debug, Error)]
pub enum ImageTaskError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("transform timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("transform task failed: {0}")]
    Join(String),
}

fn batch_failure_summary(failures: &[ImageFailure]) -> String {
    let mut message = String::from("batch conversion failed");
    for failure in failures {
        let _ = write!(
            message,
            "; image {} ({}): {}",
            failure.index, failure.name, failure.error
        );
    }
    message
}

/// Shared state behind every request handler.
///
/// Cloning is cheap; the registry and the transform limiter are shared.
#[derive(Clone)]
pub struct ConvertService {
    registry: Arc<dyn ConversionRegistry>,
    /// Root directory holding one subdirectory per batch.
    pub upload_root: PathBuf,
    public_base_url: String,
    /// Bounds concurrent per-image transforms across all in-flight batches.
    transform_limiter: Arc<Semaphore>,
    transform_timeout: Duration,
}

impl ConvertService {
    pub fn new(
        registry: Arc<dyn ConversionRegistry>,
        upload_root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        max_concurrent_transforms: usize,
        transform_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            upload_root: upload_root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            transform_limiter: Arc::new(Semaphore::new(max_concurrent_transforms.max(1))),
            transform_timeout,
        }
    }

    /// Paths registered for a finished batch, or `NotFound`.
    pub fn registered_paths(&self, conversion_id: &str) -> ConvertResult<Vec<PathBuf>> {
        self.registry
            .get(conversion_id)
            .ok_or_else(|| ConvertError::NotFound(conversion_id.to_string()))
    }

    /// Convert a batch of uploaded images sharing one set of transform params.
    ///
    /// Every image is transformed concurrently (bounded by the limiter, each
    /// under a timeout) and results are joined in input order. If any image
    /// fails the whole batch fails with a per-image failure report and
    /// nothing is written to disk or the registry. On success the batch
    /// directory, its files, and the registry entry appear together.
    pub async fn convert_batch(
        &self,
        inputs: Vec<(UploadedImage, Option<CropRectangle>)>,
        params: TransformParams,
    ) -> ConvertResult<ConversionBatch> {
        let batch_id = Uuid::new_v4().to_string();
        let names = assign_output_names(&inputs, params.format);
        debug!(
            batch = %batch_id,
            images = inputs.len(),
            format = params.format.extension(),
            "starting batch conversion"
        );

        let mut handles = Vec::with_capacity(inputs.len());
        for (index, (image, crop)) in inputs.into_iter().enumerate() {
            debug!(
                index,
                file = %image.original_name,
                declared_type = ?image.content_type,
                bytes = image.data.len(),
                "queueing image transform"
            );
            let limiter = Arc::clone(&self.transform_limiter);
            let timeout_after = self.transform_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|err| ImageTaskError::Join(err.to_string()))?;
                let work = task::spawn_blocking(move || transform_image(&image.data, crop, &params));
                match time::timeout(timeout_after, work).await {
                    Err(_) => Err(ImageTaskError::TimedOut(timeout_after)),
                    Ok(Err(join_err)) => Err(ImageTaskError::Join(join_err.to_string())),
                    Ok(Ok(result)) => result.map_err(ImageTaskError::from),
                }
            }));
        }

        let mut outputs: Vec<Vec<u8>> = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        let results = futures::future::join_all(handles).await;
        for (index, (result, name)) in results.into_iter().zip(&names).enumerate() {
            match result {
                Ok(Ok(bytes)) => outputs.push(bytes),
                Ok(Err(error)) => failures.push(ImageFailure {
                    index,
                    name: name.clone(),
                    error,
                }),
                Err(join_err) => failures.push(ImageFailure {
                    index,
                    name: name.clone(),
                    error: ImageTaskError::Join(join_err.to_string()),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(ConvertError::Batch(failures));
        }

        let batch_dir = self.upload_root.join(&batch_id);
        fs::create_dir_all(&batch_dir).await?;

        let mut artifacts = Vec::with_capacity(names.len());
        for (name, bytes) in names.into_iter().zip(outputs) {
            let path = batch_dir.join(&name);
            if let Err(err) = fs::write(&path, &bytes).await {
                let _ = fs::remove_dir_all(&batch_dir).await;
                return Err(err.into());
            }
            let url = format!(
                "{}/downloads/{}/{}",
                self.public_base_url, batch_id, name
            );
            artifacts.push(ConvertedArtifact {
                name,
                path,
                size: bytes.len() as u64,
                url,
            });
        }

        let paths = artifacts.iter().map(|a| a.path.clone()).collect();
        if let Err(err) = self.registry.put(&batch_id, paths) {
            let _ = fs::remove_dir_all(&batch_dir).await;
            return Err(err.into());
        }

        info!(
            batch = %batch_id,
            images = artifacts.len(),
            "conversion batch registered"
        );

        Ok(ConversionBatch {
            id: batch_id,
            artifacts,
            created_at: Utc::now(),
        })
    }
}

/// Derive output filenames in input order.
///
/// The first image to claim a derived name keeps it unsuffixed; later
/// collisions get a `_{position}` suffix (1-based input position), bumped
/// further if an input was literally named that way.
fn assign_output_names(
    inputs: &[(UploadedImage, Option<CropRectangle>)],
    format: OutputFormat,
) -> Vec<String> {
    let ext = format.extension();
    let mut taken: HashSet<String> = HashSet::with_capacity(inputs.len());

    inputs
        .iter()
        .enumerate()
        .map(|(index, (image, _))| {
            let stem = image.safe_stem();
            let mut candidate = format!("{stem}.{ext}");
            let mut bump = index + 1;
            while taken.contains(&candidate) {
                candidate = format!("{stem}_{bump}.{ext}");
                bump += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Reject any path segment that is not a plain file or directory name.
pub fn is_plain_name(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
        && matches!(Path::new(segment).components().count(), 1)
}
