//! HTTP handler for the batch conversion endpoint.
//!
//! Pulls files and form fields out of the multipart request, validates the
//! shared transform parameters and the index-aligned `crops` array, and
//! delegates the actual work to `ConvertService`.

use crate::{
    errors::AppError,
    models::artifact::ConversionBatch,
    models::transform::{parse_crops, TransformParams},
    models::upload::UploadedImage,
    services::batch_service::{ConvertError, ConvertService},
};
use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use tracing::debug;

/// Response body of `POST /convert`.
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    #[serde(rename = "conversionId")]
    pub conversion_id: String,
    pub images: Vec<ArtifactDto>,
}

/// Per-image metadata in the conversion response; `data` carries the
/// retrieval URL.
#[derive(Debug, Serialize)]
pub struct ArtifactDto {
    pub name: String,
    pub size: u64,
    pub data: String,
}

impl From<ConversionBatch> for ConvertResponse {
    fn from(batch: ConversionBatch) -> Self {
        Self {
            conversion_id: batch.id,
            images: batch
                .artifacts
                .into_iter()
                .map(|artifact| ArtifactDto {
                    name: artifact.name,
                    size: artifact.size,
                    data: artifact.url,
                })
                .collect(),
        }
    }
}

/// `POST /convert` — multipart `images[]` plus `width`, `height`, `quality`,
/// `format` and `crops` form fields.
///
/// All-or-nothing: either every image converts and is described in the
/// response, or the batch fails as a whole.
pub async fn convert(
    State(service): State<ConvertService>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, AppError> {
    let mut images: Vec<UploadedImage> = Vec::new();
    let mut width = None;
    let mut height = None;
    let mut quality = None;
    let mut format = None;
    let mut crops_raw = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {}", err)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "images" => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("could not read uploaded file: {}", err))
                })?;
                images.push(UploadedImage {
                    data,
                    original_name,
                    content_type,
                });
            }
            name @ ("width" | "height" | "quality" | "format" | "crops") => {
                let target = match name {
                    "width" => &mut width,
                    "height" => &mut height,
                    "quality" => &mut quality,
                    "format" => &mut format,
                    _ => &mut crops_raw,
                };
                *target = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("could not read `{}` field: {}", name, err))
                })?);
            }
            other => {
                debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let params = TransformParams::from_fields(
        width.as_deref(),
        height.as_deref(),
        quality.as_deref(),
        format.as_deref(),
    )
    .map_err(ConvertError::Validation)?;
    let crops = parse_crops(crops_raw.as_deref(), images.len()).map_err(ConvertError::Validation)?;

    debug!(
        images = images.len(),
        format = params.format.extension(),
        quality = params.quality,
        "accepted conversion request"
    );

    let inputs = images.into_iter().zip(crops).collect();
    let batch = service.convert_batch(inputs, params).await?;
    debug!(batch = %batch.id, created_at = %batch.created_at, "conversion finished");
    Ok(Json(ConvertResponse::from(batch)))
}
