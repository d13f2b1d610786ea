//! HTTP handlers for artifact retrieval: single files, bulk zip archives,
//! and selective zip archives. Bodies are streamed; nothing is buffered
//! whole in memory.

use crate::{
    errors::AppError,
    services::archive_service::{build_zip, resolve_artifact_urls},
    services::batch_service::{is_plain_name, ConvertService},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Request body of `POST /download-selected-zip`.
#[derive(Debug, Deserialize)]
pub struct SelectedZipRequest {
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Vec<String>,
}

/// `GET /download-zip/{conversionId}` — zip of every artifact in a batch.
pub async fn download_zip(
    State(service): State<ConvertService>,
    Path(conversion_id): Path<String>,
) -> Result<Response, AppError> {
    let paths = service.registered_paths(&conversion_id)?;
    debug!(batch = %conversion_id, files = paths.len(), "streaming bulk archive");
    stream_zip(paths, "converted_images.zip").await
}

/// `POST /download-selected-zip` — zip of an explicit list of retrieval URLs.
///
/// Every URL is mapped back under the upload root and rejected if it
/// resolves outside it; an empty or absent list is a 400.
pub async fn download_selected_zip(
    State(service): State<ConvertService>,
    payload: Option<Json<SelectedZipRequest>>,
) -> Result<Response, AppError> {
    let urls = payload.map(|Json(body)| body.image_urls).unwrap_or_default();
    if urls.is_empty() {
        return Err(AppError::bad_request("no image URLs provided"));
    }

    let paths = resolve_artifact_urls(&urls, &service.upload_root)?;
    debug!(files = paths.len(), "streaming selective archive");
    stream_zip(paths, "selected_images.zip").await
}

/// `GET /downloads/{conversionId}/{filename}` — raw bytes of one artifact.
pub async fn serve_artifact(
    State(service): State<ConvertService>,
    Path((conversion_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    if !is_plain_name(&conversion_id) || !is_plain_name(&filename) {
        return Err(AppError::not_found("no such file"));
    }

    let path = service.upload_root.join(&conversion_id).join(&filename);
    let file = File::open(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found(format!("`{}/{}` not found", conversion_id, filename))
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let size = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&filename)),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    Ok(response)
}

async fn stream_zip(paths: Vec<PathBuf>, attachment_name: &str) -> Result<Response, AppError> {
    let archive = build_zip(paths)
        .await
        .map_err(|err| AppError::internal(format!("could not build archive: {}", err)))?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(archive)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    let disposition = format!("attachment; filename=\"{}\"", attachment_name);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
        Some(ext) if ext.eq_ignore_ascii_case("jpeg") || ext.eq_ignore_ascii_case("jpg") => {
            "image/jpeg"
        }
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "application/octet-stream",
    }
}
