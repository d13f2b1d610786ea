//! Defines routes for the batch image conversion API.
//!
//! ## Structure
//! - **Conversion**
//!   - `POST /convert` — multipart batch conversion (images + transform params)
//!
//! - **Retrieval**
//!   - `GET  /download-zip/{conversionId}` — zip of every artifact in a batch
//!   - `POST /download-selected-zip` — zip of an explicit URL list
//!   - `GET  /downloads/{conversionId}/{filename}` — one artifact's raw bytes
//!
//! Archive responses are streamed; the multipart body is capped by
//! `max_upload_bytes`.

use crate::{
    handlers::{
        convert_handlers::convert,
        download_handlers::{download_selected_zip, download_zip, serve_artifact},
        health_handlers::{healthz, readyz},
    },
    services::batch_service::ConvertService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all conversion and retrieval routes.
///
/// The router carries shared state (`ConvertService`) to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<ConvertService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // conversion
        .route("/convert", post(convert))
        // retrieval
        .route("/download-zip/{conversion_id}", get(download_zip))
        .route("/download-selected-zip", post(download_selected_zip))
        .route("/downloads/{conversion_id}/{filename}", get(serve_artifact))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry::{ConversionRegistry, InMemoryRegistry};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use zip::ZipArchive;

    const BOUNDARY: &str = "x-image-converter-test-boundary";

    fn router(upload_root: &std::path::Path) -> Router {
        let registry: Arc<dyn ConversionRegistry> = Arc::new(InMemoryRegistry::new());
        let service = ConvertService::new(
            registry,
            upload_root,
            "http://localhost:3001",
            4,
            Duration::from_secs(30),
        );
        routes(32 * 1024 * 1024).with_state(service)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 32])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn text_part(body: &mut Vec<u8>, name: &str, value: &str) {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    fn file_part(body: &mut Vec<u8>, filename: &str, data: &[u8]) {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    fn multipart_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn convert_then_download_zip_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let mut body = Vec::new();
        text_part(&mut body, "format", "webp");
        text_part(&mut body, "quality", "75");
        file_part(&mut body, "photo.png", &png_bytes(64, 48));
        file_part(&mut body, "photo.png", &png_bytes(32, 32));
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let response = app.clone().oneshot(multipart_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        let conversion_id = json["conversionId"].as_str().unwrap().to_string();
        let images = json["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0]["name"], "photo.webp");
        assert_eq!(images[1]["name"], "photo_2.webp");

        // Each artifact is retrievable at its returned URL path.
        let first_url = images[0]["data"].as_str().unwrap();
        let first_path = first_url
            .strip_prefix("http://localhost:3001")
            .unwrap()
            .to_string();
        let response = app
            .clone()
            .oneshot(Request::get(first_path.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "image/webp"
        );
        let first_bytes = body_bytes(response).await;
        assert_eq!(first_bytes.len() as u64, images[0]["size"].as_u64().unwrap());

        // The zip holds the same entries, name and byte size alike.
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/download-zip/{conversion_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );

        let archive_bytes = body_bytes(response).await;
        let mut archive = ZipArchive::new(Cursor::new(archive_bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        for (i, image) in images.iter().enumerate() {
            let mut entry = archive.by_index(i).unwrap();
            assert_eq!(entry.name(), image["name"].as_str().unwrap());
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            assert_eq!(data.len() as u64, image["size"].as_u64().unwrap());
        }
    }

    #[tokio::test]
    async fn malformed_crops_field_is_a_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let mut body = Vec::new();
        text_part(&mut body, "format", "webp");
        text_part(&mut body, "crops", "not json");
        file_part(&mut body, "photo.png", &png_bytes(16, 16));
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let response = app.oneshot(multipart_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_conversion_id_is_a_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(
                Request::get("/download-zip/no-such-batch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn selected_zip_rejects_empty_and_escaping_lists() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let empty = Request::post("/download-selected-zip")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"imageUrls": []}"#))
            .unwrap();
        let response = app.clone().oneshot(empty).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let escaping = Request::post("/download-selected-zip")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"imageUrls": ["http://localhost:3001/downloads/../../etc/passwd"]}"#,
            ))
            .unwrap();
        let response = app.oneshot(escaping).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn artifact_download_rejects_traversal_segments() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .oneshot(
                Request::get("/downloads/..%2F..%2Fetc/passwd")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
