//! Zip archive construction for bulk and selective downloads.
//!
//! Archives are written on a blocking task into an unlinked temp file and
//! handed back as an async file handle for streaming, so a large batch never
//! sits fully in memory. Missing or unreadable inputs are skipped with a
//! warning — the sweeper may legitimately race a download, in which case the
//! client gets a partial or empty archive rather than an error.

use crate::services::batch_service::{is_plain_name, ConvertError, ConvertResult};
use std::io::{self, ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::task;
use tracing::warn;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// URL prefix under which artifacts are served; selective downloads map URLs
/// back to disk paths by splitting on it.
pub const DOWNLOADS_PREFIX: &str = "/downloads/";

/// Build a zip of the given files and return a handle positioned at the
/// start, ready to stream as a response body.
pub async fn build_zip(paths: Vec<PathBuf>) -> io::Result<File> {
    let spool = task::spawn_blocking(move || write_zip(&paths))
        .await
        .map_err(|err| io::Error::new(ErrorKind::Other, err))??;
    Ok(File::from_std(spool))
}

fn write_zip(paths: &[PathBuf]) -> io::Result<std::fs::File> {
    let mut spool = tempfile::tempfile()?;
    {
        let mut zip = ZipWriter::new(&mut spool);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9));

        for path in paths {
            let data = match std::fs::read(path) {
                Ok(data) => data,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable file while building archive"
                    );
                    continue;
                }
            };
            // Entries are flattened to their base name.
            zip.start_file(entry_name(path), options)
                .map_err(|err| io::Error::new(ErrorKind::Other, err))?;
            zip.write_all(&data)?;
        }

        zip.finish()
            .map_err(|err| io::Error::new(ErrorKind::Other, err))?;
    }
    spool.rewind()?;
    Ok(spool)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("file")
        .to_string()
}

/// Map public retrieval URLs back to paths under the upload root.
///
/// Each URL must contain the `/downloads/` prefix followed by exactly a
/// conversion id and a filename, both plain path segments. Anything else —
/// `..`, absolute paths, extra segments — is rejected before any file is
/// opened.
pub fn resolve_artifact_urls(urls: &[String], upload_root: &Path) -> ConvertResult<Vec<PathBuf>> {
    urls.iter()
        .map(|url| {
            let (_, relative) = url.split_once(DOWNLOADS_PREFIX).ok_or_else(|| {
                ConvertError::Validation(format!("`{}` is not a download URL", url))
            })?;

            let mut segments = relative.split('/');
            let (Some(conversion_id), Some(filename), None) =
                (segments.next(), segments.next(), segments.next())
            else {
                return Err(ConvertError::PathEscape(url.clone()));
            };
            if !is_plain_name(conversion_id) || !is_plain_name(filename) {
                return Err(ConvertError::PathEscape(url.clone()));
            }

            let path = upload_root.join(conversion_id).join(filename);
            if !path.starts_with(upload_root) {
                return Err(ConvertError::PathEscape(url.clone()));
            }
            Ok(path)
        })
        .collect()
}
