//! Uploaded image inputs as extracted from the multipart request.

use bytes::Bytes;
use std::path::Path;

/// One file from the `images[]` multipart field.
///
/// The multipart layer has already decoded the filename header into UTF-8;
/// the name is still untrusted and is reduced to a bare base name before any
/// output name is derived from it.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Raw file bytes. The decoder sniffs the actual format from these.
    pub data: Bytes,
    /// Filename as declared by the client. May be empty or hostile.
    pub original_name: String,
    /// Declared media type. Informational only; decoding never trusts it.
    pub content_type: Option<String>,
}

impl UploadedImage {
    /// Base name of the original filename with the extension removed,
    /// suitable as the stem of a derived output name.
    pub fn safe_stem(&self) -> String {
        let base = sanitize_file_name(&self.original_name, "image");
        Path::new(&base)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("image")
            .to_string()
    }
}

/// Reduce an untrusted filename to a plain base name.
///
/// Strips path components (including `../`), drops control characters, and
/// substitutes `fallback` when nothing usable remains.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '\\')
        .collect();

    Path::new(&cleaned)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}
