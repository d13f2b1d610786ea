//! Transform parameters shared by every image in one conversion batch.

use serde::Deserialize;

/// Quality used when the form field is absent or not a number.
pub const DEFAULT_QUALITY: u8 = 80;

/// Output encodings supported by the conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// Map the `format` form field to an encoder.
    ///
    /// `webp` selects WebP; any other value encodes as JPEG. The fallback is
    /// part of the endpoint contract, not an error.
    pub fn from_param(value: &str) -> Self {
        if value.eq_ignore_ascii_case("webp") {
            OutputFormat::Webp
        } else {
            OutputFormat::Jpeg
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
        }
    }
}

/// Caller-supplied crop region in the source image's native pixel space.
///
/// The caller has already scaled display coordinates to pixel coordinates;
/// the pipeline applies the rectangle as-is and rejects anything that falls
/// outside the decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropRectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resize and encode settings applied to every image of a batch.
#[derive(Debug, Clone, Copy)]
pub struct TransformParams {
    /// Target width. When only one dimension is set the other follows the
    /// source aspect ratio.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: OutputFormat,
    /// Encoder quality in [1, 100].
    pub quality: u8,
}

impl TransformParams {
    /// Build parameters from the raw `/convert` form fields.
    ///
    /// Width, height and quality arrive as strings; unparsable dimension
    /// values behave as absent. Quality defaults to [`DEFAULT_QUALITY`] when
    /// absent or non-numeric, but a numeric value outside [1, 100] is a
    /// validation error rather than silently clamped.
    pub fn from_fields(
        width: Option<&str>,
        height: Option<&str>,
        quality: Option<&str>,
        format: Option<&str>,
    ) -> Result<Self, String> {
        let format = match format {
            Some(value) if !value.trim().is_empty() => OutputFormat::from_param(value.trim()),
            _ => return Err("missing `format` field".into()),
        };

        let quality = match quality.map(str::trim) {
            None | Some("") => DEFAULT_QUALITY,
            Some(raw) => match raw.parse::<i64>() {
                Ok(value @ 1..=100) => value as u8,
                Ok(value) => {
                    return Err(format!("quality {} is outside the range 1-100", value));
                }
                Err(_) => DEFAULT_QUALITY,
            },
        };

        Ok(Self {
            width: parse_dimension(width),
            height: parse_dimension(height),
            format,
            quality,
        })
    }
}

/// Treat absent, empty or unparsable dimension fields as "no resize on this axis".
fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
}

/// Parse the `crops` form field: a JSON array with one entry per uploaded
/// image, each `null` or a crop rectangle, index-aligned with `images[]`.
///
/// An absent field means "no crops anywhere". A present field must decode and
/// match the image count exactly.
pub fn parse_crops(
    raw: Option<&str>,
    image_count: usize,
) -> Result<Vec<Option<CropRectangle>>, String> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(vec![None; image_count]);
    };

    let crops: Vec<Option<CropRectangle>> = serde_json::from_str(raw)
        .map_err(|err| format!("malformed `crops` field: {}", err))?;

    if crops.len() != image_count {
        return Err(format!(
            "`crops` has {} entries but {} images were uploaded",
            crops.len(),
            image_count
        ));
    }

    Ok(crops)
}
