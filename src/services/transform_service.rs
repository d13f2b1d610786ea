//! Pure in-memory image transform: decode, optional crop, optional resize,
//! encode. No side effects; one call handles exactly one image.

use crate::models::transform::{CropRectangle, OutputFormat, TransformParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error(
        "crop rectangle {width}x{height}+{x}+{y} exceeds image bounds {image_width}x{image_height}"
    )]
    CropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("could not encode image as {format}: {reason}")]
    Encode { format: &'static str, reason: String },
}

pub type TransformResult<T> = Result<T, TransformError>;

/// Convert one image held in memory.
///
/// Pipeline order is fixed: decode (format sniffed from the bytes), crop when
/// a non-degenerate rectangle is supplied, resize per the params, encode.
/// A rectangle with zero width or height is ignored; one that is not fully
/// contained in the decoded image is a [`TransformError::CropBounds`] — the
/// caller owns the coordinate space, so out-of-bounds is a contract
/// violation, never clamped.
pub fn transform_image(
    data: &[u8],
    crop: Option<CropRectangle>,
    params: &TransformParams,
) -> TransformResult<Vec<u8>> {
    let mut img =
        image::load_from_memory(data).map_err(|err| TransformError::Decode(err.to_string()))?;

    if let Some(rect) = crop.filter(|r| r.width > 0 && r.height > 0) {
        ensure_contained(&img, rect)?;
        img = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    }

    if let Some((width, height)) =
        target_dimensions(img.width(), img.height(), params.width, params.height)
    {
        if (width, height) != (img.width(), img.height()) {
            let filter = select_filter(img.width(), img.height(), width, height);
            img = img.resize_exact(width, height, filter);
        }
    }

    encode(&img, params.format, params.quality)
}

fn ensure_contained(img: &DynamicImage, rect: CropRectangle) -> TransformResult<()> {
    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    let contained = matches!((right, bottom), (Some(r), Some(b))
        if r <= img.width() && b <= img.height());

    if contained {
        Ok(())
    } else {
        Err(TransformError::CropBounds {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            image_width: img.width(),
            image_height: img.height(),
        })
    }
}

/// Resolve the resize target from optional width/height.
///
/// Both absent means no resize. A single dimension preserves the source
/// aspect ratio on the other axis; both present are honored exactly.
fn target_dimensions(
    orig_width: u32,
    orig_height: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> Option<(u32, u32)> {
    match (width, height) {
        (None, None) => None,
        (Some(w), Some(h)) => Some((w.max(1), h.max(1))),
        (Some(w), None) => {
            let aspect = orig_height as f32 / orig_width as f32;
            let h = (w as f32 * aspect).round() as u32;
            Some((w.max(1), h.max(1)))
        }
        (None, Some(h)) => {
            let aspect = orig_width as f32 / orig_height as f32;
            let w = (h as f32 * aspect).round() as u32;
            Some((w.max(1), h.max(1)))
        }
    }
}

/// Cheaper filters for heavy downscales, Lanczos for mild ones.
fn select_filter(orig_width: u32, orig_height: u32, new_width: u32, new_height: u32) -> FilterType {
    let width_ratio = orig_width as f32 / new_width as f32;
    let height_ratio = orig_height as f32 / new_height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> TransformResult<Vec<u8>> {
    match format {
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            let encoder = webp::Encoder::from_rgba(&rgba, width, height);
            Ok(encoder.encode(quality as f32).to_vec())
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            let mut buffer = Vec::new();
            let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
            rgb.write_with_encoder(encoder)
                .map_err(|err| TransformError::Encode {
                    format: "jpeg",
                    reason: err.to_string(),
                })?;
            Ok(buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn params(
        width: Option<u32>,
        height: Option<u32>,
        format: OutputFormat,
        quality: u8,
    ) -> TransformParams {
        TransformParams {
            width,
            height,
            format,
            quality,
        }
    }

    fn decoded_dimensions(data: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(data).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = transform_image(
            b"definitely not an image",
            None,
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[test]
    fn no_resize_preserves_dimensions() {
        let out = transform_image(
            &png_bytes(320, 200),
            None,
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap();
        assert_eq!(decoded_dimensions(&out), (320, 200));
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn crop_without_resize_yields_crop_dimensions() {
        let crop = CropRectangle {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        let out = transform_image(
            &png_bytes(320, 200),
            Some(crop),
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap();
        assert_eq!(decoded_dimensions(&out), (100, 50));
    }

    #[test]
    fn zero_sized_crop_is_ignored() {
        let crop = CropRectangle {
            x: 0,
            y: 0,
            width: 0,
            height: 100,
        };
        let out = transform_image(
            &png_bytes(64, 48),
            Some(crop),
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap();
        assert_eq!(decoded_dimensions(&out), (64, 48));
    }

    #[test]
    fn out_of_bounds_crop_is_rejected() {
        let crop = CropRectangle {
            x: 300,
            y: 0,
            width: 100,
            height: 50,
        };
        let err = transform_image(
            &png_bytes(320, 200),
            Some(crop),
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::CropBounds { .. }));
    }

    #[test]
    fn crop_near_u32_max_does_not_overflow() {
        let crop = CropRectangle {
            x: u32::MAX - 1,
            y: 0,
            width: 10,
            height: 10,
        };
        let err = transform_image(
            &png_bytes(32, 32),
            Some(crop),
            &params(None, None, OutputFormat::Jpeg, 80),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::CropBounds { .. }));
    }

    #[test]
    fn single_dimension_resize_preserves_aspect_ratio() {
        // 2000x1500 cropped to 800x600, resized to width 400 -> 400x300 WebP.
        let crop = CropRectangle {
            x: 100,
            y: 100,
            width: 800,
            height: 600,
        };
        let out = transform_image(
            &png_bytes(2000, 1500),
            Some(crop),
            &params(Some(400), None, OutputFormat::Webp, 75),
        )
        .unwrap();
        assert!(!out.is_empty());
        assert_eq!(&out[0..4], b"RIFF");
        assert_eq!(&out[8..12], b"WEBP");
        assert_eq!(decoded_dimensions(&out), (400, 300));
    }

    #[test]
    fn both_dimensions_resize_exactly() {
        let out = transform_image(
            &png_bytes(320, 200),
            None,
            &params(Some(100), Some(100), OutputFormat::Jpeg, 80),
        )
        .unwrap();
        assert_eq!(decoded_dimensions(&out), (100, 100));
    }

    #[test]
    fn height_only_resize_derives_width() {
        let out = transform_image(
            &png_bytes(400, 200),
            None,
            &params(None, Some(100), OutputFormat::Jpeg, 80),
        )
        .unwrap();
        assert_eq!(decoded_dimensions(&out), (200, 100));
    }
}
