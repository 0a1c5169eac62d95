//! Image preprocessing filters for OCR
//!
//! Label photos are often noisy (glossy packaging, JPEG artifacts). A
//! grayscale conversion followed by a small median filter removes most of
//! the speckle before the engine sees the image.

use image::{DynamicImage, ImageFormat};
use imageproc::filter::median_filter;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::PreprocessSettings;

/// Apply the configured filters. Returns `None` when nothing would change.
pub fn preprocess_for_ocr(image: &DynamicImage, settings: &PreprocessSettings) -> Option<DynamicImage> {
    if !settings.enabled || (!settings.grayscale && !settings.despeckle) {
        debug!("OCR preprocessing disabled");
        return None;
    }

    debug!(
        "OCR preprocessing: grayscale={}, despeckle={}, radius={}",
        settings.grayscale, settings.despeckle, settings.despeckle_radius
    );

    let radius = settings.despeckle_radius;
    let despeckle = settings.despeckle && radius > 0;

    let result = if settings.grayscale {
        let gray = image.to_luma8();
        if despeckle {
            DynamicImage::ImageLuma8(median_filter(&gray, radius, radius))
        } else {
            DynamicImage::ImageLuma8(gray)
        }
    } else {
        let rgb = image.to_rgb8();
        if despeckle {
            DynamicImage::ImageRgb8(median_filter(&rgb, radius, radius))
        } else {
            DynamicImage::ImageRgb8(rgb)
        }
    };

    Some(result)
}

/// Write `image` to a temporary PNG that is deleted when the handle drops
pub fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile, image::ImageError> {
    let temp = tempfile::Builder::new()
        .prefix("label-scan-")
        .suffix(".png")
        .tempfile()?;
    image.save_with_format(temp.path(), ImageFormat::Png)?;
    Ok(temp)
}
