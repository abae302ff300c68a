//
// resize.rs
// Report-Tools-rs
//
// Aspect-preserving resize of a raster onto a square, black-padded canvas.
//
// Report-Tools-rs maintainers - October 2026

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

use crate::error::{ReportError, ReportResult};

/// Pick floor or ceil of `value`, whichever scores lower (floor wins ties),
/// never going below one pixel.
fn round_aspect(value: f64, score: impl Fn(f64) -> f64) -> u32 {
    let floor = value.floor();
    let ceil = value.ceil();
    let best = if score(ceil) < score(floor) { ceil } else { floor };
    (best as u32).max(1)
}

/// Fit a raster with the given aspect ratio (width / height) into a
/// `width` x `height` box, shrinking the axis that overflows.
pub fn fit_size(width: u32, height: u32, aspect: f64) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    if w / h >= aspect {
        let new_w = round_aspect(h * aspect, |n| (aspect - n / h).abs());
        (new_w, height)
    } else {
        let new_h = round_aspect(w / aspect, |n| {
            if n == 0.0 {
                0.0
            } else {
                (aspect - w / n).abs()
            }
        });
        (width, new_h)
    }
}

/// Resize `image` to fit a square of side `edge` and center it on a black canvas.
pub fn letterbox(image: &DynamicImage, edge: u32) -> ReportResult<RgbImage> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ReportError::Validation(
            "cannot resize an image with zero area".into(),
        ));
    }
    if edge == 0 {
        return Err(ReportError::Validation("canvas edge must be positive".into()));
    }

    let aspect = image.width() as f64 / image.height() as f64;
    let (w, h) = fit_size(edge, edge, aspect);

    let resized = imageops::resize(&image.to_rgb8(), w, h, FilterType::Lanczos3);
    let mut canvas = RgbImage::new(edge, edge);
    let x = (edge - w) / 2;
    let y = (edge - h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    Ok(canvas)
}
