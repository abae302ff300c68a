//
// image.rs
// Report-Tools-rs
//
// Renders synthesized containers back to PNG for previews.
//
// Report-Tools-rs maintainers - October 2026

use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use dicom::object::open_file;
use dicom::pixeldata::PixelDecoder;
use dicom_pixeldata::{ConvertOptions, VoiLutOption};
use image::{DynamicImage, ImageFormat};

/// PNG bytes of one frame of a container. Monochrome containers are windowed
/// with their own VOI values; RGB ones are rendered as stored.
pub fn container_preview_png(input: &Path, frame: u32) -> Result<Vec<u8>> {
    let obj = open_file(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let decoded = obj
        .decode_pixel_data()
        .context("Failed to decode pixel data")?;
    let frames = decoded.number_of_frames();
    if frame >= frames {
        bail!("Requested frame {} but container has {} frame(s)", frame, frames);
    }

    // The stored 8-bit range is used directly; windowing only applies to the
    // signed diagnostic encoding.
    let options = if decoded.samples_per_pixel() == 3 {
        ConvertOptions::new().with_voi_lut(VoiLutOption::Identity).force_8bit()
    } else {
        ConvertOptions::new().force_8bit()
    };
    let rendered = decoded
        .to_dynamic_image_with_options(frame, &options)
        .context("Failed to render frame")?;
    encode_png(&rendered)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(buffer)
}
