//
// synth.rs
// Report-Tools-rs
//
// Builds secondary-capture containers from a raster by cloning a reference
// container's attributes and rewriting identity, geometry, provenance and
// pixel encoding tags.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::path::Path;

use chrono::Local;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{open_file, DefaultDicomObject, FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN};
use image::DynamicImage;
use tracing::debug;

use crate::config::SynthesisConfig;
use crate::error::{ReportError, ReportResult};
use crate::storage::ensure_dir;
use crate::uid;

/// Secondary Capture Image Storage.
pub const SECONDARY_CAPTURE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";

/// Series number given to synthesized series whose reference carried none.
const SENTINEL_SERIES_NUMBER: &str = "991";
const DERIVED_SERIES_PREFIX: &str = "99";

#[derive(Debug, Clone, Copy)]
pub struct SynthesisOptions {
    /// 8-bit RGB for display images; 16-bit signed monochrome otherwise.
    pub visual_range: bool,
    pub instance_number: u32,
    /// Keep every reference attribute instead of stripping extras.
    pub full_tag: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            visual_range: true,
            instance_number: 1,
            full_tag: false,
        }
    }
}

/// Fixed provenance markers and the list of extra tags to strip.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub content_label: String,
    pub content_description: String,
    pub content_creator: String,
    pub strip_tags: Vec<Tag>,
}

impl Provenance {
    pub fn from_config(config: &SynthesisConfig) -> ReportResult<Self> {
        let strip_tags = config
            .parsed_strip_tags()
            .map_err(|e| ReportError::Validation(format!("{:#}", e)))?;
        Ok(Self {
            content_label: config.content_label.clone(),
            content_description: config.content_description.clone(),
            content_creator: config.content_creator.clone(),
            strip_tags,
        })
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Provenance::from_config(&SynthesisConfig::default())
            .unwrap_or_else(|_| Provenance {
                content_label: "UNNAMED".into(),
                content_description: "UNNAMED".into(),
                content_creator: String::new(),
                strip_tags: Vec::new(),
            })
    }
}

/// Apply the derived-series numbering convention to a reference series number.
pub fn series_number_for(reference: Option<&str>) -> String {
    match reference.map(str::trim) {
        None | Some("") => SENTINEL_SERIES_NUMBER.to_string(),
        Some(n) if n.starts_with(DERIVED_SERIES_PREFIX) => n.to_string(),
        Some(n) => format!("{}{}", DERIVED_SERIES_PREFIX, n),
    }
}

/// Open a container intended as a template.
pub fn open_reference(path: &Path) -> ReportResult<DefaultDicomObject> {
    if !path.is_file() {
        return Err(ReportError::MissingReference(format!(
            "{} does not exist",
            path.display()
        )));
    }
    open_file(path).map_err(|e| {
        ReportError::InvalidReference(format!("{}: {}", path.display(), e))
    })
}

/// Raw pixel buffer and the geometry it was produced with.
struct EncodedPixels {
    rows: u16,
    columns: u16,
    bytes: Vec<u8>,
}

fn encode_pixels(image: &DynamicImage, visual_range: bool) -> ReportResult<EncodedPixels> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ReportError::Validation("raster has zero area".into()));
    }
    let too_large = || ReportError::Validation(format!("raster {}x{} is too large", width, height));
    let rows = u16::try_from(height).map_err(|_| too_large())?;
    let columns = u16::try_from(width).map_err(|_| too_large())?;

    let bytes = if visual_range {
        // Interleaved RGB triplets, row-major.
        image.to_rgb8().into_raw()
    } else {
        // Halved into the non-negative half of the signed range.
        image
            .to_luma16()
            .into_raw()
            .into_iter()
            .flat_map(|v| ((v >> 1) as i16).to_le_bytes())
            .collect()
    };

    Ok(EncodedPixels {
        rows,
        columns,
        bytes,
    })
}

fn element_text(obj: &InMemDicomObject<StandardDataDictionary>, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim().trim_end_matches('\0').to_string())
        .filter(|s| !s.is_empty())
}

fn put_str(obj: &mut InMemDicomObject<StandardDataDictionary>, tag: Tag, vr: VR, value: impl Into<String>) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value.into())));
}

fn put_u16(obj: &mut InMemDicomObject<StandardDataDictionary>, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn uses_implicit_vr(reference: &DefaultDicomObject) -> bool {
    let ts = reference.meta().transfer_syntax();
    ts.trim_end_matches('\0') == IMPLICIT_VR_LITTLE_ENDIAN.uid()
}

/// Build a new container from `image`, using `reference` only as a template.
pub fn synthesize(
    reference: &DefaultDicomObject,
    image: &DynamicImage,
    options: &SynthesisOptions,
    provenance: &Provenance,
) -> ReportResult<DefaultDicomObject> {
    let pixels = encode_pixels(image, options.visual_range)?;

    let source_series_uid = element_text(reference, tags::SERIES_INSTANCE_UID).ok_or_else(|| {
        ReportError::InvalidReference("reference lacks a SeriesInstanceUID".into())
    })?;
    if element_text(reference, tags::STUDY_INSTANCE_UID).is_none() {
        return Err(ReportError::InvalidReference(
            "reference lacks a StudyInstanceUID".into(),
        ));
    }

    let transfer_syntax = if uses_implicit_vr(reference) {
        IMPLICIT_VR_LITTLE_ENDIAN.uid()
    } else {
        EXPLICIT_VR_LITTLE_ENDIAN.uid()
    };

    // Work on a copy; the reference object is never touched.
    let mut ds: InMemDicomObject<StandardDataDictionary> = (**reference).clone();

    if !options.full_tag {
        let mut extras: Vec<Tag> = ds
            .iter()
            .map(|e| e.header().tag)
            .filter(|t| t.group() % 2 == 1)
            .collect();
        extras.extend(provenance.strip_tags.iter().copied());
        for tag in extras {
            ds.remove_element(tag);
        }
    }

    let now = Local::now();
    let date = now.format("%Y%m%d").to_string();
    let time = now.format("%H%M%S").to_string();
    let series_uid = uid::derive_uid(&source_series_uid);
    let sop_instance_uid = uid::fresh_uid();
    let comments = element_text(reference, tags::SERIES_DESCRIPTION).unwrap_or_default();
    let series_number = series_number_for(element_text(reference, tags::SERIES_NUMBER).as_deref());

    put_u16(&mut ds, tags::ROWS, pixels.rows);
    put_u16(&mut ds, tags::COLUMNS, pixels.columns);
    ds.remove_element(tags::NUMBER_OF_FRAMES);
    put_str(&mut ds, tags::INSTANCE_NUMBER, VR::IS, options.instance_number.to_string());
    put_str(&mut ds, tags::IMAGE_COMMENTS, VR::LT, comments);
    put_str(&mut ds, tags::SERIES_INSTANCE_UID, VR::UI, series_uid);
    put_str(&mut ds, tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid.clone());
    put_str(&mut ds, tags::SOP_CLASS_UID, VR::UI, SECONDARY_CAPTURE_SOP_CLASS);
    put_str(&mut ds, tags::INSTANCE_CREATION_DATE, VR::DA, date.clone());
    put_str(&mut ds, tags::INSTANCE_CREATION_TIME, VR::TM, time.clone());
    put_str(&mut ds, tags::CONTENT_DATE, VR::DA, date.clone());
    put_str(&mut ds, tags::CONTENT_TIME, VR::TM, time.clone());
    put_str(&mut ds, tags::PRESENTATION_CREATION_DATE, VR::DA, date);
    put_str(&mut ds, tags::PRESENTATION_CREATION_TIME, VR::TM, time);
    put_str(&mut ds, tags::RESCALE_INTERCEPT, VR::DS, "0");
    put_str(&mut ds, tags::RESCALE_SLOPE, VR::DS, "1");
    put_str(&mut ds, tags::SERIES_NUMBER, VR::IS, series_number);
    put_str(&mut ds, tags::CONTENT_LABEL, VR::CS, provenance.content_label.clone());
    put_str(&mut ds, tags::CONTENT_DESCRIPTION, VR::LO, provenance.content_description.clone());
    put_str(&mut ds, tags::CONTENT_CREATOR_NAME, VR::PN, provenance.content_creator.clone());
    if element_text(&ds, tags::CONVERSION_TYPE).is_none() {
        // Workstation capture.
        put_str(&mut ds, tags::CONVERSION_TYPE, VR::CS, "WSD");
    }

    if options.visual_range {
        put_u16(&mut ds, tags::BITS_STORED, 8);
        put_u16(&mut ds, tags::BITS_ALLOCATED, 8);
        put_u16(&mut ds, tags::HIGH_BIT, 7);
        put_u16(&mut ds, tags::PIXEL_REPRESENTATION, 0);
        put_str(&mut ds, tags::WINDOW_WIDTH, VR::DS, "255");
        put_str(&mut ds, tags::WINDOW_CENTER, VR::DS, "127");
        put_str(&mut ds, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "RGB");
        put_u16(&mut ds, tags::SAMPLES_PER_PIXEL, 3);
        put_u16(&mut ds, tags::PLANAR_CONFIGURATION, 0);
    } else {
        put_u16(&mut ds, tags::BITS_STORED, 16);
        put_u16(&mut ds, tags::BITS_ALLOCATED, 16);
        put_u16(&mut ds, tags::HIGH_BIT, 15);
        put_u16(&mut ds, tags::PIXEL_REPRESENTATION, 1);
        put_str(&mut ds, tags::WINDOW_WIDTH, VR::DS, "800");
        put_str(&mut ds, tags::WINDOW_CENTER, VR::DS, "300");
        put_str(&mut ds, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
        put_u16(&mut ds, tags::SAMPLES_PER_PIXEL, 1);
        ds.remove_element(tags::PLANAR_CONFIGURATION);
    }

    // A primitive value is always written with an explicit length, replacing
    // any encapsulated fragments the reference carried.
    let pixel_vr = if options.visual_range { VR::OB } else { VR::OW };
    ds.put(DataElement::new(
        tags::PIXEL_DATA,
        pixel_vr,
        PrimitiveValue::from(pixels.bytes),
    ));

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(SECONDARY_CAPTURE_SOP_CLASS)
        .media_storage_sop_instance_uid(sop_instance_uid.as_str())
        .build()
        .map_err(|e| ReportError::container("Failed to build file meta group", e))?;

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in ds {
        file_obj.put(elem);
    }

    debug!(
        sop_instance_uid = %sop_instance_uid,
        rows = pixels.rows,
        columns = pixels.columns,
        visual_range = options.visual_range,
        "container synthesized"
    );
    Ok(file_obj)
}

/// Persist a container. The file only appears at `path` once fully written.
pub fn write_container(obj: &DefaultDicomObject, path: &Path) -> ReportResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container.dcm".to_string());
    let partial = path.with_file_name(format!("{}.part", file_name));

    if let Err(e) = obj.write_to_file(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(ReportError::container(
            format!("Failed to write container {}", path.display()),
            e,
        ));
    }
    fs::rename(&partial, path).map_err(|e| ReportError::io_at("move container into", path, e))
}

/// Synthesize and write in one step.
pub fn synthesize_to_file(
    reference: &DefaultDicomObject,
    image: &DynamicImage,
    path: &Path,
    options: &SynthesisOptions,
    provenance: &Provenance,
) -> ReportResult<()> {
    let obj = synthesize(reference, image, options, provenance)?;
    write_container(&obj, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn reference(series_number: Option<&str>, implicit: bool) -> DefaultDicomObject {
        let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
        put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3");
        put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4");
        put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.5");
        put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.2");
        put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, "HEAD MRA");
        put_str(&mut obj, tags::PIXEL_SPACING, VR::DS, "0.5\\0.5");
        put_str(&mut obj, Tag(0x0029, 0x0010), VR::LO, "VENDOR");
        if let Some(n) = series_number {
            put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, n);
        }
        let ts = if implicit {
            IMPLICIT_VR_LITTLE_ENDIAN.uid()
        } else {
            EXPLICIT_VR_LITTLE_ENDIAN.uid()
        };
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(ts)
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.2")
            .media_storage_sop_instance_uid("1.2.3.4.5")
            .build()
            .expect("meta");
        let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        for elem in obj {
            file_obj.put(elem);
        }
        file_obj
    }

    fn raster(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
    }

    fn u16_tag(obj: &DefaultDicomObject, tag: Tag) -> u16 {
        obj.element(tag).expect("tag").to_int::<u16>().expect("u16")
    }

    fn str_tag(obj: &DefaultDicomObject, tag: Tag) -> String {
        obj.element(tag).expect("tag").to_str().expect("str").trim().to_string()
    }

    #[test]
    fn series_number_convention() {
        assert_eq!(series_number_for(None), "991");
        assert_eq!(series_number_for(Some("")), "991");
        assert_eq!(series_number_for(Some("5")), "995");
        assert_eq!(series_number_for(Some("9950")), "9950");
        assert_eq!(series_number_for(Some(" 12 ")), "9912");
    }

    #[test]
    fn visual_range_yields_interleaved_rgb() {
        let reference = reference(Some("5"), false);
        let out = synthesize(&reference, &raster(4, 3), &SynthesisOptions::default(), &Provenance::default())
            .expect("synthesize");

        assert_eq!(u16_tag(&out, tags::ROWS), 3);
        assert_eq!(u16_tag(&out, tags::COLUMNS), 4);
        assert_eq!(u16_tag(&out, tags::BITS_ALLOCATED), 8);
        assert_eq!(u16_tag(&out, tags::BITS_STORED), 8);
        assert_eq!(u16_tag(&out, tags::HIGH_BIT), 7);
        assert_eq!(u16_tag(&out, tags::PIXEL_REPRESENTATION), 0);
        assert_eq!(u16_tag(&out, tags::SAMPLES_PER_PIXEL), 3);
        assert_eq!(u16_tag(&out, tags::PLANAR_CONFIGURATION), 0);
        assert_eq!(str_tag(&out, tags::PHOTOMETRIC_INTERPRETATION), "RGB");
        assert_eq!(str_tag(&out, tags::WINDOW_WIDTH), "255");
        assert_eq!(str_tag(&out, tags::WINDOW_CENTER), "127");
        assert_eq!(str_tag(&out, tags::SERIES_NUMBER), "995");
        assert_eq!(str_tag(&out, tags::IMAGE_COMMENTS), "HEAD MRA");
        assert_eq!(str_tag(&out, tags::SOP_CLASS_UID), SECONDARY_CAPTURE_SOP_CLASS);

        let pixels = out.element(tags::PIXEL_DATA).expect("pixels").to_bytes().expect("bytes");
        assert_eq!(pixels.len(), 4 * 3 * 3);
        assert_eq!(&pixels[..3], &[10, 20, 30]);
    }

    #[test]
    fn diagnostic_range_yields_signed_16_bit() {
        let reference = reference(None, false);
        let options = SynthesisOptions {
            visual_range: false,
            instance_number: 7,
            full_tag: false,
        };
        let out = synthesize(&reference, &raster(2, 2), &options, &Provenance::default()).expect("synthesize");

        assert_eq!(u16_tag(&out, tags::BITS_ALLOCATED), 16);
        assert_eq!(u16_tag(&out, tags::BITS_STORED), 16);
        assert_eq!(u16_tag(&out, tags::HIGH_BIT), 15);
        assert_eq!(u16_tag(&out, tags::PIXEL_REPRESENTATION), 1);
        assert_eq!(u16_tag(&out, tags::SAMPLES_PER_PIXEL), 1);
        assert_eq!(str_tag(&out, tags::WINDOW_WIDTH), "800");
        assert_eq!(str_tag(&out, tags::WINDOW_CENTER), "300");
        assert_eq!(str_tag(&out, tags::INSTANCE_NUMBER), "7");
        assert_eq!(str_tag(&out, tags::SERIES_NUMBER), "991");

        let pixels = out.element(tags::PIXEL_DATA).expect("pixels").to_bytes().expect("bytes");
        assert_eq!(pixels.len(), 2 * 2 * 2);
    }

    #[test]
    fn diagnostic_range_keeps_grey_levels_distinct() {
        let reference = reference(None, false);
        let greys = image::GrayImage::from_raw(3, 1, vec![100, 128, 255]).expect("grey raster");
        let options = SynthesisOptions {
            visual_range: false,
            instance_number: 1,
            full_tag: false,
        };
        let out = synthesize(&reference, &DynamicImage::ImageLuma8(greys), &options, &Provenance::default())
            .expect("synthesize");

        let bytes = out.element(tags::PIXEL_DATA).expect("pixels").to_bytes().expect("bytes");
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(values, vec![12850, 16448, i16::MAX]);
    }

    #[test]
    fn identity_is_fresh_and_reference_untouched() {
        let reference = reference(Some("9950"), true);
        let out = synthesize(&reference, &raster(2, 2), &SynthesisOptions::default(), &Provenance::default())
            .expect("synthesize");

        assert_ne!(str_tag(&out, tags::SERIES_INSTANCE_UID), "1.2.3.4");
        assert!(str_tag(&out, tags::SERIES_INSTANCE_UID).starts_with("1.2.3.4."));
        assert_ne!(str_tag(&out, tags::SOP_INSTANCE_UID), "1.2.3.4.5");
        assert_eq!(str_tag(&out, tags::SERIES_NUMBER), "9950");
        assert_eq!(
            out.meta().transfer_syntax().trim_end_matches('\0'),
            IMPLICIT_VR_LITTLE_ENDIAN.uid()
        );

        // The template keeps its own identity and tags.
        assert_eq!(str_tag(&reference, tags::SERIES_INSTANCE_UID), "1.2.3.4");
        assert!(reference.element(tags::ROWS).is_err());
    }

    #[test]
    fn extras_are_stripped_unless_full_tag() {
        let reference = reference(None, false);
        let stripped = synthesize(&reference, &raster(2, 2), &SynthesisOptions::default(), &Provenance::default())
            .expect("synthesize");
        assert!(stripped.element(tags::PIXEL_SPACING).is_err());
        assert!(stripped.element(Tag(0x0029, 0x0010)).is_err());

        let options = SynthesisOptions {
            full_tag: true,
            ..SynthesisOptions::default()
        };
        let full = synthesize(&reference, &raster(2, 2), &options, &Provenance::default()).expect("synthesize");
        assert!(full.element(tags::PIXEL_SPACING).is_ok());
        assert!(full.element(Tag(0x0029, 0x0010)).is_ok());
    }

    #[test]
    fn reference_without_series_uid_is_rejected() {
        let mut reference = reference(None, false);
        reference.remove_element(tags::SERIES_INSTANCE_UID);
        let err = synthesize(&reference, &raster(2, 2), &SynthesisOptions::default(), &Provenance::default())
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidReference(_)));
    }
}
