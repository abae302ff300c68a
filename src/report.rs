//
// report.rs
// Report-Tools-rs
//
// Conversion entry points for front-end images: report rasters stored with a
// cache sidecar, and film images synthesized into containers and registered
// with the remote result records of the product.
//
// Report-Tools-rs maintainers - October 2026

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::DynamicImage;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::aggregator::ResultAggregator;
use crate::config::ReportConfig;
use crate::error::{ReportError, ReportResult};
use crate::imagedb::{decode_base64, ImageDb};
use crate::models::{validate_uid, CacheEntry, CacheOption, ImageItem, Target};
use crate::products::Product;
use crate::repacs::ResultStore;
use crate::resize::letterbox;
use crate::storage::{ensure_dir, DataRoot};
use crate::synth::{self, Provenance, SynthesisOptions};

/// Files produced for one item, per target.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionOutcome {
    pub report: Option<PathBuf>,
    pub film: Option<PathBuf>,
}

fn now_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Run every conversion the item's targets ask for. Lookups are validated
/// up front so a bad item writes nothing.
pub fn convert(
    config: &ReportConfig,
    item: &ImageItem,
    store: &dyn ResultStore,
) -> ReportResult<ConversionOutcome> {
    item.validate()?;
    item.product()?;
    if item.wants(Target::Report) {
        item.category()?;
    }

    let mut outcome = ConversionOutcome::default();
    if item.wants(Target::Report) {
        outcome.report = Some(convert_report(config, item)?);
    }
    if item.wants(Target::Film) {
        outcome.film = Some(convert_film(config, item, store)?);
    }
    Ok(outcome)
}

/// Store the decoded raster under the report layout with a `.cache.json`
/// sidecar next to it. Returns the raster path.
pub fn convert_report(config: &ReportConfig, item: &ImageItem) -> ReportResult<PathBuf> {
    item.validate()?;
    let category = item.category()?;
    let product = item.product()?;
    let bytes = decode_base64(&item.image)?;

    let root = DataRoot::new(&config.data_path);
    let dir = root.report_image_dir(product, category, &item.series_iuid);
    ensure_dir(&dir)?;

    let stem = Uuid::new_v4().to_string();
    let raster_path = dir.join(format!("{}.png", stem));
    let cache_path = dir.join(format!("{}.cache.json", stem));

    ImageDb::save_raster(&raster_path, &bytes)?;

    let entry = CacheEntry {
        report_image_type: category,
        series_iuid: item.series_iuid.clone(),
        option: CacheOption::from_front_end(item.option.as_ref(), now_timestamp()),
        path: root.to_relative(&raster_path),
    };
    if let Err(e) = ImageDb::save_cache(&cache_path, &entry) {
        // Never leave a raster without its sidecar.
        let _ = ImageDb::remove(&raster_path);
        return Err(e);
    }

    info!(
        series_iuid = %item.series_iuid,
        product = %product,
        category = %category,
        path = %entry.path,
        "report image stored"
    );
    Ok(raster_path)
}

/// Pick the template container for a series: the first file (by name) in the
/// per-series scratch directory, falling back to the shared scratch directory.
pub fn select_reference(scratch_dir: &Path, series_iuid: &str) -> ReportResult<PathBuf> {
    let per_series = scratch_dir.join(series_iuid);
    let candidates = [per_series.as_path(), scratch_dir];

    for dir in candidates.iter().filter(|d| d.is_dir()) {
        let first = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .find(|e| !e.file_name().to_string_lossy().starts_with('.'));
        if let Some(entry) = first {
            return Ok(entry.into_path());
        }
    }

    Err(ReportError::MissingReference(format!(
        "no sample container in {}",
        scratch_dir.display()
    )))
}

/// Letterbox the image onto the film canvas, synthesize a container under the
/// product's screenshot directory and register it with every result type the
/// product has. Returns the container path.
pub fn convert_film(
    config: &ReportConfig,
    item: &ImageItem,
    store: &dyn ResultStore,
) -> ReportResult<PathBuf> {
    item.validate()?;
    let product = item.product()?;
    let provenance = Provenance::from_config(&config.synthesis)?;

    let bytes = decode_base64(&item.image)?;
    let image = image::load_from_memory(&bytes).map_err(|e| ReportError::Decode(e.to_string()))?;
    let canvas = letterbox(&image, config.film_canvas_edge)?;

    let reference_path = select_reference(&config.series_scratch_dir, &item.series_iuid)?;
    let reference = synth::open_reference(&reference_path)?;

    let root = DataRoot::new(&config.data_path);
    let dir = root.screenshot_dir(product, &item.series_iuid);
    ensure_dir(&dir)?;
    let container_path = dir.join(format!("{}.dcm", Uuid::new_v4()));

    let options = SynthesisOptions {
        visual_range: true,
        instance_number: 1,
        full_tag: false,
    };
    synth::synthesize_to_file(
        &reference,
        &DynamicImage::ImageRgb8(canvas),
        &container_path,
        &options,
        &provenance,
    )?;
    info!(
        series_iuid = %item.series_iuid,
        product = %product,
        reference = %reference_path.display(),
        path = %container_path.display(),
        "film container synthesized"
    );

    let profile = config.products.profile(product);
    let result_types = profile.result_types();
    if result_types.is_empty() {
        warn!(product = %product, "no result types configured, skipping result update");
    }
    let aggregator = ResultAggregator::new(store, root);
    for result_type in &result_types {
        aggregator.add_reference(result_type, profile.custom_shape, &item.series_iuid, &container_path)?;
    }

    Ok(container_path)
}

/// Unregister a film container from every result type of the product and
/// delete it. Returns whether any record listed it.
pub fn remove_film(
    config: &ReportConfig,
    product: Product,
    series_iuid: &str,
    path: &Path,
    store: &dyn ResultStore,
) -> ReportResult<bool> {
    validate_uid("series_iuid", series_iuid)?;
    let profile = config.products.profile(product);
    let root = DataRoot::new(&config.data_path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.to_absolute(&path.to_string_lossy())
    };

    let aggregator = ResultAggregator::new(store, root);
    let mut removed = false;
    for result_type in profile.result_types() {
        removed |= aggregator.remove_reference(&result_type, profile.custom_shape, series_iuid, &absolute)?;
    }
    Ok(removed)
}
