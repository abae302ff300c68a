//
// push.rs
// Report-Tools-rs
//
// Push orchestration: stage the requested rasters in a per-request scratch
// area, convert them into containers and hand them to the push collaborator
// for every PACS target, recording success per target and per kind.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::DefaultDicomObject;
use image::DynamicImage;
use tracing::{debug, error, info, warn};

use crate::config::{PacsConfig, ReportConfig};
use crate::error::{ReportError, ReportResult};
use crate::imagedb::{decode_base64, ImageDb};
use crate::models::{validate_uid, PushEndpoint, PushRequest, PushStatus, PushSummary, TargetOutcome};
use crate::products::Product;
use crate::repacs::SeriesLookup;
use crate::storage::{ensure_dir, DataRoot};
use crate::synth::{self, Provenance, SynthesisOptions};
use crate::uid;

/// Everything the push collaborator needs for one batch to one target.
#[derive(Debug)]
pub struct PushJob<'a> {
    pub files: &'a [PathBuf],
    pub target: &'a PushEndpoint,
    pub calling_ae: &'a str,
    pub series_description: &'a str,
    pub series_number: &'a str,
    pub settings: &'a PacsConfig,
}

/// Delivers containers to a remote node.
pub trait Pusher {
    fn push(&self, job: &PushJob<'_>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Image,
    Report,
}

impl PushKind {
    pub fn series_description(self) -> &'static str {
        match self {
            PushKind::Image => "Push Image",
            PushKind::Report => "Push Report",
        }
    }

    fn file_tag(self) -> &'static str {
        match self {
            PushKind::Image => "img",
            PushKind::Report => "rep",
        }
    }
}

/// A directory that exists for as long as this value does.
#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
}

impl ScratchArea {
    pub fn create(path: impl Into<PathBuf>) -> ReportResult<Self> {
        let path = path.into();
        ensure_dir(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scratch area removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove scratch area: {}", e),
        }
    }
}

/// Containers produced for a request, split by kind.
#[derive(Debug, Default)]
pub struct GeneratedContainers {
    pub images: Vec<PathBuf>,
    pub reports: Vec<PathBuf>,
    pub series_number: String,
}

/// Converts the rasters of one push request. Owns the scratch area, so every
/// staged and generated file disappears when the generator is dropped.
pub struct ReportGenerator<'a> {
    request: &'a PushRequest,
    root: DataRoot,
    lookup: &'a dyn SeriesLookup,
    provenance: Provenance,
    reference: Option<DefaultDicomObject>,
    scratch: ScratchArea,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(
        config: &ReportConfig,
        product: Product,
        request: &'a PushRequest,
        lookup: &'a dyn SeriesLookup,
    ) -> ReportResult<Self> {
        let root = DataRoot::new(&config.data_path);
        let scratch = ScratchArea::create(root.push_scratch_dir(product, &request.series_iuid))?;
        Ok(Self {
            request,
            root,
            lookup,
            provenance: Provenance::from_config(&config.synthesis)?,
            reference: None,
            scratch,
        })
    }

    fn staging_dir(&self) -> ReportResult<PathBuf> {
        let dir = self.scratch.path().join("img_png");
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Template container for the series, fetched once per request.
    fn reference(&mut self) -> ReportResult<&DefaultDicomObject> {
        if self.reference.is_none() {
            let info = self.lookup.series_info(&self.request.series_iuid)?;
            let storage_path = info
                .images
                .first()
                .map(|img| img.storage_path.clone())
                .ok_or_else(|| {
                    ReportError::MissingReference(format!(
                        "series {} has no stored images",
                        self.request.series_iuid
                    ))
                })?;
            let path = self.root.to_absolute(&storage_path);
            debug!(path = %path.display(), "loading push reference");
            self.reference = Some(synth::open_reference(&path)?);
        }
        self.reference
            .as_ref()
            .ok_or_else(|| ReportError::MissingReference(self.request.series_iuid.clone()))
    }

    fn stage_image(&self, relative: &str, name: &str) -> ReportResult<PathBuf> {
        let source = self.root.resolve_existing(relative)?;
        let staged = self.staging_dir()?.join(name);
        fs::copy(&source, &staged).map_err(|e| ReportError::io_at("copy", &source, e))?;
        Ok(staged)
    }

    fn stage_report(&self, entry: &str, name: &str) -> ReportResult<PathBuf> {
        if let Ok(source) = self.root.resolve_existing(entry) {
            let staged = self.staging_dir()?.join(name);
            fs::copy(&source, &staged).map_err(|e| ReportError::io_at("copy", &source, e))?;
            return Ok(staged);
        }

        let bytes = decode_base64(entry).map_err(|e| {
            ReportError::Decode(format!(
                "report entry is neither a stored file nor base64 data ({})",
                e
            ))
        })?;
        let staged = self.staging_dir()?.join(name);
        ImageDb::save_raster(&staged, &bytes)?;
        Ok(staged)
    }

    fn convert_staged(
        &mut self,
        staged: &Path,
        series_uid: &str,
        instance_number: u32,
    ) -> ReportResult<PathBuf> {
        let raster = image::open(staged)
            .map_err(|e| ReportError::Decode(format!("{}: {}", staged.display(), e)))?;
        // Alpha and extra channels are dropped.
        let raster = DynamicImage::ImageRgb8(raster.to_rgb8());

        let options = SynthesisOptions {
            visual_range: true,
            instance_number,
            full_tag: false,
        };
        let provenance = self.provenance.clone();
        let request = self.request;
        let mut container = synth::synthesize(self.reference()?, &raster, &options, &provenance)?;

        container.put(DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(request.study_iuid.as_str()),
        ));
        container.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from(request.patient_id.as_str()),
        ));
        container.put(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(series_uid),
        ));

        let sop_uid = container
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
            .unwrap_or_else(uid::fresh_uid);
        let path = self
            .scratch
            .path()
            .join(series_uid)
            .join(format!("{}.dcm", sop_uid));
        synth::write_container(&container, &path)?;
        Ok(path)
    }

    fn generate_kind(&mut self, kind: PushKind, entries: &[String]) -> ReportResult<Vec<PathBuf>> {
        let series_uid = uid::fresh_uid();
        let mut generated = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let name = format!("{}_{}.png", idx, kind.file_tag());
            let staged = match kind {
                PushKind::Image => self.stage_image(entry, &name)?,
                PushKind::Report => self.stage_report(entry, &name)?,
            };
            let instance_number = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            generated.push(self.convert_staged(&staged, &series_uid, instance_number)?);
        }
        Ok(generated)
    }

    /// Convert every image and report entry. Images of one kind share a series.
    pub fn generate(&mut self) -> ReportResult<GeneratedContainers> {
        let request = self.request;
        let images = self.generate_kind(PushKind::Image, &request.image)?;
        let reports = self.generate_kind(PushKind::Report, &request.report)?;

        let series_number = match &self.reference {
            Some(reference) => synth::series_number_for(
                reference
                    .element(tags::SERIES_NUMBER)
                    .ok()
                    .and_then(|e| e.to_str().ok())
                    .as_deref(),
            ),
            None => synth::series_number_for(None),
        };

        Ok(GeneratedContainers {
            images,
            reports,
            series_number,
        })
    }
}

fn push_kind(
    pusher: &dyn Pusher,
    config: &ReportConfig,
    kind: PushKind,
    files: &[PathBuf],
    target: &PushEndpoint,
    series_number: &str,
    series_iuid: &str,
) -> PushStatus {
    if files.is_empty() {
        return PushStatus::Skipped;
    }

    let job = PushJob {
        files,
        target,
        calling_ae: &config.pacs.calling_ae_title,
        series_description: kind.series_description(),
        series_number,
        settings: &config.pacs,
    };
    match pusher.push(&job) {
        Ok(()) => {
            info!(series_iuid, node = %target, kind = ?kind, count = files.len(), "push succeeded");
            PushStatus::Ok
        }
        Err(e) => {
            error!(series_iuid, node = %target, kind = ?kind, "push failed: {:#}", e);
            PushStatus::Error
        }
    }
}

/// Convert the request's rasters and push them to every target. Per-target,
/// per-kind failures are recorded in the summary, never propagated.
pub fn report_push(
    config: &ReportConfig,
    request: &PushRequest,
    lookup: &dyn SeriesLookup,
    pusher: &dyn Pusher,
) -> ReportResult<PushSummary> {
    let product: Product = request.product.parse()?;
    validate_uid("series_iuid", &request.series_iuid)?;

    let root = DataRoot::new(&config.data_path);
    ensure_dir(&root.report_root(product))?;

    let mut generator = ReportGenerator::new(config, product, request, lookup)?;
    let generated = generator.generate()?;

    let mut summary = PushSummary::default();
    if generated.images.is_empty() && generated.reports.is_empty() {
        warn!(series_iuid = %request.series_iuid, "nothing to push");
        return Ok(summary);
    }

    for pacs in &request.pacs {
        let target = pacs.endpoint();
        let image = push_kind(
            pusher,
            config,
            PushKind::Image,
            &generated.images,
            &target,
            &generated.series_number,
            &request.series_iuid,
        );
        let report = push_kind(
            pusher,
            config,
            PushKind::Report,
            &generated.reports,
            &target,
            &generated.series_number,
            &request.series_iuid,
        );
        summary.targets.push(TargetOutcome {
            target,
            image,
            report,
        });
    }

    Ok(summary)
}
