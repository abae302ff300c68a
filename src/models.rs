//
// models.rs
// Report-Tools-rs
//
// Request, response and on-disk records exchanged with the front end, the
// remote result service and the push collaborator.
//
// Report-Tools-rs maintainers - October 2026

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ReportError;
use crate::products::Product;

/// Category of an image shown in an image-text report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportImageType {
    Preset,
    Screenshot,
    Upload,
}

impl ReportImageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportImageType::Preset => "preset",
            ReportImageType::Screenshot => "screenshot",
            ReportImageType::Upload => "upload",
        }
    }

    /// Subdirectory of `{product}_report/` that stores this category.
    pub fn subdir(self) -> &'static str {
        match self {
            ReportImageType::Preset => "image/preset",
            ReportImageType::Screenshot => "image/screenshot",
            ReportImageType::Upload => "image/upload",
        }
    }
}

impl FromStr for ReportImageType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "preset" => Ok(ReportImageType::Preset),
            "screenshot" => Ok(ReportImageType::Screenshot),
            "upload" => Ok(ReportImageType::Upload),
            other => Err(ReportError::Validation(format!(
                "unknown report image type `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an uploaded image is going to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Report,
    Film,
}

impl FromStr for Target {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "report" => Ok(Target::Report),
            "film" => Ok(Target::Film),
            other => Err(ReportError::Validation(format!("unknown target `{}`", other))),
        }
    }
}

/// One image posted by the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    pub series_iuid: String,
    /// Base64 encoded raster, optionally prefixed with a data URL header.
    #[serde(default)]
    pub image: String,
    #[serde(alias = "predict_type")]
    pub product: String,
    #[serde(deserialize_with = "deserialize_targets")]
    pub target: Vec<Target>,
    /// Kept as text so an unknown category surfaces as a validation error
    /// at conversion time rather than as a parse failure.
    #[serde(default)]
    pub report_image_type: String,
    #[serde(default)]
    pub option: Option<Value>,
    #[serde(default)]
    pub extra: Option<Value>,
}

impl ImageItem {
    pub fn category(&self) -> Result<ReportImageType, ReportError> {
        self.report_image_type.parse()
    }

    pub fn product(&self) -> Result<Product, ReportError> {
        self.product.parse()
    }

    pub fn wants(&self, target: Target) -> bool {
        self.target.contains(&target)
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        validate_uid("series_iuid", &self.series_iuid)?;
        if self.target.is_empty() {
            return Err(ReportError::Validation("at least one target is required".into()));
        }
        Ok(())
    }
}

/// Identifiers become path components, so only UID syntax is accepted:
/// dot-separated runs of digits, at most 64 characters.
pub fn validate_uid(field: &str, value: &str) -> Result<(), ReportError> {
    if value.is_empty() {
        return Err(ReportError::Validation(format!("{} is required", field)));
    }
    let well_formed = value.len() <= 64
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(ReportError::Validation(format!(
            "{} `{}` is not a valid identifier",
            field, value
        )));
    }
    Ok(())
}

fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<Target>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    let parts: Vec<String> = match Raw::deserialize(deserializer)? {
        Raw::Joined(s) => s.split(',').map(str::to_string).collect(),
        Raw::List(items) => items,
    };

    let mut targets = Vec::new();
    for part in parts.iter().filter(|p| !p.trim().is_empty()) {
        let target: Target = part.parse().map_err(serde::de::Error::custom)?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    Ok(targets)
}

/// Sidecar written next to each stored report raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub report_image_type: ReportImageType,
    pub series_iuid: String,
    pub option: CacheOption,
    /// Raster path relative to the data root.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOption {
    #[serde(default)]
    pub desc: String,
    #[serde(default = "default_option_id")]
    pub id: i64,
    #[serde(rename = "imageId", default)]
    pub image_id: String,
    pub timestamp: f64,
    /// Any additional front-end keys, kept in their original order.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_option_id() -> i64 {
    1
}

impl CacheOption {
    /// Defaults overlaid with whatever the front end supplied; the timestamp is always fresh.
    pub fn from_front_end(option: Option<&Value>, timestamp: f64) -> Self {
        let mut merged = CacheOption {
            desc: String::new(),
            id: default_option_id(),
            image_id: String::new(),
            timestamp,
            extra: Map::new(),
        };

        if let Some(Value::Object(fields)) = option {
            for (key, value) in fields {
                match key.as_str() {
                    "desc" => {
                        if let Some(s) = value.as_str() {
                            merged.desc = s.to_string();
                        }
                    }
                    "id" => {
                        if let Some(id) = value.as_i64() {
                            merged.id = id;
                        }
                    }
                    "imageId" => {
                        if let Some(s) = value.as_str() {
                            merged.image_id = s.to_string();
                        }
                    }
                    "timestamp" => {}
                    _ => {
                        merged.extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        merged
    }
}

/// PACS destination as sent by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacsTarget {
    #[serde(alias = "pacs_sevrer_ip")]
    pub pacs_server_ip: String,
    pub pacs_server_port: u16,
    pub pacs_client_aet: String,
}

impl PacsTarget {
    pub fn endpoint(&self) -> PushEndpoint {
        PushEndpoint {
            server_ae: self.pacs_client_aet.clone(),
            server_ip: self.pacs_server_ip.clone(),
            server_port: self.pacs_server_port,
        }
    }
}

/// Descriptor handed to the push collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEndpoint {
    pub server_ae: String,
    pub server_ip: String,
    pub server_port: u16,
}

impl PushEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.server_ip, self.server_port)
    }
}

impl fmt::Display for PushEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.server_ae, self.server_ip, self.server_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub series_iuid: String,
    pub study_iuid: String,
    pub patient_id: String,
    /// Report rasters: data-root relative paths, or base64 payloads.
    #[serde(default)]
    pub report: Vec<String>,
    /// Image rasters as data-root relative paths.
    #[serde(default)]
    pub image: Vec<String>,
    pub pacs: Vec<PacsTarget>,
    pub product: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: PushEndpoint,
    pub image: PushStatus,
    pub report: PushStatus,
}

/// Per-target result of a push request. Empty when nothing was generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub targets: Vec<TargetOutcome>,
}

impl PushSummary {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Outcome of the final target processed.
    pub fn last(&self) -> Option<&TargetOutcome> {
        self.targets.last()
    }

    pub fn all_ok(&self) -> bool {
        self.targets
            .iter()
            .all(|t| t.image != PushStatus::Error && t.report != PushStatus::Error)
    }
}

/// Subset of the remote series document needed to locate a template container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesInfo {
    #[serde(default)]
    pub images: Vec<SeriesImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesImage {
    pub storage_path: String,
}
