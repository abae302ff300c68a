//
// config.rs
// Report-Tools-rs
//
// Explicit runtime configuration: data root, remote result service, PACS push
// settings, synthesis markers and the product table. Loaded from TOML with
// environment overrides and threaded through every entry point.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dicom::core::Tag;
use serde::Deserialize;
use tracing::info;

use crate::products::ProductTable;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Root that every stored relative path is resolved against.
    pub data_path: PathBuf,
    /// Directory holding captured containers used as film templates.
    pub series_scratch_dir: PathBuf,
    pub film_canvas_edge: u32,
    pub repacs: RepacsConfig,
    pub pacs: PacsConfig,
    pub synthesis: SynthesisConfig,
    pub products: ProductTable,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepacsConfig {
    pub host: String,
    pub port: u16,
    pub lookup_timeout_secs: u64,
    pub result_timeout_secs: u64,
}

/// Settings handed to the push collaborator for every job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacsConfig {
    pub calling_ae_title: String,
    pub medium_type: String,
    pub left_info: String,
    pub right_info: String,
    pub bottom_info: String,
    pub font_size: u32,
    pub letter_spacing: u32,
    pub custom_film_format: bool,
    pub unvalidated_ae_titles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisConfig {
    pub content_label: String,
    pub content_description: String,
    pub content_creator: String,
    /// Tags written as "GGGG,EEEE" that are dropped unless full-tag output is requested.
    pub strip_tags: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("/data/DICOMS"),
            series_scratch_dir: PathBuf::from("/tmp/report-tools/series"),
            film_canvas_edge: 512,
            repacs: RepacsConfig::default(),
            pacs: PacsConfig::default(),
            synthesis: SynthesisConfig::default(),
            products: ProductTable::default(),
        }
    }
}

impl Default for RepacsConfig {
    fn default() -> Self {
        Self {
            host: "repacs".to_string(),
            port: 3333,
            lookup_timeout_secs: 3,
            result_timeout_secs: 7,
        }
    }
}

impl Default for PacsConfig {
    fn default() -> Self {
        Self {
            calling_ae_title: "TXPACS".to_string(),
            medium_type: "BLUE FILM".to_string(),
            left_info: "PatientName,PatientID,PatientAge+PatientSex,StudyDate,StudyTime"
                .to_string(),
            right_info: "HospitalName,Manufacturer,SeriesDescription".to_string(),
            bottom_info: "WindowWidth,WindowCenter".to_string(),
            font_size: 15,
            letter_spacing: 1,
            custom_film_format: false,
            unvalidated_ae_titles: Vec::new(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let strip_tags = [
            "0008,1111", // ReferencedPerformedProcedureStepSequence
            "0008,1140", // ReferencedImageSequence
            "0008,2112", // SourceImageSequence
            "0018,0050", // SliceThickness
            "0020,0032", // ImagePositionPatient
            "0020,0037", // ImageOrientationPatient
            "0020,1041", // SliceLocation
            "0028,0030", // PixelSpacing
            "0028,0106", // SmallestImagePixelValue
            "0028,0107", // LargestImagePixelValue
            "0028,1055", // WindowCenterWidthExplanation
            "0028,3000", // ModalityLUTSequence
            "0028,3010", // VOILUTSequence
            "0040,0275", // RequestAttributesSequence
            "0088,0200", // IconImageSequence
        ];
        Self {
            content_label: "UNNAMED".to_string(),
            content_description: "UNNAMED".to_string(),
            content_creator: "REPORT^TOOLS".to_string(),
            strip_tags: strip_tags.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RepacsConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

impl SynthesisConfig {
    pub fn parsed_strip_tags(&self) -> Result<Vec<Tag>> {
        self.strip_tags.iter().map(|s| parse_tag(s)).collect()
    }
}

impl ReportConfig {
    /// Configuration rooted at `data_path` with every other field defaulted.
    pub fn with_data_path(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    /// Load from an optional TOML file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?;
                let config = Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config {:?}", path))?;
                info!(config = %path.display(), "configuration loaded");
                config
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("REPORT_DATA_PATH") {
            self.data_path = PathBuf::from(path);
        }
        if let Ok(host) = std::env::var("REPACS_HOST") {
            self.repacs.host = host;
        }
        if let Some(port) = std::env::var("REPACS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.repacs.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.film_canvas_edge == 0 {
            bail!("film_canvas_edge must be greater than zero");
        }
        if self.pacs.calling_ae_title.is_empty() || self.pacs.calling_ae_title.len() > 16 {
            bail!(
                "calling AE title `{}` must be 1-16 characters",
                self.pacs.calling_ae_title
            );
        }
        self.synthesis
            .parsed_strip_tags()
            .context("Invalid synthesis.strip_tags entry")?;
        Ok(())
    }
}

/// Parse a tag written as "GGGG,EEEE" (parentheses optional).
pub fn parse_tag(input: &str) -> Result<Tag> {
    let trimmed = input.trim().trim_start_matches('(').trim_end_matches(')');
    let (group, element) = trimmed
        .split_once(',')
        .with_context(|| format!("tag `{}` is not in GGGG,EEEE form", input))?;
    let group = u16::from_str_radix(group.trim(), 16)
        .with_context(|| format!("invalid group in tag `{}`", input))?;
    let element = u16::from_str_radix(element.trim(), 16)
        .with_context(|| format!("invalid element in tag `{}`", input))?;
    Ok(Tag(group, element))
}
