//
// batch.rs
// Report-Tools-rs
//
// Converts a directory of ImageItem JSON files. Items of one series run in
// order on one worker; distinct series run in parallel.
//
// Report-Tools-rs maintainers - October 2026

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};
use walkdir::WalkDir;

use crate::config::ReportConfig;
use crate::models::ImageItem;
use crate::repacs::ResultStore;
use crate::report::{self, ConversionOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub file: PathBuf,
    pub series_iuid: Option<String>,
    pub outcome: Option<ConversionOutcome>,
    pub error: Option<String>,
}

impl BatchEntry {
    fn failed(file: PathBuf, series_iuid: Option<String>, error: String) -> Self {
        Self {
            file,
            series_iuid,
            outcome: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

fn item_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
        .map(|e| e.into_path())
        .collect()
}

fn load_item(path: &Path) -> Result<ImageItem> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&content).with_context(|| format!("Invalid image item {}", path.display()))
}

pub fn process_directory(
    config: &ReportConfig,
    dir: &Path,
    store: &(dyn ResultStore + Sync),
) -> Result<BatchSummary> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let files = item_files(dir);
    info!(dir = %dir.display(), count = files.len(), "batch started");

    let mut summary = BatchSummary::default();
    let mut by_series: BTreeMap<String, Vec<(PathBuf, ImageItem)>> = BTreeMap::new();
    for file in files {
        match load_item(&file) {
            Ok(item) => by_series
                .entry(item.series_iuid.clone())
                .or_default()
                .push((file, item)),
            Err(e) => {
                error!(file = %file.display(), "{:#}", e);
                summary.entries.push(BatchEntry::failed(file, None, format!("{:#}", e)));
            }
        }
    }

    let converted: Vec<Vec<BatchEntry>> = by_series
        .par_iter()
        .map(|(series_iuid, items)| {
            items
                .iter()
                .map(|(file, item)| match report::convert(config, item, store) {
                    Ok(outcome) => BatchEntry {
                        file: file.clone(),
                        series_iuid: Some(series_iuid.clone()),
                        outcome: Some(outcome),
                        error: None,
                    },
                    Err(e) => {
                        error!(file = %file.display(), series_iuid = %series_iuid, "conversion failed: {}", e);
                        BatchEntry::failed(file.clone(), Some(series_iuid.clone()), e.to_string())
                    }
                })
                .collect()
        })
        .collect();
    summary.entries.extend(converted.into_iter().flatten());

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportResult;
    use serde_json::Value;
    use tempfile::tempdir;

    struct NullStore;

    impl ResultStore for NullStore {
        fn fetch_result(&self, _: &str, _: &str) -> ReportResult<Value> {
            Ok(Value::Null)
        }

        fn save_result(&self, _: &Value, _: &str, _: &str) -> ReportResult<()> {
            Ok(())
        }
    }

    #[test]
    fn report_items_are_converted_and_bad_files_reported() {
        let data = tempdir().expect("tempdir");
        let items = tempdir().expect("tempdir");
        let config = ReportConfig::with_data_path(data.path());

        for (name, series) in [("a.json", "1.1"), ("b.json", "1.1"), ("c.json", "2.2")] {
            let item = serde_json::json!({
                "series_iuid": series,
                "image": "aGVsbG8=",
                "product": "ct_bmd",
                "target": "report",
                "report_image_type": "upload"
            });
            fs::write(items.path().join(name), item.to_string()).unwrap();
        }
        fs::write(items.path().join("broken.json"), b"{not json").unwrap();
        fs::write(items.path().join("ignored.txt"), b"x").unwrap();

        let summary = process_directory(&config, items.path(), &NullStore).expect("batch");
        assert_eq!(summary.entries.len(), 4);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 1);

        let stored = WalkDir::new(data.path().join("ct_bmd_report/image/upload/1.1"))
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "png"))
            .count();
        assert_eq!(stored, 2);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let config = ReportConfig::with_data_path(dir.path());
        assert!(process_directory(&config, &dir.path().join("nope"), &NullStore).is_err());
    }
}
