//
// imagedb.rs
// Report-Tools-rs
//
// Thin disk writer for report rasters and their JSON sidecars.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{ReportError, ReportResult};
use crate::models::CacheEntry;

/// Decode a base64 payload, tolerating a `data:<mime>;base64,` prefix and
/// embedded whitespace.
pub fn decode_base64(payload: &str) -> ReportResult<Vec<u8>> {
    let body = match payload.split_once(";base64,") {
        Some((header, body)) if header.starts_with("data:") => body,
        _ => payload,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ReportError::Decode("empty image payload".into()));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ReportError::Decode(e.to_string()))
}

pub struct ImageDb;

impl ImageDb {
    /// Write an already decoded raster as-is.
    pub fn save_raster(path: &Path, bytes: &[u8]) -> ReportResult<()> {
        fs::write(path, bytes).map_err(|e| ReportError::io_at("write raster", path, e))
    }

    pub fn save_cache(path: &Path, entry: &CacheEntry) -> ReportResult<()> {
        let content = serde_json::to_vec(entry)
            .map_err(|e| ReportError::container("Failed to serialize cache entry", e))?;
        fs::write(path, content).map_err(|e| ReportError::io_at("write cache", path, e))
    }

    pub fn load_cache(path: &Path) -> ReportResult<CacheEntry> {
        let content = fs::read(path).map_err(|e| ReportError::io_at("read cache", path, e))?;
        serde_json::from_slice(&content)
            .map_err(|e| ReportError::container(format!("Invalid cache file {}", path.display()), e))
    }

    /// Delete a file or a whole directory tree.
    pub fn remove(path: &Path) -> ReportResult<()> {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| ReportError::io_at("remove", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheOption, ReportImageType};
    use tempfile::tempdir;

    #[test]
    fn decode_strips_data_url_header() {
        let plain = decode_base64("aGVsbG8=").unwrap();
        let prefixed = decode_base64("data:image/png;base64,aGVs\nbG8=").unwrap();
        assert_eq!(plain, b"hello");
        assert_eq!(prefixed, b"hello");
        assert!(matches!(decode_base64("   "), Err(ReportError::Decode(_))));
        assert!(matches!(decode_base64("***"), Err(ReportError::Decode(_))));
    }

    #[test]
    fn cache_entries_round_trip_and_remove() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.cache.json");
        let entry = CacheEntry {
            report_image_type: ReportImageType::Upload,
            series_iuid: "1.2.3".into(),
            option: CacheOption::from_front_end(None, 1.0),
            path: "ct_bmd_report/image/upload/1.2.3/a.png".into(),
        };

        ImageDb::save_cache(&path, &entry).expect("save");
        assert_eq!(ImageDb::load_cache(&path).expect("load"), entry);

        ImageDb::remove(&path).expect("remove");
        assert!(!path.exists());
        assert!(ImageDb::remove(&path).unwrap_err().is_file_gone());
    }
}
