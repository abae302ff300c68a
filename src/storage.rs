//
// storage.rs
// Report-Tools-rs
//
// Filesystem layout under the configured data root, plus conversion between
// absolute and root-relative paths with a path traversal guard.
//
// Report-Tools-rs maintainers - October 2026

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{ReportError, ReportResult};
use crate::models::ReportImageType;
use crate::products::Product;

const SCRATCH_DIR: &str = "FB_TMP";

#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `{root}/{product}_report`
    pub fn report_root(&self, product: Product) -> PathBuf {
        self.root.join(format!("{}_report", product))
    }

    /// `{root}/{product}_report/{category-subdir}/{series}`
    pub fn report_image_dir(
        &self,
        product: Product,
        category: ReportImageType,
        series_iuid: &str,
    ) -> PathBuf {
        self.report_root(product)
            .join(category.subdir())
            .join(series_iuid)
    }

    /// `{root}/{product}_report/FB_TMP/{series}`
    pub fn push_scratch_dir(&self, product: Product, series_iuid: &str) -> PathBuf {
        self.report_root(product).join(SCRATCH_DIR).join(series_iuid)
    }

    /// `{root}/RESULT/ssr/{product}/{series}/dcm/screenshots`
    pub fn screenshot_dir(&self, product: Product, series_iuid: &str) -> PathBuf {
        self.root
            .join("RESULT")
            .join("ssr")
            .join(product.as_str())
            .join(series_iuid)
            .join("dcm")
            .join("screenshots")
    }

    /// Strip the data root (or its canonical form) from `path`. Paths outside
    /// the root come back unchanged apart from the leading separator.
    pub fn to_relative(&self, path: &Path) -> String {
        let stripped = path
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
            .or_else(|| {
                let canonical = self.root.canonicalize().ok()?;
                path.strip_prefix(&canonical).ok().map(Path::to_path_buf)
            })
            .unwrap_or_else(|| path.to_path_buf());

        stripped
            .to_string_lossy()
            .trim_start_matches('/')
            .to_string()
    }

    /// Join a stored relative path onto the root. A leading separator is ignored.
    pub fn to_absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }

    /// Resolve a stored relative path to an existing file inside the root.
    pub fn resolve_existing(&self, relative: &str) -> ReportResult<PathBuf> {
        let relative = relative.trim_start_matches('/');
        // Guard against path traversal before touching the filesystem.
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ReportError::Validation(format!(
                "path `{}` escapes the data root",
                relative
            )));
        }

        let candidate = self.root.join(relative);
        if !candidate.is_file() {
            return Err(ReportError::io(
                format!("file {} not found", candidate.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(candidate)
    }
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> ReportResult<()> {
    fs::create_dir_all(dir).map_err(|e| ReportError::io_at("create directory", dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_matches_expected_structure() {
        let root = DataRoot::new("/data");
        assert_eq!(
            root.report_image_dir(Product::MrHead, ReportImageType::Upload, "1.2"),
            PathBuf::from("/data/mr_head_report/image/upload/1.2")
        );
        assert_eq!(
            root.push_scratch_dir(Product::CtBmd, "1.2"),
            PathBuf::from("/data/ct_bmd_report/FB_TMP/1.2")
        );
        assert_eq!(
            root.screenshot_dir(Product::CtHeart, "1.2"),
            PathBuf::from("/data/RESULT/ssr/ct_heart/1.2/dcm/screenshots")
        );
    }

    #[test]
    fn relative_and_absolute_round_trip() {
        let root = DataRoot::new("/data");
        let abs = PathBuf::from("/data/RESULT/ssr/x.dcm");
        let rel = root.to_relative(&abs);
        assert_eq!(rel, "RESULT/ssr/x.dcm");
        assert_eq!(root.to_absolute(&rel), abs);
        assert_eq!(root.to_absolute("/RESULT/ssr/x.dcm"), abs);
    }

    #[test]
    fn resolve_rejects_traversal_and_missing_files() {
        let dir = tempdir().expect("tempdir");
        let root = DataRoot::new(dir.path());
        fs::write(dir.path().join("a.png"), b"png").expect("write");

        assert!(root.resolve_existing("a.png").is_ok());
        assert!(root.resolve_existing("/a.png").is_ok());
        assert!(matches!(
            root.resolve_existing("../a.png"),
            Err(ReportError::Validation(_))
        ));
        assert!(root.resolve_existing("b.png").unwrap_err().is_file_gone());
    }
}
