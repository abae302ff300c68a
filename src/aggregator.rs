//
// aggregator.rs
// Report-Tools-rs
//
// Adds and removes container references inside the "Custom" collection of a
// remote result record. Records are fetched fresh, edited in memory and written
// back whole; concurrent writers to one series are not coordinated.
//
// Report-Tools-rs maintainers - October 2026

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::ReportResult;
use crate::imagedb::ImageDb;
use crate::products::{CustomShape, ResultType};
use crate::repacs::ResultStore;
use crate::storage::DataRoot;

const CUSTOM_KEY: &str = "Custom";

pub struct ResultAggregator<'a> {
    store: &'a dyn ResultStore,
    root: DataRoot,
    tolerant: bool,
}

impl<'a> ResultAggregator<'a> {
    /// Fetch failures are tolerated by default and read as an empty record.
    pub fn new(store: &'a dyn ResultStore, root: DataRoot) -> Self {
        Self {
            store,
            root,
            tolerant: true,
        }
    }

    /// Propagate fetch failures instead of substituting an empty record.
    pub fn strict(mut self) -> Self {
        self.tolerant = false;
        self
    }

    fn fetch(&self, result_type: &ResultType, series_iuid: &str) -> ReportResult<Value> {
        match self.store.fetch_result(&result_type.name, series_iuid) {
            Ok(Value::Object(record)) => Ok(Value::Object(record)),
            Ok(Value::Null) => Ok(Value::Object(Map::new())),
            Ok(other) if self.tolerant => {
                warn!(
                    result_type = %result_type.name,
                    series_iuid,
                    "result record is not an object, starting from empty: {}",
                    other
                );
                Ok(Value::Object(Map::new()))
            }
            Ok(other) => Ok(other),
            Err(e) if self.tolerant => {
                warn!(
                    result_type = %result_type.name,
                    series_iuid,
                    "result fetch failed, starting from empty record: {}",
                    e
                );
                Ok(Value::Object(Map::new()))
            }
            Err(e) => Err(e),
        }
    }

    /// Append `path` (stored root-relative) to the Custom collection.
    pub fn add_reference(
        &self,
        result_type: &ResultType,
        shape: CustomShape,
        series_iuid: &str,
        path: &Path,
    ) -> ReportResult<()> {
        let relative = self.root.to_relative(path);
        let mut record = self.fetch(result_type, series_iuid)?;

        let custom = custom_collection(&mut record, result_type, shape);
        if let Some(items) = custom.as_array_mut() {
            items.push(Value::String(relative.clone()));
        } else if let Some(entries) = custom.as_object_mut() {
            entries.insert(map_key(&relative), Value::String(relative.clone()));
        }

        self.store.save_result(&record, &result_type.name, series_iuid)?;
        info!(
            result_type = %result_type.name,
            series_iuid,
            path = %relative,
            "reference added"
        );
        Ok(())
    }

    /// Remove `path` from the Custom collection and delete the local file.
    /// Returns `false`, leaving the record untouched, when the path is not listed.
    pub fn remove_reference(
        &self,
        result_type: &ResultType,
        shape: CustomShape,
        series_iuid: &str,
        path: &Path,
    ) -> ReportResult<bool> {
        let relative = self.root.to_relative(path);
        let mut record = self.fetch(result_type, series_iuid)?;

        let custom = custom_collection(&mut record, result_type, shape);
        let removed = match custom {
            Value::Array(items) => match items.iter().position(|v| v.as_str() == Some(relative.as_str())) {
                Some(idx) => {
                    items.remove(idx);
                    true
                }
                None => false,
            },
            Value::Object(entries) => {
                let before = entries.len();
                entries.retain(|_, v| v.as_str() != Some(relative.as_str()));
                entries.len() != before
            }
            _ => false,
        };

        if !removed {
            warn!(
                result_type = %result_type.name,
                series_iuid,
                path = %relative,
                "reference not present, nothing removed"
            );
            return Ok(false);
        }

        self.store.save_result(&record, &result_type.name, series_iuid)?;
        self.delete_local(&relative);
        info!(
            result_type = %result_type.name,
            series_iuid,
            path = %relative,
            "reference removed"
        );
        Ok(true)
    }

    fn delete_local(&self, relative: &str) {
        let absolute = self.root.to_absolute(relative);
        match ImageDb::remove(&absolute) {
            Ok(()) => {}
            Err(e) if e.is_file_gone() => {
                warn!(path = %absolute.display(), "file already removed");
            }
            Err(e) => {
                warn!(path = %absolute.display(), "failed to delete file: {}", e);
            }
        }
    }
}

/// Locate `record[collection]["Custom"]`, creating the collection and an empty
/// Custom value of the product's shape when missing or empty.
fn custom_collection<'r>(
    record: &'r mut Value,
    result_type: &ResultType,
    shape: CustomShape,
) -> &'r mut Value {
    if !record.is_object() {
        *record = Value::Object(Map::new());
    }
    let collection = &mut record[result_type.collection.record_key()];
    if !collection.is_object() {
        *collection = Value::Object(Map::new());
    }

    let custom = &mut collection[CUSTOM_KEY];
    let usable = match custom {
        Value::Array(items) => !items.is_empty() || shape == CustomShape::List,
        Value::Object(entries) => !entries.is_empty() || shape == CustomShape::Map,
        _ => false,
    };
    if !usable {
        *custom = match shape {
            CustomShape::List => Value::Array(Vec::new()),
            CustomShape::Map => Value::Object(Map::new()),
        };
    }
    custom
}

fn map_key(relative: &str) -> String {
    Path::new(relative)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.to_string())
}
