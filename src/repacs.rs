//
// repacs.rs
// Report-Tools-rs
//
// Blocking HTTP client for the remote series/result service, behind the
// `SeriesLookup` and `ResultStore` traits used by the orchestrators.
//
// Report-Tools-rs maintainers - October 2026

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde_json::Value;
use tracing::debug;

use crate::config::RepacsConfig;
use crate::error::{ReportError, ReportResult};
use crate::models::SeriesInfo;

/// Resolves the stored images of a series.
pub trait SeriesLookup {
    fn series_info(&self, series_iuid: &str) -> ReportResult<SeriesInfo>;
}

/// Whole-document access to per-series, per-type result records.
pub trait ResultStore {
    fn fetch_result(&self, result_type: &str, series_iuid: &str) -> ReportResult<Value>;
    fn save_result(&self, record: &Value, result_type: &str, series_iuid: &str) -> ReportResult<()>;
}

pub struct RepacsClient {
    client: Client,
    base_url: String,
    lookup_timeout: Duration,
    result_timeout: Duration,
}

impl RepacsClient {
    pub fn new(config: &RepacsConfig) -> ReportResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.lookup_timeout())
            .build()
            .map_err(|e| ReportError::RemoteUnavailable {
                url: config.base_url(),
                source: e,
            })?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            lookup_timeout: config.lookup_timeout(),
            result_timeout: config.result_timeout(),
        })
    }

    fn series_url(&self, series_iuid: &str) -> String {
        format!("{}/series/{}", self.base_url, series_iuid)
    }

    fn result_url(&self, result_type: &str, series_iuid: &str) -> String {
        format!("{}/series/{}/{}", self.base_url, series_iuid, result_type)
    }
}

fn check_status(url: &str, response: Response) -> ReportResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ReportError::RemoteStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn unavailable(url: &str) -> impl FnOnce(reqwest::Error) -> ReportError {
    let url = url.to_string();
    move |source| ReportError::RemoteUnavailable { url, source }
}

impl SeriesLookup for RepacsClient {
    fn series_info(&self, series_iuid: &str) -> ReportResult<SeriesInfo> {
        let url = self.series_url(series_iuid);
        debug!(url = %url, "series lookup");
        let response = self
            .client
            .get(&url)
            .timeout(self.lookup_timeout)
            .send()
            .map_err(unavailable(&url))?;
        check_status(&url, response)?
            .json::<SeriesInfo>()
            .map_err(unavailable(&url))
    }
}

impl ResultStore for RepacsClient {
    fn fetch_result(&self, result_type: &str, series_iuid: &str) -> ReportResult<Value> {
        let url = self.result_url(result_type, series_iuid);
        debug!(url = %url, "result fetch");
        let response = self
            .client
            .get(&url)
            .timeout(self.result_timeout)
            .send()
            .map_err(unavailable(&url))?;
        check_status(&url, response)?
            .json::<Value>()
            .map_err(unavailable(&url))
    }

    fn save_result(&self, record: &Value, result_type: &str, series_iuid: &str) -> ReportResult<()> {
        let url = self.result_url(result_type, series_iuid);
        debug!(url = %url, "result save");
        let response = self
            .client
            .put(&url)
            .timeout(self.result_timeout)
            .json(record)
            .send()
            .map_err(unavailable(&url))?;
        check_status(&url, response).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_service_layout() {
        let client = RepacsClient::new(&RepacsConfig::default()).expect("client");
        assert_eq!(client.series_url("1.2.3"), "http://repacs:3333/series/1.2.3");
        assert_eq!(
            client.result_url("mr_head_film", "1.2.3"),
            "http://repacs:3333/series/1.2.3/mr_head_film"
        );
    }

    #[test]
    fn series_info_parses_storage_paths() {
        let info: SeriesInfo = serde_json::from_str(
            r#"{"images": [{"storagePath": "DICOM/1.2.3/a.dcm", "instanceNumber": 1}], "total": 1}"#,
        )
        .expect("parse");
        assert_eq!(info.images[0].storage_path, "DICOM/1.2.3/a.dcm");
    }
}
