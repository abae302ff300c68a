//
// error.rs
// Report-Tools-rs
//
// Error taxonomy shared by the conversion, aggregation and push pipelines.
//
// Report-Tools-rs maintainers - October 2026

use std::io;
use std::path::Path;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Unknown category, product or result type; nothing has been written yet.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("remote request to {url} failed: {source}")]
    RemoteUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote request to {url} returned status {status}")]
    RemoteStatus { url: String, status: u16 },

    #[error("{context}: {source}")]
    LocalIo {
        context: String,
        #[source]
        source: io::Error,
    },

    /// No template container could be located for the series.
    #[error("no reference container available: {0}")]
    MissingReference(String),

    #[error("reference container is not usable: {0}")]
    InvalidReference(String),

    #[error("failed to decode image payload: {0}")]
    Decode(String),

    #[error("{context}: {source}")]
    Container {
        context: String,
        #[source]
        source: BoxError,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

impl ReportError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ReportError::LocalIo {
            context: context.into(),
            source,
        }
    }

    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        ReportError::io(format!("failed to {} {}", action, path.display()), source)
    }

    pub fn container<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ReportError::Container {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True for the "file already removed" case that best-effort deletes swallow.
    pub fn is_file_gone(&self) -> bool {
        matches!(
            self,
            ReportError::LocalIo { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ReportError::RemoteUnavailable { .. } | ReportError::RemoteStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_io_is_classified_as_file_gone() {
        let err = ReportError::io("remove", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_file_gone());

        let denied = ReportError::io("remove", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_file_gone());
        assert!(!ReportError::Validation("x".into()).is_file_gone());
    }

    #[test]
    fn remote_status_is_remote() {
        let err = ReportError::RemoteStatus {
            url: "http://repacs:3333/series/1".into(),
            status: 404,
        };
        assert!(err.is_remote());
        assert!(err.to_string().contains("404"));
    }
}
