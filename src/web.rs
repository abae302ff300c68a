//
// web.rs
// Report-Tools-rs
//
// Axum HTTP API over the conversion, film removal, push and preview entry points.
//
// Report-Tools-rs maintainers - October 2026

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::image;
use crate::models::{ImageItem, PushRequest, PushSummary};
use crate::products::Product;
use crate::push;
use crate::repacs::RepacsClient;
use crate::report::{self, ConversionOutcome};
use crate::scu::StoreScu;
use crate::storage::DataRoot;

#[derive(Clone)]
struct AppState {
    config: Arc<ReportConfig>,
}

/// Error body returned by every handler.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("worker failed: {}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(json!({ "success": false, "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn status_for(err: &ReportError) -> StatusCode {
    match err {
        ReportError::Validation(_) | ReportError::Decode(_) => StatusCode::BAD_REQUEST,
        ReportError::MissingReference(_) => StatusCode::NOT_FOUND,
        e if e.is_file_gone() => StatusCode::NOT_FOUND,
        e if e.is_remote() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(config: ReportConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/api/images", post(convert_handler))
        .route("/api/images/film", delete(remove_film_handler))
        .route("/api/push", post(push_handler))
        .route("/api/preview", get(preview_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_server(config: ReportConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(config);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn convert_handler(
    State(state): State<AppState>,
    Json(item): Json<ImageItem>,
) -> ApiResult<Json<ConversionOutcome>> {
    let config = state.config.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let store = RepacsClient::new(&config.repacs)?;
        report::convert(&config, &item, &store)
    })
    .await??;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct RemoveFilmRequest {
    #[serde(alias = "predict_type")]
    product: String,
    series_iuid: String,
    path: PathBuf,
}

async fn remove_film_handler(
    State(state): State<AppState>,
    Json(request): Json<RemoveFilmRequest>,
) -> ApiResult<Json<Value>> {
    let product: Product = request.product.parse()?;
    let config = state.config.clone();
    let removed = tokio::task::spawn_blocking(move || {
        let store = RepacsClient::new(&config.repacs)?;
        report::remove_film(&config, product, &request.series_iuid, &request.path, &store)
    })
    .await??;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

async fn push_handler(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> ApiResult<Json<PushSummary>> {
    let config = state.config.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let lookup = RepacsClient::new(&config.repacs)?;
        push::report_push(&config, &request, &lookup, &StoreScu::new())
    })
    .await??;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    path: String,
    #[serde(default)]
    frame: u32,
}

async fn preview_handler(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<impl IntoResponse> {
    let root = DataRoot::new(&state.config.data_path);
    let path = root.resolve_existing(&query.path)?;
    let bytes = tokio::task::spawn_blocking(move || image::container_preview_png(&path, query.frame))
        .await?
        .map_err(|e| ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: format!("{:#}", e),
        })?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            status_for(&ReportError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ReportError::MissingReference("none".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ReportError::io("read", io::Error::from(io::ErrorKind::NotFound))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ReportError::RemoteStatus {
                url: "http://repacs".into(),
                status: 500
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ReportError::io("write", io::Error::from(io::ErrorKind::PermissionDenied))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
