use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use helios_core::{
    DiscoveryReport, FileRecord, FileStatus, ManifestFilter, QueryLogRecord, SanitizedConfig,
    SchedulerStatus, Stage,
};

use crate::state::AppState;

const SERVICE_NAME: &str = "helios";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Trailing window for the counts-by-status summary.
const STATUS_WINDOW_HOURS: i64 = 24;

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME,
        version: VERSION,
        status: "running",
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: BTreeMap<&'static str, &'static str>,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let mut components = BTreeMap::new();

    let manifest_healthy = state.manifest().counts_by_status(1).is_ok();
    components.insert(
        "manifest",
        if manifest_healthy { "healthy" } else { "unhealthy" },
    );

    let scheduler_running = state.scheduler().status().await.running;
    components.insert(
        "scheduler",
        if scheduler_running { "running" } else { "stopped" },
    );

    let healthy = manifest_healthy && scheduler_running;
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            components,
        }),
    )
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub uptime_seconds: i64,
    pub scheduler: SchedulerStatus,
    pub queue_depths: BTreeMap<&'static str, usize>,
    pub files_by_status: BTreeMap<String, i64>,
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let counts = state
        .manifest()
        .counts_by_status(STATUS_WINDOW_HOURS)
        .map_err(|e| {
            error!("Failed to read status counts: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let mut files_by_status = BTreeMap::new();
    for count in counts {
        files_by_status.insert(count.status.as_str().to_string(), count.count);
    }

    let mut queue_depths = BTreeMap::new();
    queue_depths.insert("download", state.queue().depth(Stage::Download));
    queue_depths.insert("process", state.queue().depth(Stage::Process));

    Ok(Json(StatusResponse {
        service: SERVICE_NAME,
        uptime_seconds: state.uptime_seconds(),
        scheduler: state.scheduler().status().await,
        queue_depths,
        files_by_status,
    }))
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = state.registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Manually trigger one discovery cycle and return its report.
pub async fn trigger_poll(State(state): State<Arc<AppState>>) -> Json<DiscoveryReport> {
    Json(state.scheduler().poll_once().await)
}

#[derive(Deserialize)]
pub struct ListFilesParams {
    pub status: Option<String>,
    pub source_tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
    pub total: i64,
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListFilesParams>,
) -> Result<Json<FileListResponse>, (StatusCode, String)> {
    let mut filter = ManifestFilter::new()
        .with_limit(params.limit.unwrap_or(100).clamp(1, 1000))
        .with_offset(params.offset.unwrap_or(0).max(0));

    if let Some(ref status_str) = params.status {
        let status = FileStatus::parse(status_str).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown status: {}", status_str),
            )
        })?;
        filter = filter.with_status(status);
    }

    if let Some(source_tag) = params.source_tag {
        filter = filter.with_source_tag(source_tag);
    }

    let files = state.manifest().list(&filter).map_err(|e| {
        error!("Failed to list files: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "query failed".to_string())
    })?;
    let total = state.manifest().count(&filter).map_err(|e| {
        error!("Failed to count files: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "query failed".to_string())
    })?;

    Ok(Json(FileListResponse { files, total }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecord>, StatusCode> {
    match state.manifest().get(&file_id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to fetch file {}: {}", file_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Deserialize)]
pub struct ListQueriesParams {
    pub limit: Option<i64>,
}

pub async fn list_queries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQueriesParams>,
) -> Result<Json<Vec<QueryLogRecord>>, StatusCode> {
    state
        .manifest()
        .recent_queries(params.limit.unwrap_or(50).clamp(1, 500))
        .map(Json)
        .map_err(|e| {
            error!("Failed to read query log: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
