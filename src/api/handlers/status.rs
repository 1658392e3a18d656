//! Health-check and aggregate statistics handlers.

use super::{AppState, S3Error};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for /stats
#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    pub bucket: Option<String>,
}

/// Aggregate storage statistics across one or all buckets.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub bucket_count: u64,
    pub total_objects: u64,
    pub total_bytes: u64,
}

/// GET /stats — aggregate stats across all buckets, or GET /stats?bucket=NAME
/// for a single one. Not part of the S3 API surface; a local operability
/// extension for scripts driving the emulator.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, S3Error> {
    let buckets_to_scan: Vec<String> = if let Some(bucket) = query.bucket {
        vec![bucket]
    } else {
        state
            .store
            .list_buckets()
            .await?
            .into_iter()
            .map(|b| b.name)
            .collect()
    };
    let bucket_count = buckets_to_scan.len() as u64;

    let mut total_objects: u64 = 0;
    let mut total_bytes: u64 = 0;

    for bucket in &buckets_to_scan {
        let mut start_after: Option<String> = None;
        loop {
            let page = state
                .store
                .list_objects(bucket, "", None, start_after.as_deref(), 1000)
                .await?;
            total_objects += page.objects.len() as u64;
            total_bytes += page.objects.iter().map(|(_, meta)| meta.content_length).sum::<u64>();
            if !page.is_truncated {
                break;
            }
            start_after = page.next_token;
            if start_after.is_none() {
                break;
            }
        }
    }

    Ok(Json(StatsResponse {
        bucket_count,
        total_objects,
        total_bytes,
    }))
}

/// S3 root HEAD handler — the connection probe issued by Cyberduck and other
/// S3 clients against `HEAD /` before doing anything else.
pub async fn head_root() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("server", "s3emu")
        .header("x-amz-request-id", "0")
        .body(Body::empty())
        .unwrap()
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub peak_rss_bytes: u64,
}

/// Return the process-lifetime peak RSS (high-water mark) in bytes, via
/// `getrusage(RUSAGE_SELF)`.
pub(crate) fn get_peak_rss_bytes() -> u64 {
    // SAFETY: getrusage is a POSIX syscall writing into a caller-provided
    // rusage struct; `usage` is a local, zero-initialized stack variable and
    // the call is infallible for RUSAGE_SELF.
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
            let ru_maxrss = usage.ru_maxrss as u64;
            // macOS reports ru_maxrss in bytes; Linux reports in KB.
            if cfg!(target_os = "macos") {
                ru_maxrss
            } else {
                ru_maxrss * 1024
            }
        } else {
            0
        }
    }
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        peak_rss_bytes: get_peak_rss_bytes(),
    })
}
