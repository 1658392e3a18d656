//! S3 API request handlers.
//!
//! Split into submodules by domain:
//! - `object` — GET, HEAD, PUT, DELETE, CopyObject for individual objects
//! - `bucket` — bucket CRUD, listing, and subresource (CORS/Website/Tagging) CRUD
//! - `multipart` — multipart upload lifecycle
//! - `post_form` — browser-form (`POST /{bucket}`) uploads
//! - `status` — health check and aggregate stats

mod bucket;
mod multipart;
mod object;
mod post_form;
mod status;

use super::errors::S3Error;
use crate::accounts::AccountRegistry;
use crate::config::ServerOptions;
use crate::events::EventEmitter;
use crate::metrics::Metrics;
use crate::storage::{ByteRange, ObjectMeta, PutMetadata, Store};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use std::sync::Arc;

pub use bucket::{
    bucket_get_handler, create_bucket, delete_bucket, delete_bucket_subresource, get_bucket_subresource,
    head_bucket, list_buckets, put_bucket_subresource, BucketGetQuery,
};
pub use multipart::{
    abort_multipart_upload, list_multipart_uploads, list_parts, post_object, upload_part,
};
pub use object::{
    delete_object, delete_objects, get_object, head_object, post_bucket_dispatch,
    put_object_or_copy, ObjectQuery,
};
pub use post_form::post_object_form;
pub use status::{
    get_peak_rss_bytes, get_stats, head_root, health_check, HealthResponse, StatsQuery,
    StatsResponse,
};

/// Application state shared across handlers, middleware, and the website
/// engine.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub accounts: AccountRegistry,
    pub options: Arc<ServerOptions>,
    pub events: EventEmitter,
    pub metrics: Option<Arc<Metrics>>,
}

impl AppState {
    /// Records an auth attempt in the metrics registry, when one is
    /// configured. A no-op build (metrics disabled) costs nothing.
    pub(crate) fn metrics_auth(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_auth(success);
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers used across handler submodules and the website engine
// ---------------------------------------------------------------------------

pub(crate) fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Build the response headers S3 attaches to a successful GET/HEAD: ETag,
/// Content-Length, Content-Type, Last-Modified, storage class, and any
/// user-supplied `x-amz-meta-*` pairs.
pub(crate) fn object_response_headers(meta: &ObjectMeta) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("ETag", hval(&meta.etag));
    headers.insert("Content-Length", hval(&meta.content_length.to_string()));
    headers.insert("Content-Type", hval(&meta.content_type));
    headers.insert(
        "Last-Modified",
        hval(&meta.last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
    );
    headers.insert("x-amz-storage-class", hval(meta.storage_class.as_str()));
    if let Some(redirect) = &meta.website_redirect_location {
        headers.insert("x-amz-website-redirect-location", hval(redirect));
    }
    for (key, value) in &meta.user_metadata {
        let header_name = format!("x-amz-meta-{key}");
        if let Ok(name) = axum::http::header::HeaderName::from_bytes(header_name.as_bytes()) {
            headers.insert(name, hval(value));
        }
    }
    headers
}

/// Build an XML response with the correct content type.
fn xml_response(xml: impl Into<String>) -> Response {
    (StatusCode::OK, [("Content-Type", "application/xml")], xml.into()).into_response()
}

/// Extract user-provided `x-amz-meta-*` headers verbatim.
fn extract_user_metadata(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    use crate::types::meta_keys::AMZ_META_PREFIX;
    headers
        .iter()
        .filter_map(|(name, value)| {
            let suffix = name.as_str().strip_prefix(AMZ_META_PREFIX)?;
            let v = value.to_str().ok()?;
            Some((suffix.to_string(), v.to_string()))
        })
        .collect()
}

fn extract_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Build a [`PutMetadata`] from the headers of a PUT / InitiateMultipartUpload
/// request: content type, storage class, website redirect, user metadata.
pub(crate) fn metadata_from_headers(headers: &HeaderMap) -> Result<PutMetadata, S3Error> {
    use crate::types::meta_keys::{AMZ_STORAGE_CLASS, AMZ_WEBSITE_REDIRECT_LOCATION};
    use crate::types::StorageClass;

    let storage_class = match headers.get(AMZ_STORAGE_CLASS).and_then(|v| v.to_str().ok()) {
        Some(s) => Some(StorageClass::parse(s)?),
        None => None,
    };
    let website_redirect_location = headers
        .get(AMZ_WEBSITE_REDIRECT_LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(PutMetadata {
        content_type: extract_content_type(headers),
        storage_class,
        website_redirect_location,
        user_metadata: extract_user_metadata(headers).into_iter().collect(),
    })
}

/// The only query parameters GetObject/HeadObject are permitted to honor as
/// response-header overrides.
const PERMITTED_RESPONSE_OVERRIDES: &[&str] = &[
    "response-content-type",
    "response-content-language",
    "response-expires",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
];

/// Validate the `response-*` query parameters on a signed GET/HEAD: reject
/// any override on an unauthenticated (website/anonymous) request, and any
/// override name outside the permitted set.
pub(crate) fn validate_response_overrides(raw_query: Option<&str>, authenticated: bool) -> Result<(), S3Error> {
    let Some(query) = raw_query else {
        return Ok(());
    };
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(raw_key).unwrap_or_default().into_owned();
        if !key.starts_with("response-") {
            continue;
        }
        if !authenticated {
            return Err(S3Error::InvalidRequest(
                "response header overrides are not permitted on an unsigned request".to_string(),
            ));
        }
        if !PERMITTED_RESPONSE_OVERRIDES.contains(&key.as_str()) {
            let value = urlencoding::decode(raw_value).unwrap_or_default().into_owned();
            return Err(S3Error::InvalidArgument(format!(
                "Invalid argument: {key} ({value})"
            )));
        }
    }
    Ok(())
}

/// Parse an `x-amz-copy-source` header into `(bucket, key)`. The header is a
/// URL-encoded `/bucket/key` path, optionally with a leading slash and a
/// trailing `?versionId=...` which this store ignores (single-version only).
pub(crate) fn parse_copy_source(header_value: &str) -> Result<(String, String), S3Error> {
    let decoded = urlencoding::decode(header_value)
        .map_err(|_| S3Error::InvalidArgument("x-amz-copy-source is not valid UTF-8".to_string()))?;
    let without_query = decoded.split('?').next().unwrap_or("");
    let trimmed = without_query.trim_start_matches('/');
    let (bucket, key) = trimmed
        .split_once('/')
        .ok_or_else(|| S3Error::InvalidArgument("x-amz-copy-source must be /bucket/key".to_string()))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(S3Error::InvalidArgument(
            "x-amz-copy-source must be /bucket/key".to_string(),
        ));
    }
    Ok((bucket.to_string(), key.to_string()))
}

/// Parse a `bytes=start-end` range header value (the `Range` header, or
/// `x-amz-copy-source-range`) against a known total size.
///
/// Returns `Ok(None)` for an absent/unsupported header (callers treat that as
/// "serve the whole object"), `Ok(Some(range))` for a satisfiable range
/// clamped to `total_len`, and `Err(InvalidRange)` when the range is wholly
/// outside the object, per the wholly-out-of-bounds-yields-416 rule.
pub(crate) fn parse_byte_range(value: &str, total_len: u64) -> Result<Option<ByteRange>, S3Error> {
    let spec = match value.strip_prefix("bytes=") {
        Some(s) => s,
        None => return Ok(None),
    };
    let (start_str, end_str) = spec.split_once('-').ok_or_else(|| {
        S3Error::InvalidRange("Range header must be of the form bytes=start-end".to_string())
    })?;

    if start_str.is_empty() {
        // Suffix range `bytes=-N`: last N bytes.
        let suffix_len: u64 = end_str
            .parse()
            .map_err(|_| S3Error::InvalidRange("malformed suffix range".to_string()))?;
        if suffix_len == 0 || total_len == 0 {
            return Err(S3Error::InvalidRange(String::new()));
        }
        let start = total_len.saturating_sub(suffix_len);
        return Ok(Some(ByteRange { start, end: total_len - 1 }));
    }

    let start: u64 = start_str
        .parse()
        .map_err(|_| S3Error::InvalidRange("malformed range start".to_string()))?;
    if start >= total_len {
        return Err(S3Error::InvalidRange(String::new()));
    }
    let end = if end_str.is_empty() {
        total_len - 1
    } else {
        let requested_end: u64 = end_str
            .parse()
            .map_err(|_| S3Error::InvalidRange("malformed range end".to_string()))?;
        requested_end.min(total_len - 1)
    };
    Ok(Some(ByteRange { start, end }))
}

#[cfg(test)]
mod helper_tests {
    use super::*;

    #[test]
    fn copy_source_parses_bucket_and_key() {
        assert_eq!(
            parse_copy_source("/my-bucket/my-key.txt").unwrap(),
            ("my-bucket".to_string(), "my-key.txt".to_string())
        );
    }

    #[test]
    fn copy_source_decodes_and_strips_version_id() {
        let (bucket, key) = parse_copy_source("/bucket/nested%2Fkey.txt?versionId=abc").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "nested/key.txt");
    }

    #[test]
    fn copy_source_rejects_missing_key() {
        assert!(parse_copy_source("/bucket").is_err());
    }

    #[test]
    fn byte_range_full_suffix_and_partial() {
        assert!(parse_byte_range("bytes=0-", 100).unwrap().is_some());
        let r = parse_byte_range("bytes=10-20", 100).unwrap().unwrap();
        assert_eq!((r.start, r.end), (10, 20));
        let r = parse_byte_range("bytes=-10", 100).unwrap().unwrap();
        assert_eq!((r.start, r.end), (90, 99));
    }

    #[test]
    fn byte_range_clamps_partial_out_of_bounds_end() {
        let r = parse_byte_range("bytes=90-200", 100).unwrap().unwrap();
        assert_eq!((r.start, r.end), (90, 99));
    }

    #[test]
    fn byte_range_wholly_out_of_bounds_is_invalid_range() {
        assert!(parse_byte_range("bytes=200-300", 100).is_err());
    }

    #[test]
    fn byte_range_absent_header_form_is_none() {
        assert!(parse_byte_range("not-a-range", 100).unwrap().is_none());
    }

    #[test]
    fn response_override_allowed_when_authenticated() {
        assert!(validate_response_overrides(Some("response-content-type=text/plain"), true).is_ok());
    }

    #[test]
    fn response_override_rejected_when_anonymous() {
        let err = validate_response_overrides(Some("response-content-type=text/plain"), false).unwrap_err();
        assert!(matches!(err, S3Error::InvalidRequest(_)));
    }

    #[test]
    fn unrecognized_override_name_is_invalid_argument() {
        let err = validate_response_overrides(Some("response-bogus=x"), true).unwrap_err();
        assert!(matches!(err, S3Error::InvalidArgument(_)));
    }

    #[test]
    fn non_override_query_params_are_ignored() {
        assert!(validate_response_overrides(Some("partNumber=1&uploadId=abc"), false).is_ok());
    }
}
