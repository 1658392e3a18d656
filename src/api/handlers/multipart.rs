//! Multipart upload lifecycle: Initiate, UploadPart (+ UploadPartCopy),
//! Complete, Abort, ListParts, ListMultipartUploads.
//!
//! InitiateMultipartUpload and CompleteMultipartUpload share one HTTP path
//! (`POST /{bucket}/{key}`, distinguished only by the `uploads` / `uploadId`
//! query parameter), so [`post_object`] is the single axum-bound handler for
//! that path; everything else in this module is a plain async helper called
//! either from here or from sibling handler modules (`object`, `bucket`)
//! that share a path with one of these operations.

use super::{metadata_from_headers, parse_byte_range, parse_copy_source, xml_response, AppState};
use crate::api::extractors::ValidatedPath;
use crate::api::xml::{
    CompleteMultipartUploadRequest, CompleteMultipartUploadResult, InitiateMultipartUploadResult,
    ListMultipartUploadsResult, ListPartsResult, PartInfo, UploadInfo,
};
use crate::api::S3Error;
use crate::events::{EventInput, EventKind};
use crate::storage::CompletedPart;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use tracing::instrument;

/// Query parameters recognized on `POST /{bucket}/{key}`.
#[derive(Debug, serde::Deserialize, Default)]
pub struct PostObjectQuery {
    pub uploads: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
}

/// POST /{bucket}/{key} — dispatches by query string between
/// InitiateMultipartUpload (`?uploads`) and CompleteMultipartUpload
/// (`?uploadId=...`); those are the only two POST operations on this path.
#[instrument(skip(state, headers, body))]
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<PostObjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.uploads.is_some() {
        return create_multipart_upload(&state, &bucket, &key, &headers).await;
    }
    if let Some(upload_id) = query.upload_id {
        return complete_multipart_upload(&state, &bucket, &key, &upload_id, &body).await;
    }
    Err(S3Error::InvalidRequest(
        "POST requires either ?uploads or ?uploadId=...".to_string(),
    ))
}

/// InitiateMultipartUpload
pub async fn create_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let metadata = metadata_from_headers(headers)?;
    let upload_id = state.store.initiate_multipart(bucket, key, metadata).await?;

    Ok(xml_response(
        InitiateMultipartUploadResult {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
        }
        .to_xml(),
    ))
}

/// CompleteMultipartUpload
pub async fn complete_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &Bytes,
) -> Result<Response, S3Error> {
    let xml = std::str::from_utf8(body)
        .map_err(|_| S3Error::MalformedXml("request body is not valid UTF-8".to_string()))?;
    let request = CompleteMultipartUploadRequest::from_xml(xml)
        .map_err(|e| S3Error::MalformedXml(e.to_string()))?;

    let parts: Vec<CompletedPart> = request
        .parts
        .into_iter()
        .map(|p| CompletedPart {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect();

    let meta = state
        .store
        .complete_multipart(bucket, key, upload_id, &parts)
        .await?;

    state.events.emit(EventInput {
        kind: EventKind::CompleteMultipartUpload,
        bucket,
        key,
        source_ip: "-",
        request_id: upload_id,
        size: Some(meta.content_length),
        etag: Some(&meta.etag),
    });

    Ok(xml_response(
        CompleteMultipartUploadResult {
            location: format!("/{bucket}/{key}"),
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: meta.etag,
        }
        .to_xml(),
    ))
}

/// UploadPart / UploadPartCopy — PUT /{bucket}/{key}?partNumber=N&uploadId=...
pub async fn upload_part(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: u32,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if let Some(copy_source) = headers.get("x-amz-copy-source").and_then(|v| v.to_str().ok()) {
        return upload_part_copy(state, bucket, key, upload_id, part_number, headers, copy_source).await;
    }

    let etag = state
        .store
        .upload_part(bucket, key, upload_id, part_number, body)
        .await?;

    Ok((StatusCode::OK, [("ETag", etag)], "").into_response())
}

async fn upload_part_copy(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: u32,
    headers: &HeaderMap,
    copy_source: &str,
) -> Result<Response, S3Error> {
    let (src_bucket, src_key) = parse_copy_source(copy_source)?;

    let src_range = match headers.get("x-amz-copy-source-range").and_then(|v| v.to_str().ok()) {
        Some(range_value) => {
            let src_meta = state
                .store
                .head_object(&src_bucket, &src_key)
                .await?
                .ok_or_else(|| S3Error::NoSuchKey(src_key.clone()))?;
            parse_byte_range(range_value, src_meta.content_length)?
        }
        None => None,
    };

    let etag = state
        .store
        .upload_part_copy(bucket, key, upload_id, part_number, &src_bucket, &src_key, src_range)
        .await?;

    let last_modified = state
        .store
        .head_object(bucket, key)
        .await
        .ok()
        .flatten()
        .map(|m| m.last_modified)
        .unwrap_or_else(chrono::Utc::now);

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CopyPartResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <ETag>{}</ETag>
  <LastModified>{}</LastModified>
</CopyPartResult>"#,
        crate::api::xml::escape_xml(&etag),
        last_modified.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
    );

    Ok(xml_response(xml))
}

/// AbortMultipartUpload — DELETE /{bucket}/{key}?uploadId=...
pub async fn abort_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<Response, S3Error> {
    state.store.abort_multipart(bucket, key, upload_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// ListParts — GET /{bucket}/{key}?uploadId=...
pub async fn list_parts(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<Response, S3Error> {
    let parts = state.store.list_parts(bucket, key, upload_id).await?;

    let part_infos: Vec<PartInfo> = parts
        .into_iter()
        .map(|p| PartInfo {
            part_number: p.part_number,
            etag: p.etag,
            size: p.size,
            last_modified: p.last_modified,
        })
        .collect();

    Ok(xml_response(
        ListPartsResult {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            parts: part_infos,
            max_parts: 1000,
            is_truncated: false,
        }
        .to_xml(),
    ))
}

/// ListMultipartUploads — GET /{bucket}?uploads
pub async fn list_multipart_uploads(
    state: &AppState,
    bucket: &str,
    prefix: Option<&str>,
) -> Result<Response, S3Error> {
    let uploads = state.store.list_multipart_uploads(bucket, prefix).await?;

    let upload_infos: Vec<UploadInfo> = uploads
        .into_iter()
        .map(|u| UploadInfo {
            key: u.key,
            upload_id: u.upload_id,
            initiated: u.initiated,
        })
        .collect();

    Ok(xml_response(
        ListMultipartUploadsResult {
            bucket: bucket.to_string(),
            uploads: upload_infos,
            prefix: prefix.unwrap_or_default().to_string(),
            max_uploads: 1000,
            is_truncated: false,
        }
        .to_xml(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_object_query_recognizes_uploads_flag() {
        let q = PostObjectQuery {
            uploads: Some(String::new()),
            upload_id: None,
        };
        assert!(q.uploads.is_some());
        assert!(q.upload_id.is_none());
    }

    #[test]
    fn post_object_query_recognizes_upload_id() {
        let q = PostObjectQuery {
            uploads: None,
            upload_id: Some("abc".to_string()),
        };
        assert_eq!(q.upload_id.as_deref(), Some("abc"));
    }
}
