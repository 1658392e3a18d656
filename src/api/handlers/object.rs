//! Object-level S3 handlers: GET, HEAD, PUT (with copy/multipart-part
//! detection), DELETE, and the bulk DeleteObjects POST.
//!
//! Several operations share one HTTP path with a sibling operation and so
//! cannot each bind their own axum handler (axum routes by method+path, not
//! by query string): PUT serves PutObject, CopyObject, and UploadPart;
//! GET serves GetObject and ListParts; DELETE serves DeleteObject and
//! AbortMultipartUpload. Each is therefore one axum-bound handler here that
//! dispatches internally, calling into `multipart` via the re-exports in
//! `handlers::mod`.

use super::{
    hval, metadata_from_headers, object_response_headers, parse_byte_range, parse_copy_source,
    validate_response_overrides, xml_response, AppState,
};
use crate::api::aws_chunked::{decode_aws_chunked, is_aws_chunked};
use crate::api::auth::{Authenticated, ChunkSigningContext};
use crate::api::extractors::{ValidatedBucket, ValidatedPath};
use crate::api::xml::{CopyObjectResult, DeleteError, DeleteRequest, DeleteResult, DeletedObject, Tagging};
use crate::api::S3Error;
use crate::events::{EventInput, EventKind};
use crate::storage::{MetadataDirective, PutMetadata, SubresourceKind};
use axum::extract::{Extension, FromRequest, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use tracing::instrument;

/// Query parameters recognized on the object path. One struct covers every
/// GET/PUT/DELETE variant since they all bind to the same axum route.
#[derive(Debug, serde::Deserialize, Default)]
pub struct ObjectQuery {
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "response-content-type")]
    pub response_content_type: Option<String>,
    #[serde(rename = "response-content-language")]
    pub response_content_language: Option<String>,
    #[serde(rename = "response-expires")]
    pub response_expires: Option<String>,
    #[serde(rename = "response-cache-control")]
    pub response_cache_control: Option<String>,
    #[serde(rename = "response-content-disposition")]
    pub response_content_disposition: Option<String>,
    #[serde(rename = "response-content-encoding")]
    pub response_content_encoding: Option<String>,
    pub tagging: Option<String>,
}

/// Query parameters for the bucket-level bulk-delete POST.
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketPostQuery {
    pub delete: Option<String>,
}

/// PUT /{bucket}/{key} — PutObject, CopyObject, or UploadPart, depending on
/// the presence of `x-amz-copy-source` / `?partNumber&uploadId`.
#[instrument(skip(state, chunk_ctx, body))]
pub async fn put_object_or_copy(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    chunk_ctx: Option<Extension<ChunkSigningContext>>,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.tagging.is_some() {
        return put_object_tagging(&state, &bucket, &key, body).await;
    }

    let body = if is_aws_chunked(&headers) {
        let Extension(ctx) = chunk_ctx.ok_or_else(|| {
            S3Error::InvalidRequest("chunked payload received without a signing context".to_string())
        })?;
        decode_aws_chunked(&body, &headers, &ctx)?
    } else {
        body
    };

    if let (Some(part_number), Some(upload_id)) = (query.part_number, &query.upload_id) {
        return super::upload_part(&state, &bucket, &key, upload_id, part_number, &headers, body).await;
    }

    if let Some(copy_source) = headers.get("x-amz-copy-source").and_then(|v| v.to_str().ok()) {
        return copy_object(&state, &bucket, &key, copy_source, &headers).await;
    }

    put_object(&state, &bucket, &key, &headers, body).await
}

async fn put_object(
    state: &AppState,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    let metadata = metadata_from_headers(headers)?;
    let meta = state.store.put_object(bucket, key, body, metadata).await?;

    state.events.emit(EventInput {
        kind: EventKind::Put,
        bucket,
        key,
        source_ip: "-",
        request_id: "put-object",
        size: Some(meta.content_length),
        etag: Some(&meta.etag),
    });

    Ok((StatusCode::OK, [("ETag", meta.etag)], "").into_response())
}

async fn copy_object(
    state: &AppState,
    bucket: &str,
    key: &str,
    copy_source: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let (src_bucket, src_key) = parse_copy_source(copy_source)?;

    let directive = match headers
        .get("x-amz-metadata-directive")
        .and_then(|v| v.to_str().ok())
    {
        Some("REPLACE") => MetadataDirective::Replace,
        _ => MetadataDirective::Copy,
    };

    if src_bucket == bucket && src_key == key && directive == MetadataDirective::Copy {
        return Err(S3Error::InvalidRequest(
            "copying an object onto itself requires x-amz-metadata-directive: REPLACE".to_string(),
        ));
    }

    let replacement_metadata = if directive == MetadataDirective::Replace {
        metadata_from_headers(headers)?
    } else {
        PutMetadata::default()
    };

    let meta = state
        .store
        .copy_object(&src_bucket, &src_key, bucket, key, directive, replacement_metadata)
        .await?;

    state.events.emit(EventInput {
        kind: EventKind::Copy,
        bucket,
        key,
        source_ip: "-",
        request_id: "copy-object",
        size: Some(meta.content_length),
        etag: Some(&meta.etag),
    });

    Ok(xml_response(
        CopyObjectResult {
            etag: meta.etag,
            last_modified: meta.last_modified,
        }
        .to_xml(),
    ))
}

/// PUT /{bucket}/{key}?tagging — replaces the object's tag set. The object
/// must already exist; S3 rejects tagging a key that isn't there.
async fn put_object_tagging(state: &AppState, bucket: &str, key: &str, body: Bytes) -> Result<Response, S3Error> {
    state
        .store
        .head_object(bucket, key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.to_string()))?;

    let xml = std::str::from_utf8(&body)
        .map_err(|_| S3Error::MalformedXml("request body is not valid UTF-8".to_string()))?;
    Tagging::from_xml(xml).map_err(S3Error::MalformedXml)?;

    state
        .store
        .put_subresource(bucket, Some(key), SubresourceKind::Tagging, xml.to_string())
        .await?;
    Ok(StatusCode::OK.into_response())
}

/// GET /{bucket}/{key}?tagging — an object with no tag set returns an empty
/// `<Tagging>` document rather than a 404 (matching observed S3 behavior).
async fn get_object_tagging(state: &AppState, bucket: &str, key: &str) -> Result<Response, S3Error> {
    state
        .store
        .head_object(bucket, key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.to_string()))?;

    let xml = state
        .store
        .get_subresource(bucket, Some(key), SubresourceKind::Tagging)
        .await?
        .unwrap_or_else(|| {
            Tagging {
                tag_set: Default::default(),
            }
            .to_xml()
        });
    Ok(xml_response(xml))
}

/// DELETE /{bucket}/{key}?tagging — clears the object's tag set.
async fn delete_object_tagging(state: &AppState, bucket: &str, key: &str) -> Result<Response, S3Error> {
    state
        .store
        .head_object(bucket, key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.to_string()))?;
    state
        .store
        .delete_subresource(bucket, Some(key), SubresourceKind::Tagging)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /{bucket}/{key} — GetObject (with Range support and
/// `response-*` header overrides), or ListParts when `?uploadId=...` is
/// present without a `partNumber`.
#[instrument(skip(state))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    uri: Uri,
    authenticated: Option<Extension<Authenticated>>,
    headers: HeaderMap,
) -> Result<Response, S3Error> {
    if query.tagging.is_some() {
        return get_object_tagging(&state, &bucket, &key).await;
    }

    if let (Some(upload_id), None) = (&query.upload_id, query.part_number) {
        return super::list_parts(&state, &bucket, &key, upload_id).await;
    }

    validate_response_overrides(uri.query(), authenticated.is_some())?;

    let head = state
        .store
        .head_object(&bucket, &key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.clone()))?;

    let range = match headers.get("range").and_then(|v| v.to_str().ok()) {
        Some(value) => parse_byte_range(value, head.content_length)?,
        None => None,
    };

    let object = state
        .store
        .get_object(&bucket, &key, range)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.clone()))?;

    let mut response_headers = object_response_headers(&object.meta);
    let status = if let Some(r) = range {
        response_headers.insert(
            "Content-Range",
            hval(&format!("bytes {}-{}/{}", r.start, r.end, head.content_length)),
        );
        response_headers.insert("Content-Length", hval(&object.body.len().to_string()));
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    if let Some(v) = &query.response_content_type {
        response_headers.insert("Content-Type", hval(v));
    }
    if let Some(v) = &query.response_content_language {
        response_headers.insert("Content-Language", hval(v));
    }
    if let Some(v) = &query.response_expires {
        response_headers.insert("Expires", hval(v));
    }
    if let Some(v) = &query.response_cache_control {
        response_headers.insert("Cache-Control", hval(v));
    }
    if let Some(v) = &query.response_content_disposition {
        response_headers.insert("Content-Disposition", hval(v));
    }
    if let Some(v) = &query.response_content_encoding {
        response_headers.insert("Content-Encoding", hval(v));
    }

    Ok((status, response_headers, object.body).into_response())
}

/// HEAD /{bucket}/{key}
#[instrument(skip(state))]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    uri: Uri,
    authenticated: Option<Extension<Authenticated>>,
) -> Result<Response, S3Error> {
    validate_response_overrides(uri.query(), authenticated.is_some())?;

    let meta = state
        .store
        .head_object(&bucket, &key)
        .await?
        .ok_or_else(|| S3Error::NoSuchKey(key.clone()))?;

    let mut response_headers = object_response_headers(&meta);
    if let Some(v) = &query.response_content_type {
        response_headers.insert("Content-Type", hval(v));
    }
    if let Some(v) = &query.response_content_language {
        response_headers.insert("Content-Language", hval(v));
    }
    if let Some(v) = &query.response_expires {
        response_headers.insert("Expires", hval(v));
    }
    if let Some(v) = &query.response_cache_control {
        response_headers.insert("Cache-Control", hval(v));
    }
    if let Some(v) = &query.response_content_disposition {
        response_headers.insert("Content-Disposition", hval(v));
    }
    if let Some(v) = &query.response_content_encoding {
        response_headers.insert("Content-Encoding", hval(v));
    }

    Ok((StatusCode::OK, response_headers).into_response())
}

/// DELETE /{bucket}/{key} — DeleteObject, or AbortMultipartUpload when
/// `?uploadId=...` is present.
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    if query.tagging.is_some() {
        return delete_object_tagging(&state, &bucket, &key).await;
    }

    if let Some(upload_id) = &query.upload_id {
        return super::abort_multipart_upload(&state, &bucket, &key, upload_id).await;
    }

    if let Err(e) = state.store.delete_object(&bucket, &key).await {
        let err = S3Error::from(e);
        // DeleteObject is idempotent: a missing key is not an error.
        if !matches!(err, S3Error::NoSuchKey(_)) {
            return Err(err);
        }
    }

    state.events.emit(EventInput {
        kind: EventKind::Delete,
        bucket: &bucket,
        key: &key,
        source_ip: "-",
        request_id: "delete-object",
        size: None,
        etag: None,
    });

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /{bucket}?delete — bulk DeleteObjects.
#[instrument(skip(state, body))]
pub async fn delete_objects(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<BucketPostQuery>,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.delete.is_none() {
        return Err(S3Error::InvalidRequest(
            "POST requires a ?delete query parameter".to_string(),
        ));
    }

    let xml = std::str::from_utf8(&body)
        .map_err(|_| S3Error::MalformedXml("request body is not valid UTF-8".to_string()))?;
    let request = DeleteRequest::from_xml(xml).map_err(|e| S3Error::MalformedXml(e.to_string()))?;
    let quiet = request.quiet.unwrap_or(false);

    let mut deleted = Vec::new();
    let mut errors = Vec::new();

    for obj in request.objects {
        let key = obj.key.trim_start_matches('/');
        match state.store.delete_object(&bucket, key).await {
            Ok(()) => deleted.push(DeletedObject {
                key: obj.key.clone(),
                version_id: obj.version_id.clone(),
            }),
            Err(e) => {
                let s3_err = S3Error::from(e);
                // S3 treats a missing key as a successful delete in a batch.
                if matches!(s3_err, S3Error::NoSuchKey(_)) {
                    deleted.push(DeletedObject {
                        key: obj.key.clone(),
                        version_id: obj.version_id.clone(),
                    });
                } else {
                    errors.push(DeleteError {
                        key: obj.key.clone(),
                        version_id: obj.version_id.clone(),
                        code: s3_err.code().to_string(),
                        message: s3_err.to_string(),
                    });
                }
            }
        }
    }

    state.events.emit(EventInput {
        kind: EventKind::Delete,
        bucket: &bucket,
        key: "",
        source_ip: "-",
        request_id: "delete-objects",
        size: None,
        etag: None,
    });

    Ok(xml_response(DeleteResult { deleted, errors }.to_xml(quiet)))
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == name {
            Some(urlencoding::decode(v).unwrap_or_default().into_owned())
        } else {
            None
        }
    })
}

/// POST /{bucket} dispatches to DeleteObjects (`?delete`) or a browser-form
/// upload: the two shapes axum can't tell apart by method and path alone.
pub async fn post_bucket_dispatch(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    request: axum::extract::Request,
) -> Result<Response, S3Error> {
    let delete = query_param(request.uri().query(), "delete");

    if delete.is_some() {
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| S3Error::InvalidRequest(format!("failed reading request body: {e}")))?;
        delete_objects(
            State(state),
            ValidatedBucket(bucket),
            Query(BucketPostQuery { delete }),
            body,
        )
        .await
    } else {
        let multipart = axum::extract::Multipart::from_request(request, &state)
            .await
            .map_err(|e| S3Error::InvalidRequest(format!("malformed multipart form: {e}")))?;
        super::post_object_form(State(state), axum::extract::Path(bucket), multipart).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_query_extracts_part_and_upload_id() {
        let q: ObjectQuery = serde_urlencoded::from_str("partNumber=3&uploadId=xyz").unwrap();
        assert_eq!(q.part_number, Some(3));
        assert_eq!(q.upload_id.as_deref(), Some("xyz"));
    }

    #[test]
    fn object_query_extracts_response_overrides() {
        let q: ObjectQuery =
            serde_urlencoded::from_str("response-content-type=text%2Fplain").unwrap();
        assert_eq!(q.response_content_type.as_deref(), Some("text/plain"));
    }
}
