//! Bucket-level S3 handlers: CREATE, DELETE, HEAD, LIST, and sub-operations
//! (GetBucketLocation, GetBucketVersioning, ListMultipartUploads), plus
//! bucket-level subresource CRUD (CORS/Website/Tagging/ACL).

use super::{xml_response, AppState, S3Error};
use crate::api::extractors::ValidatedBucket;
use crate::api::xml::{
    BucketInfo, CorsConfiguration, ListBucketResult, ListBucketsResult, S3Object, Tagging,
    WebsiteConfiguration,
};
use crate::storage::SubresourceKind;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, instrument};

/// Query parameters for bucket-level GET operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketGetQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<u8>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<u32>,
    /// v2 pagination
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    /// v1 pagination
    pub marker: Option<String>,
    /// Encoding type for keys/prefixes in the response (e.g. "url")
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
    /// GetBucketLocation query parameter
    pub location: Option<String>,
    /// GetBucketVersioning query parameter
    pub versioning: Option<String>,
    /// ListMultipartUploads query parameter
    pub uploads: Option<String>,
}

/// Bucket-level GET handler - dispatches to appropriate operation based on query params
/// GET /{bucket}?list-type=2&prefix=  -> ListObjectsV2
/// GET /{bucket}?location            -> GetBucketLocation
/// GET /{bucket}?versioning          -> GetBucketVersioning
/// GET /{bucket}?uploads             -> ListMultipartUploads
#[instrument(skip(state))]
pub async fn bucket_get_handler(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<BucketGetQuery>,
    Query(sub_query): Query<SubresourceQuery>,
) -> Result<Response, S3Error> {
    if sub_query.is_present() {
        return get_bucket_subresource(
            State(state),
            ValidatedBucket(bucket),
            Query(sub_query),
        )
        .await;
    }

    if query.location.is_some() {
        info!("GET bucket location: {}", bucket);
        return get_bucket_location(&bucket).await;
    }

    if query.versioning.is_some() {
        info!("GET bucket versioning: {}", bucket);
        return get_bucket_versioning(&bucket).await;
    }

    if query.uploads.is_some() {
        info!("LIST multipart uploads: {}", bucket);
        let prefix = query.prefix.as_deref();
        return super::list_multipart_uploads(&state, &bucket, prefix).await;
    }

    let is_v2 = query.list_type == Some(2);
    let prefix = query.prefix.unwrap_or_default();
    let delimiter = query.delimiter.clone();
    let max_keys = query.max_keys.unwrap_or(1000);

    // v1 uses `marker`, v2 uses `continuation-token` — both serve as "start after" key
    let pagination_token = if is_v2 {
        query.continuation_token.as_deref()
    } else {
        query.marker.as_deref()
    };

    info!(
        "LIST {}/{}* (v{})",
        bucket,
        prefix,
        if is_v2 { "2" } else { "1" }
    );

    let page = state
        .store
        .list_objects(&bucket, &prefix, delimiter.as_deref(), pagination_token, max_keys)
        .await?;

    let s3_objects: Vec<S3Object> = page
        .objects
        .into_iter()
        .map(|(key, meta)| S3Object::new(key, meta.content_length, meta.last_modified, meta.etag))
        .collect();

    let xml = if is_v2 {
        ListBucketResult::new_v2(
            bucket,
            prefix,
            delimiter,
            max_keys,
            s3_objects,
            page.common_prefixes,
            query.continuation_token,
            page.next_token,
            page.is_truncated,
        )
        .to_xml()
    } else {
        ListBucketResult::new_v1(
            bucket,
            prefix,
            delimiter,
            max_keys,
            s3_objects,
            page.common_prefixes,
            query.marker,
            page.next_token,
            page.is_truncated,
            query.encoding_type,
        )
        .to_xml()
    };

    Ok(xml_response(xml))
}

/// GetBucketLocation handler
/// GET /{bucket}?location
async fn get_bucket_location(_bucket: &str) -> Result<Response, S3Error> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">us-east-1</LocationConstraint>"#;
    Ok(xml_response(xml))
}

/// GetBucketVersioning handler
/// GET /{bucket}?versioning
async fn get_bucket_versioning(_bucket: &str) -> Result<Response, S3Error> {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#;
    Ok(xml_response(xml))
}

/// CREATE bucket handler
/// PUT /{bucket}
#[instrument(skip(state))]
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(sub_query): Query<SubresourceQuery>,
    body: bytes::Bytes,
) -> Result<Response, S3Error> {
    if sub_query.is_present() {
        return put_bucket_subresource(
            State(state),
            ValidatedBucket(bucket),
            Query(sub_query),
            body,
        )
        .await;
    }

    info!("CREATE bucket {}", bucket);

    if bucket.is_empty() {
        return Err(S3Error::InvalidArgument(
            "Bucket name cannot be empty".to_string(),
        ));
    }

    state.store.put_bucket(&bucket).await?;

    Ok((StatusCode::OK, [("Location", format!("/{bucket}"))], "").into_response())
}

/// DELETE bucket handler
/// DELETE /{bucket}
#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(sub_query): Query<SubresourceQuery>,
) -> Result<Response, S3Error> {
    if sub_query.is_present() {
        return delete_bucket_subresource(State(state), ValidatedBucket(bucket), Query(sub_query))
            .await;
    }

    info!("DELETE bucket {}", bucket);

    let page = state.store.list_objects(&bucket, "", None, None, 1).await?;
    if !page.objects.is_empty() {
        return Err(S3Error::BucketNotEmpty(bucket));
    }

    state.store.delete_bucket(&bucket).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// HEAD bucket handler
/// HEAD /{bucket}
#[instrument(skip(state))]
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
) -> Result<Response, S3Error> {
    info!("HEAD bucket {}", bucket);

    let exists = state.store.get_bucket(&bucket).await?.is_some();
    if !exists {
        return Err(S3Error::NoSuchBucket(bucket));
    }

    Ok((StatusCode::OK, [("x-amz-bucket-region", "us-east-1")]).into_response())
}

/// LIST buckets handler
/// GET /
#[instrument(skip(state))]
pub async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Response, S3Error> {
    info!("LIST buckets");

    let mut bucket_list = state.store.list_buckets().await?;
    bucket_list.sort_by(|a, b| a.name.cmp(&b.name));

    let result = ListBucketsResult {
        owner_id: "s3emu".to_string(),
        owner_display_name: "s3emu".to_string(),
        buckets: bucket_list
            .into_iter()
            .map(|b| BucketInfo {
                name: b.name,
                creation_date: b.creation_date,
            })
            .collect(),
    };

    Ok(xml_response(result.to_xml()))
}

/// Which subresource a bucket-level request names, as a query-string flag.
#[derive(Debug, serde::Deserialize, Default)]
pub struct SubresourceQuery {
    pub cors: Option<String>,
    pub website: Option<String>,
    pub tagging: Option<String>,
    pub acl: Option<String>,
    pub lifecycle: Option<String>,
}

impl SubresourceQuery {
    fn is_present(&self) -> bool {
        self.cors.is_some()
            || self.website.is_some()
            || self.tagging.is_some()
            || self.acl.is_some()
            || self.lifecycle.is_some()
    }
}

fn subresource_kind(query: &SubresourceQuery) -> Result<SubresourceKind, S3Error> {
    if query.cors.is_some() {
        Ok(SubresourceKind::Cors)
    } else if query.website.is_some() {
        Ok(SubresourceKind::Website)
    } else if query.tagging.is_some() {
        Ok(SubresourceKind::Tagging)
    } else if query.acl.is_some() {
        Ok(SubresourceKind::Acl)
    } else if query.lifecycle.is_some() {
        Ok(SubresourceKind::Lifecycle)
    } else {
        Err(S3Error::InvalidArgument(
            "no recognized subresource in query string".to_string(),
        ))
    }
}

fn no_such_subresource(kind: SubresourceKind, bucket: &str) -> S3Error {
    match kind {
        SubresourceKind::Cors => S3Error::NoSuchCorsConfiguration(bucket.to_string()),
        SubresourceKind::Website => S3Error::NoSuchWebsiteConfiguration(bucket.to_string()),
        _ => S3Error::InvalidArgument(format!("no {} configuration set for this bucket", kind.as_str())),
    }
}

/// GET /{bucket}?cors|website|tagging|acl|lifecycle
#[instrument(skip(state))]
pub async fn get_bucket_subresource(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<SubresourceQuery>,
) -> Result<Response, S3Error> {
    let kind = subresource_kind(&query)?;
    let xml = state
        .store
        .get_subresource(&bucket, None, kind)
        .await?
        .ok_or_else(|| no_such_subresource(kind, &bucket))?;
    Ok(xml_response(xml))
}

/// PUT /{bucket}?cors|website|tagging|acl|lifecycle
#[instrument(skip(state, body))]
pub async fn put_bucket_subresource(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<SubresourceQuery>,
    body: bytes::Bytes,
) -> Result<Response, S3Error> {
    let kind = subresource_kind(&query)?;
    let xml = String::from_utf8(body.to_vec())
        .map_err(|_| S3Error::MalformedXml("request body is not valid UTF-8".to_string()))?;

    match kind {
        SubresourceKind::Cors => {
            CorsConfiguration::from_xml(&xml).map_err(S3Error::MalformedXml)?;
        }
        SubresourceKind::Website => {
            WebsiteConfiguration::from_xml(&xml).map_err(S3Error::MalformedXml)?;
        }
        SubresourceKind::Tagging => {
            Tagging::from_xml(&xml).map_err(S3Error::MalformedXml)?;
        }
        SubresourceKind::Acl | SubresourceKind::Lifecycle => {}
    }

    state.store.put_subresource(&bucket, None, kind, xml).await?;
    Ok(StatusCode::OK.into_response())
}

/// DELETE /{bucket}?cors|website|tagging|acl|lifecycle
#[instrument(skip(state))]
pub async fn delete_bucket_subresource(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<SubresourceQuery>,
) -> Result<Response, S3Error> {
    let kind = subresource_kind(&query)?;
    state.store.delete_subresource(&bucket, None, kind).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
