//! The abstract object-store contract. Any backend satisfying this trait
//! may serve the HTTP layer; the bundled implementation is filesystem-backed
//! (see [`super::filesystem`]).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors surfaced by the store. Handlers convert these into `S3Error`
/// at the API boundary; the store itself knows nothing about HTTP.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("key not found: {0}")]
    NoSuchKey(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("upload not found: {0}")]
    NoSuchUpload(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("part too small: {0}")]
    EntityTooSmall(String),

    #[error("subresource not found: {0}")]
    NoSuchSubresource(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// A bucket's identity and creation time.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// A stored object's attributes, without its body.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub storage_class: crate::types::StorageClass,
    pub website_redirect_location: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
}

/// A stored object: its metadata plus its body.
#[derive(Debug, Clone)]
pub struct Object {
    pub meta: ObjectMeta,
    pub body: Bytes,
}

/// Inclusive byte range for partial reads, already clamped to 0..content_length.
#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Metadata supplied by the caller of `putObject` / `completeMultipart`.
#[derive(Debug, Clone, Default)]
pub struct PutMetadata {
    pub content_type: Option<String>,
    pub storage_class: Option<crate::types::StorageClass>,
    pub website_redirect_location: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
}

/// How `copyObject` should treat metadata relative to the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDirective {
    #[default]
    Copy,
    Replace,
}

/// One page of a `listObjects` call.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<(String, ObjectMeta)>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// v1 `NextMarker` / v2 `NextContinuationToken`, populated per §4.3.
    pub next_token: Option<String>,
}

/// A subresource kind addressed by query-string parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubresourceKind {
    Cors,
    Website,
    Tagging,
    Acl,
    Lifecycle,
}

impl SubresourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubresourceKind::Cors => "cors",
            SubresourceKind::Website => "website",
            SubresourceKind::Tagging => "tagging",
            SubresourceKind::Acl => "acl",
            SubresourceKind::Lifecycle => "lifecycle",
        }
    }
}

/// One completed multipart part, as supplied to `completeMultipart`.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// A part previously uploaded via `uploadPart`, as returned by `listParts`.
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// An in-progress multipart upload, as returned by `listMultipartUploads`.
#[derive(Debug, Clone)]
pub struct MultipartUploadSummary {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
}

/// Abstract storage backend for the S3 object model. Object-safe so it can
/// be held as `Box<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StoreError>;
    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, StoreError>;
    async fn put_bucket(&self, name: &str) -> Result<(), StoreError>;
    async fn delete_bucket(&self, name: &str) -> Result<(), StoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: u32,
    ) -> Result<ListPage, StoreError>;

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Option<Object>, StoreError>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        metadata: PutMetadata,
    ) -> Result<ObjectMeta, StoreError>;

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        directive: MetadataDirective,
        replacement_metadata: PutMetadata,
    ) -> Result<ObjectMeta, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: PutMetadata,
    ) -> Result<String, StoreError>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: Bytes,
    ) -> Result<String, StoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        src_range: Option<ByteRange>,
    ) -> Result<String, StoreError>;

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectMeta, StoreError>;

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<(), StoreError>;

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, StoreError>;

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<MultipartUploadSummary>, StoreError>;

    async fn get_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
    ) -> Result<Option<String>, StoreError>;

    async fn put_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
        config_xml: String,
    ) -> Result<(), StoreError>;

    async fn delete_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
    ) -> Result<(), StoreError>;

    /// Remove all buckets/objects/uploads and recreate an empty root.
    async fn reset(&self) -> Result<(), StoreError>;
}
