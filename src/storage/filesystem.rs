//! Filesystem-backed [`Store`] implementation.
//!
//! Layout:
//! ```text
//! {root}/{bucket}/.bucket.json                  bucket metadata (creation date)
//! {root}/{bucket}/.{kind}.xml                    bucket-level subresource config
//! {root}/{bucket}/{percent-encoded key}/body     object body
//! {root}/{bucket}/{percent-encoded key}/.metadata.json
//! {root}/{bucket}/.uploads/{uploadId}/part-{n}   multipart part body
//! {root}/{bucket}/.uploads/{uploadId}/parts.json multipart part index + initiation metadata
//! ```

use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

const ENOSPC: i32 = 28;

fn io_to_store_error(e: std::io::Error) -> StoreError {
    if e.raw_os_error() == Some(ENOSPC) {
        StoreError::Internal("disk full".to_string())
    } else {
        StoreError::Io(e)
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Atomically write `data` to `path` via write-to-temp + fsync + rename.
async fn atomic_write(path: &Path, data: Vec<u8>) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Internal("atomic_write with no parent directory".into()))?
        .to_path_buf();
    fs::create_dir_all(&parent).await?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut tmp = NamedTempFile::new_in(&parent).map_err(io_to_store_error)?;
        tmp.write_all(&data).map_err(io_to_store_error)?;
        tmp.as_file().sync_all().map_err(io_to_store_error)?;
        tmp.persist(&path).map_err(|e| io_to_store_error(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Internal(format!("spawn_blocking join failed: {e}")))?
}

fn hex_md5(bytes: &[u8]) -> String {
    hex::encode(md5::Md5::digest(bytes))
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMetaFile {
    content_length: u64,
    content_type: String,
    last_modified: DateTime<Utc>,
    etag: String,
    storage_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    website_redirect_location: Option<String>,
    #[serde(default)]
    user_metadata: BTreeMap<String, String>,
}

impl ObjectMetaFile {
    fn into_meta(self) -> ObjectMeta {
        ObjectMeta {
            content_length: self.content_length,
            content_type: self.content_type,
            last_modified: self.last_modified,
            etag: self.etag,
            storage_class: crate::types::StorageClass::parse(&self.storage_class)
                .unwrap_or_default(),
            website_redirect_location: self.website_redirect_location,
            user_metadata: self.user_metadata,
        }
    }

    fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            content_length: meta.content_length,
            content_type: meta.content_type.clone(),
            last_modified: meta.last_modified,
            etag: meta.etag.clone(),
            storage_class: meta.storage_class.as_str().to_string(),
            website_redirect_location: meta.website_redirect_location.clone(),
            user_metadata: meta.user_metadata.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketMetaFile {
    creation_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct MultipartIndex {
    key: String,
    initiated: DateTime<Utc>,
    content_type: Option<String>,
    storage_class: Option<String>,
    website_redirect_location: Option<String>,
    user_metadata: BTreeMap<String, String>,
    /// part_number -> (etag, size)
    parts: BTreeMap<u32, (String, u64)>,
}

/// Filesystem storage backend. Each bucket is a real subdirectory under
/// the root; each object is its own directory keyed by its percent-encoded
/// name, holding a body file and a `.metadata.json` sidecar.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub async fn new(root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn bucket_meta_path(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join(".bucket.json")
    }

    fn subresource_path(&self, bucket: &str, key: Option<&str>, kind: SubresourceKind) -> PathBuf {
        match key {
            Some(key) => self
                .object_dir(bucket, key)
                .join(format!(".{}.xml", kind.as_str())),
            None => self.bucket_dir(bucket).join(format!(".{}.xml", kind.as_str())),
        }
    }

    fn object_dir(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join(urlencoding::encode(key).into_owned())
    }

    fn object_body_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.object_dir(bucket, key).join("body")
    }

    fn object_meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.object_dir(bucket, key).join(".metadata.json")
    }

    fn uploads_dir(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join(".uploads")
    }

    fn upload_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.uploads_dir(bucket).join(upload_id)
    }

    fn upload_index_path(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.upload_dir(bucket, upload_id).join("parts.json")
    }

    fn upload_part_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(bucket, upload_id)
            .join(format!("part-{part_number}"))
    }

    async fn read_object_meta(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, StoreError> {
        let path = self.object_meta_path(bucket, key);
        if !path_exists(&path).await {
            return Ok(None);
        }
        let data = fs::read(&path).await?;
        let meta: ObjectMetaFile = serde_json::from_slice(&data)?;
        Ok(Some(meta.into_meta()))
    }

    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        metadata: PutMetadata,
    ) -> Result<ObjectMeta, StoreError> {
        let meta = ObjectMeta {
            content_length: bytes.len() as u64,
            content_type: metadata
                .content_type
                .unwrap_or_else(|| "binary/octet-stream".to_string()),
            last_modified: Utc::now(),
            etag: format!("\"{}\"", hex_md5(bytes)),
            storage_class: metadata.storage_class.unwrap_or_default(),
            website_redirect_location: metadata.website_redirect_location,
            user_metadata: metadata.user_metadata,
        };
        let body_path = self.object_body_path(bucket, key);
        let meta_path = self.object_meta_path(bucket, key);
        atomic_write(&body_path, bytes.to_vec()).await?;
        let meta_json = serde_json::to_vec_pretty(&ObjectMetaFile::from_meta(&meta))?;
        atomic_write(&meta_path, meta_json).await?;
        debug!("put_object {}/{} ({} bytes)", bucket, key, bytes.len());
        Ok(meta)
    }

    async fn read_upload_index(
        &self,
        bucket: &str,
        upload_id: &str,
    ) -> Result<MultipartIndex, StoreError> {
        let path = self.upload_index_path(bucket, upload_id);
        if !path_exists(&path).await {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        let data = fs::read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn write_upload_index(
        &self,
        bucket: &str,
        upload_id: &str,
        index: &MultipartIndex,
    ) -> Result<(), StoreError> {
        let path = self.upload_index_path(bucket, upload_id);
        let data = serde_json::to_vec_pretty(index)?;
        atomic_write(&path, data).await
    }

    async fn require_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if !path_exists(&self.bucket_dir(bucket)).await {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FilesystemStore {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StoreError> {
        let mut buckets = Vec::new();
        if !path_exists(&self.root).await {
            return Ok(buckets);
        }
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    let creation_date = match fs::read(self.bucket_meta_path(name)).await {
                        Ok(data) => serde_json::from_slice::<BucketMetaFile>(&data)
                            .map(|m| m.creation_date)
                            .unwrap_or_else(|_| Utc::now()),
                        Err(_) => Utc::now(),
                    };
                    buckets.push(Bucket {
                        name: name.to_string(),
                        creation_date,
                    });
                }
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("listed {} buckets", buckets.len());
        Ok(buckets)
    }

    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, StoreError> {
        if !path_exists(&self.bucket_dir(name)).await {
            return Ok(None);
        }
        let creation_date = match fs::read(self.bucket_meta_path(name)).await {
            Ok(data) => serde_json::from_slice::<BucketMetaFile>(&data)
                .map(|m| m.creation_date)
                .unwrap_or_else(|_| Utc::now()),
            Err(_) => Utc::now(),
        };
        Ok(Some(Bucket {
            name: name.to_string(),
            creation_date,
        }))
    }

    async fn put_bucket(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.bucket_dir(name);
        if path_exists(&dir).await {
            return Err(StoreError::BucketAlreadyExists(name.to_string()));
        }
        fs::create_dir_all(&dir).await?;
        let meta = BucketMetaFile {
            creation_date: Utc::now(),
        };
        atomic_write(&self.bucket_meta_path(name), serde_json::to_vec(&meta)?).await?;
        debug!("created bucket {}", name);
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        self.require_bucket(name).await?;
        let dir = self.bucket_dir(name);
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name == ".bucket.json" || file_name.ends_with(".xml") {
                continue;
            }
            if file_name == ".uploads" {
                // completed/aborted uploads remove their own per-upload dir but
                // leave this parent behind; only a live (in-progress) upload
                // makes the bucket non-empty.
                let mut uploads = fs::read_dir(entry.path()).await?;
                if uploads.next_entry().await?.is_none() {
                    continue;
                }
                return Err(StoreError::BucketNotEmpty(name.to_string()));
            }
            return Err(StoreError::BucketNotEmpty(name.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        debug!("deleted bucket {}", name);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        start_after: Option<&str>,
        max_keys: u32,
    ) -> Result<ListPage, StoreError> {
        self.require_bucket(bucket).await?;
        let dir = self.bucket_dir(bucket);
        let mut all_keys: Vec<String> = Vec::new();
        if path_exists(&dir).await {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let encoded = entry.file_name();
                let encoded = encoded.to_string_lossy();
                if encoded.starts_with('.') {
                    continue;
                }
                if let Ok(key) = urlencoding::decode(&encoded) {
                    all_keys.push(key.into_owned());
                }
            }
        }
        all_keys.sort();

        let filtered: Vec<&str> = all_keys
            .iter()
            .map(|s| s.as_str())
            .filter(|k| k.starts_with(prefix))
            .filter(|k| start_after.map(|s| *k > s).unwrap_or(true))
            .collect();

        if max_keys == 0 {
            return Ok(ListPage::default());
        }

        let mut objects = Vec::new();
        let mut common_prefixes: Vec<String> = Vec::new();
        let mut is_truncated = false;
        let mut next_token = None;
        let mut count = 0u32;

        for key in filtered {
            if count >= max_keys {
                is_truncated = true;
                break;
            }
            let collapsed = delimiter.filter(|d| !d.is_empty()).and_then(|d| {
                let rest = &key[prefix.len()..];
                rest.find(d)
                    .map(|idx| key[..prefix.len() + idx + d.len()].to_string())
            });
            if let Some(cp) = collapsed {
                if common_prefixes.last() != Some(&cp) {
                    common_prefixes.push(cp.clone());
                    count += 1;
                    next_token = Some(cp);
                }
                continue;
            }
            if let Some(meta) = self.read_object_meta(bucket, key).await? {
                objects.push((key.to_string(), meta));
                count += 1;
                next_token = Some(key.to_string());
            }
        }

        common_prefixes.sort();
        common_prefixes.dedup();

        if !is_truncated {
            next_token = None;
        }

        Ok(ListPage {
            objects,
            common_prefixes,
            is_truncated,
            next_token,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Option<Object>, StoreError> {
        self.require_bucket(bucket).await?;
        let meta = match self.read_object_meta(bucket, key).await? {
            Some(m) => m,
            None => return Ok(None),
        };
        let body_path = self.object_body_path(bucket, key);
        let mut data = fs::read(&body_path).await?;
        if let Some(range) = range {
            let len = data.len() as u64;
            let start = range.start.min(len);
            let end = range.end.min(len.saturating_sub(1));
            if start > end {
                data = Vec::new();
            } else {
                data = data[start as usize..=end as usize].to_vec();
            }
        }
        Ok(Some(Object {
            meta,
            body: Bytes::from(data),
        }))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.require_bucket(bucket).await?;
        self.read_object_meta(bucket, key).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        metadata: PutMetadata,
    ) -> Result<ObjectMeta, StoreError> {
        self.require_bucket(bucket).await?;
        self.write_object(bucket, key, &bytes, metadata).await
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        directive: MetadataDirective,
        replacement_metadata: PutMetadata,
    ) -> Result<ObjectMeta, StoreError> {
        self.require_bucket(src_bucket).await?;
        self.require_bucket(dst_bucket).await?;
        let src_meta = self
            .read_object_meta(src_bucket, src_key)
            .await?
            .ok_or_else(|| StoreError::NoSuchKey(src_key.to_string()))?;
        let body = fs::read(self.object_body_path(src_bucket, src_key)).await?;

        let metadata = match directive {
            MetadataDirective::Copy => PutMetadata {
                content_type: Some(src_meta.content_type.clone()),
                storage_class: Some(src_meta.storage_class),
                website_redirect_location: src_meta.website_redirect_location.clone(),
                user_metadata: src_meta.user_metadata.clone(),
            },
            MetadataDirective::Replace => replacement_metadata,
        };

        self.write_object(dst_bucket, dst_key, &body, metadata).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        let dir = self.object_dir(bucket, key);
        if path_exists(&dir).await {
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: PutMetadata,
    ) -> Result<String, StoreError> {
        self.require_bucket(bucket).await?;
        let upload_id = hex::encode(md5::Md5::digest(format!(
            "{bucket}/{key}/{}/{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            uuid::Uuid::new_v4()
        )));
        let index = MultipartIndex {
            key: key.to_string(),
            initiated: Utc::now(),
            content_type: metadata.content_type,
            storage_class: metadata.storage_class.map(|c| c.as_str().to_string()),
            website_redirect_location: metadata.website_redirect_location,
            user_metadata: metadata.user_metadata,
            parts: BTreeMap::new(),
        };
        fs::create_dir_all(self.upload_dir(bucket, &upload_id)).await?;
        self.write_upload_index(bucket, &upload_id, &index).await?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: Bytes,
    ) -> Result<String, StoreError> {
        if !(1..=10000).contains(&part_number) {
            return Err(StoreError::InvalidArgument(format!(
                "part number {part_number} out of range 1..=10000"
            )));
        }
        let mut index = self.read_upload_index(bucket, upload_id).await?;
        if index.key != key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        let etag = format!("\"{}\"", hex_md5(&bytes));
        let path = self.upload_part_path(bucket, upload_id, part_number);
        atomic_write(&path, bytes.to_vec()).await?;
        index
            .parts
            .insert(part_number, (etag.clone(), bytes.len() as u64));
        self.write_upload_index(bucket, upload_id, &index).await?;
        Ok(etag)
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        src_range: Option<ByteRange>,
    ) -> Result<String, StoreError> {
        let object = self
            .get_object(src_bucket, src_key, src_range)
            .await?
            .ok_or_else(|| StoreError::NoSuchKey(src_key.to_string()))?;
        self.upload_part(bucket, key, upload_id, part_number, object.body)
            .await
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectMeta, StoreError> {
        let index = self.read_upload_index(bucket, upload_id).await?;
        if index.key != key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }

        let mut last_number = 0u32;
        let mut body = Vec::new();
        let mut part_md5s = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if part.part_number <= last_number {
                return Err(StoreError::InvalidPart(
                    "part numbers must be strictly increasing".to_string(),
                ));
            }
            last_number = part.part_number;
            let (stored_etag, size) = index.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::InvalidPart(format!("missing part {}", part.part_number))
            })?;
            if *stored_etag != part.etag {
                return Err(StoreError::InvalidPart(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            let is_last = i == parts.len() - 1;
            if !is_last && *size < 5 * 1024 * 1024 {
                return Err(StoreError::EntityTooSmall(format!(
                    "part {} is smaller than 5 MiB",
                    part.part_number
                )));
            }
            let part_bytes =
                fs::read(self.upload_part_path(bucket, upload_id, part.part_number)).await?;
            part_md5s.extend_from_slice(&md5::Md5::digest(&part_bytes));
            body.extend_from_slice(&part_bytes);
        }

        let composite_etag = format!("\"{}-{}\"", hex_md5(&part_md5s), parts.len());

        let metadata = PutMetadata {
            content_type: index.content_type.clone(),
            storage_class: index
                .storage_class
                .as_deref()
                .and_then(|s| crate::types::StorageClass::parse(s).ok()),
            website_redirect_location: index.website_redirect_location.clone(),
            user_metadata: index.user_metadata.clone(),
        };

        let mut meta = self.write_object(bucket, key, &body, metadata).await?;
        meta.etag = composite_etag;
        let meta_path = self.object_meta_path(bucket, key);
        atomic_write(
            &meta_path,
            serde_json::to_vec_pretty(&ObjectMetaFile::from_meta(&meta))?,
        )
        .await?;

        fs::remove_dir_all(self.upload_dir(bucket, upload_id)).await?;
        Ok(meta)
    }

    async fn abort_multipart(
        &self,
        bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let dir = self.upload_dir(bucket, upload_id);
        if !path_exists(&dir).await {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, StoreError> {
        let index = self.read_upload_index(bucket, upload_id).await?;
        if index.key != key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(index
            .parts
            .into_iter()
            .map(|(part_number, (etag, size))| UploadedPart {
                part_number,
                etag,
                size,
                last_modified: index.initiated,
            })
            .collect())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<MultipartUploadSummary>, StoreError> {
        let dir = self.uploads_dir(bucket);
        let mut out = Vec::new();
        if !path_exists(&dir).await {
            return Ok(out);
        }
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let upload_id = entry.file_name().to_string_lossy().into_owned();
            if let Ok(index) = self.read_upload_index(bucket, &upload_id).await {
                if prefix.map(|p| index.key.starts_with(p)).unwrap_or(true) {
                    out.push(MultipartUploadSummary {
                        key: index.key,
                        upload_id,
                        initiated: index.initiated,
                    });
                }
            }
        }
        out.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));
        Ok(out)
    }

    async fn get_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
    ) -> Result<Option<String>, StoreError> {
        self.require_bucket(bucket).await?;
        let path = self.subresource_path(bucket, key, kind);
        if !path_exists(&path).await {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path).await?))
    }

    async fn put_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
        config_xml: String,
    ) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        atomic_write(&self.subresource_path(bucket, key, kind), config_xml.into_bytes()).await
    }

    async fn delete_subresource(
        &self,
        bucket: &str,
        key: Option<&str>,
        kind: SubresourceKind,
    ) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        let path = self.subresource_path(bucket, key, kind);
        if path_exists(&path).await {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        if path_exists(&self.root).await {
            fs::remove_dir_all(&self.root).await?;
        }
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}
