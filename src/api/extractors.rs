//! Custom Axum extractors for S3 request paths.
//!
//! The host/path router (see [`crate::router`]) has already rewritten the
//! request URI to the canonical `/{bucket}` or `/{bucket}/{key}` shape
//! regardless of how the client originally addressed the bucket (path-style
//! or virtual-hosted-style). These extractors just pull the path segments
//! back out; bucket *existence* is a `Store` question, checked by handlers.

use super::errors::S3Error;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

/// A bucket name taken from the request path, not yet validated against the
/// store.
#[derive(Debug, Clone)]
pub struct ValidatedBucket(pub String);

impl std::ops::Deref for ValidatedBucket {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ValidatedBucket
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(bucket): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| S3Error::InvalidRequest("missing bucket in request path".to_string()))?;
        Ok(ValidatedBucket(bucket))
    }
}

/// A bucket and key taken from the request path. The key is normalized by
/// stripping a leading slash (axum's wildcard capture includes it); no
/// other transformation happens since the store is flat and `/` carries no
/// structural meaning in a key.
#[derive(Debug, Clone)]
pub struct ValidatedPath {
    pub bucket: String,
    pub key: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ValidatedPath
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((bucket, key)): Path<(String, String)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                S3Error::InvalidRequest("missing bucket/key in request path".to_string())
            })?;
        let key = key.trim_start_matches('/').to_string();
        Ok(ValidatedPath { bucket, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deref_exposes_inner_str() {
        let b = ValidatedBucket("my-bucket".to_string());
        assert_eq!(&*b, "my-bucket");
    }
}
