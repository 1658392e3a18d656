//! S3 error taxonomy and XML envelope rendering.
//!
//! One variant per error code in the public surface; converts `StoreError`
//! at the API boundary so internal storage detail never reaches a client.

use crate::storage::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

/// S3 API errors, one variant per code in the public taxonomy.
#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("The specified bucket does not exist")]
    NoSuchBucket(String),

    #[error("The specified key does not exist.")]
    NoSuchKey(String),

    #[error("The specified multipart upload does not exist. The upload ID might be invalid, or the upload might have been aborted or completed.")]
    NoSuchUpload(String),

    #[error("The CORS configuration does not exist")]
    NoSuchCorsConfiguration(String),

    #[error("The specified bucket does not have a website configuration")]
    NoSuchWebsiteConfiguration(String),

    #[error("The bucket you tried to delete is not empty")]
    BucketNotEmpty(String),

    #[error("The requested bucket name is not available")]
    BucketAlreadyExists(String),

    #[error("The specified bucket is not valid")]
    InvalidBucketName(String),

    #[error("The XML you provided was not well-formed or did not validate against our published schema: {0}")]
    MalformedXml(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("The storage class you specified is not valid")]
    InvalidStorageClass(String),

    #[error("The authorization header you provided is not valid.")]
    AuthorizationHeaderMalformed,

    #[error("Error parsing the X-Amz-Credential parameter; the Access Key Id does not exist in our records.")]
    AuthorizationQueryParametersError(String),

    #[error("The request signature we calculated does not match the signature you provided.")]
    SignatureDoesNotMatch {
        string_to_sign: String,
        string_to_sign_bytes: String,
    },

    #[error("Access Denied")]
    AccessDenied,

    #[error("The difference between the request time and the current time is too large.")]
    RequestTimeTooSkewed,

    #[error("Only the last chunk is allowed to have a size less than 8192 bytes")]
    InvalidChunkSizeError { chunk: usize, bad_chunk_size: usize },

    #[error("You must provide the Content-Length HTTP header.")]
    MissingContentLength,

    #[error("There is a problem with your multi-chunk request.")]
    IncompleteBody,

    #[error("At least one of the pre-conditions you specified did not hold")]
    PreconditionFailed(String),

    #[error("One or more of the specified parts could not be found. The part might not have been uploaded, or the specified ETag might not have matched the part's ETag.")]
    InvalidPart(String),

    #[error("Your proposed upload is smaller than the minimum allowed object size.")]
    EntityTooSmall(String),

    #[error("Your proposed upload exceeds the maximum allowed object size.")]
    EntityTooLarge,

    #[error("The Content-MD5 you specified did not match what we received.")]
    BadDigest,

    #[error("The requested range is not satisfiable")]
    InvalidRange(String),

    #[error("We encountered an internal error. Please try again.")]
    InternalError(String),
}

impl S3Error {
    /// The S3 error code, as emitted in `<Code>`.
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::NoSuchBucket(_) => "NoSuchBucket",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::NoSuchUpload(_) => "NoSuchUpload",
            S3Error::NoSuchCorsConfiguration(_) => "NoSuchCORSConfiguration",
            S3Error::NoSuchWebsiteConfiguration(_) => "NoSuchWebsiteConfiguration",
            S3Error::BucketNotEmpty(_) => "BucketNotEmpty",
            S3Error::BucketAlreadyExists(_) => "BucketAlreadyExists",
            S3Error::InvalidBucketName(_) => "InvalidBucketName",
            S3Error::MalformedXml(_) => "MalformedXML",
            S3Error::InvalidArgument(_) => "InvalidArgument",
            S3Error::InvalidRequest(_) => "InvalidRequest",
            S3Error::InvalidStorageClass(_) => "InvalidStorageClass",
            S3Error::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            S3Error::AuthorizationQueryParametersError(_) => "AuthorizationQueryParametersError",
            S3Error::SignatureDoesNotMatch { .. } => "SignatureDoesNotMatch",
            S3Error::AccessDenied => "AccessDenied",
            S3Error::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            S3Error::InvalidChunkSizeError { .. } => "InvalidChunkSizeError",
            S3Error::MissingContentLength => "MissingContentLength",
            S3Error::IncompleteBody => "IncompleteBody",
            S3Error::PreconditionFailed(_) => "PreconditionFailed",
            S3Error::InvalidPart(_) => "InvalidPart",
            S3Error::EntityTooSmall(_) => "EntityTooSmall",
            S3Error::EntityTooLarge => "EntityTooLarge",
            S3Error::BadDigest => "BadDigest",
            S3Error::InvalidRange(_) => "InvalidRange",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::NoSuchBucket(_)
            | S3Error::NoSuchKey(_)
            | S3Error::NoSuchUpload(_)
            | S3Error::NoSuchCorsConfiguration(_)
            | S3Error::NoSuchWebsiteConfiguration(_) => StatusCode::NOT_FOUND,

            S3Error::BucketNotEmpty(_) | S3Error::BucketAlreadyExists(_) => StatusCode::CONFLICT,

            S3Error::InvalidBucketName(_)
            | S3Error::MalformedXml(_)
            | S3Error::InvalidArgument(_)
            | S3Error::InvalidRequest(_)
            | S3Error::InvalidStorageClass(_)
            | S3Error::AuthorizationHeaderMalformed
            | S3Error::AuthorizationQueryParametersError(_)
            | S3Error::IncompleteBody
            | S3Error::InvalidPart(_)
            | S3Error::EntityTooSmall(_)
            | S3Error::EntityTooLarge
            | S3Error::BadDigest => StatusCode::BAD_REQUEST,

            S3Error::SignatureDoesNotMatch { .. }
            | S3Error::AccessDenied
            | S3Error::RequestTimeTooSkewed
            | S3Error::InvalidChunkSizeError { .. } => StatusCode::FORBIDDEN,

            S3Error::MissingContentLength => StatusCode::LENGTH_REQUIRED,
            S3Error::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            S3Error::InvalidRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The resource path embedded in `<Resource>` (bucket, key, or empty).
    fn resource(&self) -> String {
        match self {
            S3Error::NoSuchBucket(r)
            | S3Error::NoSuchKey(r)
            | S3Error::NoSuchUpload(r)
            | S3Error::NoSuchCorsConfiguration(r)
            | S3Error::NoSuchWebsiteConfiguration(r)
            | S3Error::BucketNotEmpty(r)
            | S3Error::BucketAlreadyExists(r)
            | S3Error::InvalidBucketName(r)
            | S3Error::PreconditionFailed(r)
            | S3Error::InvalidPart(r)
            | S3Error::EntityTooSmall(r)
            | S3Error::InvalidRange(r) => r.clone(),
            _ => String::new(),
        }
    }

    /// Extra `<Element>` tags beyond Code/Message/Resource/RequestId, per §7's
    /// scenario-specific error detail (signature mismatch, bad chunk size).
    fn extra_xml(&self) -> String {
        match self {
            S3Error::SignatureDoesNotMatch {
                string_to_sign,
                string_to_sign_bytes,
            } => format!(
                "<StringToSign>{}</StringToSign><StringToSignBytes>{}</StringToSignBytes>",
                crate::api::xml::escape_xml(string_to_sign),
                string_to_sign_bytes
            ),
            S3Error::InvalidChunkSizeError {
                chunk,
                bad_chunk_size,
            } => format!(
                "<Chunk>{}</Chunk><BadChunkSize>{}</BadChunkSize>",
                chunk, bad_chunk_size
            ),
            _ => String::new(),
        }
    }

    /// Render the full `<Error>` XML envelope per §7.
    pub fn to_xml(&self) -> String {
        let request_id = Uuid::new_v4().simple().to_string();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>{}</Code><Message>{}</Message>{}<Resource>{}</Resource><RequestId>{}</RequestId></Error>"#,
            self.code(),
            crate::api::xml::escape_xml(&self.to_string()),
            self.extra_xml(),
            crate::api::xml::escape_xml(&self.resource()),
            request_id,
        )
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        if matches!(self, S3Error::InternalError(ref msg) if !msg.is_empty()) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status_code();
        let body = self.to_xml();
        (status, [("Content-Type", "application/xml")], body).into_response()
    }
}

impl From<StoreError> for S3Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoSuchBucket(b) => S3Error::NoSuchBucket(b),
            StoreError::NoSuchKey(k) => S3Error::NoSuchKey(k),
            StoreError::BucketAlreadyExists(b) => S3Error::BucketAlreadyExists(b),
            StoreError::BucketNotEmpty(b) => S3Error::BucketNotEmpty(b),
            StoreError::NoSuchUpload(u) => S3Error::NoSuchUpload(u),
            StoreError::InvalidPart(m) => S3Error::InvalidPart(m),
            StoreError::EntityTooSmall(m) => S3Error::EntityTooSmall(m),
            StoreError::NoSuchSubresource(m) => S3Error::NoSuchCorsConfiguration(m),
            StoreError::InvalidArgument(m) => S3Error::InvalidArgument(m),
            StoreError::Io(e) => S3Error::InternalError(e.to_string()),
            StoreError::Serialization(e) => S3Error::InternalError(e.to_string()),
            StoreError::Internal(m) => S3Error::InternalError(m),
        }
    }
}

impl From<crate::types::KeyValidationError> for S3Error {
    fn from(err: crate::types::KeyValidationError) -> Self {
        S3Error::InvalidBucketName(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            S3Error::NoSuchBucket("b".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            S3Error::BucketNotEmpty("b".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            S3Error::AccessDenied.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            S3Error::MissingContentLength.status_code(),
            StatusCode::LENGTH_REQUIRED
        );
        assert_eq!(
            S3Error::PreconditionFailed("x".into()).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            S3Error::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn xml_envelope_contains_code_and_request_id() {
        let xml = S3Error::NoSuchKey("foo".into()).to_xml();
        assert!(xml.contains("<Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Resource>foo</Resource>"));
        assert!(xml.contains("<RequestId>"));
    }

    #[test]
    fn signature_mismatch_carries_string_to_sign() {
        let err = S3Error::SignatureDoesNotMatch {
            string_to_sign: "AWS4-HMAC-SHA256\n...".into(),
            string_to_sign_bytes: "4157 5334".into(),
        };
        let xml = err.to_xml();
        assert!(xml.contains("<StringToSign>"));
        assert!(xml.contains("<StringToSignBytes>4157 5334</StringToSignBytes>"));
    }

    #[test]
    fn chunk_size_error_carries_chunk_ordinal() {
        let err = S3Error::InvalidChunkSizeError {
            chunk: 3,
            bad_chunk_size: 5,
        };
        let xml = err.to_xml();
        assert!(xml.contains("<Chunk>3</Chunk>"));
        assert!(xml.contains("<BadChunkSize>5</BadChunkSize>"));
    }
}
