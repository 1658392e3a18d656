//! Core value types shared across the store, the SigV4 verifier, and the
//! HTTP handlers: object keys, bucket-name validation, and S3 storage
//! classes.

use std::fmt;

/// S3 metadata conventions used on the wire.
pub mod meta_keys {
    /// Prefix for user-defined object metadata headers.
    pub const AMZ_META_PREFIX: &str = "x-amz-meta-";
    pub const AMZ_COPY_SOURCE: &str = "x-amz-copy-source";
    pub const AMZ_METADATA_DIRECTIVE: &str = "x-amz-metadata-directive";
    pub const AMZ_WEBSITE_REDIRECT_LOCATION: &str = "x-amz-website-redirect-location";
    pub const AMZ_STORAGE_CLASS: &str = "x-amz-storage-class";
    pub const AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";
    pub const AMZ_DECODED_CONTENT_LENGTH: &str = "x-amz-decoded-content-length";
}

/// Error raised when a caller-supplied bucket name or object key fails
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidationError(String);

impl KeyValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for KeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for KeyValidationError {}

/// Validate a bucket name per the DNS-label constraints named in the data
/// model: 3-63 characters, lowercase alphanumerics, `.` and `-`, must start
/// and end with an alphanumeric character.
pub fn validate_bucket_name(name: &str) -> Result<(), KeyValidationError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(KeyValidationError::new(
            "Bucket name must be between 3 and 63 characters long",
        ));
    }
    let bytes = name.as_bytes();
    let valid_char = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-';
    if !bytes.iter().all(|&b| valid_char(b)) {
        return Err(KeyValidationError::new(
            "Bucket name must contain only lowercase letters, digits, dots, and hyphens",
        ));
    }
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit())
        || !(last.is_ascii_lowercase() || last.is_ascii_digit())
    {
        return Err(KeyValidationError::new(
            "Bucket name must start and end with a letter or digit",
        ));
    }
    if name.contains("..") || name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(KeyValidationError::new(
            "Bucket name must not be formatted as an IP address and must not contain '..'",
        ));
    }
    Ok(())
}

/// Validate an object key. The store is flat (`/` has no structural meaning),
/// so the only hard requirements are non-emptiness and the absence of NUL
/// bytes; the filesystem backend is responsible for safely encoding the key
/// into a path component.
pub fn validate_object_key(key: &str) -> Result<(), KeyValidationError> {
    if key.is_empty() {
        return Err(KeyValidationError::new("Object key must not be empty"));
    }
    if key.contains('\0') {
        return Err(KeyValidationError::new(
            "Object key must not contain NUL bytes",
        ));
    }
    Ok(())
}

/// S3 storage class. Only `STANDARD` has behavioral meaning here; the rest
/// round-trip so SDKs that set an explicit class don't choke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageClass {
    #[default]
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    Glacier,
    DeepArchive,
    Outposts,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Outposts => "OUTPOSTS",
        }
    }

    pub fn parse(s: &str) -> Result<Self, KeyValidationError> {
        match s {
            "STANDARD" => Ok(StorageClass::Standard),
            "REDUCED_REDUNDANCY" => Ok(StorageClass::ReducedRedundancy),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "ONEZONE_IA" => Ok(StorageClass::OnezoneIa),
            "INTELLIGENT_TIERING" => Ok(StorageClass::IntelligentTiering),
            "GLACIER" => Ok(StorageClass::Glacier),
            "DEEP_ARCHIVE" => Ok(StorageClass::DeepArchive),
            "OUTPOSTS" => Ok(StorageClass::Outposts),
            other => Err(KeyValidationError::new(format!(
                "Invalid storage class: {other}"
            ))),
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_length_bounds() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name("abc").is_ok());
    }

    #[test]
    fn bucket_name_rejects_uppercase_and_underscore() {
        assert!(validate_bucket_name("MyBucket").is_err());
        assert!(validate_bucket_name("my_bucket").is_err());
    }

    #[test]
    fn bucket_name_rejects_ip_literal() {
        assert!(validate_bucket_name("192.168.0.1").is_err());
    }

    #[test]
    fn bucket_name_rejects_bad_edges() {
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
        assert!(validate_bucket_name(".bucket").is_err());
    }

    #[test]
    fn object_key_rejects_empty_and_nul() {
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("a\0b").is_err());
    }

    #[test]
    fn object_key_allows_trailing_slash_distinct_from_bare() {
        assert!(validate_object_key("foo").is_ok());
        assert!(validate_object_key("foo/").is_ok());
    }

    #[test]
    fn storage_class_round_trips() {
        for s in [
            "STANDARD",
            "REDUCED_REDUNDANCY",
            "STANDARD_IA",
            "ONEZONE_IA",
            "INTELLIGENT_TIERING",
            "GLACIER",
            "DEEP_ARCHIVE",
            "OUTPOSTS",
        ] {
            assert_eq!(StorageClass::parse(s).unwrap().as_str(), s);
        }
        assert!(StorageClass::parse("BOGUS").is_err());
    }
}
