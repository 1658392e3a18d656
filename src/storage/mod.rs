//! Storage backend abstraction.

pub mod filesystem;
pub mod traits;

pub use filesystem::FilesystemStore;
pub use traits::{
    Bucket, ByteRange, CompletedPart, ListPage, MetadataDirective, MultipartUploadSummary,
    Object, ObjectMeta, PutMetadata, Store, StoreError, SubresourceKind, UploadedPart,
};
