//! Best-effort object-lifecycle event emitter.
//!
//! Mirrors the S3 bucket-notification record shape closely enough that a
//! test harness listening for `ObjectCreated:*` / `ObjectRemoved:*` records
//! sees the fields it expects. Delivery is in-process and non-blocking: a
//! full or closed channel never fails the request that triggered the event.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

/// The mutation that produced an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Post,
    Copy,
    CompleteMultipartUpload,
    Delete,
}

impl EventKind {
    fn name(self) -> &'static str {
        match self {
            EventKind::Put => "ObjectCreated:Put",
            EventKind::Post => "ObjectCreated:Post",
            EventKind::Copy => "ObjectCreated:Copy",
            EventKind::CompleteMultipartUpload => "ObjectCreated:CompleteMultipartUpload",
            EventKind::Delete => "ObjectRemoved:Delete",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct UserIdentity {
    #[serde(rename = "principalId")]
    principal_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct RequestParameters {
    #[serde(rename = "sourceIPAddress")]
    source_ip_address: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseElements {
    #[serde(rename = "x-amz-request-id")]
    request_id: String,
    #[serde(rename = "x-amz-id-2")]
    id_2: String,
}

#[derive(Debug, Clone, Serialize)]
struct OwnerIdentity {
    #[serde(rename = "principalId")]
    principal_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct BucketInfo {
    name: String,
    #[serde(rename = "ownerIdentity")]
    owner_identity: OwnerIdentity,
    arn: String,
}

#[derive(Debug, Clone, Serialize)]
struct ObjectInfo {
    key: String,
    sequencer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(rename = "eTag", skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct S3Detail {
    #[serde(rename = "s3SchemaVersion")]
    s3_schema_version: String,
    #[serde(rename = "configurationId")]
    configuration_id: String,
    bucket: BucketInfo,
    object: ObjectInfo,
}

/// A single S3-style bucket-notification record.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    #[serde(rename = "eventVersion")]
    event_version: String,
    #[serde(rename = "eventSource")]
    event_source: String,
    #[serde(rename = "awsRegion")]
    aws_region: String,
    #[serde(rename = "eventTime")]
    event_time: String,
    #[serde(rename = "eventName")]
    event_name: String,
    #[serde(rename = "userIdentity")]
    user_identity: UserIdentity,
    #[serde(rename = "requestParameters")]
    request_parameters: RequestParameters,
    #[serde(rename = "responseElements")]
    response_elements: ResponseElements,
    s3: S3Detail,
}

/// The envelope published on every object mutation.
#[derive(Debug, Clone, Serialize)]
pub struct RecordEnvelope {
    #[serde(rename = "Records")]
    pub records: Vec<Record>,
}

/// Inputs describing the mutation that triggers an event.
pub struct EventInput<'a> {
    pub kind: EventKind,
    pub bucket: &'a str,
    pub key: &'a str,
    pub source_ip: &'a str,
    pub request_id: &'a str,
    pub size: Option<u64>,
    pub etag: Option<&'a str>,
}

fn hex_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest).chars().take(len).collect()
}

fn sequencer() -> String {
    format!("{:016X}", Utc::now().timestamp_nanos_opt().unwrap_or(0))
}

/// Publishes best-effort object-lifecycle notifications to any subscriber
/// listening via [`EventEmitter::subscribe`]. Built on a broadcast channel
/// rather than anything that can block or fail the caller: a notification
/// with no subscribers, or whose subscribers lag, is simply dropped.
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<RecordEnvelope>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Subscribe to the event stream, e.g. from an integration test.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordEnvelope> {
        self.sender.subscribe()
    }

    /// Build and publish a record envelope for one mutation. Never fails:
    /// a send with no receivers is a documented no-op of `broadcast::Sender`.
    pub fn emit(&self, input: EventInput<'_>) {
        let principal_id = format!("AWS:{}", hex_hash(&format!("{}{}", input.bucket, input.key), 21));
        let owner_principal_id = hex_hash(input.bucket, 14);
        let envelope = RecordEnvelope {
            records: vec![Record {
                event_version: "2.0".to_string(),
                event_source: "aws:s3".to_string(),
                aws_region: "us-east-1".to_string(),
                event_time: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                event_name: input.kind.name().to_string(),
                user_identity: UserIdentity { principal_id },
                request_parameters: RequestParameters {
                    source_ip_address: input.source_ip.to_string(),
                },
                response_elements: ResponseElements {
                    request_id: input.request_id.to_string(),
                    id_2: hex_hash(input.request_id, 40),
                },
                s3: S3Detail {
                    s3_schema_version: "1.0".to_string(),
                    configuration_id: "testConfigId".to_string(),
                    bucket: BucketInfo {
                        name: input.bucket.to_string(),
                        owner_identity: OwnerIdentity {
                            principal_id: owner_principal_id,
                        },
                        arn: format!("arn:aws:s3:::{}", input.bucket),
                    },
                    object: ObjectInfo {
                        key: input.key.to_string(),
                        sequencer: sequencer(),
                        size: input.size,
                        etag: input.etag.map(str::to_string),
                    },
                },
            }],
        };

        if self.sender.send(envelope).is_err() {
            debug!(bucket = input.bucket, key = input.key, "event emitted with no subscribers");
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_taxonomy() {
        assert_eq!(EventKind::Put.name(), "ObjectCreated:Put");
        assert_eq!(EventKind::Delete.name(), "ObjectRemoved:Delete");
        assert_eq!(
            EventKind::CompleteMultipartUpload.name(),
            "ObjectCreated:CompleteMultipartUpload"
        );
    }

    #[tokio::test]
    async fn emit_delivers_to_subscriber() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();
        emitter.emit(EventInput {
            kind: EventKind::Put,
            bucket: "my-bucket",
            key: "my-key",
            source_ip: "127.0.0.1",
            request_id: "req-1",
            size: Some(42),
            etag: Some("abc123"),
        });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.records.len(), 1);
        assert_eq!(envelope.records[0].event_name, "ObjectCreated:Put");
        assert_eq!(envelope.records[0].s3.bucket.name, "my-bucket");
        assert_eq!(envelope.records[0].s3.object.key, "my-key");
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let emitter = EventEmitter::new();
        emitter.emit(EventInput {
            kind: EventKind::Delete,
            bucket: "b",
            key: "k",
            source_ip: "-",
            request_id: "r",
            size: None,
            etag: None,
        });
    }
}
