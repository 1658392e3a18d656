//! `STREAMING-AWS4-HMAC-SHA256-PAYLOAD` chunked body decoder and verifier.
//!
//! Each chunk line is `HEX(len) ";chunk-signature=" HEX(sig) CRLF payload
//! CRLF`; the payload is re-assembled here while checking every chunk's
//! signature against a chain seeded by the request's own SigV4 signature
//! (see [`crate::api::auth::ChunkSigningContext`]).

use crate::api::auth::{hmac_sha256, ChunkSigningContext};
use crate::api::S3Error;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

const MIN_CHUNK_SIZE: usize = 8192;
const EMPTY_SHA256_HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub fn is_aws_chunked(headers: &HeaderMap) -> bool {
    headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "STREAMING-AWS4-HMAC-SHA256-PAYLOAD")
        .unwrap_or(false)
}

fn decoded_content_length(headers: &HeaderMap) -> Result<usize, S3Error> {
    headers
        .get("x-amz-decoded-content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(S3Error::MissingContentLength)
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(1)).find(|&i| data[i] == b'\r' && data[i + 1] == b'\n')
}

fn chunk_string_to_sign(ctx: &ChunkSigningContext, previous_signature: &str, chunk: &[u8]) -> String {
    format!(
        "AWS4-HMAC-SHA256-PAYLOAD\n{}\n{}\n{}\n{}\n{}",
        ctx.amz_date,
        ctx.credential_scope,
        previous_signature,
        EMPTY_SHA256_HEX,
        hex::encode(Sha256::digest(chunk)),
    )
}

/// Decode and verify an AWS-chunked body. Requires
/// `X-Amz-Decoded-Content-Length`; validates each chunk's signature against
/// the chain seeded by `ctx`, enforces the 8192-byte minimum non-final
/// chunk size, and checks the reassembled length against the declared one.
///
/// The minimum-size check is deferred by one chunk: an undersized chunk is
/// only a violation once a following chunk proves it wasn't the last one,
/// so the reported ordinal is that following chunk's, not the undersized
/// chunk's own.
pub fn decode_aws_chunked(
    body: &[u8],
    headers: &HeaderMap,
    ctx: &ChunkSigningContext,
) -> Result<bytes::Bytes, S3Error> {
    let expected_length = decoded_content_length(headers)?;
    let mut result = Vec::with_capacity(expected_length);
    let mut pos = 0;
    let mut previous_signature = ctx.seed_signature.clone();
    let mut chunk_ordinal = 0usize;
    // A chunk's minimum-size violation isn't known until the *next* chunk's
    // header is read — only then is it certain the undersized chunk wasn't
    // the last one. Holds the undersized chunk's size between iterations so
    // the error can name the ordinal of the chunk that revealed it.
    let mut pending_small: Option<usize> = None;

    loop {
        let header_end =
            find_crlf(&body[pos..]).ok_or(S3Error::InvalidRequest("malformed chunk header".to_string()))?;
        let header_line = &body[pos..pos + header_end];
        pos += header_end + 2;

        let header_str = std::str::from_utf8(header_line)
            .map_err(|_| S3Error::InvalidRequest("non-UTF8 chunk header".to_string()))?;
        let mut parts = header_str.splitn(2, ';');
        let chunk_size_hex = parts.next().unwrap_or("");
        let chunk_size = usize::from_str_radix(chunk_size_hex.trim(), 16)
            .map_err(|_| S3Error::InvalidRequest("malformed chunk size".to_string()))?;
        let chunk_signature = parts
            .next()
            .and_then(|s| s.trim().strip_prefix("chunk-signature="))
            .ok_or(S3Error::InvalidRequest("missing chunk-signature".to_string()))?
            .to_string();

        let is_last = chunk_size == 0;
        chunk_ordinal += 1;
        if let Some(bad_chunk_size) = pending_small.take() {
            return Err(S3Error::InvalidChunkSizeError {
                chunk: chunk_ordinal,
                bad_chunk_size,
            });
        }

        if pos + chunk_size > body.len() {
            return Err(S3Error::IncompleteBody);
        }
        let chunk = &body[pos..pos + chunk_size];

        let string_to_sign = chunk_string_to_sign(ctx, &previous_signature, chunk);
        let computed = hex::encode(hmac_sha256(&ctx.signing_key, string_to_sign.as_bytes()));
        if computed != chunk_signature {
            return Err(S3Error::SignatureDoesNotMatch {
                string_to_sign,
                string_to_sign_bytes: string_to_sign
                    .as_bytes()
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            });
        }
        previous_signature = chunk_signature;

        pos += chunk_size;
        if pos + 2 <= body.len() && &body[pos..pos + 2] == b"\r\n" {
            pos += 2;
        }

        if is_last {
            break;
        }
        if chunk_size < MIN_CHUNK_SIZE {
            pending_small = Some(chunk_size);
        }
        result.extend_from_slice(chunk);
    }

    if result.len() != expected_length {
        return Err(S3Error::IncompleteBody);
    }

    Ok(bytes::Bytes::from(result))
}
