//! Browser-form (`POST /{bucket}`) uploads.
//!
//! S3 lets a web page upload directly to a bucket via an HTML form carrying
//! a signed policy document as plain fields alongside the file, rather than
//! a signed `Authorization` header — this is the one upload path that never
//! goes through [`crate::api::auth`].

use super::AppState;
use crate::api::S3Error;
use crate::events::{EventInput, EventKind};
use crate::storage::PutMetadata;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

#[derive(Default)]
struct FormFields {
    key: Option<String>,
    content_type: Option<String>,
    success_action_redirect: Option<String>,
    success_action_status: Option<String>,
}

/// Parse `multipart/form-data`, honoring only the fields that precede the
/// `file` field (everything after is ignored, matching the policy-document
/// upload flow browsers generate).
pub async fn post_object_form(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, S3Error> {
    let mut fields = FormFields::default();
    let mut file_bytes: Option<bytes::Bytes> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| S3Error::InvalidRequest(format!("malformed multipart form: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name.eq_ignore_ascii_case("file") {
            file_name = field.file_name().map(str::to_string);
            file_bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| S3Error::InvalidRequest(format!("failed reading file field: {e}")))?,
            );
            // Any field after `file` is ignored per the documented form contract.
            break;
        }

        let value = field
            .text()
            .await
            .map_err(|e| S3Error::InvalidRequest(format!("failed reading form field: {e}")))?;
        match name.to_ascii_lowercase().as_str() {
            "key" => fields.key = Some(value),
            "content-type" => fields.content_type = Some(value),
            "success_action_redirect" | "redirect" => fields.success_action_redirect = Some(value),
            "success_action_status" => fields.success_action_status = Some(value),
            _ => {}
        }
    }

    let key_template = fields
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| S3Error::InvalidArgument("a 'key' form field is required".to_string()))?;
    let body = file_bytes.unwrap_or_default();
    let key = if key_template.contains("${filename}") {
        key_template.replace("${filename}", file_name.as_deref().unwrap_or(""))
    } else {
        key_template
    };

    let metadata = PutMetadata {
        content_type: fields.content_type,
        ..Default::default()
    };

    let meta = state
        .store
        .put_object(&bucket, &key, body, metadata)
        .await
        .map_err(S3Error::from)?;

    state.events.emit(EventInput {
        kind: EventKind::Post,
        bucket: &bucket,
        key: &key,
        source_ip: "-",
        request_id: "post-form",
        size: Some(meta.content_length),
        etag: Some(&meta.etag),
    });

    if let Some(redirect) = fields.success_action_redirect {
        let separator = if redirect.contains('?') { "&" } else { "?" };
        let location = format!(
            "{redirect}{separator}bucket={}&key={}&etag={}",
            urlencoding::encode(&bucket),
            urlencoding::encode(&key),
            urlencoding::encode(&meta.etag),
        );
        return Ok((StatusCode::SEE_OTHER, [("Location", location)]).into_response());
    }

    let status = match fields.success_action_status.as_deref() {
        Some("200") => StatusCode::OK,
        Some("201") => StatusCode::CREATED,
        _ => StatusCode::NO_CONTENT,
    };

    if status == StatusCode::CREATED {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<PostResponse><Location>/{bucket}/{key}</Location><Bucket>{bucket}</Bucket><Key>{key}</Key><ETag>{}</ETag></PostResponse>"#,
            meta.etag
        );
        return Ok((status, [("Content-Type", "application/xml")], xml).into_response());
    }

    Ok(status.into_response())
}

#[cfg(test)]
mod tests {
    #[test]
    fn filename_substitution_is_literal() {
        let template = "uploads/${filename}";
        let replaced = template.replace("${filename}", "photo.png");
        assert_eq!(replaced, "uploads/photo.png");
    }
}
