//! Static website hosting engine.
//!
//! Entered from [`crate::router::dispatch_middleware`] for any request the
//! host resolved as website traffic: SigV4, CORS, and metrics middleware are
//! all bypassed — a browser fetching a hosted page carries no AWS
//! credentials and CORS against a website vhost is governed by the bucket's
//! CORS config the same as any other simple request, handled upstream.

use crate::api::handlers::AppState;
use crate::api::xml::{RoutingCondition, RoutingRedirect, RoutingRule, WebsiteConfiguration};
use crate::storage::{ObjectMeta, StoreError, SubresourceKind};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

fn error_body(code: &str, message: &str, resource: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>{code}</Code><Message>{message}</Message><Resource>{}</Resource></Error>"#,
        crate::api::xml::escape_xml(resource)
    )
}

fn html_error(status: StatusCode, code: &str, message: &str, resource: &str) -> Response {
    (
        status,
        [("Content-Type", "text/html; charset=utf-8")],
        error_body(code, message, resource),
    )
        .into_response()
}

async fn load_website_config(state: &AppState, bucket: &str) -> Result<WebsiteConfiguration, Response> {
    match state.store.get_subresource(bucket, None, SubresourceKind::Website).await {
        Ok(Some(xml)) => WebsiteConfiguration::from_xml(&xml).map_err(|e| {
            html_error(StatusCode::BAD_REQUEST, "MalformedXML", &e, bucket)
        }),
        Ok(None) => Err(html_error(
            StatusCode::NOT_FOUND,
            "NoSuchWebsiteConfiguration",
            "The specified bucket does not have a website configuration",
            bucket,
        )),
        Err(StoreError::NoSuchBucket(_)) => Err(html_error(
            StatusCode::NOT_FOUND,
            "NoSuchBucket",
            "The specified bucket does not exist",
            bucket,
        )),
        Err(e) => Err(html_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            &e.to_string(),
            bucket,
        )),
    }
}

fn condition_matches(condition: &RoutingCondition, key: &str, status: StatusCode) -> bool {
    let prefix_ok = condition
        .key_prefix_equals
        .as_deref()
        .map(|p| key.starts_with(p))
        .unwrap_or(true);
    let code_ok = condition
        .http_error_code_returned_equals
        .map(|c| c == status.as_u16())
        .unwrap_or(true);
    prefix_ok && code_ok
}

fn find_matching_rule<'a>(rules: &'a [RoutingRule], key: &str, status: StatusCode) -> Option<&'a RoutingRule> {
    rules.iter().find(|rule| match &rule.condition {
        Some(condition) => condition_matches(condition, key, status),
        None => true,
    })
}

fn replaced_key(key: &str, redirect: &RoutingRedirect, condition: Option<&RoutingCondition>) -> String {
    if let Some(replace_with) = &redirect.replace_key_with {
        return replace_with.clone();
    }
    if let Some(prefix) = condition.and_then(|c| c.key_prefix_equals.as_deref()) {
        if let Some(replacement) = &redirect.replace_key_prefix_with {
            if let Some(rest) = key.strip_prefix(prefix) {
                return format!("{replacement}{rest}");
            }
        }
    }
    key.to_string()
}

fn redirect_response(redirect: &RoutingRedirect, key: &str, condition: Option<&RoutingCondition>, host: &str) -> Response {
    let protocol = redirect.protocol.as_deref().unwrap_or("http");
    let host_name = redirect.host_name.as_deref().unwrap_or(host);
    let status = redirect
        .http_redirect_code
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(StatusCode::MOVED_PERMANENTLY);
    let key = replaced_key(key, redirect, condition);
    let location = format!("{protocol}://{host_name}/{key}");
    (status, [("Location", location)]).into_response()
}

fn apply_routing_rules(
    config: &WebsiteConfiguration,
    key: &str,
    status: StatusCode,
    host: &str,
) -> Option<Response> {
    let rule = find_matching_rule(config.rules(), key, status)?;
    Some(redirect_response(&rule.redirect, key, rule.condition.as_ref(), host))
}

async fn serve_error_document(
    state: &AppState,
    bucket: &str,
    config: &WebsiteConfiguration,
    status: StatusCode,
) -> Option<Response> {
    let error_document = config.error_document.as_ref()?;
    let object = state.store.get_object(bucket, &error_document.key, None).await.ok()??;
    Some(
        (
            status,
            crate::api::handlers::object_response_headers(&object.meta),
            object.body,
        )
            .into_response(),
    )
}

fn object_response(status: StatusCode, meta: &ObjectMeta, body: bytes::Bytes) -> Response {
    if let Some(redirect) = &meta.website_redirect_location {
        return (
            StatusCode::MOVED_PERMANENTLY,
            [("Location", redirect.as_str())],
        )
            .into_response();
    }
    (status, crate::api::handlers::object_response_headers(meta), body).into_response()
}

/// Serve one request against a bucket's website configuration. `bucket`
/// comes from the already-resolved virtual host; the request path is the
/// already-rewritten `/{bucket}/{key}` form, matching every other handler.
pub async fn serve(state: &AppState, bucket: Option<String>, request: Request<Body>) -> Response {
    let Some(bucket) = bucket else {
        return html_error(StatusCode::BAD_REQUEST, "InvalidRequest", "no bucket resolved for website host", "");
    };

    let host = request
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let config = match load_website_config(state, &bucket).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let full_path = request.uri().path();
    let key = full_path
        .strip_prefix(&format!("/{bucket}/"))
        .or_else(|| full_path.strip_prefix(&format!("/{bucket}")))
        .unwrap_or("")
        .trim_start_matches('/')
        .to_string();

    let index_suffix = config
        .index_document
        .as_ref()
        .map(|d| d.suffix.clone())
        .unwrap_or_default();

    if key.is_empty() || key.ends_with('/') {
        let index_key = format!("{key}{index_suffix}");
        return match state.store.get_object(&bucket, &index_key, None).await {
            Ok(Some(object)) => object_response(StatusCode::OK, &object.meta, object.body),
            Ok(None) => {
                let status = StatusCode::NOT_FOUND;
                if let Some(resp) = serve_error_document(state, &bucket, &config, status).await {
                    return resp;
                }
                if let Some(resp) = apply_routing_rules(&config, &index_key, status, &host) {
                    return resp;
                }
                html_error(status, "NoSuchKey", "The specified key does not exist.", &index_key)
            }
            Err(e) => html_error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", &e.to_string(), &key),
        };
    }

    match state.store.get_object(&bucket, &key, None).await {
        Ok(Some(object)) => {
            if let Some(resp) = apply_routing_rules(&config, &key, StatusCode::OK, &host) {
                return resp;
            }
            object_response(StatusCode::OK, &object.meta, object.body)
        }
        Ok(None) => {
            // Step 2: a missing key that names a "directory" with its own
            // index is redirected to the directory form rather than 404ing.
            let dir_index = format!("{key}/{index_suffix}");
            if matches!(state.store.head_object(&bucket, &dir_index).await, Ok(Some(_))) {
                return (
                    StatusCode::FOUND,
                    [("Location", format!("/{key}/"))],
                )
                    .into_response();
            }

            let status = StatusCode::NOT_FOUND;
            if let Some(resp) = apply_routing_rules(&config, &key, status, &host) {
                return resp;
            }
            if let Some(resp) = serve_error_document(state, &bucket, &config, status).await {
                return resp;
            }
            html_error(status, "NoSuchKey", "The specified key does not exist.", &key)
        }
        Err(e) => html_error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", &e.to_string(), &key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::xml::RoutingRules;

    fn redirect(host_name: &str, code: Option<u16>) -> RoutingRedirect {
        RoutingRedirect {
            protocol: None,
            host_name: Some(host_name.to_string()),
            replace_key_prefix_with: None,
            replace_key_with: None,
            http_redirect_code: code,
        }
    }

    #[test]
    fn condition_with_no_fields_always_matches() {
        let c = RoutingCondition::default();
        assert!(condition_matches(&c, "anything", StatusCode::NOT_FOUND));
    }

    #[test]
    fn condition_matches_prefix_and_code() {
        let c = RoutingCondition {
            key_prefix_equals: Some("docs/".to_string()),
            http_error_code_returned_equals: Some(404),
        };
        assert!(condition_matches(&c, "docs/missing.html", StatusCode::NOT_FOUND));
        assert!(!condition_matches(&c, "images/missing.png", StatusCode::NOT_FOUND));
        assert!(!condition_matches(&c, "docs/missing.html", StatusCode::FORBIDDEN));
    }

    #[test]
    fn find_matching_rule_picks_first_match() {
        let rules = vec![
            RoutingRule {
                condition: Some(RoutingCondition {
                    key_prefix_equals: Some("a/".to_string()),
                    http_error_code_returned_equals: None,
                }),
                redirect: redirect("a.example.com", None),
            },
            RoutingRule {
                condition: None,
                redirect: redirect("fallback.example.com", None),
            },
        ];
        let m = find_matching_rule(&rules, "a/x", StatusCode::OK).unwrap();
        assert_eq!(m.redirect.host_name.as_deref(), Some("a.example.com"));
        let m = find_matching_rule(&rules, "b/x", StatusCode::OK).unwrap();
        assert_eq!(m.redirect.host_name.as_deref(), Some("fallback.example.com"));
    }

    #[test]
    fn replaced_key_prefers_replace_key_with() {
        let r = RoutingRedirect {
            replace_key_with: Some("static.html".to_string()),
            ..redirect("x", None)
        };
        assert_eq!(replaced_key("any/path", &r, None), "static.html");
    }

    #[test]
    fn replaced_key_substitutes_prefix() {
        let r = RoutingRedirect {
            replace_key_prefix_with: Some("documents/".to_string()),
            ..redirect("x", None)
        };
        let cond = RoutingCondition {
            key_prefix_equals: Some("docs/".to_string()),
            http_error_code_returned_equals: None,
        };
        assert_eq!(replaced_key("docs/readme.html", &r, Some(&cond)), "documents/readme.html");
    }

    #[test]
    fn rules_helper_flattens_routing_rules_option() {
        let config = WebsiteConfiguration {
            index_document: None,
            error_document: None,
            routing_rules: Some(RoutingRules {
                rules: vec![RoutingRule {
                    condition: None,
                    redirect: redirect("x", None),
                }],
            }),
        };
        assert_eq!(config.rules().len(), 1);
    }
}
