//! Per-bucket CORS engine.
//!
//! Implemented as purpose-built middleware rather than a generic
//! `tower_http::cors::CorsLayer`: S3's CORS model is driven by a per-bucket
//! subresource document (`PUT /{bucket}?cors`), not static server-wide
//! config, so every preflight and simple-request check has to look up that
//! bucket's configuration first.

use crate::api::handlers::AppState;
use crate::api::xml::{CorsConfiguration, CorsRule};
use crate::router::RouteContext;
use crate::storage::SubresourceKind;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use std::sync::Arc;

fn bucket_from_request(request: &Request<Body>) -> Option<String> {
    if let Some(ctx) = request.extensions().get::<RouteContext>() {
        if let Some(bucket) = &ctx.vhost_bucket {
            return Some(bucket.clone());
        }
    }
    request
        .uri()
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Matches a CORS `AllowedOrigin` pattern against a request's `Origin`
/// header. At most one `*` is permitted per pattern (enforced when the CORS
/// configuration is parsed); it expands to `.*`, with the rest of the
/// pattern regex-escaped so literal dots and other regex metacharacters in
/// the origin aren't mistaken for wildcards themselves.
fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == origin;
    }
    let escaped = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{escaped}$"))
        .map(|re| re.is_match(origin))
        .unwrap_or(false)
}

fn header_allowed(rule: &CorsRule, header: &str) -> bool {
    rule.allowed_headers
        .iter()
        .any(|h| h == "*" || h.eq_ignore_ascii_case(header))
}

/// Finds the first rule matching both `origin` and `method`, along with the
/// specific `AllowedOrigin` pattern within that rule that matched — needed
/// so the response can tell a wildcard match (`http://*.bar.com`) from an
/// exact one apart, since only the former echoes back `*`.
fn find_rule<'a>(
    config: &'a CorsConfiguration,
    origin: &str,
    method: &str,
) -> Option<(&'a CorsRule, &'a str)> {
    config.rules.iter().find_map(|rule| {
        if !rule.allowed_methods.iter().any(|m| m == method) {
            return None;
        }
        rule.allowed_origins
            .iter()
            .find(|o| origin_matches(o, origin))
            .map(|matched| (rule, matched.as_str()))
    })
}

fn insert_allow_origin(headers: &mut HeaderMap, matched_origin: &str, origin: &str) {
    let value = if matched_origin.contains('*') { "*" } else { origin };
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert("Access-Control-Allow-Origin", v);
    }
    headers.insert("Vary", HeaderValue::from_static("Origin"));
}

async fn load_cors_config(state: &AppState, bucket: &str) -> Option<CorsConfiguration> {
    let xml = match state
        .store
        .get_subresource(bucket, None, SubresourceKind::Cors)
        .await
    {
        Ok(Some(xml)) => xml,
        _ => return None,
    };
    CorsConfiguration::from_xml(&xml).ok()
}

/// Handles CORS preflight (`OPTIONS`) requests directly and annotates every
/// other response with the matching rule's headers. Requests with no
/// `Origin` header, or against a bucket with no CORS configuration, pass
/// through untouched.
pub async fn cors_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(origin) = request
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    let Some(bucket) = bucket_from_request(&request) else {
        return next.run(request).await;
    };

    let Some(config) = load_cors_config(&state, &bucket).await else {
        if request.method() == Method::OPTIONS {
            return S3CorsRejection.into_response();
        }
        return next.run(request).await;
    };

    if request.method() == Method::OPTIONS {
        let requested_method = request
            .headers()
            .get("access-control-request-method")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let requested_headers = request
            .headers()
            .get("access-control-request-headers")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let Some((rule, matched_origin)) = find_rule(&config, &origin, requested_method) else {
            return S3CorsRejection.into_response();
        };
        for header in requested_headers
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
        {
            if !header_allowed(rule, header) {
                return S3CorsRejection.into_response();
            }
        }

        let mut headers = HeaderMap::new();
        insert_allow_origin(&mut headers, matched_origin, &origin);
        if let Ok(v) = HeaderValue::from_str(&rule.allowed_methods.join(", ")) {
            headers.insert("Access-Control-Allow-Methods", v);
        }
        if !requested_headers.is_empty() {
            if let Ok(v) = HeaderValue::from_str(requested_headers) {
                headers.insert("Access-Control-Allow-Headers", v);
            }
        }
        if let Some(max_age) = rule.max_age_seconds {
            if let Ok(v) = HeaderValue::from_str(&max_age.to_string()) {
                headers.insert("Access-Control-Max-Age", v);
            }
        }
        return (StatusCode::OK, headers).into_response();
    }

    let method = request.method().as_str().to_string();
    let mut response = next.run(request).await;
    if let Some((rule, matched_origin)) = find_rule(&config, &origin, &method) {
        let headers = response.headers_mut();
        insert_allow_origin(headers, matched_origin, &origin);
        if !rule.expose_headers.is_empty() {
            if let Ok(v) = HeaderValue::from_str(&rule.expose_headers.join(", ")) {
                headers.insert("Access-Control-Expose-Headers", v);
            }
        }
    }
    response
}

struct S3CorsRejection;

impl IntoResponse for S3CorsRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            [("Content-Type", "application/xml")],
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessForbidden</Code><Message>CORSResponse: This CORS request is not allowed. This is usually because the evalution of Origin, request method / Access-Control-Request-Method or Access-Control-Request-Headers are not whitelisted by the resource's CORS spec.</Message></Error>"#,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::xml::CorsRule;

    fn rule(origins: &[&str], methods: &[&str]) -> CorsRule {
        CorsRule {
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
            allowed_methods: methods.iter().map(|s| s.to_string()).collect(),
            allowed_headers: vec![],
            expose_headers: vec![],
            max_age_seconds: None,
        }
    }

    #[test]
    fn wildcard_origin_matches_anything() {
        assert!(origin_matches("*", "https://example.com"));
    }

    #[test]
    fn partial_wildcard_matches_subdomain() {
        assert!(origin_matches("https://*.example.com", "https://foo.example.com"));
        assert!(!origin_matches("https://*.example.com", "https://example.com"));
    }

    #[test]
    fn exact_origin_requires_match() {
        assert!(origin_matches("https://example.com", "https://example.com"));
        assert!(!origin_matches("https://example.com", "https://other.com"));
    }

    #[test]
    fn find_rule_checks_origin_and_method() {
        let config = CorsConfiguration {
            rules: vec![rule(&["https://example.com"], &["GET", "PUT"])],
        };
        assert!(find_rule(&config, "https://example.com", "GET").is_some());
        assert!(find_rule(&config, "https://example.com", "DELETE").is_none());
        assert!(find_rule(&config, "https://other.com", "GET").is_none());
    }

    #[test]
    fn find_rule_reports_the_matched_origin_pattern() {
        let config = CorsConfiguration {
            rules: vec![rule(&["http://*.bar.com"], &["GET"])],
        };
        let (_, matched) = find_rule(&config, "http://foo.bar.com", "GET").unwrap();
        assert_eq!(matched, "http://*.bar.com");
    }

    #[test]
    fn wildcard_match_echoes_star_but_exact_match_echoes_origin() {
        let mut headers = HeaderMap::new();
        insert_allow_origin(&mut headers, "http://*.bar.com", "http://foo.bar.com");
        assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");

        let mut headers = HeaderMap::new();
        insert_allow_origin(&mut headers, "https://example.com", "https://example.com");
        assert_eq!(
            headers.get("Access-Control-Allow-Origin").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn header_allowed_is_case_insensitive() {
        let r = rule(&["*"], &["GET"]);
        let mut r = r;
        r.allowed_headers = vec!["X-Custom-Header".to_string()];
        assert!(header_allowed(&r, "x-custom-header"));
        assert!(!header_allowed(&r, "x-other"));
    }
}
