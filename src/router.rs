//! Host/path addressing router.
//!
//! Runs as the outermost middleware layer, ahead of tracing, metrics, auth,
//! and CORS: those all need to see a single canonical `/{bucket}/{key}`
//! request shape regardless of whether the client addressed the bucket by
//! path (`PUT /bucket/key`) or by virtual host (`PUT /key` with
//! `Host: bucket.s3.<endpoint>`). Requests against a bucket's website vhost
//! (`bucket.s3-website.<endpoint>`) are recognized here and handed straight
//! to [`crate::website`], bypassing SigV4 entirely — a browser fetching a
//! hosted page carries no AWS credentials.

use crate::api::handlers::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Per-request addressing metadata, stashed in request extensions for
/// downstream middleware (auth) and handlers that care how the bucket was
/// addressed.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// The bucket named by the Host header, when the request used
    /// virtual-hosted-style addressing. `None` for path-style requests (the
    /// path itself still carries the bucket; extractors read it directly).
    pub vhost_bucket: Option<String>,
    /// True when the Host header addressed this bucket's website endpoint.
    pub website: bool,
}

struct Resolved {
    vhost_bucket: Option<String>,
    website: bool,
    rewritten_path_and_query: Option<String>,
}

fn host_without_port(host: &str) -> &str {
    host.split(':').next().unwrap_or("")
}

/// The machine's own hostname, so a bare request to `http://<hostname>:port/`
/// (no bucket subdomain at all) isn't mistaken for virtual-hosted-style
/// addressing of a bucket literally named after this host.
fn os_hostname() -> Option<String> {
    let mut buf = vec![0u8; 256];
    // SAFETY: buf is a valid, non-null buffer of the given length; gethostname
    // writes at most buf.len() bytes including the NUL terminator.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..nul].to_vec()).ok()
}

fn looks_like_bare_host(host: &str) -> bool {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if let Some(name) = os_hostname() {
        if host.eq_ignore_ascii_case(&name) {
            return true;
        }
    }
    false
}

/// Any `x-amz-*` header or query parameter marks a request as SDK traffic
/// targeting the `s3` service, not a browser request against a website vhost.
fn is_sdk_request(headers: &axum::http::HeaderMap, uri: &Uri) -> bool {
    let header_hit = headers.iter().any(|(name, _)| name.as_str().starts_with("x-amz-"));
    let query_hit = uri
        .query()
        .map(|q| q.split('&').any(|p| p.to_ascii_lowercase().starts_with("x-amz-")))
        .unwrap_or(false);
    header_hit || query_hit
}

fn rewrite_path(uri: &Uri, bucket: &str) -> String {
    let path = uri.path();
    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    if path == "/" {
        format!("/{bucket}{query}")
    } else {
        format!("/{bucket}{path}{query}")
    }
}

/// Builds the §4.1 host pattern for a given service endpoint:
/// `^(?:(.+)\.)?s3(-website)?([-.][^.]+)?\.{service_endpoint}$` — an optional
/// bucket-label prefix, the `s3`/`s3-website` service marker, an optional
/// region segment (`-us-east-1`, `.dualstack`, …), then the endpoint itself.
fn host_pattern(service_endpoint: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(service_endpoint);
    regex::Regex::new(&format!(r"^(?:(.+)\.)?s3(-website)?([-.][^.]+)?\.{escaped}$")).ok()
}

fn resolve(
    host: &str,
    uri: &Uri,
    headers: &axum::http::HeaderMap,
    service_endpoint: &str,
    vhost_enabled: bool,
) -> Resolved {
    let host = host_without_port(host);
    if !vhost_enabled || host.is_empty() {
        return Resolved {
            vhost_bucket: None,
            website: false,
            rewritten_path_and_query: None,
        };
    }

    if !service_endpoint.is_empty() {
        if let Some(pattern) = host_pattern(service_endpoint) {
            if let Some(caps) = pattern.captures(host) {
                let website = caps.get(2).is_some();
                return match caps.get(1) {
                    Some(bucket) if !bucket.as_str().is_empty() => Resolved {
                        rewritten_path_and_query: Some(rewrite_path(uri, bucket.as_str())),
                        vhost_bucket: Some(bucket.as_str().to_string()),
                        website,
                    },
                    // Bare service host (`s3.{endpoint}` / `s3-website.{endpoint}`):
                    // no bucket label, so this is the service-level endpoint.
                    _ => Resolved {
                        vhost_bucket: None,
                        website: false,
                        rewritten_path_and_query: None,
                    },
                };
            }
        }
    }

    // No recognized suffix matched: fall back to treating the whole
    // hostname as the bucket, unless it looks like the emulator's own
    // address rather than a bucket name.
    if looks_like_bare_host(host) {
        return Resolved {
            vhost_bucket: None,
            website: false,
            rewritten_path_and_query: None,
        };
    }

    Resolved {
        rewritten_path_and_query: Some(rewrite_path(uri, host)),
        vhost_bucket: Some(host.to_string()),
        website: !is_sdk_request(headers, uri),
    }
}

/// Rewrite virtual-hosted-style requests to the canonical path shape and
/// short-circuit website-addressed requests straight to the website engine.
pub async fn dispatch_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let resolved = resolve(
        &host,
        request.uri(),
        request.headers(),
        &state.options.service_endpoint,
        state.options.vhost_buckets_enabled,
    );

    if let Some(rewritten) = &resolved.rewritten_path_and_query {
        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = Some(
            rewritten
                .parse()
                .expect("rewritten path-and-query is always valid"),
        );
        *request.uri_mut() =
            Uri::from_parts(parts).expect("rewritten URI retains a valid scheme/authority");
    }

    if resolved.website {
        return crate::website::serve(&state, resolved.vhost_bucket.clone(), request)
            .await
            .into_response();
    }

    request.extensions_mut().insert(RouteContext {
        vhost_bucket: resolved.vhost_bucket,
        website: false,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn no_headers() -> axum::http::HeaderMap {
        axum::http::HeaderMap::new()
    }

    #[test]
    fn path_style_request_is_untouched() {
        let r = resolve(
            "localhost",
            &uri("/my-bucket/my-key"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert!(r.vhost_bucket.is_none());
        assert!(!r.website);
        assert!(r.rewritten_path_and_query.is_none());
    }

    #[test]
    fn vhost_api_request_is_rewritten() {
        let r = resolve(
            "my-bucket.s3.amazonaws.com",
            &uri("/my-key"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-bucket"));
        assert!(!r.website);
        assert_eq!(r.rewritten_path_and_query.as_deref(), Some("/my-bucket/my-key"));
    }

    #[test]
    fn vhost_website_request_is_flagged() {
        let r = resolve(
            "my-bucket.s3-website.amazonaws.com",
            &uri("/index.html"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-bucket"));
        assert!(r.website);
        assert_eq!(
            r.rewritten_path_and_query.as_deref(),
            Some("/my-bucket/index.html")
        );
    }

    #[test]
    fn disabled_vhost_buckets_always_path_style() {
        let r = resolve(
            "my-bucket.s3.amazonaws.com",
            &uri("/my-key"),
            &no_headers(),
            "amazonaws.com",
            false,
        );
        assert!(r.vhost_bucket.is_none());
        assert!(r.rewritten_path_and_query.is_none());
    }

    #[test]
    fn root_host_request_rewrites_bucket_only_path() {
        let r = resolve(
            "my-bucket.s3.amazonaws.com",
            &uri("/"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.rewritten_path_and_query.as_deref(), Some("/my-bucket"));
    }

    #[test]
    fn arbitrary_hostname_falls_back_to_bucket_as_website() {
        let r = resolve(
            "my-custom-domain.example",
            &uri("/index.html"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-custom-domain.example"));
        assert!(r.website);
    }

    #[test]
    fn arbitrary_hostname_with_amz_header_is_sdk_not_website() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse().unwrap());
        let r = resolve(
            "my-custom-domain.example",
            &uri("/key"),
            &headers,
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-custom-domain.example"));
        assert!(!r.website);
    }

    #[test]
    fn loopback_ip_is_never_treated_as_a_bucket() {
        let r = resolve("127.0.0.1", &uri("/"), &no_headers(), "amazonaws.com", true);
        assert!(r.vhost_bucket.is_none());
    }

    #[test]
    fn regional_website_host_is_resolved_to_its_bucket() {
        let r = resolve(
            "bucket-a.s3-website-us-east-1.amazonaws.com",
            &uri("/page/"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("bucket-a"));
        assert!(r.website);
        assert_eq!(r.rewritten_path_and_query.as_deref(), Some("/bucket-a/page/"));
    }

    #[test]
    fn regional_api_host_is_resolved_to_its_bucket() {
        let r = resolve(
            "my-bucket.s3-us-west-2.amazonaws.com",
            &uri("/key"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-bucket"));
        assert!(!r.website);
        assert_eq!(r.rewritten_path_and_query.as_deref(), Some("/my-bucket/key"));
    }

    #[test]
    fn dualstack_style_region_segment_is_accepted() {
        let r = resolve(
            "my-bucket.s3.dualstack.amazonaws.com",
            &uri("/key"),
            &no_headers(),
            "amazonaws.com",
            true,
        );
        assert_eq!(r.vhost_bucket.as_deref(), Some("my-bucket"));
    }

    #[test]
    fn bare_service_host_has_no_bucket() {
        let r = resolve("s3.amazonaws.com", &uri("/"), &no_headers(), "amazonaws.com", true);
        assert!(r.vhost_bucket.is_none());
        assert!(r.rewritten_path_and_query.is_none());
    }
}
