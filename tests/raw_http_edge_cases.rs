//! Edge cases that a well-behaved SDK would never construct, exercised with
//! raw HTTP (`reqwest`) against a spawned `s3emu` process: website vhost
//! routing, CORS preflight, and malformed/expired SigV4 requests.

mod common;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use common::TestServer;
use std::time::Duration;

#[tokio::test]
async fn website_bucket_without_config_returns_404() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("bucket-a").send().await.unwrap();

    let http = reqwest::Client::new();
    let resp = http
        .get(format!("{}/page/", server.endpoint()))
        .header("host", "bucket-a.s3-website.amazonaws.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    let body = resp.text().await.unwrap();
    assert!(body.contains("NoSuchWebsiteConfiguration"));
}

#[tokio::test]
async fn website_index_resolution_and_directory_redirect() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("website0").send().await.unwrap();

    client
        .put_bucket_website()
        .bucket("website0")
        .website_configuration(
            aws_sdk_s3::types::WebsiteConfiguration::builder()
                .index_document(
                    aws_sdk_s3::types::IndexDocument::builder()
                        .suffix("index.html")
                        .build()
                        .unwrap(),
                )
                .build(),
        )
        .send()
        .await
        .unwrap();

    client
        .put_object()
        .bucket("website0")
        .key("page/index.html")
        .body(ByteStream::from_static(
            b"<html><body>Hello</body></html>",
        ))
        .send()
        .await
        .unwrap();

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let resp = http
        .get(format!("{}/page/", server.endpoint()))
        .header("host", "website0.s3-website.amazonaws.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "<html><body>Hello</body></html>");

    let redirect = http
        .get(format!("{}/page", server.endpoint()))
        .header("host", "website0.s3-website.amazonaws.com")
        .send()
        .await
        .unwrap();
    assert_eq!(redirect.status(), 302);
    assert_eq!(
        redirect.headers().get("location").unwrap(),
        "/website0/page/"
    );
}

#[tokio::test]
async fn expired_presigned_url_is_rejected() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();
    client
        .put_object()
        .bucket("b")
        .key("k")
        .body(ByteStream::from_static(b"x"))
        .send()
        .await
        .unwrap();

    let presigned = client
        .get_object()
        .bucket("b")
        .key("k")
        .presigned(PresigningConfig::expires_in(Duration::from_secs(1)).unwrap())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let http = reqwest::Client::new();
    let resp = http
        .get(presigned.uri().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body = resp.text().await.unwrap();
    assert!(body.contains("AccessDenied"));
}

#[tokio::test]
async fn request_time_too_far_in_future_is_rejected() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let http = reqwest::Client::new();
    let skewed_date = (chrono::Utc::now() + chrono::Duration::minutes(20))
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    let resp = http
        .get(format!("{}/b", server.endpoint()))
        .header("x-amz-date", &skewed_date)
        .header(
            "authorization",
            format!(
                "AWS4-HMAC-SHA256 Credential=S3RVER/{}/us-east-1/s3/aws4_request, \
                 SignedHeaders=host;x-amz-date, Signature={}",
                &skewed_date[..8],
                "0".repeat(64)
            ),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
    let body = resp.text().await.unwrap();
    assert!(body.contains("RequestTimeTooSkewed"));
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();
    client
        .put_object()
        .bucket("b")
        .key("k")
        .body(ByteStream::from_static(b"x"))
        .send()
        .await
        .unwrap();

    let presigned = client
        .get_object()
        .bucket("b")
        .key("k")
        .presigned(PresigningConfig::expires_in(Duration::from_secs(60)).unwrap())
        .await
        .unwrap();

    let mut url = presigned.uri().to_string();
    url = url.replace("X-Amz-Signature=", "X-Amz-Signature=deadbeef");

    let http = reqwest::Client::new();
    let resp = http.get(url).send().await.unwrap();
    assert_eq!(resp.status(), 403);
    let body = resp.text().await.unwrap();
    assert!(body.contains("SignatureDoesNotMatch"));
    assert!(body.contains("StringToSign"));
}

#[tokio::test]
async fn cors_preflight_matches_wildcard_origin_rule() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    client
        .put_bucket_cors()
        .bucket("b")
        .cors_configuration(
            aws_sdk_s3::types::CorsConfiguration::builder()
                .cors_rules(
                    aws_sdk_s3::types::CorsRule::builder()
                        .allowed_origins("http://*.bar.com")
                        .allowed_methods("GET")
                        .allowed_headers("Range")
                        .allowed_headers("Authorization")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        )
        .send()
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let resp = http
        .request(reqwest::Method::OPTIONS, format!("{}/b/k", server.endpoint()))
        .header("origin", "http://foo.bar.com")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "Range, Authorization")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://foo.bar.com"
    );

    let denied = http
        .request(reqwest::Method::OPTIONS, format!("{}/b/k", server.endpoint()))
        .header("origin", "http://a-test.example.com")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "Authorization")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
}
