//! End-to-end S3 protocol coverage, driven through the AWS SDK against a
//! spawned `s3emu` process with a fresh filesystem-backed data directory.

mod common;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use common::{generate_binary, TestServer};
use md5::{Digest, Md5};

#[tokio::test]
async fn put_get_roundtrip() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let data = b"hello s3emu";
    let put = client
        .put_object()
        .bucket("b")
        .key("greeting.txt")
        .body(ByteStream::from(data.to_vec()))
        .send()
        .await
        .expect("PUT should succeed");

    let expected_etag = format!("\"{:x}\"", Md5::digest(data));
    assert_eq!(put.e_tag(), Some(expected_etag.as_str()));

    let got = client
        .get_object()
        .bucket("b")
        .key("greeting.txt")
        .send()
        .await
        .expect("GET should succeed");
    let body = got.body.collect().await.unwrap().into_bytes();
    assert_eq!(body.as_ref(), data);
}

#[tokio::test]
async fn binary_roundtrip_is_byte_exact() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let data = generate_binary(250_000, 7);
    client
        .put_object()
        .bucket("b")
        .key("blob.bin")
        .body(ByteStream::from(data.clone()))
        .send()
        .await
        .unwrap();

    let got = client
        .get_object()
        .bucket("b")
        .key("blob.bin")
        .send()
        .await
        .unwrap();
    let body = got.body.collect().await.unwrap().into_bytes();
    assert_eq!(body.as_ref(), data.as_slice());
}

#[tokio::test]
async fn distinct_keys_with_trailing_slash_do_not_collide() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    client
        .put_object()
        .bucket("b")
        .key("foo")
        .body(ByteStream::from_static(b"X"))
        .send()
        .await
        .unwrap();
    client
        .put_object()
        .bucket("b")
        .key("foo/")
        .body(ByteStream::from_static(b"Y"))
        .send()
        .await
        .unwrap();

    let a = client.get_object().bucket("b").key("foo").send().await.unwrap();
    let b = client.get_object().bucket("b").key("foo/").send().await.unwrap();
    assert_eq!(a.body.collect().await.unwrap().into_bytes().as_ref(), b"X");
    assert_eq!(b.body.collect().await.unwrap().into_bytes().as_ref(), b"Y");
}

#[tokio::test]
async fn range_get_returns_partial_content() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let data = b"0123456789".to_vec();
    client
        .put_object()
        .bucket("b")
        .key("range.bin")
        .body(ByteStream::from(data.clone()))
        .send()
        .await
        .unwrap();

    let got = client
        .get_object()
        .bucket("b")
        .key("range.bin")
        .range("bytes=2-5")
        .send()
        .await
        .unwrap();
    assert_eq!(got.content_range(), Some("bytes 2-5/10"));
    let body = got.body.collect().await.unwrap().into_bytes();
    assert_eq!(body.as_ref(), &data[2..=5]);
}

#[tokio::test]
async fn listing_is_lexicographically_ordered_with_delimiter() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    for key in ["akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3"] {
        client
            .put_object()
            .bucket("b")
            .key(key)
            .body(ByteStream::from_static(b"x"))
            .send()
            .await
            .unwrap();
    }

    let listing = client
        .list_objects_v2()
        .bucket("b")
        .delimiter("/")
        .send()
        .await
        .unwrap();

    assert_eq!(listing.contents().len(), 6);
    assert_eq!(listing.common_prefixes().len(), 1);
    assert_eq!(listing.common_prefixes()[0].prefix(), Some("key/"));

    let keys: Vec<&str> = listing.contents().iter().filter_map(|o| o.key()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn bucket_with_object_cannot_be_deleted() {
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

    let err = client.delete_bucket().bucket("b").send().await.unwrap_err();
    assert!(err.to_string().contains("BucketNotEmpty") || format!("{err:?}").contains("BucketNotEmpty"));

    client.delete_object().bucket("b").key("k").send().await.unwrap();
    client.delete_bucket().bucket("b").send().await.expect("should succeed once empty");
}

#[tokio::test]
async fn multipart_upload_assembles_to_concatenated_parts() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let create = client
        .create_multipart_upload()
        .bucket("b")
        .key("multi.bin")
        .send()
        .await
        .unwrap();
    let upload_id = create.upload_id().unwrap().to_string();

    let part_a = vec![1u8; 5 * 1024 * 1024];
    let part_b = vec![2u8; 1024];

    let mut completed = Vec::new();
    for (n, data) in [(1, &part_a), (2, &part_b)] {
        let resp = client
            .upload_part()
            .bucket("b")
            .key("multi.bin")
            .upload_id(&upload_id)
            .part_number(n)
            .body(ByteStream::from(data.clone()))
            .send()
            .await
            .unwrap();
        completed.push(
            CompletedPart::builder()
                .part_number(n)
                .e_tag(resp.e_tag().unwrap())
                .build(),
        );
    }

    client
        .complete_multipart_upload()
        .bucket("b")
        .key("multi.bin")
        .upload_id(&upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(completed))
                .build(),
        )
        .send()
        .await
        .unwrap();

    let got = client
        .get_object()
        .bucket("b")
        .key("multi.bin")
        .send()
        .await
        .unwrap();
    let body = got.body.collect().await.unwrap().into_bytes();
    let mut expected = part_a;
    expected.extend(part_b);
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn bulk_delete_treats_missing_keys_as_succeeded() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();
    client
        .put_object()
        .bucket("b")
        .key("present")
        .body(ByteStream::from_static(b"x"))
        .send()
        .await
        .unwrap();

    let result = client
        .delete_objects()
        .bucket("b")
        .delete(
            Delete::builder()
                .objects(ObjectIdentifier::builder().key("present").build().unwrap())
                .objects(ObjectIdentifier::builder().key("missing").build().unwrap())
                .build()
                .unwrap(),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(result.deleted().len(), 2);
    assert!(result.errors().is_empty());
}

#[tokio::test]
async fn bulk_delete_of_five_hundred_keys_all_succeed() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let keys: Vec<String> = (0..500).map(|n| format!("key{n:04}")).collect();
    for key in &keys {
        client
            .put_object()
            .bucket("b")
            .key(key)
            .body(ByteStream::from_static(b"x"))
            .send()
            .await
            .unwrap();
    }

    let identifiers = keys
        .iter()
        .map(|k| ObjectIdentifier::builder().key(k).build().unwrap())
        .collect::<Vec<_>>();

    let result = client
        .delete_objects()
        .bucket("b")
        .delete(Delete::builder().set_objects(Some(identifiers)).build().unwrap())
        .send()
        .await
        .unwrap();

    assert_eq!(result.deleted().len(), 500);
    assert!(result.errors().is_empty());
}

#[tokio::test]
async fn copy_object_duplicates_content_under_new_key() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();
    client
        .put_object()
        .bucket("b")
        .key("src")
        .body(ByteStream::from_static(b"original"))
        .send()
        .await
        .unwrap();

    client
        .copy_object()
        .bucket("b")
        .key("dst")
        .copy_source("b/src")
        .send()
        .await
        .unwrap();

    let got = client.get_object().bucket("b").key("dst").send().await.unwrap();
    assert_eq!(got.body.collect().await.unwrap().into_bytes().as_ref(), b"original");
}

#[tokio::test]
async fn object_tagging_round_trips_and_defaults_empty() {
    use aws_sdk_s3::types::{Tag, Tagging};

    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();
    client
        .put_object()
        .bucket("b")
        .key("tagged")
        .body(ByteStream::from_static(b"payload"))
        .send()
        .await
        .unwrap();

    let empty = client
        .get_object_tagging()
        .bucket("b")
        .key("tagged")
        .send()
        .await
        .unwrap();
    assert!(empty.tag_set().is_empty());

    client
        .put_object_tagging()
        .bucket("b")
        .key("tagged")
        .tagging(
            Tagging::builder()
                .tag_set(Tag::builder().key("project").value("s3emu").build().unwrap())
                .build()
                .unwrap(),
        )
        .send()
        .await
        .unwrap();

    let got = client
        .get_object_tagging()
        .bucket("b")
        .key("tagged")
        .send()
        .await
        .unwrap();
    assert_eq!(got.tag_set().len(), 1);
    assert_eq!(got.tag_set()[0].key(), "project");
    assert_eq!(got.tag_set()[0].value(), "s3emu");

    client
        .delete_object_tagging()
        .bucket("b")
        .key("tagged")
        .send()
        .await
        .unwrap();

    let cleared = client
        .get_object_tagging()
        .bucket("b")
        .key("tagged")
        .send()
        .await
        .unwrap();
    assert!(cleared.tag_set().is_empty());
}

#[tokio::test]
async fn object_tagging_on_missing_key_is_no_such_key() {
    let server = TestServer::start().await;
    let client = server.s3_client();
    client.create_bucket().bucket("b").send().await.unwrap();

    let err = client
        .get_object_tagging()
        .bucket("b")
        .key("missing")
        .send()
        .await
        .expect_err("tagging a nonexistent key must fail");
    let svc = err.into_service_error();
    assert!(svc.is_no_such_key());
}
