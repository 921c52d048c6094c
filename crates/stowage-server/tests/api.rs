pub mod common;

use crate::common::{body_json, error_code, ServiceStateBuilder, OWNER, READER};
use axum::body::{to_bytes, Body, Bytes};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use std::io;
use stowage_api_types::params::ErrorCode;
use stowage_api_types::resource::Fingerprint;

#[tokio::test]
async fn declared_resource_starts_as_placeholder() {
    let service = ServiceStateBuilder::default().build();
    assert_eq!(service.declare("pkg", true, &["data"]).await.status(), StatusCode::CREATED);

    let response = service.get("/pkg/meta/resource/data", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({
            "name": "data",
            "type": "file",
            "path": "data.zip",
            "description": "data for testing",
            "origin": "upload",
        })
    );
}

#[tokio::test]
async fn upload_then_download() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;

    let response = service.upload("pkg", "data", b"hello").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "revision": 0 }));

    let response = service.get("/pkg/meta/resource/data", None).await;
    let meta = body_json(response).await;
    assert_eq!(meta["origin"], "store");
    assert_eq!(meta["revision"], 0);
    assert_eq!(meta["size"], 5);
    assert_eq!(meta["fingerprint"], Fingerprint::of(b"hello").to_string());

    let response = service.get("/pkg/resources/data", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(headers[CONTENT_LENGTH], "5");
    assert_eq!(headers["content-sha384"], Fingerprint::of(b"hello").to_string().as_str());
    assert_eq!(headers["entity-id"], "pkg");
    assert_eq!(headers["resource-id"], "data/0");
    assert_eq!(headers[CACHE_CONTROL], "public, max-age=600");

    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    assert_eq!(&body[..], b"hello");

    // a second upload moves "latest", the first revision stays addressable
    service.upload("pkg", "data", b"world").await;
    let response = service.get("/pkg/resources/data", None).await;
    assert_eq!(response.headers()["resource-id"], "data/1");
    let response = service.get("/pkg/resources/data/0", None).await;
    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    assert_eq!(&body[..], b"hello");
}

#[tokio::test]
async fn missing_revision_is_metadata_not_found() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;
    service.upload("pkg", "data", b"hello").await;

    let response = service.get("/pkg/meta/resource/data/5", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::MetadataNotFound);

    let response = service.get("/pkg/meta/resource/other", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::MetadataNotFound);

    let response = service.get("/pkg/resources/data/5", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::NotFound);
}

#[tokio::test]
async fn malformed_paths() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;

    for uri in [
        "/pkg/meta/resource/data/x1",
        "/pkg/meta/resource/data/1/2",
        "/pkg/resources/data/-1",
        "/pkg/resources/data?channel=No%20Such",
        "/Not_A_Package/meta/resources",
    ] {
        let response = service.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(error_code(response).await, ErrorCode::BadRequest, "{uri}");
    }
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;

    let response = service
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/pkg/resources/data")
                .header(AUTHORIZATION, OWNER)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(error_code(response).await, ErrorCode::MethodNotAllowed);
}

#[tokio::test]
async fn upload_preconditions() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;
    let hash = Fingerprint::of(b"hello");

    let upload = |content_length: Option<&str>, hash: String, token: &'static str| {
        let mut request = Request::builder()
            .method("POST")
            .uri(format!("/pkg/resources/data?hash={hash}"))
            .header(AUTHORIZATION, token);
        if let Some(len) = content_length {
            request = request.header(CONTENT_LENGTH, len);
        }
        request.body(Body::from(&b"hello"[..])).unwrap()
    };

    let response = service.send(upload(None, hash.to_string(), OWNER)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = service.send(upload(Some("5"), "abcd".into(), OWNER)).await;
    assert_eq!(error_code(response).await, ErrorCode::BadRequest);

    let response = service.send(upload(Some("4096"), hash.to_string(), OWNER)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_code(response).await, ErrorCode::PayloadTooLarge);

    let response = service.send(upload(Some("5"), hash.to_string(), READER)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = service.send(upload(Some("5"), hash.to_string(), "bogus")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = service
        .send(upload(Some("5"), Fingerprint::of(b"hullo").to_string(), OWNER))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, ErrorCode::IntegrityMismatch);

    // only the mismatched upload got as far as allocating a revision
    let response = service.send(upload(Some("5"), hash.to_string(), OWNER)).await;
    assert_eq!(body_json(response).await, serde_json::json!({ "revision": 1 }));
    let response = service.get("/pkg/meta/resource/data/0", None).await;
    assert_eq!(error_code(response).await, ErrorCode::MetadataNotFound);
}

#[tokio::test]
async fn interrupted_upload_is_a_bad_request() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data"]).await;

    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"hel")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ];
    let response = service
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/pkg/resources/data?hash={}", Fingerprint::of(b"hello")))
                .header(AUTHORIZATION, OWNER)
                .header(CONTENT_LENGTH, 5)
                .body(Body::from_stream(futures_util::stream::iter(chunks)))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, ErrorCode::BadRequest);

    let response = service.get("/pkg/meta/resource/data/0", None).await;
    assert_eq!(error_code(response).await, ErrorCode::MetadataNotFound);
    let response = service.upload("pkg", "data", b"hello").await;
    assert_eq!(body_json(response).await, serde_json::json!({ "revision": 1 }));
}

#[tokio::test]
async fn private_packages_need_a_reader() {
    let service = ServiceStateBuilder::default().build();
    service.declare("secret", false, &["data"]).await;
    service.upload("secret", "data", b"hello").await;

    let response = service.get("/secret/resources/data", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, ErrorCode::Unauthorized);

    let response = service.get("/secret/meta/resources", Some("bogus")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = service.get("/secret/resources/data", Some(READER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], "private, no-cache, must-revalidate");
}

#[tokio::test]
async fn auth_required_covers_public_reads() {
    let service = ServiceStateBuilder::default().auth_required(true).build();
    service.declare("pkg", true, &["data"]).await;

    let response = service.get("/pkg/meta/resources", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = service.get("/pkg/meta/resources", Some(READER)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn channels_follow_publication() {
    let service = ServiceStateBuilder::default().build();
    service.declare("pkg", true, &["data", "config"]).await;
    service.upload("pkg", "data", b"hello").await;
    service.upload("pkg", "data", b"world").await;

    let response = service.get("/pkg/resources/data?channel=stable", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = service
        .publish("pkg", serde_json::json!({ "channels": ["stable"], "resources": { "data": 0 } }))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = service.get("/pkg/resources/data?channel=stable", None).await;
    assert_eq!(response.headers()["resource-id"], "data/0");
    let response = service.get("/pkg/resources/data?channel=unpublished", None).await;
    assert_eq!(response.headers()["resource-id"], "data/1");

    let response = service.get("/pkg/meta/resources?channel=stable", None).await;
    let listed = body_json(response).await;
    let listed: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["name"].as_str().unwrap().to_owned(),
                r["origin"].as_str().unwrap().to_owned(),
                r["revision"].as_u64(),
            )
        })
        .collect();
    assert_eq!(
        listed,
        [
            ("config".to_owned(), "upload".to_owned(), None),
            ("data".to_owned(), "store".to_owned(), Some(0)),
        ]
    );

    let response = service
        .publish("pkg", serde_json::json!({ "channels": ["stable"], "resources": { "data": 9 } }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = service.get("/pkg/resources/data?channel=stable", None).await;
    assert_eq!(response.headers()["resource-id"], "data/0");

    let response = service
        .publish(
            "pkg",
            serde_json::json!({ "channels": ["unpublished"], "resources": { "data": 1 } }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bundles_have_empty_metadata() {
    let service = ServiceStateBuilder::default().build();
    let response = service
        .send(
            Request::builder()
                .method("PUT")
                .uri("/my-bundle")
                .header(AUTHORIZATION, OWNER)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"kind":"bundle","public":true}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = service.get("/my-bundle/meta/resources", None).await;
    assert_eq!(body_json(response).await, serde_json::json!([]));

    let response = service.get("/my-bundle/meta/resource/anything", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({}));
}

#[tokio::test]
async fn declarations() {
    let service = ServiceStateBuilder::default().build();
    assert_eq!(service.declare("pkg", true, &["data"]).await.status(), StatusCode::CREATED);

    let response = service.declare("pkg", true, &["data"]).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, ErrorCode::DuplicateUpload);

    let response = service.declare("twice", true, &["data", "data"]).await;
    assert_eq!(error_code(response).await, ErrorCode::BadRequest);

    let response = service.get("/missing/meta/resources", None).await;
    assert_eq!(error_code(response).await, ErrorCode::MetadataNotFound);
    let response = service.get("/missing/resources/data", None).await;
    assert_eq!(error_code(response).await, ErrorCode::NotFound);
}

#[tokio::test]
async fn registration() {
    let register = || {
        Request::builder()
            .method("POST")
            .uri("/account")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=alice"))
            .unwrap()
    };

    let service = ServiceStateBuilder::default().build();
    let response = service.send(register()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "token": "token-for-alice" }));

    let service = ServiceStateBuilder::default().allow_registration(false).build();
    let response = service.send(register()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn healthcheck_and_fallback() {
    let service = ServiceStateBuilder::default().build();

    let response = service.get("/healthcheck", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 100_000).await.unwrap();
    assert_eq!(&body[..], b"OK");

    let response = service.get("/pkg/no/such/endpoint", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::NotFound);
}
