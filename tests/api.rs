// tests/api.rs

//! HTTP surface tests driven through the router with tower's oneshot.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use sideload::SqliteStorage;
use sideload::origin::Origin;
use sideload::server::{ServerConfig, ServerState, create_router};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "sideload-test-boundary";

fn app(enable_delete: bool) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open(dir.path()).unwrap();
    let config = ServerConfig {
        storage_root: dir.path().to_path_buf(),
        enable_delete,
        ..ServerConfig::default()
    };
    let state = ServerState::new(config, Arc::new(storage));
    (dir, create_router(Arc::new(state)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, "apps.internal:8080")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "apps.internal:8080")
        .body(Body::empty())
        .unwrap()
}

fn upload_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::HOST, "apps.internal:8080")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Upload `bytes` and return the id of the newest record
async fn upload(app: &Router, file_name: &str, bytes: &[u8]) -> String {
    let (status, json) = send_json(app, upload_request(file_name, bytes)).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", json);
    assert_eq!(json, json!({ "msg": "ok", "err": "" }));

    let (_, listed) = send_json(app, post_json("/api/list", json!({ "page": 1, "size": 1 }))).await;
    listed["data"][0]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_delete_probe() {
    let (_dir, app) = app(false);
    let (status, json) = send_json(&app, get("/api/delete")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "delete": false, "err": "" }));

    let (_enabled_dir, enabled) = self::app(true);
    let (_, json) = send_json(&enabled, get("/api/delete")).await;
    assert_eq!(json["delete"], true);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let (_dir, app) = app(true);
    let (status, json) = send_json(&app, get("/api/info/short")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["err"], "id invalid");

    let (status, _) = send_json(&app, post_json("/api/delete", json!({ "id": "../etc" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_method_is_not_found() {
    let (_dir, app) = app(false);
    for request in [
        get("/api/list"),
        get("/api/search"),
        get("/api/upload"),
        get("/api/edit"),
        post_json("/api/info/0123456789abcdef", json!({})),
    ] {
        let (status, json) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json, json!({ "err": "404" }));
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (_dir, app) = app(false);
    let (status, json) = send_json(&app, get("/api/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({ "err": "404" }));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (_dir, app) = app(false);
    let request = Request::builder()
        .method("POST")
        .uri("/api/search")
        .body(Body::from("{keyword"))
        .unwrap();
    let (status, json) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json["err"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_upload() {
    let (_dir, app) = app(false);
    let (status, json) = send_json(&app, upload_request("notes.txt", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["err"], "do not support .txt file");
}

#[tokio::test]
async fn test_undecodable_upload() {
    let (_dir, app) = app(false);
    let (status, _) = send_json(&app, upload_request("broken.ipa", b"garbage")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, listed) = send_json(&app, post_json("/api/list", json!({}))).await;
    assert_eq!(listed, json!({ "data": [], "err": "" }));
}

#[tokio::test]
async fn test_upload_info_edit_delete() {
    let (_dir, app) = app(true);
    let id = upload(&app, "Demo.ipa", &common::ipa("com.example.demo", "Demo", "1.2.3", "45")).await;

    let (status, info) = send_json(&app, get(&format!("/api/info/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["err"], "");
    assert_eq!(info["name"], "Demo");
    assert_eq!(info["type"], 0);
    assert_eq!(info["identifier"], "com.example.demo");
    assert_eq!(info["pkg"], format!("http://apps.internal:8080/pkg/{}.ipa", id));

    let edit = json!({ "id": id, "comment": "smoke tested" });
    let (status, json) = send_json(&app, post_json("/api/edit", edit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["msg"], "ok");

    let (_, hits) = send_json(&app, post_json("/api/search", json!({ "keyword": "demo" }))).await;
    assert_eq!(hits["data"][0]["comment"], "smoke tested");

    let (status, _) = send_json(&app, post_json("/api/delete", json!({ "id": id }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, get(&format!("/api/info/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_disabled_is_forbidden() {
    let (_dir, app) = app(false);
    let id = upload(&app, "a.apk", &common::apk("com.example.droid", "Droid", "1.0", 3)).await;

    let (status, json) = send_json(&app, post_json("/api/delete", json!({ "id": id }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["err"], "no permission to delete");

    let (status, _) = send_json(&app, get(&format!("/api/info/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_plist_uses_request_origin() {
    let (_dir, app) = app(false);
    let id = upload(&app, "Demo.ipa", &common::ipa("com.example.demo", "Demo", "1.0", "1")).await;

    let request = Request::builder()
        .uri(format!("/plist/{}.plist", id))
        .header(header::HOST, "internal:8080")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/xml")
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(&format!("https://internal:8080/pkg/{}.ipa", id)));
    assert!(text.contains("com.example.demo"));
}

#[tokio::test]
async fn test_plist_errors_have_no_body() {
    let (_dir, app) = app(false);
    let (status, body) = send(&app, get("/plist/0123456789abcdef.plist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());

    let (status, body) = send(&app, get("/plist/bad.plist")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_download_package_and_icon() {
    let (_dir, app) = app(false);
    let bytes = common::apk("com.example.droid", "Droid", "1.0", 3);
    let id = upload(&app, "droid.apk", &bytes).await;

    let response = app.clone().oneshot(get(&format!("/pkg/{}.apk", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.android.package-archive"
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.to_vec(), bytes);

    let (status, _) = send(&app, get(&format!("/pkg/{}.ipa", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, icon) = send(&app, get(&format!("/icon/{}.png", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(icon, common::png());
}

#[tokio::test]
async fn test_public_url_overrides_headers() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open(dir.path()).unwrap();
    let config = ServerConfig {
        public_origin: Some(Origin::new("https", "apps.example.com")),
        ..ServerConfig::default()
    };
    let app = create_router(Arc::new(ServerState::new(config, Arc::new(storage))));

    let id = upload(&app, "Demo.ipa", &common::ipa("com.example.demo", "Demo", "1.0", "1")).await;
    let (_, info) = send_json(&app, get(&format!("/api/info/{}", id))).await;
    assert_eq!(info["pkg"], format!("https://apps.example.com/pkg/{}.ipa", id));
}
