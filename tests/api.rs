//! End-to-end tests over the demo endpoint set.

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

async fn json_of(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

#[tokio::test]
async fn path_and_query_parameters() {
    let server = common::start_server().await;

    let body = json_of(
        server
            .client
            .get(server.url("/api/v1/get/a/42"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["id"], "42");
    assert_eq!(body["method"], "GET");

    let defaults = json_of(server.client.get(server.url("/api/v1/get")).send().await.unwrap()).await;
    assert_eq!(defaults["page"], 1);
    assert_eq!(defaults["size"], 10);

    let paged = json_of(
        server
            .client
            .get(server.url("/api/v1/get?page=3&size=20"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(paged["page"], 3);
    assert_eq!(paged["size"], 20);

    let bad = server
        .client
        .get(server.url("/api/v1/get?page=three"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    let bad = json_of(bad).await;
    assert_eq!(bad["details"][0]["field"], "page");
    assert_eq!(bad["details"][0]["reason"], "type_mismatch");

    let user = json_of(
        server
            .client
            .get(server.url("/api/v1/uri/John/30"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(user["user"], json!({"name": "John", "age": 30}));

    assert_eq!(server.stop().await.exit_code(), 0);
}

#[tokio::test]
async fn structured_bodies() {
    let server = common::start_server().await;

    let from_json = json_of(
        server
            .client
            .post(server.url("/api/v1/post/json"))
            .json(&json!({"name": "John", "age": 30}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(from_json["user"]["name"], "John");
    assert_eq!(from_json["user"]["age"], 30);

    let malformed = server
        .client
        .post(server.url("/api/v1/post/json"))
        .header(CONTENT_TYPE, "application/json")
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let malformed = json_of(malformed).await;
    assert_eq!(malformed["code"], "malformed_body");
    assert!(malformed.get("user").is_none());

    let missing = json_of(
        server
            .client
            .put(server.url("/api/v1/put/json"))
            .json(&json!({}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(missing["code"], "binding_failed");
    assert_eq!(missing["details"].as_array().unwrap().len(), 2);

    let from_xml = json_of(
        server
            .client
            .post(server.url("/api/v1/xml"))
            .header(CONTENT_TYPE, "application/xml")
            .body("<user><name>Ann</name><age>41</age></user>")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(from_xml["user"], json!({"name": "Ann", "age": 41}));

    let from_yaml = json_of(
        server
            .client
            .post(server.url("/api/v1/yaml"))
            .header(CONTENT_TYPE, "application/x-yaml")
            .body("name: Bo\nage: 7\n")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(from_yaml["user"], json!({"name": "Bo", "age": 7}));

    server.stop().await;
}

#[tokio::test]
async fn nested_form_maps() {
    let server = common::start_server().await;

    let urlencoded = json_of(
        server
            .client
            .post(server.url("/api/v1/post/form"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("info%5Bname%5D=John&info%5Bage%5D=30")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(urlencoded["msg"], json!({"name": "John", "age": "30"}));

    let form = Form::new().text("info[name]", "Jane").text("info[city]", "Oslo");
    let multipart = json_of(
        server
            .client
            .post(server.url("/api/v2/articles/7/like"))
            .multipart(form)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(multipart["id"], "7");
    assert_eq!(multipart["msg"], json!({"name": "Jane", "city": "Oslo"}));

    let empty = json_of(
        server
            .client
            .get(server.url("/api/v2/getExchangeRates"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(empty["msg"], json!({}));

    server.stop().await;
}

#[tokio::test]
async fn headers_and_cookies() {
    let server = common::start_server().await;

    let headers = json_of(
        server
            .client
            .get(server.url("/api/v1/header"))
            .header("Authorization", "Bearer t0k")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(headers["token"], "Bearer t0k");

    let unset = json_of(server.client.get(server.url("/api/v1/cookie")).send().await.unwrap()).await;
    assert_eq!(unset["token"], "not set");

    let set = json_of(
        server
            .client
            .get(server.url("/api/v1/cookie"))
            .header(COOKIE, "theme=dark; token=xyz")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(set["token"], "xyz");

    let response = server.client.get(server.url("/api/v1/set-cookie")).send().await.unwrap();
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("token=abc123"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(cookie.contains("Domain=localhost"));
    assert!(cookie.contains("HttpOnly"));
    assert!(!cookie.contains("Secure"));

    server.stop().await;
}

#[tokio::test]
async fn upload_then_download() {
    let server = common::start_server().await;

    let form = Form::new().part(
        "file",
        Part::bytes(b"root:x:0:0".to_vec()).file_name("../../etc/passwd"),
    );
    let uploaded = json_of(
        server
            .client
            .post(server.url("/api/v1/post/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(uploaded["size"], 10);
    assert!(server.storage.path().join("passwd").exists());

    let download = server
        .client
        .get(server.url("/api/v1/get/download/passwd"))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    let disposition = download.headers()[CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("passwd"));
    assert_eq!(download.bytes().await.unwrap().as_ref(), b"root:x:0:0");

    let missing = server
        .client
        .get(server.url("/api/v1/get/download/nope.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_of(missing).await["code"], "file_not_found");

    let no_part = server
        .client
        .post(server.url("/api/v1/post/upload"))
        .multipart(Form::new().text("other", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_part.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn multi_file_upload_reports_each_file() {
    let server = common::start_server().await;

    let form = Form::new()
        .part("files", Part::bytes(b"one".to_vec()).file_name("a.txt"))
        .part("files", Part::bytes(b"two!".to_vec()).file_name(".."))
        .part("files", Part::bytes(b"three".to_vec()).file_name("c.txt"));
    let body = json_of(
        server
            .client
            .post(server.url("/api/v1/post/uploadFiles"))
            .multipart(form)
            .send()
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(body["count"], 2);
    assert_eq!(body["files"].as_array().unwrap().len(), 2);
    assert_eq!(body["failed"][0]["name"], "..");
    assert!(server.storage.path().join("a.txt").exists());
    assert!(server.storage.path().join("c.txt").exists());

    server.stop().await;
}

#[tokio::test]
async fn raw_body_upload() {
    let server = common::start_server().await;

    let payload = vec![7u8; 64 * 1024];
    let body = json_of(
        server
            .client
            .post(server.url("/api/v1/post/bin"))
            .header(CONTENT_DISPOSITION, "attachment; filename=\"blob.bin\"")
            .body(payload.clone())
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["filename"], "blob.bin");
    assert_eq!(body["size"], 64 * 1024);
    assert_eq!(
        std::fs::read(server.storage.path().join("blob.bin")).unwrap(),
        payload
    );

    let unnamed = server
        .client
        .post(server.url("/api/v1/post/bin"))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(unnamed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(unnamed).await["code"], "missing_filename");

    server.stop().await;
}

#[tokio::test]
async fn uploads_stream_past_the_buffered_body_limit() {
    let server = common::start_server_with(|config| config.server.max_body_bytes = 4096).await;

    let payload = vec![3u8; 256 * 1024];
    let raw = server
        .client
        .post(server.url("/api/v1/post/bin"))
        .header(CONTENT_DISPOSITION, "attachment; filename=\"big.bin\"")
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(raw.status(), StatusCode::OK);
    assert_eq!(json_of(raw).await["size"], 256 * 1024);
    assert_eq!(
        std::fs::read(server.storage.path().join("big.bin")).unwrap().len(),
        payload.len()
    );

    let form = Form::new().part("file", Part::bytes(payload).file_name("part.bin"));
    let part = server
        .client
        .post(server.url("/api/v1/post/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(part.status(), StatusCode::OK);
    assert_eq!(json_of(part).await["size"], 256 * 1024);

    let oversized = server
        .client
        .post(server.url("/api/v1/post/json"))
        .json(&json!({"name": "x".repeat(8192), "age": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let oversized = json_of(oversized).await;
    assert_eq!(oversized["code"], "body_too_large");
    assert!(oversized["error"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn streaming_endpoints() {
    let server = common::start_server().await;

    let chunked = server.client.get(server.url("/api/v1/stream")).send().await.unwrap();
    assert!(chunked.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = chunked.text().await.unwrap();
    let expected: String = (0..10).map(|i| format!("Chunk {i}\n")).collect();
    assert_eq!(text, expected);

    let sse = server.client.get(server.url("/api/v1/sse")).send().await.unwrap();
    assert_eq!(sse.headers()[CONTENT_TYPE], "text/event-stream");
    let events = sse.text().await.unwrap();
    assert!(events.contains("data: Message 0\n\n"));
    assert!(events.find("Message 0").unwrap() < events.find("Message 4").unwrap());

    server.stop().await;
}

#[tokio::test]
async fn dispatch_outcomes() {
    let server = common::start_server().await;

    let missing = server.client.get(server.url("/api/v3/anything")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(missing.headers().contains_key("x-request-id"));

    let wrong = server.client.delete(server.url("/api/v1/get")).send().await.unwrap();
    assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong.headers()["allow"], "GET");

    let config = json_of(server.client.get(server.url("/api/v1/config")).send().await.unwrap()).await;
    assert_eq!(config["name"], "web-scaffold");

    let report = server.stop().await;
    assert!(report.drained);
    assert!(report.closed.is_empty());
}
