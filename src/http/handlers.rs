//! Demo endpoint set.
//!
//! One handler per parameter style: path, query, header, cookie, form,
//! nested form map, JSON, XML, YAML, file upload/download, raw body,
//! chunked and event streams.

use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::binding::{BindingTarget, FieldValue};
use crate::http::cookies::SetCookie;
use crate::http::request::RequestContext;
use crate::http::response::{attachment, ApiError};
use crate::http::server::{handler, Routes};
use crate::http::stream::{open_stream, Event, StreamKind};
use crate::routing::RouteError;
use crate::storage::{StorageError, UploadBatch};

/// Fallback when the `token` cookie is absent.
pub const COOKIE_NOT_SET: &str = "not set";

const CHUNK_COUNT: usize = 10;
const EVENT_COUNT: usize = 5;

pub fn routes() -> Result<Routes, RouteError> {
    let mut routes = Routes::new();

    routes
        .group("/api/v1")
        .get("/get/a/:id", handler(path_id))?
        .get("/get", handler(paging))?
        .get("/get/download/*filename", handler(download))?
        .post("/post/a/:id", handler(path_id))?
        .post("/post", handler(paging))?
        .post("/post/json", handler(json_user))?
        .post("/post/form", handler(info_map))?
        .post("/post/upload", handler(upload_single))?
        .post("/post/uploadFiles", handler(upload_many))?
        .post("/post/bin", handler(upload_raw))?
        .put("/put/a/:id", handler(info_map))?
        .put("/put/json", handler(json_user))?
        .delete("/delete/:id", handler(info_map))?
        .get("/header", handler(headers))?
        .get("/cookie", handler(read_cookie))?
        .get("/set-cookie", handler(write_cookie))?
        .get("/stream", handler(chunked))?
        .get("/sse", handler(events))?
        .post("/xml", handler(xml_user))?
        .post("/yaml", handler(yaml_user))?
        .get("/uri/:name/:age", handler(uri_user))?
        .get("/config", handler(config_summary))?;

    routes
        .group("/api/v2")
        .get("/getExchangeRates", handler(info_map))?
        .post("/createExchangeRate", handler(info_map))?
        .get("/articles", handler(info_map))?
        .post("/articles", handler(info_map))?
        .get("/articles/:id", handler(info_map))?
        .get("/articles/:id/like", handler(info_map))?
        .post("/articles/:id/like", handler(info_map))?;

    Ok(routes)
}

fn request_line(ctx: &RequestContext) -> (String, String) {
    (ctx.method().to_string(), ctx.uri().to_string())
}

async fn path_id(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let bound = ctx.bind(&[BindingTarget::path("id").required()]).await?;
    let (method, url) = request_line(&ctx);
    Ok(Json(json!({ "method": method, "url": url, "id": bound.get("id") })))
}

async fn paging(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let bound = ctx
        .bind(&[
            BindingTarget::query("page").integer().default_value(1i64),
            BindingTarget::query("size").integer().default_value(10i64),
        ])
        .await?;
    let (method, url) = request_line(&ctx);
    Ok(Json(json!({
        "method": method,
        "url": url,
        "page": bound.get("page"),
        "size": bound.get("size"),
    })))
}

/// `info[name]=..&info[age]=..` echoed back as a map.
async fn info_map(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let bound = ctx
        .bind(&[
            BindingTarget::path("id"),
            BindingTarget::form_map("info").default_value(FieldValue::Map(Default::default())),
        ])
        .await?;
    let mut body = json!({ "msg": bound.get("info") });
    if let Some(id) = bound.get("id") {
        body["id"] = json!(id);
    }
    Ok(Json(body))
}

#[derive(Debug, Serialize, Deserialize)]
struct User {
    name: String,
    age: i64,
}

fn user_targets(make: fn(&'static str) -> BindingTarget) -> [BindingTarget; 2] {
    [make("name").text().required(), make("age").integer().required()]
}

async fn bind_user(
    ctx: &mut RequestContext,
    make: fn(&'static str) -> BindingTarget,
) -> Result<Json<Value>, ApiError> {
    let bound = ctx.bind(&user_targets(make)).await?;
    let user: User = bound
        .deserialize()
        .map_err(|e| ApiError::Internal(format!("bound user does not decode: {e}")))?;
    Ok(Json(json!({ "user": user })))
}

async fn json_user(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    bind_user(&mut ctx, BindingTarget::json).await
}

async fn xml_user(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    bind_user(&mut ctx, BindingTarget::xml).await
}

async fn yaml_user(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    bind_user(&mut ctx, BindingTarget::yaml).await
}

async fn uri_user(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    bind_user(&mut ctx, BindingTarget::path).await
}

async fn headers(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let bound = ctx
        .bind(&[
            BindingTarget::header("token").key(AUTHORIZATION.as_str()),
            BindingTarget::header("contentType").key(CONTENT_TYPE.as_str()),
        ])
        .await?;
    Ok(Json(json!({
        "token": bound.get_str("token").unwrap_or_default(),
        "contentType": bound.get_str("contentType").unwrap_or_default(),
    })))
}

async fn read_cookie(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let bound = ctx
        .bind(&[BindingTarget::cookie("token").default_value(COOKIE_NOT_SET)])
        .await?;
    Ok(Json(json!({ "token": bound.get("token") })))
}

async fn write_cookie(_ctx: RequestContext) -> Result<Response, ApiError> {
    let cookie = SetCookie::new("token", "abc123")
        .max_age(3600)
        .path("/")
        .domain("localhost")
        .secure(false)
        .http_only(true);
    let value = cookie
        .to_header_value()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(SET_COOKIE, value)], Json(json!({ "message": "cookie set" }))).into_response())
}

async fn download(ctx: RequestContext) -> Result<Response, ApiError> {
    let name = ctx.param("filename").unwrap_or_default();
    let served = ctx.files().serve(name).await?;
    tracing::info!(file = %served.file_name, bytes = served.len, "serving download");
    Ok(attachment(served))
}

async fn upload_single(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let mut multipart = ctx.multipart().await?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or(StorageError::MissingFilename)?;
        let stored = ctx.files().store(&name, field, None).await?;
        return Ok(Json(json!({
            "message": "upload complete",
            "filename": stored.original_name,
            "size": stored.size,
            "path": stored.path,
        })));
    }
    Err(ApiError::BadRequest("multipart part 'file' is missing".to_string()))
}

async fn upload_many(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let mut multipart = ctx.multipart().await?;
    let mut batch = UploadBatch::default();
    let mut seen = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        seen += 1;
        let name = field.file_name().unwrap_or_default().to_string();
        let result = ctx.files().store(&name, field, None).await;
        batch.record(&name, result);
    }

    if seen == 0 {
        return Err(ApiError::BadRequest("no files uploaded".to_string()));
    }
    Ok(Json(json!({
        "count": batch.count(),
        "files": batch.stored,
        "failed": batch.failed,
    })))
}

/// Body is the file; `Content-Disposition: attachment; filename="x.bin"` names it.
async fn upload_raw(mut ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let disposition = ctx.header(CONTENT_DISPOSITION.as_str()).map(str::to_string);
    let size_hint = ctx
        .header(CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<u64>().ok());
    let body = ctx.take_body().into_data_stream();
    let stored = ctx
        .files()
        .ingest_raw(disposition.as_deref(), body, size_hint)
        .await?;
    Ok(Json(json!({
        "message": "success",
        "filename": stored.file_name,
        "size": stored.size,
    })))
}

async fn chunked(ctx: RequestContext) -> Result<Response, ApiError> {
    let (mut stream, response) = open_stream(StreamKind::Chunked);
    let request_id = ctx.request_id().to_string();
    tokio::spawn(async move {
        for i in 0..CHUNK_COUNT {
            if let Err(e) = stream.write(format!("Chunk {i}\n")).await {
                tracing::debug!(request_id = %request_id, error = %e, "chunked stream stopped");
                return;
            }
        }
    });
    Ok(response)
}

async fn events(ctx: RequestContext) -> Result<Response, ApiError> {
    let (mut stream, response) = open_stream(StreamKind::EventStream);
    let request_id = ctx.request_id().to_string();
    tokio::spawn(async move {
        for i in 0..EVENT_COUNT {
            let event = Event::new(format!("Message {i}")).id(i.to_string());
            if let Err(e) = stream.send_event(&event).await {
                tracing::debug!(request_id = %request_id, error = %e, "event stream stopped");
                return;
            }
        }
    });
    Ok(response)
}

async fn config_summary(ctx: RequestContext) -> Result<Json<Value>, ApiError> {
    let config = ctx.config();
    Ok(Json(json!({
        "name": config.name,
        "mode": config.mode,
        "version": config.version,
        "port": config.server.port,
    })))
}
