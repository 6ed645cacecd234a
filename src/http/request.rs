//! Per-request context handed to handlers.
//!
//! # Responsibilities
//! - Expose method, path, query, headers, cookies and matched path params
//! - Buffer the body on demand (binding) or hand it over as a stream (uploads)
//! - Only buffered reads are held to `server.max_body_bytes`; streamed uploads are not
//! - Carry the request ID assigned by the middleware stack
//!
//! # Design Decisions
//! - Owned by exactly one handler invocation
//! - The body is read at most once; binding buffers it so several binds can share it

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, Uri};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::binding::{self, BindingError, BindingTarget, Bound, ParamSource};
use crate::config::{AppConfig, ConfigHandle};
use crate::http::cookies::parse_cookies;
use crate::http::response::ApiError;
use crate::routing::PathParams;
use crate::storage::FileStore;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Process-scoped collaborators reachable from handlers.
#[derive(Debug, Clone)]
pub struct Services {
    pub files: FileStore,
    pub config: ConfigHandle,
}

enum BodyState {
    Unread(Body),
    Buffered(Bytes),
    Taken,
}

pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    query: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    params: PathParams,
    body: BodyState,
    body_limit: usize,
    request_id: String,
    services: Arc<Services>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("params", &self.params)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn new(
        request: Request,
        params: PathParams,
        services: Arc<Services>,
        body_limit: usize,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let query = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let cookies = parse_cookies(&parts.headers);
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
            query,
            cookies,
            params,
            body: BodyState::Unread(body),
            body_limit,
            request_id,
            services,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// First value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }

    pub fn query_all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.cookies, name)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn files(&self) -> &FileStore {
        &self.services.files
    }

    /// The configuration snapshot current at the time of the call.
    pub fn config(&self) -> Arc<AppConfig> {
        self.services.config.load()
    }

    /// Read the whole body, honouring the configured size limit.
    pub async fn body_bytes(&mut self) -> Result<Bytes, BindingError> {
        match std::mem::replace(&mut self.body, BodyState::Taken) {
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyState::Unread(body) => {
                let bytes = read_limited(body, self.body_limit).await?;
                self.body = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyState::Taken => Err(BindingError::Body(
                "request body was already consumed".to_string(),
            )),
        }
    }

    /// Hand the body over as a stream. Later reads see an error.
    pub fn take_body(&mut self) -> Body {
        match std::mem::replace(&mut self.body, BodyState::Taken) {
            BodyState::Unread(body) => body,
            BodyState::Buffered(bytes) => Body::from(bytes),
            BodyState::Taken => Body::empty(),
        }
    }

    /// Multipart reader over the body, for streaming file parts.
    pub async fn multipart(&mut self) -> Result<Multipart, ApiError> {
        let mut request = Request::new(self.take_body());
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = self.extensions.clone();
        Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))
    }

    /// Run the binding pipeline. The body is only read when a target needs it.
    pub async fn bind(&mut self, targets: &[BindingTarget]) -> Result<Bound, BindingError> {
        let body = if targets.iter().any(|t| t.source.reads_body()) {
            self.body_bytes().await?
        } else {
            Bytes::new()
        };
        let view = ParamView {
            params: &self.params,
            query: &self.query,
            headers: &self.headers,
            cookies: &self.cookies,
        };
        binding::bind_with(&view, body, targets).await
    }
}

/// Buffer `body`, failing with `TooLarge` once it passes `limit`.
async fn read_limited(body: Body, limit: usize) -> Result<Bytes, BindingError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BindingError::Body(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(BindingError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Borrowed, thread-safe view of the non-body request parts.
struct ParamView<'a> {
    params: &'a PathParams,
    query: &'a [(String, String)],
    headers: &'a HeaderMap,
    cookies: &'a [(String, String)],
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

impl ParamSource for ParamView<'_> {
    fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        lookup(self.cookies, name)
    }

    fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::binding::FieldValue;

    pub(crate) fn services(root: &std::path::Path) -> Services {
        Services {
            files: FileStore::new(root),
            config: AppConfig::default().into(),
        }
    }

    fn context(request: Request, params: PathParams) -> RequestContext {
        RequestContext::new(request, params, Arc::new(services(std::path::Path::new("uploads"))), 1024)
    }

    #[tokio::test]
    async fn exposes_request_parts() {
        let request = Request::builder()
            .uri("/api/v1/get?page=2&size=10&page=3")
            .header("Cookie", "token=abc")
            .header(X_REQUEST_ID, "req-1")
            .body(Body::empty())
            .unwrap();
        let mut params = PathParams::new();
        params.insert("id", "9");
        let ctx = context(request, params);

        assert_eq!(ctx.path(), "/api/v1/get");
        assert_eq!(ctx.query("page"), Some("2"));
        assert_eq!(ctx.query_all("page"), vec!["2", "3"]);
        assert_eq!(ctx.cookie("token"), Some("abc"));
        assert_eq!(ctx.param("id"), Some("9"));
        assert_eq!(ctx.request_id(), "req-1");
        assert_eq!(ctx.config().name, AppConfig::default().name);
    }

    #[tokio::test]
    async fn body_is_shared_between_binds() {
        let request = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Ada","age":36}"#))
            .unwrap();
        let mut ctx = context(request, PathParams::new());

        let first = ctx.bind(&[BindingTarget::json("name").required()]).await.unwrap();
        let second = ctx.bind(&[BindingTarget::json("age").integer()]).await.unwrap();
        assert_eq!(first.get("name"), Some(&FieldValue::from("Ada")));
        assert_eq!(second.get_i64("age"), Some(36));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .body(Body::from(vec![b'x'; 4096]))
            .unwrap();
        let mut ctx = context(request, PathParams::new());
        assert!(matches!(
            ctx.body_bytes().await,
            Err(BindingError::TooLarge { limit: 1024 })
        ));
    }

    #[tokio::test]
    async fn taken_body_is_not_limited() {
        let request = Request::builder()
            .method(Method::POST)
            .body(Body::from(vec![b'x'; 4096]))
            .unwrap();
        let mut ctx = context(request, PathParams::new());
        let bytes = axum::body::to_bytes(ctx.take_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 4096);
    }
}
