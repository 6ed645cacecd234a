//! HTTP server setup and the dispatch boundary.
//!
//! # Responsibilities
//! - Build the axum app: one fallback that defers to the route registry
//! - Wire up middleware (request ID, tracing, CORS, in-flight tracking)
//! - Contain handler failures: errors become JSON, panics become 500s
//! - Record request metrics per matched route

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, CorsConfig};
use crate::http::request::{RequestContext, Services, UuidRequestId, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::net::connection::{track_in_flight, InFlightTracker};
use crate::observability::metrics;
use crate::routing::RouteRegistry;

pub type HandlerResult = Result<Response, ApiError>;

/// Anything that turns a [`RequestContext`] into a response.
///
/// Implemented for every `Fn(RequestContext) -> impl Future<Output = Result<impl IntoResponse, ApiError>>`,
/// so plain `async fn`s register directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        self(ctx).map(|r| r.map(IntoResponse::into_response)).boxed()
    }
}

pub type BoxedHandler = Arc<dyn Handler>;

/// Route table handed to the server.
pub type Routes = RouteRegistry<BoxedHandler>;

pub fn handler<H: Handler>(h: H) -> BoxedHandler {
    Arc::new(h)
}

#[derive(Clone)]
struct AppState {
    routes: Arc<Routes>,
    services: Arc<Services>,
    body_limit: usize,
}

/// HTTP front end: the route table plus its middleware stack.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(
        routes: Routes,
        services: Services,
        config: &AppConfig,
        tracker: InFlightTracker,
    ) -> Self {
        tracing::info!(routes = routes.len(), "route table frozen");
        let state = AppState {
            routes: Arc::new(routes),
            services: Arc::new(services),
            body_limit: config.server.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state, tracker),
        }
    }

    fn build_router(config: &AppConfig, state: AppState, tracker: InFlightTracker) -> Router {
        // buffered reads enforce `max_body_bytes` in RequestContext; uploads stream unbounded
        let mut router = Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(middleware::from_fn_with_state(tracker, track_in_flight))
            .layer(DefaultBodyLimit::disable());

        if let Some(cors) = cors_layer(&config.cors) {
            router = router.layer(cors);
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if config.allow_origins.is_empty() {
        return None;
    }
    let origins = if config.allow_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allow_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
            .expose_headers([header::CONTENT_LENGTH])
            .allow_credentials(config.allow_credentials)
            .max_age(Duration::from_secs(config.max_age_secs)),
    )
}

/// Fallback handler: every request goes through the registry.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let (route, result) = match state.routes.dispatch(&method, &path) {
        Ok(matched) => {
            let route = matched.pattern.to_string();
            let handler = Arc::clone(matched.handler);
            let ctx = RequestContext::new(
                request,
                matched.params,
                Arc::clone(&state.services),
                state.body_limit,
            );
            let result = match invoke(handler.as_ref(), ctx).await {
                Ok(result) => result,
                Err(panic) => {
                    tracing::error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        route = %route,
                        panic = %panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                    Err(ApiError::Internal("internal server error".to_string()))
                }
            };
            (route, result)
        }
        Err(e) => (metrics::UNMATCHED_ROUTE.to_string(), Err(ApiError::from(e))),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!(request_id = %request_id, method = %method, path = %path, error = %e, "request failed");
            } else {
                tracing::debug!(request_id = %request_id, method = %method, path = %path, error = %e, "request rejected");
            }
            e.into_response()
        }
    };

    metrics::record_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Run a handler, catching panics raised while building or polling its future.
async fn invoke(
    handler: &dyn Handler,
    ctx: RequestContext,
) -> Result<HandlerResult, Box<dyn Any + Send>> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(ctx)))?;
    AssertUnwindSafe(future).catch_unwind().await
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::tests::services;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::Json;
    use tower::ServiceExt;

    async fn ok(_ctx: RequestContext) -> Result<Json<serde_json::Value>, ApiError> {
        Ok(Json(serde_json::json!({"ok": true})))
    }

    async fn boom(_ctx: RequestContext) -> Result<&'static str, ApiError> {
        panic!("handler bug")
    }

    fn app() -> Router {
        let mut routes = Routes::new();
        routes
            .group("/api")
            .get("/items/:id", handler(ok))
            .unwrap()
            .get("/items/active", handler(|ctx: RequestContext| async move {
                Ok::<_, ApiError>(format!("active {}", ctx.params().len()))
            }))
            .unwrap()
            .get("/boom", handler(boom))
            .unwrap();
        let services = services(&std::env::temp_dir());
        HttpServer::new(routes, services, &AppConfig::default(), InFlightTracker::new())
            .into_router()
    }

    async fn call(method: Method, uri: &str) -> Response {
        app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn literal_route_beats_parameter() {
        let response = call(Method::GET, "/api/items/active").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(text(response).await, "active 0");
    }

    #[tokio::test]
    async fn unknown_path_and_wrong_method() {
        let missing = call(Method::GET, "/nope").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(text(missing).await.contains("route_not_found"));

        let wrong = call(Method::DELETE, "/api/items/3").await;
        assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(wrong.headers()[header::ALLOW], "GET");
    }

    async fn echo_name(mut ctx: RequestContext) -> Result<String, ApiError> {
        let bound = ctx
            .bind(&[crate::binding::BindingTarget::json("name").required()])
            .await?;
        Ok(bound.get_str("name").unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn oversized_buffered_body_is_a_json_413() {
        let mut routes = Routes::new();
        routes.group("/api").post("/echo", handler(echo_name)).unwrap();
        let mut config = AppConfig::default();
        config.server.max_body_bytes = 64;
        let app = HttpServer::new(routes, services(&std::env::temp_dir()), &config, InFlightTracker::new())
            .into_router();

        let name = "x".repeat(1024);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/echo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!(r#"{{"name":"{name}"}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["code"], "body_too_large");
        assert!(body["error"].as_str().unwrap().contains("64 bytes"));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let response = call(Method::GET, "/api/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(body["code"], "internal_error");

        // the app keeps serving afterwards
        assert_eq!(call(Method::GET, "/api/items/1").await.status(), StatusCode::OK);
    }
}
