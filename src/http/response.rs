//! Structured error and file responses.
//!
//! # Responsibilities
//! - Map every handler-visible error to a status code and stable JSON shape
//! - Build attachment responses for downloads
//!
//! # Design Decisions
//! - Error body is always `{"error", "code"}`, plus `details` for binding failures
//! - `NotFound`/`MethodNotAllowed` are ordinary outcomes, logged at debug
//! - 405 responses list the allowed methods in `Allow`

use axum::body::Body;
use axum::http::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::binding::BindingError;
use crate::http::stream::StreamError;
use crate::routing::RouteError;
use crate::storage::{attachment_disposition, ServedFile, StorageError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Route(RouteError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Route(RouteError::MethodNotAllowed { .. }) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Binding(BindingError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Binding(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Stream(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Route(RouteError::NotFound { .. }) => "route_not_found",
            ApiError::Route(RouteError::MethodNotAllowed { .. }) => "method_not_allowed",
            ApiError::Route(_) => "route_config",
            ApiError::Binding(e) => e.code(),
            ApiError::Storage(e) => e.code(),
            ApiError::Stream(StreamError::ConnectionClosed) => "connection_closed",
            ApiError::Stream(StreamError::WriteFailure(_)) => "stream_failed",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldDetail<'a> {
    field: &'a str,
    reason: &'a str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldDetail<'a>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::Binding(e) => e
                .field_errors()
                .iter()
                .map(|f| FieldDetail {
                    field: f.field(),
                    reason: f.code(),
                    message: f.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            details,
        };
        let mut response = (status, Json(body)).into_response();

        if let ApiError::Route(RouteError::MethodNotAllowed { allowed, .. }) = &self {
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        response
    }
}

/// Stream a stored file back as a download.
pub fn attachment(served: ServedFile) -> Response {
    let disposition = attachment_disposition(&served.file_name);
    let len = served.len;
    let mut response = Response::new(Body::from_stream(served.into_stream()));
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::FieldError;
    use crate::binding::Source;
    use axum::http::Method;

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn binding_errors_list_every_field() {
        let err = ApiError::from(BindingError::Invalid(vec![
            FieldError::Missing {
                field: "name".into(),
                location: Source::Json,
            },
            FieldError::TypeMismatch {
                field: "age".into(),
                expected: "integer",
                got: "'x'".into(),
            },
        ]));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json(response).await;
        assert_eq!(body["code"], "binding_failed");
        assert_eq!(body["details"][0]["field"], "name");
        assert_eq!(body["details"][1]["reason"], "type_mismatch");
    }

    #[tokio::test]
    async fn method_not_allowed_sets_allow() {
        let err = ApiError::from(RouteError::MethodNotAllowed {
            method: Method::PATCH,
            path: "/items".into(),
            allowed: vec![Method::GET, Method::POST],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST");
        assert!(json(response).await.get("details").is_none());
    }

    #[test]
    fn storage_statuses() {
        let missing = ApiError::from(StorageError::NotFound { name: "a".into() });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StorageError::MissingFilename).status(),
            StatusCode::BAD_REQUEST
        );
        let failed = ApiError::from(StorageError::WriteFailure {
            name: "a".into(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
