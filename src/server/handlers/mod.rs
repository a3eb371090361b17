// src/server/handlers/mod.rs
//! HTTP request handlers for the sideload server
//!
//! JSON responses share one envelope: object results are flattened next
//! to an `err` string, sequences sit under `data`. `err` is empty on
//! success.

pub mod api;
pub mod files;
pub mod plist;

use crate::Error;
use crate::origin::Origin;
use crate::server::ServerState;
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(flatten)]
    pub body: T,
    pub err: String,
}

/// Sequence payload
#[derive(Debug, Serialize)]
pub struct DataList<T: Serialize> {
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub msg: &'static str,
}

/// 200 with `body` flattened into the envelope
pub fn ok<T: Serialize>(body: T) -> Response {
    Json(Envelope {
        body,
        err: String::new(),
    })
    .into_response()
}

/// 200 with `items` under `data`
pub fn ok_list<T: Serialize>(items: Vec<T>) -> Response {
    ok(DataList { data: items })
}

/// 200 `{msg: "ok"}`
pub fn ok_message() -> Response {
    ok(Message { msg: "ok" })
}

/// 404 `{err: "404"}` for unknown routes and wrong methods
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "err": "404" }))).into_response()
}

/// Router fallback
pub async fn fallback() -> Response {
    not_found()
}

/// API error wrapper that implements IntoResponse
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidIdentifier | Error::UnsupportedFormat(_) | Error::Transport(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::Storage(_) | Error::ShortWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            // Client closed request
            Error::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            Error::Storage(msg) => tracing::error!("Storage failure: {}", msg),
            Error::ShortWrite { .. } => {
                tracing::error!("{}", self.0);
                return status.into_response();
            }
            _ => tracing::debug!("Request failed: {}", self.0),
        }

        (status, Json(json!({ "err": self.0.to_string() }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Run a blocking catalog call off the async runtime
pub async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Storage(format!("Task join error: {}", e)))?
        .map_err(ApiError)
}

/// External origin for links in this response
///
/// A configured public URL wins; otherwise derived from the referer,
/// `x-forwarded-proto` and `host` headers.
pub fn request_origin(state: &ServerState, headers: &HeaderMap) -> Origin {
    if let Some(origin) = &state.config.public_origin {
        return origin.clone();
    }

    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let bind = state.config.bind_addr.to_string();
    let host = text(header::HOST.as_str()).unwrap_or(&bind);
    Origin::resolve(
        text(header::REFERER.as_str()),
        text("x-forwarded-proto"),
        host,
    )
}
