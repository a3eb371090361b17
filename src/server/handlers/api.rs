// src/server/handlers/api.rs
//! JSON API handlers
//!
//! Routes are mounted with `any()`; each handler checks the method itself
//! and answers a mismatch with the 404 envelope. Request bodies are JSON
//! except for upload, which is multipart.

use super::{ApiResult, blocking, not_found, ok, ok_list, ok_message, request_origin};
use crate::Error;
use crate::packages::{PackageFormat, extension_of};
use crate::server::ServerState;
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, Method},
    response::Response,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Multipart field carrying the package
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: i64,
    pub size: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub keyword: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditParams {
    pub id: String,
    pub comment: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteParams {
    pub id: String,
}

/// Answer to the delete capability probe
#[derive(Debug, Serialize)]
pub struct DeleteProbe {
    pub delete: bool,
}

/// Decode a JSON request body; an empty body means all defaults
fn params<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| Error::Transport(format!("invalid request body: {}", e)))
}

/// POST /api/list
pub async fn list(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    if method != Method::POST {
        return Ok(not_found());
    }

    let params: ListParams = params(&body)?;
    let origin = request_origin(&state, &headers);
    let catalog = state.catalog.clone();
    let items = blocking(move || catalog.list(&origin, params.page, params.size)).await?;
    Ok(ok_list(items))
}

/// GET /api/info/:id
pub async fn info(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if method != Method::GET {
        return Ok(not_found());
    }

    let origin = request_origin(&state, &headers);
    let catalog = state.catalog.clone();
    let item = blocking(move || catalog.find(&id, &origin)).await?;
    Ok(ok(item))
}

/// POST /api/search
pub async fn search(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    if method != Method::POST {
        return Ok(not_found());
    }

    let params: SearchParams = params(&body)?;
    let origin = request_origin(&state, &headers);
    let catalog = state.catalog.clone();
    let items = blocking(move || catalog.search(&params.keyword, &origin)).await?;
    Ok(ok_list(items))
}

/// POST /api/upload
///
/// Streams the `file` field to a staging file, then decodes and commits it
/// on the blocking pool. If the client goes away the drop guard cancels
/// the pending decode and nothing is committed.
pub async fn upload(State(state): State<Arc<ServerState>>, request: Request) -> ApiResult<Response> {
    if request.method() != Method::POST {
        return Ok(not_found());
    }

    let result = receive_upload(&state, request).await;
    match &result {
        Ok(bytes) => state.metrics.record_upload(*bytes),
        Err(_) => state.metrics.record_upload_failure(),
    }
    result.map(|_| ok_message())
}

async fn receive_upload(state: &Arc<ServerState>, request: Request) -> ApiResult<u64> {
    let transport = |e: axum::extract::multipart::MultipartError| Error::Transport(e.body_text());

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| Error::Transport(e.body_text()))?;

    while let Some(mut field) = multipart.next_field().await.map_err(transport)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if PackageFormat::classify(&file_name).is_none() {
            return Err(Error::UnsupportedFormat(extension_of(&file_name)).into());
        }

        let mut staged = state.catalog.stage(&file_name)?;
        let mut out = tokio::fs::File::from_std(staged.as_file_mut().try_clone().map_err(Error::from)?);
        let mut received = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(transport)? {
            out.write_all(&chunk).await.map_err(Error::from)?;
            received += chunk.len() as u64;
        }
        out.flush().await.map_err(Error::from)?;
        drop(out);

        tracing::debug!("Received upload {} ({} bytes)", file_name, received);

        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let catalog = state.catalog.clone();
        blocking(move || catalog.add(staged, &cancel)).await?;
        return Ok(received);
    }

    Err(Error::Transport(format!("missing form field '{}'", UPLOAD_FIELD)).into())
}

/// POST /api/edit
pub async fn edit(
    State(state): State<Arc<ServerState>>,
    method: Method,
    body: Bytes,
) -> ApiResult<Response> {
    if method != Method::POST {
        return Ok(not_found());
    }

    let params: EditParams = params(&body)?;
    let catalog = state.catalog.clone();
    blocking(move || catalog.edit(&params.id, &params.comment)).await?;
    Ok(ok_message())
}

/// GET probes whether deletion is enabled; POST deletes
pub async fn delete(
    State(state): State<Arc<ServerState>>,
    method: Method,
    body: Bytes,
) -> ApiResult<Response> {
    if method == Method::GET {
        return Ok(ok(DeleteProbe {
            delete: state.catalog.delete_enabled(),
        }));
    }
    if method != Method::POST {
        return Ok(not_found());
    }

    let params: DeleteParams = params(&body)?;
    let catalog = state.catalog.clone();
    blocking(move || catalog.delete(&params.id)).await?;
    Ok(ok_message())
}
