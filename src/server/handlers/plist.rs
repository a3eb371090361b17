// src/server/handlers/plist.rs
//! OTA install manifest endpoint
//!
//! iOS fetches this document after following an `itms-services` link.
//! Failures carry no body, only the status.

use super::{ApiError, blocking, request_origin};
use crate::catalog::write_manifest;
use crate::server::ServerState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /plist/:id.plist
pub async fn get_plist(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = file.strip_suffix(".plist").map(str::to_string) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let origin = request_origin(&state, &headers);
    let catalog = state.catalog.clone();
    let document = match blocking(move || catalog.plist(&id, &origin)).await {
        Ok(document) => document,
        Err(e) => return status_only(e),
    };

    let mut body = Vec::with_capacity(document.len());
    if let Err(e) = write_manifest(&mut body, &document) {
        return status_only(ApiError(e));
    }

    state.metrics.record_manifest();
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn status_only(err: ApiError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!("Manifest generation failed: {}", err.0);
    }
    status.into_response()
}
