// src/server/handlers/files.rs
//! Package and icon downloads
//!
//! Paths are `{id}.{ext}`; the extension must match what was stored.
//! Files are streamed rather than buffered.

use super::{ApiResult, blocking, not_found};
use crate::Error;
use crate::server::ServerState;
use crate::storage::PackageRecord;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Split `abc.ipa` into (`abc`, `ipa`)
fn split_file_name(file: &str) -> Option<(&str, &str)> {
    let (id, ext) = file.rsplit_once('.')?;
    (!id.is_empty() && !ext.is_empty()).then_some((id, ext))
}

/// Download name offered to browsers, e.g. `Demo-1.2.0.ipa`
fn download_name(record: &PackageRecord) -> String {
    let stem: String = format!("{}-{}", record.name, record.version)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", stem, record.format.extension())
}

/// GET /pkg/:id.{ipa,apk}
pub async fn get_package(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let Some((id, ext)) = split_file_name(&file) else {
        return Ok(not_found());
    };

    let catalog = state.catalog.clone();
    let id = id.to_string();
    let (record, path) = blocking(move || catalog.package_file(&id)).await?;
    if !ext.eq_ignore_ascii_case(record.format.extension()) {
        return Err(Error::NotFound(file.clone()).into());
    }

    let filename = download_name(&record);
    tracing::info!("Serving package {} as {}", record.id, filename);
    stream_file(
        &state,
        path,
        record.format.content_type(),
        Some(format!("attachment; filename=\"{}\"", filename)),
    )
    .await
}

/// GET /icon/:id.png
pub async fn get_icon(
    State(state): State<Arc<ServerState>>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let Some((id, "png")) = split_file_name(&file) else {
        return Ok(not_found());
    };

    let catalog = state.catalog.clone();
    let id = id.to_string();
    let path = blocking(move || catalog.icon_file(&id)).await?;
    stream_file(&state, path, "image/png", None).await
}

async fn stream_file(
    state: &ServerState,
    path: PathBuf,
    content_type: &str,
    disposition: Option<String>,
) -> ApiResult<Response> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()).into());
        }
        Err(e) => return Err(Error::from(e).into()),
    };
    let len = file.metadata().await.map_err(Error::from)?.len();
    state.metrics.record_download(len);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        // Stored files never change under an id
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable");
    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Error::Storage(format!("failed to build response: {}", e)).into())
}
