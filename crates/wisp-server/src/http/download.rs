//! One-time download handler
//!
//! The transfer is consumed before the first byte is sent, so a second
//! request for the same link always gets 404. The bytes on disk are removed
//! when the response body is dropped, whether streaming finished or the
//! client hung up part-way.
//!
//! `HEAD` only peeks: it reports the headers a download would carry and
//! leaves the transfer in place.

use super::AppState;
use crate::error::ApiError;
use crate::utils::content_disposition;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use futures_util::StreamExt;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::runtime::Handle;
use tokio_util::io::ReaderStream;
use wisp_core::{TransferId, TransferRecord};

/// Deletes the consumed bytes once the last reference goes away
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.0);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_delivered(&path));
            }
            Err(_) => remove_delivered(&path),
        }
    }
}

fn remove_delivered(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed delivered file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// `GET /download/{id}`
pub async fn download(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id: TransferId = raw_id.parse().map_err(|_| ApiError::NotFound)?;
    let record = state.store.consume(&id).map_err(|e| {
        tracing::debug!("Download of {} refused: {}", raw_id, e);
        ApiError::from(e)
    })?;
    let cleanup = RemoveOnDrop(record.location.clone());

    let file = File::open(&record.location).await?;
    let size = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _owned = &cleanup;
        chunk
    });

    tracing::info!("Streaming {} ({} bytes) to downloader", id, size);
    Ok(attachment(Body::from_stream(stream), &record, size))
}

/// `HEAD /download/{id}`
pub async fn inspect(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id: TransferId = raw_id.parse().map_err(|_| ApiError::NotFound)?;
    let record = state.store.get(&id)?;
    let size = tokio::fs::metadata(&record.location).await?.len();
    Ok(attachment(Body::empty(), &record, size))
}

fn attachment(body: Body, record: &TransferRecord, size: u64) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(&record.download_name()))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(CONTENT_DISPOSITION, disposition);
    response
}
