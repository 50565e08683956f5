//! Upload handler
//!
//! Accepts either a raw request body (`curl -T file host/name`) or a
//! `multipart/form-data` form. Bytes are streamed to a random storage key
//! under the upload directory and only registered with the store once the
//! whole body has arrived within the size limit and the password checks out.
//! Any failure removes the partial file.

use super::AppState;
use super::auth::{PasswordQuery, supplied_password};
use crate::error::ApiError;
use crate::utils::{filename_from_path, format_size};
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use wisp_core::TransferId;
use wisp_core::id::storage_key;

/// `POST`/`PUT` on `/` or `/{name}`
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<PasswordQuery>,
    request: Request,
) -> Result<String, ApiError> {
    let config = &state.config;
    let headers = request.headers().clone();
    let mut password = supplied_password(&headers, &query);

    if password
        .as_deref()
        .is_some_and(|p| p != config.password.as_str())
    {
        tracing::warn!("Upload attempt with invalid password");
        return Err(ApiError::Unauthorized);
    }

    let multipart = is_multipart(&headers);
    if !multipart {
        if password.is_none() {
            tracing::warn!("Upload attempt without password");
            return Err(ApiError::Unauthorized);
        }
        if let Some(len) = content_length(&headers)
            && len > config.max_file_bytes()
        {
            tracing::info!(
                "Rejected upload: Content-Length {} exceeds {} bytes",
                len,
                config.max_file_bytes()
            );
            return Err(ApiError::PayloadTooLarge {
                max_mb: config.max_file_size_mb,
            });
        }
    }

    let location = config.upload_dir.join(storage_key()?);
    let received = if multipart {
        receive_multipart(request, &state, &location, &mut password).await
    } else {
        let name = filename_from_path(request.uri().path());
        let body = request.into_body().into_data_stream();
        write_stream(body, &location, config.max_file_bytes(), config.max_file_size_mb)
            .await
            .map(|size| (name, size))
    };

    let (name, size) = match received {
        Ok(saved) => saved,
        Err(e) => {
            discard_partial(&location).await;
            return Err(e);
        }
    };

    if password.as_deref() != Some(config.password.as_str()) {
        tracing::warn!("Upload attempt with invalid password");
        discard_partial(&location).await;
        return Err(ApiError::Unauthorized);
    }

    let id = match state.store.register_default(&location, name.clone()) {
        Ok(id) => id,
        Err(e) => {
            discard_partial(&location).await;
            return Err(e.into());
        }
    };

    tracing::info!("File uploaded: {} (original: {:?}, {} bytes)", id, name, size);
    Ok(success_message(&headers, id, &name, size))
}

/// Read a multipart form, saving the first file part
///
/// A `password` field fills in `password` if no header or query value was
/// given.
async fn receive_multipart(
    request: Request,
    state: &AppState,
    location: &Path,
    password: &mut Option<String>,
) -> Result<(String, u64), ApiError> {
    let config = &state.config;
    let mut form = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut saved = None;

    while let Some(field) = form.next_field().await.map_err(bad_form)? {
        let field_name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);

        if field_name.as_deref() == Some("password") && password.is_none() {
            *password = Some(field.text().await.map_err(bad_form)?);
        } else if let Some(file_name) = file_name
            && saved.is_none()
        {
            let size = write_stream(
                field,
                location,
                config.max_file_bytes(),
                config.max_file_size_mb,
            )
            .await?;
            saved = Some((file_name, size));
        }
    }

    saved.ok_or_else(|| ApiError::BadRequest("No file part in multipart form".to_string()))
}

/// Stream chunks into a new file at `location`, stopping past `max_bytes`
async fn write_stream<S, E>(
    stream: S,
    location: &Path,
    max_bytes: u64,
    max_mb: u64,
) -> Result<u64, ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    futures_util::pin_mut!(stream);
    let mut file = File::create(location).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        written += chunk.len() as u64;
        if written > max_bytes {
            tracing::info!("Rejected upload: body exceeds {} bytes", max_bytes);
            return Err(ApiError::PayloadTooLarge { max_mb });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn discard_partial(location: &Path) {
    if let Err(e) = tokio::fs::remove_file(location).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("Failed to remove partial upload {}: {}", location.display(), e);
    }
}

fn bad_form(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Failed to parse multipart form: {}", err.body_text()))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Plain-text response listing the download link and a cURL one-liner
fn success_message(headers: &HeaderMap, id: TransferId, name: &str, size: u64) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let url = format!("{scheme}://{host}/download/{id}");
    let name = if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    };

    format!(
        "File uploaded successfully!\n\
         Original name: {name}\n\
         File size: {}\n\
         Download URL: {url}\n\
         cURL command: curl -o \"{name}\" {url}\n",
        format_size(size)
    )
}
