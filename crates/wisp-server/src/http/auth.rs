//! Upload password checks

use super::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};

/// Header carrying the upload password
pub const PASSWORD_HEADER: &str = "x-upload-password";

/// Optional `?password=` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct PasswordQuery {
    /// Password supplied in the query string
    pub password: Option<String>,
}

/// Password from the header, falling back to the query string
pub fn supplied_password(headers: &HeaderMap, query: &PasswordQuery) -> Option<String> {
    headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| query.password.clone().filter(|p| !p.is_empty()))
}

/// `POST /login`: check a password without uploading anything
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<PasswordQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    match supplied_password(&headers, &query) {
        Some(password) if password == state.config.password => {
            Ok(Json(json!({ "success": true })))
        }
        _ => {
            tracing::warn!("Failed login attempt");
            Err(ApiError::Unauthorized)
        }
    }
}
