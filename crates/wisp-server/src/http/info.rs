//! Public configuration for the web front end

use super::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Non-sensitive settings the browser UI needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    /// Whether the server still uses the default password
    pub is_default_password: bool,
    /// Minutes before an unclaimed file expires
    pub file_expiry_minutes: u64,
    /// Upload size limit in MiB
    #[serde(rename = "maxFileSizeMB")]
    pub max_file_size_mb: u64,
}

/// `GET /config`
pub async fn public_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(PublicConfig {
        is_default_password: state.config.is_default_password(),
        file_expiry_minutes: state.config.file_expiry_minutes,
        max_file_size_mb: state.config.max_file_size_mb,
    })
}
