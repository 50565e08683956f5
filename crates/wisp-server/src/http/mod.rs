//! HTTP front end
//!
//! | Route            | Method     | Handler                         |
//! |------------------|------------|---------------------------------|
//! | `/`, `/{*path}`  | POST, PUT  | [`upload::upload`]              |
//! | `/`, `/{*path}`  | GET        | static files from `public_dir`  |
//! | `/download/{id}` | GET        | [`download::download`]          |
//! | `/download/{id}` | HEAD       | [`download::inspect`]           |
//! | `/ws/{id}`       | GET        | [`watch::watch`] (WebSocket)    |
//! | `/login`         | POST       | [`auth::login`]                 |
//! | `/config`        | GET        | [`info::public_config`]         |

pub mod auth;
pub mod download;
pub mod info;
pub mod upload;
pub mod watch;

use crate::config::ServerConfig;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use wisp_core::TransferStore;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// The transfer registry
    pub store: TransferStore,
    /// Validated server configuration
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Bundle the store and configuration
    pub fn new(config: ServerConfig, store: TransferStore) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.public_dir);
    let uploads = post(upload::upload)
        .put(upload::upload)
        .fallback_service(assets);

    Router::new()
        .route(
            "/download/{id}",
            get(download::download).head(download::inspect),
        )
        .route("/ws/{id}", get(watch::watch))
        .route("/login", post(auth::login))
        .route("/config", get(info::public_config))
        .route("/", uploads.clone())
        .route("/{*path}", uploads)
        // Upload size is enforced while streaming to disk
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve<F>(state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
