//! # Wisp Server
//!
//! HTTP front end for the Wisp transfer store.
//!
//! This crate provides:
//! - Password-protected raw and multipart uploads
//! - One-time streaming downloads
//! - WebSocket watchers notified on delivery or expiry
//! - Environment/CLI configuration and a startup sweep of orphaned files

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod sweep;
pub mod utils;

pub use config::ServerConfig;
pub use error::ApiError;
pub use http::{AppState, router, serve};
