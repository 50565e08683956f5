//! Server configuration
//!
//! Every option can come from the command line or the environment, so the
//! server runs unchanged under a container that only sets env vars.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const MIB: u64 = 1 << 20;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8088;

/// Password used when none is configured
pub const DEFAULT_PASSWORD: &str = "demo";

/// Default upload limit in MiB
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;

/// Default expiry, derived from the store's default TTL
pub const DEFAULT_EXPIRY_MINUTES: u64 = wisp_core::DEFAULT_TTL.as_secs() / 60;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Upload password is empty
    #[error("Upload password cannot be empty")]
    EmptyPassword,

    /// Size limit is zero
    #[error("Max file size must be positive, got {0}")]
    InvalidMaxFileSize(u64),

    /// Expiry is zero
    #[error("File expiry minutes must be positive, got {0}")]
    InvalidExpiry(u64),

    /// Size limit does not fit in a byte count
    #[error("Max file size of {0} MB is too large")]
    MaxFileSizeTooLarge(u64),

    /// Expiry does not fit in a duration in seconds
    #[error("File expiry of {0} minutes is too large")]
    ExpiryTooLarge(u64),
}

/// Wisp - one-time file drop server
#[derive(Parser, Debug, Clone)]
#[command(name = "wisp")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// IP address to bind to (IPv4 or IPv6)
    #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding uploaded bytes until they are downloaded or expire
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Directory of static assets served for GET requests
    #[arg(long, env = "PUBLIC_DIR", default_value = "./public")]
    pub public_dir: PathBuf,

    /// Password required to upload
    #[arg(long, env = "UPLOAD_PASSWORD", default_value = DEFAULT_PASSWORD, hide_env_values = true)]
    pub password: String,

    /// Maximum upload size in MiB
    #[arg(
        long = "max-file-size-mb",
        env = "MAX_FILE_SIZE_MB",
        default_value_t = DEFAULT_MAX_FILE_SIZE_MB
    )]
    pub max_file_size_mb: u64,

    /// Minutes an unclaimed file is kept before it is deleted
    #[arg(long, env = "FILE_EXPIRY_MINUTES", default_value_t = DEFAULT_EXPIRY_MINUTES)]
    pub file_expiry_minutes: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("./uploads"),
            public_dir: PathBuf::from("./public"),
            password: DEFAULT_PASSWORD.to_string(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            file_expiry_minutes: DEFAULT_EXPIRY_MINUTES,
            verbose: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Check that all values are usable
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if self.max_file_size_mb == 0 {
            return Err(ConfigError::InvalidMaxFileSize(self.max_file_size_mb));
        }
        if self.file_expiry_minutes == 0 {
            return Err(ConfigError::InvalidExpiry(self.file_expiry_minutes));
        }
        if self.max_file_size_mb.checked_mul(MIB).is_none() {
            return Err(ConfigError::MaxFileSizeTooLarge(self.max_file_size_mb));
        }
        if self.file_expiry_minutes.checked_mul(60).is_none() {
            return Err(ConfigError::ExpiryTooLarge(self.file_expiry_minutes));
        }
        Ok(())
    }

    /// Address to listen on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Upload size limit in bytes (saturates if not validated)
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(MIB)
    }

    /// Time-to-live for unclaimed files (saturates if not validated)
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.file_expiry_minutes.saturating_mul(60))
    }

    /// Whether the server still runs with the well-known default password
    pub fn is_default_password(&self) -> bool {
        self.password == DEFAULT_PASSWORD
    }

    /// Log filter derived from the verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Settings worth logging at startup, password masked
    pub fn summary(&self) -> Vec<String> {
        vec![
            "Password: ***".to_string(),
            format!("Max file size: {} MB", self.max_file_size_mb),
            format!("File expiry: {} minutes", self.file_expiry_minutes),
            format!("Listen address: {}", self.socket_addr()),
            format!("Upload directory: {}", self.upload_dir.display()),
            format!("Public directory: {}", self.public_dir.display()),
        ]
    }
}
