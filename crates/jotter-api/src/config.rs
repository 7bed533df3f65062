//! Server configuration, read once at startup.
//!
//! Environment variables:
//!   HOST               - bind address (default: "0.0.0.0")
//!   PORT               - bind port (default: 3000)
//!   DATABASE_URL       - PostgreSQL connection string
//!   ALLOWED_ORIGINS    - comma-separated CORS origin whitelist
//!   IDENTITY_HEADER    - header carrying the gateway-verified subject (default: "x-auth-subject")
//!   AUTO_CREATE_USERS  - create a user on first sight of a subject (default: true)
//!   OBJECT_STORE_PATH  - root directory for uploaded media
//!   MAX_UPLOAD_BYTES   - request body cap for uploads

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{HeaderName, HeaderValue};

use jotter_core::defaults::{IDENTITY_HEADER, MAX_UPLOAD_BYTES, OBJECT_STORE_PATH, SERVER_PORT};
use jotter_core::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/jotter";
const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub allowed_origins: Vec<HeaderValue>,
    pub identity_header: HeaderName,
    pub auto_create_users: bool,
    pub object_store_path: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: SERVER_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            allowed_origins: vec![HeaderValue::from_static(DEFAULT_ORIGINS)],
            identity_header: HeaderName::from_static(IDENTITY_HEADER),
            auto_create_users: true,
            object_store_path: PathBuf::from(OBJECT_STORE_PATH),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl ApiConfig {
    /// Build the configuration from the environment.
    ///
    /// Unset variables take their defaults; set but malformed values are a
    /// configuration error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("PORT: '{port}' is not a valid port")))?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            if !origins.trim().is_empty() {
                config.allowed_origins = parse_allowed_origins(&origins)?;
            }
        }
        if let Ok(header) = std::env::var("IDENTITY_HEADER") {
            config.identity_header = parse_identity_header(&header)?;
        }
        if let Ok(flag) = std::env::var("AUTO_CREATE_USERS") {
            config.auto_create_users = flag == "true" || flag == "1";
        }
        if let Ok(path) = std::env::var("OBJECT_STORE_PATH") {
            config.object_store_path = PathBuf::from(path);
        }
        if let Ok(bytes) = std::env::var("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = bytes.parse().map_err(|_| {
                Error::Config(format!("MAX_UPLOAD_BYTES: '{bytes}' is not a byte count"))
            })?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("bind address {}:{}: {e}", self.host, self.port)))
    }
}

/// Parse a comma-separated origin list, skipping entries that are not valid header values.
///
/// ```text
/// ALLOWED_ORIGINS=https://jotter.example.com,http://localhost:3000
/// ```
///
/// A `*` entry is a configuration error: the CORS layer sends credentials,
/// and browsers refuse a wildcard origin on credentialed requests.
pub fn parse_allowed_origins(raw: &str) -> Result<Vec<HeaderValue>> {
    let mut origins = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if entry == "*" {
            return Err(Error::Config(
                "ALLOWED_ORIGINS: '*' cannot be combined with credentials; list each origin"
                    .to_string(),
            ));
        }
        match entry.parse::<HeaderValue>() {
            Ok(v) => origins.push(v),
            Err(e) => tracing::warn!("Invalid CORS origin '{}': {}", entry, e),
        }
    }
    Ok(origins)
}

fn parse_identity_header(raw: &str) -> Result<HeaderName> {
    HeaderName::try_from(raw.trim().to_ascii_lowercase())
        .map_err(|e| Error::Config(format!("IDENTITY_HEADER: '{raw}': {e}")))
}
