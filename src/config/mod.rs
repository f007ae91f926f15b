//! Configuration module for the kanban backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// SQLite file holding the board collections
    pub board_db_path: PathBuf,
    /// SQLite file holding summaries, follows and reference data
    pub app_db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    pub refresh_interval: Duration,
    pub refresh_timeout: Duration,
    pub request_timeout: Duration,
    /// Board slug convention of the business domain, matched case-insensitively
    pub slug_domain_regexp: String,
    /// Base URL of the board UI
    pub board_url: String,
    /// Base URL of the application, linked from created cards
    pub web_base_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("KANBAN_API_PSK").ok();

        let board_db_path = env::var("KANBAN_BOARD_DB_PATH")
            .unwrap_or_else(|_| "./data/boards.sqlite".to_string())
            .into();

        let app_db_path = env::var("KANBAN_APP_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let bind_addr = env::var("KANBAN_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid KANBAN_BIND_ADDR format");

        let log_level = env::var("KANBAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("KANBAN_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        let slug_domain_regexp = env::var("KANBAN_SLUG_DOMAIN_REGEXP")
            .unwrap_or_else(|_| "^tableau-crp.*".to_string());
        let board_url =
            env::var("KANBAN_BOARD_URL").unwrap_or_else(|_| "http://localhost:3000/".to_string());
        let web_base_url = env::var("KANBAN_WEB_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080/".to_string());

        Self {
            api_psk,
            board_db_path,
            app_db_path,
            bind_addr,
            log_level,
            log_format,
            refresh_interval: secs_from_env("KANBAN_REFRESH_INTERVAL_SECS", 60),
            refresh_timeout: secs_from_env("KANBAN_REFRESH_TIMEOUT_SECS", 30),
            request_timeout: secs_from_env("KANBAN_REQUEST_TIMEOUT_SECS", 30),
            slug_domain_regexp,
            board_url,
            web_base_url,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
