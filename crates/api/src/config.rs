//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL saga store; in-memory store when unset
/// - `USERS_SERVICE_URL`, `LAWYERS_SERVICE_URL`, `APPOINTMENTS_SERVICE_URL`
///   — downstream services for the gateway sagas; in-memory clients when
///   any is unset
/// - `HTTP_TIMEOUT_SECS` — per-request timeout for downstream calls
///   (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub users_service_url: Option<String>,
    pub lawyers_service_url: Option<String>,
    pub appointments_service_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            users_service_url: std::env::var("USERS_SERVICE_URL").ok(),
            lawyers_service_url: std::env::var("LAWYERS_SERVICE_URL").ok(),
            appointments_service_url: std::env::var("APPOINTMENTS_SERVICE_URL").ok(),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(10),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-request timeout for downstream service calls.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Base URLs of the three downstream services, when all are configured.
    pub fn service_urls(&self) -> Option<(String, String, String)> {
        match (
            &self.users_service_url,
            &self.lawyers_service_url,
            &self.appointments_service_url,
        ) {
            (Some(users), Some(lawyers), Some(appointments)) => {
                Some((users.clone(), lawyers.clone(), appointments.clone()))
            }
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            users_service_url: None,
            lawyers_service_url: None,
            appointments_service_url: None,
            http_timeout_secs: 10,
        }
    }
}
