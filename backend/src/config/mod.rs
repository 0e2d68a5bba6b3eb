//! Configuration module for the admissions backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Default cap for uploaded roster spreadsheets (5 MiB).
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Default session lifetime (one week).
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to the Excel roster mirror
    pub mirror_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum accepted request body size for uploads
    pub max_upload_bytes: usize,
    /// Mark the session cookie `Secure` (enable behind HTTPS)
    pub secure_cookies: bool,
    /// Hours a session stays valid after login
    pub session_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("ADMISSIONS_DB_PATH")
            .unwrap_or_else(|_| "./data/admissions.sqlite".to_string())
            .into();

        let mirror_path = env::var("ADMISSIONS_MIRROR_PATH")
            .unwrap_or_else(|_| "./data/students_record.xlsx".to_string())
            .into();

        let bind_addr = env::var("ADMISSIONS_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid ADMISSIONS_BIND_ADDR: {}", e)))?;

        let log_level = env::var("ADMISSIONS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let max_upload_bytes = match env::var("ADMISSIONS_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.trim().parse().map_err(|e| {
                AppError::Internal(format!("Invalid ADMISSIONS_MAX_UPLOAD_BYTES: {}", e))
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let secure_cookies = match env::var("ADMISSIONS_SECURE_COOKIES") {
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                AppError::Internal(format!("Invalid ADMISSIONS_SECURE_COOKIES: {}", raw))
            })?,
            Err(_) => false,
        };

        let session_ttl_hours = match env::var("ADMISSIONS_SESSION_TTL_HOURS") {
            Ok(raw) => match raw.trim().parse::<i64>() {
                Ok(hours) if hours > 0 => hours,
                _ => {
                    return Err(AppError::Internal(format!(
                        "Invalid ADMISSIONS_SESSION_TTL_HOURS: {}",
                        raw
                    )))
                }
            },
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };

        Ok(Self {
            db_path,
            mirror_path,
            bind_addr,
            log_level,
            max_upload_bytes,
            secure_cookies,
            session_ttl_hours,
        })
    }

    /// How long a new session stays valid.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("ADMISSIONS_DB_PATH");
        env::remove_var("ADMISSIONS_MIRROR_PATH");
        env::remove_var("ADMISSIONS_BIND_ADDR");
        env::remove_var("ADMISSIONS_LOG_LEVEL");
        env::remove_var("ADMISSIONS_MAX_UPLOAD_BYTES");
        env::remove_var("ADMISSIONS_SECURE_COOKIES");
        env::remove_var("ADMISSIONS_SESSION_TTL_HOURS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/admissions.sqlite"));
        assert_eq!(
            config.mirror_path,
            PathBuf::from("./data/students_record.xlsx")
        );
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(!config.secure_cookies);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(168));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
