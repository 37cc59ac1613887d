use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::employee_payload::DEFAULT_SITE;
use crate::services::http_json::{HttpTimeouts, DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::services::hr::{HrSettings, HR_BASE_URL};
use crate::services::recruiting::{RecruitingSettings, RECRUITING_BASE_URL};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RESUME_CONTEXT: &str = "pdf_cv";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub recruiting: RecruitingSettings,
    pub hr: HrSettings,
    pub timeouts: HttpTimeouts,
    pub resume_context: String,
    pub download_dir: PathBuf,
    pub default_site: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let seconds = |key: &'static str, default: Duration| match get(key) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
            None => Ok(default),
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            bind_addr,
            recruiting: RecruitingSettings {
                base_url: get("RECRUITING_API_BASE_URL")
                    .unwrap_or_else(|| RECRUITING_BASE_URL.to_string()),
                api_key: require("RECRUITING_API_KEY")?,
                api_version: get("RECRUITING_API_VERSION"),
            },
            hr: HrSettings {
                base_url: get("HR_API_BASE_URL").unwrap_or_else(|| HR_BASE_URL.to_string()),
                username: require("HR_API_USERNAME")?,
                password: require("HR_API_PASSWORD")?,
            },
            timeouts: HttpTimeouts {
                open: seconds("HTTP_OPEN_TIMEOUT_SECS", DEFAULT_OPEN_TIMEOUT)?,
                read: seconds("HTTP_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT)?,
            },
            resume_context: get("RESUME_ATTACHMENT_CONTEXT")
                .unwrap_or_else(|| DEFAULT_RESUME_CONTEXT.to_string()),
            download_dir: get("ATTACHMENT_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            default_site: get("HR_DEFAULT_SITE").unwrap_or_else(|| DEFAULT_SITE.to_string()),
        })
    }
}
