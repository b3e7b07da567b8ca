use std::{env, fmt::Display, str::FromStr};

use anyhow::{anyhow, Result};
use tracing::info;

/// Server configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub max_upload_bytes: usize,
    /// Mount `DELETE /api/patient/:identifier`
    pub enable_admin: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys fall back to defaults;
    /// malformed values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            host: try_load(&lookup, "VISIT_TRACKER_HOST", "0.0.0.0")?,
            port: try_load(&lookup, "VISIT_TRACKER_PORT", "5000")?,
            db_path: try_load(&lookup, "VISIT_TRACKER_DB_PATH", "visit_tracker.db")?,
            max_upload_bytes: try_load(&lookup, "VISIT_TRACKER_MAX_UPLOAD_BYTES", "5242880")?,
            enable_admin: load_flag(&lookup, "VISIT_TRACKER_ENABLE_ADMIN")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            db_path: "visit_tracker.db".to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
            enable_admin: false,
        }
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn load_flag<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => {
            info!("{key} not set, using default: false");
            Ok(false)
        }
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(anyhow!("Invalid {key} value {v:?}: expected true or false")),
        },
    }
}
