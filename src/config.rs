use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const DEFAULT_DB_PATH: &str = "spesometro.db";
pub const DEFAULT_PORT: &str = "8080";
pub const DEFAULT_TOKEN_EXPIRE_H: &str = "3";

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,

    /// Debug mode enables permissive CORS for a separately served frontend
    pub debug: bool,

    /// Lifetime of login tokens, in hours
    pub token_expire_hours: i64,

    /// Password for the bootstrap `admin` account (generated when unset)
    pub default_password: Option<String>,

    /// Directory with a built frontend to serve next to the API
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            db_path: PathBuf::from(try_load::<String>("SPESOMETRO_DB", DEFAULT_DB_PATH)?),
            port: try_load("SPESOMETRO_PORT", DEFAULT_PORT)?,
            debug: var("SPESOMETRO_DEBUG").map(|v| is_truthy(&v)).unwrap_or(false),
            token_expire_hours: try_load("SPESOMETRO_TOKEN_EXPIRE_H", DEFAULT_TOKEN_EXPIRE_H)?,
            default_password: var("SPESOMETRO_DEFAULT_PSW"),
            static_dir: var("SPESOMETRO_STATIC_DIR").map(PathBuf::from),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            port: 8080,
            debug: false,
            token_expire_hours: 3,
            default_password: None,
            static_dir: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "t")
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow::anyhow!("{e}")
        })
        .with_context(|| format!("Environment misconfigured: {key}={raw}"))
}
