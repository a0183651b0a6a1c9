//! Process configuration (spec §6): environment variables with a
//! `key=value` file fallback, the way the original `pydantic_settings`
//! loader read from `env_file="env_config"`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Default location for the `key=value` fallback file, matching the
/// original `env_config` default.
const DEFAULT_CONFIG_FILE: &str = "env_config";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub count_workers: usize,
    pub archive_folder: PathBuf,
    pub database_folder: PathBuf,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidInteger { key: &'static str, value: String },
}

impl Config {
    /// Loads configuration from the environment, falling back to a
    /// `key=value` file (`STACKDEX_CONFIG`, default `./env_config`) for any
    /// value not already set in the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file_path = std::env::var("STACKDEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file_values = read_key_value_file(&file_path);

        let lookup = |key: &'static str| -> Option<String> {
            std::env::var(key).ok().or_else(|| file_values.get(key).cloned())
        };

        // count_threads is accepted as a synonym for count_workers.
        let count_workers_raw = lookup("count_workers").or_else(|| lookup("count_threads"));
        let count_workers = match count_workers_raw {
            Some(raw) => parse_positive_usize("count_workers", &raw)?,
            None => default_worker_count(),
        };

        let archive_folder = lookup("archive_folder")
            .ok_or(ConfigError::Missing("archive_folder"))
            .map(PathBuf::from)?;
        let database_folder = lookup("database_folder")
            .ok_or(ConfigError::Missing("database_folder"))
            .map(PathBuf::from)?;
        let host = lookup("host").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match lookup("port") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidInteger { key: "port", value: raw })?,
            None => 8000,
        };

        Ok(Self {
            count_workers: count_workers.max(2),
            archive_folder,
            database_folder,
            host,
            port,
        })
    }
}

/// Default worker pool size (spec §9: "default to `min(cpu_count, 8)`"),
/// enforced to never drop below 2 (spec §5: one slot for the line producer,
/// one for the batch consumer's I/O).
fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cpus.min(8).max(2)
}

fn parse_positive_usize(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let value: usize = raw
        .parse()
        .map_err(|_| ConfigError::InvalidInteger { key, value: raw.to_string() })?;
    if value == 0 {
        return Err(ConfigError::InvalidInteger { key, value: raw.to_string() });
    }
    Ok(value)
}

fn read_key_value_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
