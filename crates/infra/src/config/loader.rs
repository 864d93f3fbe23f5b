//! Configuration loader
//!
//! Loads aggregator configuration from files and environment variables.
//!
//! ## Loading Strategy
//! 1. Start from a config file when one exists (`NOCTUA_CONFIG_PATH`, then
//!    probed locations), otherwise from the built-in defaults
//! 2. Apply environment variable overrides on top (env always wins)
//! 3. Supports JSON and TOML formats, chosen by file extension
//!
//! ## Environment Variables
//! - `NOCTUA_CONFIG_PATH`: Explicit config file path
//! - `NOCTUA_DB_PATH`: Shared SQLite file path
//! - `NOCTUA_DB_POOL_SIZE`: Connection pool size
//! - `NOCTUA_DB_BUSY_TIMEOUT_MS`: Per-connection busy timeout
//! - `NOCTUA_WORKERS`: Users processed concurrently within one pass
//! - `NOCTUA_MERGE_GAP_MINUTES`: Reconnection gap absorbed into intervals
//! - `NOCTUA_MIN_SLEEP_MINUTES`: Minimum sleep candidate duration
//! - `NOCTUA_DEFAULT_TIMEZONE`: Fallback IANA timezone
//! - `NOCTUA_USER_TIMEZONES`: Per-user overrides, compact `id:tz,id:tz` form
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./noctua.toml` or `./noctua.json` (current working directory)
//! 2. `./config/noctua.toml` or `./config/noctua.json`
//! 3. Relative to executable location

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use noctua_domain::{NoctuaConfig, NoctuaError, Result};

/// Load configuration with environment-first override semantics.
///
/// # Errors
/// Returns `NoctuaError::Config` if:
/// - `NOCTUA_CONFIG_PATH` points at a missing file
/// - A config file exists but cannot be parsed
/// - An environment override has an invalid value
pub fn load() -> Result<NoctuaConfig> {
    let mut config = match config_file_path()? {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("no config file found, starting from defaults");
            NoctuaConfig::default()
        }
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `NoctuaError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<NoctuaConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(NoctuaError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            NoctuaError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| NoctuaError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<NoctuaConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| NoctuaError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| NoctuaError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(NoctuaError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend([
            cwd.join("noctua.toml"),
            cwd.join("noctua.json"),
            cwd.join("config/noctua.toml"),
            cwd.join("config/noctua.json"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend([exe_dir.join("noctua.toml"), exe_dir.join("noctua.json")]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Parse the compact `id:tz,id:tz` per-user timezone form.
///
/// Empty entries are skipped; anything without a colon, with a non-numeric
/// id, or with an empty zone name is a configuration error. Unknown IANA
/// names are deliberately not rejected here; they surface per-user at pass
/// time.
pub fn parse_timezone_map(raw: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((id, zone)) = entry.split_once(':') else {
            return Err(NoctuaError::Config(format!(
                "Invalid user timezone entry '{entry}': expected id:tz"
            )));
        };
        let id = id.trim();
        let zone = zone.trim();
        if zone.is_empty() {
            return Err(NoctuaError::Config(format!(
                "Invalid user timezone entry '{entry}': empty timezone"
            )));
        }
        id.parse::<i64>().map_err(|_| {
            NoctuaError::Config(format!("Invalid user id '{id}' in timezone entry"))
        })?;
        map.insert(id.to_string(), zone.to_string());
    }
    Ok(map)
}

fn config_file_path() -> Result<Option<PathBuf>> {
    if let Some(raw) = env_string("NOCTUA_CONFIG_PATH") {
        let path = PathBuf::from(raw);
        if !path.exists() {
            return Err(NoctuaError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }
    Ok(probe_config_paths())
}

fn apply_env_overrides(config: &mut NoctuaConfig) -> Result<()> {
    if let Some(path) = env_string("NOCTUA_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = env_parse::<u32>("NOCTUA_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }
    if let Some(millis) = env_parse::<u64>("NOCTUA_DB_BUSY_TIMEOUT_MS")? {
        config.database.busy_timeout_ms = millis;
    }
    if let Some(workers) = env_parse::<usize>("NOCTUA_WORKERS")? {
        config.pass.workers = workers;
    }
    if let Some(minutes) = env_parse::<i64>("NOCTUA_MERGE_GAP_MINUTES")? {
        config.inference.merge_gap_minutes = minutes;
    }
    if let Some(minutes) = env_parse::<i64>("NOCTUA_MIN_SLEEP_MINUTES")? {
        config.inference.min_sleep_minutes = minutes;
    }
    if let Some(zone) = env_string("NOCTUA_DEFAULT_TIMEZONE") {
        config.users.default_timezone = Some(zone);
    }
    if let Some(raw) = env_string("NOCTUA_USER_TIMEZONES") {
        // Per-user env entries win over file entries.
        config.users.timezones.extend(parse_timezone_map(&raw)?);
    }
    Ok(())
}

/// Get an environment variable, treating empty values as unset.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an environment variable if set.
///
/// # Errors
/// Returns `NoctuaError::Config` if the value does not parse.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| NoctuaError::Config(format!("Invalid {key}: {e}"))),
    }
}
