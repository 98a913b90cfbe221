//! Configuration layer: typed settings with layered precedence (file → env).

use std::{
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::purge::PurgeConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "purge-relay";
const ENV_PREFIX: &str = "PURGE_RELAY";
const MAX_RETRIES_CEILING: u32 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub purge: PurgeSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct PurgeSettings {
    pub enabled: bool,
    pub debounce_window: Duration,
    pub min_interval: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub audit_log_capacity: NonZeroUsize,
    pub purge_timeout: Duration,
    pub in_flight_recheck: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Where settings are read from, lowest precedence first.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    /// Extra file layered over the default and local files; must exist.
    pub config_file: Option<PathBuf>,
}

/// Load settings using the configured precedence (files → environment).
pub fn load(sources: &Sources) -> Result<Settings, LoadError> {
    load_with_environment(
        sources,
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}

fn load_with_environment(sources: &Sources, env: Environment) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = sources.config_file.as_deref() {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(env);

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    purge: RawPurgeSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, purge } = raw;

        let logging = build_logging_settings(logging)?;
        let purge = build_purge_settings(purge)?;

        Ok(Self { logging, purge })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_purge_settings(purge: RawPurgeSettings) -> Result<PurgeSettings, LoadError> {
    let defaults = PurgeConfig::default();

    let max_retries = purge.max_retries.unwrap_or(defaults.max_retries);
    if max_retries > MAX_RETRIES_CEILING {
        return Err(LoadError::invalid(
            "purge.max_retries",
            format!("must not exceed {MAX_RETRIES_CEILING}"),
        ));
    }

    let capacity = purge
        .audit_log_capacity
        .unwrap_or(defaults.audit_log_capacity);
    let audit_log_capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
        LoadError::invalid("purge.audit_log_capacity", "must be greater than zero")
    })?;

    Ok(PurgeSettings {
        enabled: purge.enabled.unwrap_or(defaults.enabled),
        debounce_window: Duration::from_millis(
            purge
                .debounce_window_ms
                .unwrap_or(defaults.debounce_window_ms),
        ),
        min_interval: Duration::from_millis(
            purge.min_interval_ms.unwrap_or(defaults.min_interval_ms),
        ),
        max_retries,
        backoff_base: Duration::from_millis(
            purge.backoff_base_ms.unwrap_or(defaults.backoff_base_ms),
        ),
        audit_log_capacity,
        purge_timeout: positive_millis(
            purge.purge_timeout_ms.unwrap_or(defaults.purge_timeout_ms),
            "purge.purge_timeout_ms",
        )?,
        in_flight_recheck: positive_millis(
            purge
                .in_flight_recheck_ms
                .unwrap_or(defaults.in_flight_recheck_ms),
            "purge.in_flight_recheck_ms",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPurgeSettings {
    enabled: Option<bool>,
    debounce_window_ms: Option<u64>,
    min_interval_ms: Option<u64>,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
    audit_log_capacity: Option<usize>,
    purge_timeout_ms: Option<u64>,
    in_flight_recheck_ms: Option<u64>,
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}
