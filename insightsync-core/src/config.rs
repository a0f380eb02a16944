//! Pipeline configuration.
//!
//! Two layers: an optional TOML settings file for tunables and destination
//! defaults, and the process environment for credentials, coordinates and
//! per-run overrides. Environment values win. Empty environment values are
//! treated as unset.
//!
//! ```toml
//! [api]
//! version = "v20.0"
//! timeout_secs = 60
//! breakdown_publisher_platform = true
//!
//! [window]
//! lookback_days = 14
//!
//! [sink]
//! root = "warehouse"
//! batch_size = 500
//! project = "analytics"
//! dataset = "ads"
//! table = "meta_insights_raw"
//! ```

use crate::insights::{
    Credentials, InsightsEndpoint, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT,
};
use crate::loader::DEFAULT_BATCH_SIZE;
use crate::sink::TableRef;
use crate::transport::DEFAULT_TIMEOUT_SECS;
use crate::window::{WindowOverrides, DEFAULT_LOOKBACK_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_ACCESS_TOKEN: &str = "META_ACCESS_TOKEN";
pub const ENV_AD_ACCOUNT_ID: &str = "META_AD_ACCOUNT_ID";
pub const ENV_API_VERSION: &str = "META_API_VERSION";
pub const ENV_SINCE: &str = "META_SINCE";
pub const ENV_UNTIL: &str = "META_UNTIL";
pub const ENV_LOOKBACK_DAYS: &str = "LOOKBACK_DAYS";
pub const ENV_PROJECT: &str = "BQ_PROJECT";
pub const ENV_DATASET: &str = "BQ_DATASET";
pub const ENV_TABLE: &str = "BQ_TABLE_RAW";
pub const ENV_SINK_DIR: &str = "INSIGHTSYNC_SINK_DIR";

const DEFAULT_SINK_ROOT: &str = "warehouse";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {name}")]
    Missing { name: String },

    #[error("invalid value for {name} ({value:?}): {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub version: String,
    pub timeout_secs: u64,
    pub page_limit: u32,
    pub breakdown_publisher_platform: bool,
    pub inline_link_clicks: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_limit: DEFAULT_PAGE_LIMIT,
            breakdown_publisher_platform: true,
            inline_link_clicks: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub lookback_days: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub root: PathBuf,
    pub batch_size: usize,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_SINK_ROOT),
            batch_size: DEFAULT_BATCH_SIZE,
            project: None,
            dataset: None,
            table: None,
        }
    }
}

/// File-level settings; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub window: WindowSettings,
    pub sink: SinkSettings,
}

impl Settings {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

/// Everything one pipeline run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub credentials: Credentials,
    pub account_id: String,
    pub table: TableRef,
    pub overrides: WindowOverrides,
    pub lookback_days: u32,
    pub api: ApiSettings,
    pub sink_root: PathBuf,
    pub batch_size: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn require<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Result<String, ConfigError> {
    non_empty(lookup(name)).ok_or_else(|| ConfigError::Missing {
        name: name.to_string(),
    })
}

fn require_or<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    fallback: Option<&String>,
) -> Result<String, ConfigError> {
    non_empty(lookup(name))
        .or_else(|| non_empty(fallback.cloned()))
        .ok_or_else(|| ConfigError::Missing {
            name: name.to_string(),
        })
}

/// Destination table from the environment, falling back to `[sink]`.
pub fn resolve_table<F: Fn(&str) -> Option<String>>(
    sink: &SinkSettings,
    lookup: &F,
) -> Result<TableRef, ConfigError> {
    Ok(TableRef {
        project: require_or(lookup, ENV_PROJECT, sink.project.as_ref())?,
        dataset: require_or(lookup, ENV_DATASET, sink.dataset.as_ref())?,
        table: require_or(lookup, ENV_TABLE, sink.table.as_ref())?,
    })
}

/// Sink root directory from the environment, falling back to `[sink] root`.
pub fn resolve_sink_root<F: Fn(&str) -> Option<String>>(sink: &SinkSettings, lookup: &F) -> PathBuf {
    non_empty(lookup(ENV_SINK_DIR))
        .map(PathBuf::from)
        .unwrap_or_else(|| sink.root.clone())
}

/// `std::env::var` as a lookup function.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl PipelineConfig {
    /// Resolve against an arbitrary lookup (the environment in production,
    /// a map in tests).
    pub fn resolve<F: Fn(&str) -> Option<String>>(
        settings: Settings,
        lookup: F,
    ) -> Result<Self, ConfigError> {
        let access_token = require(&lookup, ENV_ACCESS_TOKEN)?;
        let account_id = require(&lookup, ENV_AD_ACCOUNT_ID)?;
        let table = resolve_table(&settings.sink, &lookup)?;
        let sink_root = resolve_sink_root(&settings.sink, &lookup);

        let lookback_days = match non_empty(lookup(ENV_LOOKBACK_DAYS)) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: ENV_LOOKBACK_DAYS.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => settings.window.lookback_days,
        };

        let mut api = settings.api;
        if let Some(version) = non_empty(lookup(ENV_API_VERSION)) {
            api.version = version;
        }

        if settings.sink.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "sink.batch_size".to_string(),
                value: "0".to_string(),
                reason: "batch size must be at least 1".to_string(),
            });
        }

        Ok(Self {
            credentials: Credentials::new(access_token),
            account_id,
            table,
            overrides: WindowOverrides {
                since: non_empty(lookup(ENV_SINCE)),
                until: non_empty(lookup(ENV_UNTIL)),
            },
            lookback_days,
            api,
            sink_root,
            batch_size: settings.sink.batch_size,
        })
    }

    /// Resolve against the process environment.
    pub fn from_env(settings: Settings) -> Result<Self, ConfigError> {
        Self::resolve(settings, env_lookup)
    }

    pub fn endpoint(&self) -> InsightsEndpoint {
        InsightsEndpoint {
            base_url: self.api.base_url.clone(),
            api_version: self.api.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ACCESS_TOKEN, "tok"),
            (ENV_AD_ACCOUNT_ID, "1234"),
            (ENV_PROJECT, "proj"),
            (ENV_DATASET, "ads"),
            (ENV_TABLE, "raw"),
        ]
    }

    #[test]
    fn defaults_apply_when_only_required_values_set() {
        let cfg = PipelineConfig::resolve(Settings::default(), lookup(&required())).unwrap();

        assert_eq!(cfg.account_id, "1234");
        assert_eq!(cfg.credentials.access_token(), "tok");
        assert_eq!(cfg.table, TableRef::new("proj", "ads", "raw"));
        assert_eq!(cfg.lookback_days, 14);
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.api.version, "v20.0");
        assert_eq!(cfg.api.page_limit, 5000);
        assert_eq!(cfg.api.timeout_secs, 60);
        assert!(cfg.api.breakdown_publisher_platform);
        assert_eq!(cfg.sink_root, PathBuf::from("warehouse"));
        assert_eq!(cfg.overrides, WindowOverrides::default());
    }

    #[test]
    fn missing_token_is_reported_by_name() {
        let mut pairs = required();
        pairs.retain(|(k, _)| *k != ENV_ACCESS_TOKEN);
        let err = PipelineConfig::resolve(Settings::default(), lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref name } if name == ENV_ACCESS_TOKEN));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut pairs = required();
        pairs.retain(|(k, _)| *k != ENV_AD_ACCOUNT_ID);
        pairs.push((ENV_AD_ACCOUNT_ID, ""));
        let err = PipelineConfig::resolve(Settings::default(), lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref name } if name == ENV_AD_ACCOUNT_ID));
    }

    #[test]
    fn env_overrides_file_values() {
        let settings = Settings::from_toml(
            r#"
            [api]
            version = "v19.0"
            [window]
            lookback_days = 30
            [sink]
            project = "file-proj"
            dataset = "file-ds"
            table = "file-table"
            batch_size = 100
            "#,
        )
        .unwrap();

        let mut pairs = vec![(ENV_ACCESS_TOKEN, "tok"), (ENV_AD_ACCOUNT_ID, "1")];
        let cfg = PipelineConfig::resolve(settings.clone(), lookup(&pairs)).unwrap();
        assert_eq!(cfg.table, TableRef::new("file-proj", "file-ds", "file-table"));
        assert_eq!(cfg.lookback_days, 30);
        assert_eq!(cfg.api.version, "v19.0");
        assert_eq!(cfg.batch_size, 100);

        pairs.extend([
            (ENV_PROJECT, "env-proj"),
            (ENV_LOOKBACK_DAYS, "7"),
            (ENV_API_VERSION, "v21.0"),
            (ENV_SINCE, "2024-01-01"),
            (ENV_UNTIL, "2024-01-31"),
        ]);
        let cfg = PipelineConfig::resolve(settings, lookup(&pairs)).unwrap();
        assert_eq!(cfg.table.project, "env-proj");
        assert_eq!(cfg.table.dataset, "file-ds");
        assert_eq!(cfg.lookback_days, 7);
        assert_eq!(cfg.api.version, "v21.0");
        assert_eq!(cfg.overrides, WindowOverrides::new("2024-01-01", "2024-01-31"));
        assert_eq!(
            cfg.endpoint().url_for("1"),
            "https://graph.facebook.com/v21.0/act_1/insights"
        );
    }

    #[test]
    fn non_numeric_lookback_is_invalid() {
        let mut pairs = required();
        pairs.push((ENV_LOOKBACK_DAYS, "two weeks"));
        let err = PipelineConfig::resolve(Settings::default(), lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == ENV_LOOKBACK_DAYS));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let settings = Settings::from_toml("[sink]\nbatch_size = 0\n").unwrap();
        let err = PipelineConfig::resolve(settings, lookup(&required())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn mistyped_toml_is_a_parse_error() {
        assert!(matches!(
            Settings::from_toml("[api]\ntimeout_secs = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_settings_file_is_a_read_error() {
        let err = Settings::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn sink_dir_env_wins() {
        let mut pairs = required();
        pairs.push((ENV_SINK_DIR, "/tmp/elsewhere"));
        let cfg = PipelineConfig::resolve(Settings::default(), lookup(&pairs)).unwrap();
        assert_eq!(cfg.sink_root, PathBuf::from("/tmp/elsewhere"));
    }
}
