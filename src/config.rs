use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::ElprisError;

pub const DEFAULT_SOURCE_URL: &str =
    "https://dropbox.com/sh/0qkvdyeychvde9o/AACw-J_gPfhpPF6kFMcFjK-xa?dl=1";
pub const DEFAULT_CONFIG_FILE: &str = "elpris.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub archive_name: Option<String>,
    #[serde(default)]
    pub extract_dir: Option<String>,
    #[serde(default)]
    pub csv_file_name: Option<String>,
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub min_day_slots: Option<usize>,
    /// `null` disables the trailing window, a missing key keeps the default.
    #[serde(default, deserialize_with = "explicit_option")]
    pub lookahead_days: Option<Option<usize>>,
    #[serde(default)]
    pub interval_minutes: Option<u64>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn explicit_option<'de, D>(deserializer: D) -> Result<Option<Option<usize>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<usize>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub source_url: String,
    pub work_dir: Utf8PathBuf,
    pub archive_name: String,
    pub extract_dir: String,
    pub csv_file_name: String,
    pub store_dir: Utf8PathBuf,
    pub timezone: Tz,
    pub min_day_slots: usize,
    pub lookahead_days: Option<usize>,
    pub interval_minutes: u64,
    pub slack_webhook_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl ResolvedConfig {
    pub fn archive_path(&self) -> Utf8PathBuf {
        self.work_dir.join(&self.archive_name)
    }

    pub fn extract_path(&self) -> Utf8PathBuf {
        self.work_dir.join(&self.extract_dir)
    }

    pub fn csv_path(&self) -> Utf8PathBuf {
        self.extract_path().join(&self.csv_file_name)
    }

    /// Current calendar date in the reference timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `elpris.json` from the working directory when present.
    /// Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ElprisError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ElprisError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ElprisError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ElprisError> {
        let timezone_name = config
            .timezone
            .unwrap_or_else(|| "Europe/Stockholm".to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| ElprisError::InvalidTimezone(timezone_name.clone()))?;

        let store_dir = match config.store_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_store_dir()?,
        };

        let slack_webhook_url = std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or(config.slack_webhook_url);

        Ok(ResolvedConfig {
            source_url: config
                .source_url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            work_dir: Utf8PathBuf::from(config.work_dir.unwrap_or_else(|| ".elpris".to_string())),
            archive_name: config.archive_name.unwrap_or_else(|| "file.zip".to_string()),
            extract_dir: config.extract_dir.unwrap_or_else(|| "data".to_string()),
            csv_file_name: config
                .csv_file_name
                .unwrap_or_else(|| "EVIEW_Price.csv".to_string()),
            store_dir,
            timezone,
            min_day_slots: config.min_day_slots.unwrap_or(10),
            lookahead_days: config.lookahead_days.unwrap_or(Some(8)),
            interval_minutes: config.interval_minutes.unwrap_or(60).max(1),
            slack_webhook_url,
            request_timeout_secs: config.request_timeout_secs.unwrap_or(120),
        })
    }
}

fn default_store_dir() -> Result<Utf8PathBuf, ElprisError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("elpris")).ok())
        .ok_or_else(|| ElprisError::Filesystem("unable to resolve data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let config = Config {
            store_dir: Some("/tmp/elpris-store".to_string()),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.timezone, chrono_tz::Europe::Stockholm);
        assert_eq!(resolved.min_day_slots, 10);
        assert_eq!(resolved.lookahead_days, Some(8));
        assert_eq!(resolved.interval_minutes, 60);
        assert!(resolved.csv_path().ends_with("data/EVIEW_Price.csv"));
        assert!(resolved.archive_path().ends_with(".elpris/file.zip"));
    }

    #[test]
    fn null_lookahead_disables_window() {
        let config: Config =
            serde_json::from_str(r#"{"store_dir": "/tmp/s", "lookahead_days": null}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.lookahead_days, None);
    }
}
