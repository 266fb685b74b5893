//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::ConfigError;

pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/polymonster/dig/main/registry/releases.json";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote catalog location and refresh cadence.
    pub registry: RegistryConfig,
    #[serde(default)]
    /// On-disk media cache location.
    pub cache: CacheConfig,
    #[serde(default)]
    /// Per-view worker pacing.
    pub pipeline: PipelineConfig,
    #[serde(default)]
    /// Visibility window sizes.
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    /// Liked-id persistence.
    pub user_data: UserDataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote catalog preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    #[serde(default = "default_http_connect_timeout_secs")]
    pub http_connect_timeout_secs: u64,
    #[serde(default = "default_http_read_timeout_secs")]
    pub http_read_timeout_secs: u64,
}

/// Media cache preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Overrides `<cache_dir>/dig` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default = "default_min_download_chunk_bytes")]
    pub min_download_chunk_bytes: usize,
}

/// Tuning knobs for the builder/cacher/decoder workers.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_builder_entry_sleep_ms")]
    pub builder_entry_sleep_ms: u64,
    #[serde(default = "default_worker_pass_sleep_ms")]
    pub worker_pass_sleep_ms: u64,
    #[serde(default = "default_registry_wait_poll_ms")]
    pub registry_wait_poll_ms: u64,
    /// How long a regular view waits for a fresh registry before using the disk snapshot.
    #[serde(default)]
    pub view_freshness_timeout_ms: u64,
    /// How long a reload view waits for a fresh registry before using the disk snapshot.
    #[serde(default = "default_reload_freshness_timeout_ms")]
    pub reload_freshness_timeout_ms: u64,
    /// Longest decoded artwork edge; 0 keeps the source size.
    #[serde(default)]
    pub artwork_max_edge_px: u32,
}

/// Decode and cache window radii around the topmost visible entry.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PrefetchConfig {
    #[serde(default = "default_decode_radius")]
    pub decode_radius: usize,
    #[serde(default = "default_cache_radius")]
    pub cache_radius: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserDataConfig {
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
    #[serde(default = "default_likes_file")]
    pub likes_file: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            poll_interval_secs: default_poll_interval_secs(),
            snapshot_file: default_snapshot_file(),
            http_connect_timeout_secs: default_http_connect_timeout_secs(),
            http_read_timeout_secs: default_http_read_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            min_download_chunk_bytes: default_min_download_chunk_bytes(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            builder_entry_sleep_ms: default_builder_entry_sleep_ms(),
            worker_pass_sleep_ms: default_worker_pass_sleep_ms(),
            registry_wait_poll_ms: default_registry_wait_poll_ms(),
            view_freshness_timeout_ms: 0,
            reload_freshness_timeout_ms: default_reload_freshness_timeout_ms(),
            artwork_max_edge_px: 0,
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            decode_radius: default_decode_radius(),
            cache_radius: default_cache_radius(),
        }
    }
}

impl Default for UserDataConfig {
    fn default() -> Self {
        Self {
            persist_interval_ms: default_persist_interval_ms(),
            likes_file: default_likes_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    600
}

fn default_snapshot_file() -> String {
    "registry.json".to_string()
}

fn default_http_connect_timeout_secs() -> u64 {
    5
}

fn default_http_read_timeout_secs() -> u64 {
    20
}

fn default_min_download_chunk_bytes() -> usize {
    1024
}

fn default_builder_entry_sleep_ms() -> u64 {
    3
}

fn default_worker_pass_sleep_ms() -> u64 {
    16
}

fn default_registry_wait_poll_ms() -> u64 {
    16
}

fn default_reload_freshness_timeout_ms() -> u64 {
    10_000
}

fn default_decode_radius() -> usize {
    10
}

fn default_cache_radius() -> usize {
    100
}

fn default_persist_interval_ms() -> u64 {
    1_000
}

fn default_likes_file() -> String {
    "user_data.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Root of the media cache, `<cache_dir>/dig` unless overridden.
    pub fn cache_root(&self) -> PathBuf {
        self.cache.root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dig")
        })
    }

    pub fn registry_snapshot_path(&self) -> PathBuf {
        data_dir().join(&self.registry.snapshot_file)
    }

    pub fn likes_path(&self) -> PathBuf {
        data_dir().join(&self.user_data.likes_file)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.logging
            .level
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dig")
}

pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dig")
        .join("config.toml")
}

/// Clamps values that would stall or invert the pipeline.
pub fn sanitize_config(config: Config) -> Config {
    let decode_radius = config.prefetch.decode_radius.max(1);
    let cache_radius = config.prefetch.cache_radius.max(decode_radius);

    Config {
        registry: RegistryConfig {
            poll_interval_secs: config.registry.poll_interval_secs.max(1),
            http_connect_timeout_secs: config.registry.http_connect_timeout_secs.max(1),
            http_read_timeout_secs: config.registry.http_read_timeout_secs.max(1),
            ..config.registry
        },
        cache: CacheConfig {
            min_download_chunk_bytes: config.cache.min_download_chunk_bytes.max(64),
            ..config.cache
        },
        pipeline: PipelineConfig {
            builder_entry_sleep_ms: config.pipeline.builder_entry_sleep_ms,
            worker_pass_sleep_ms: config.pipeline.worker_pass_sleep_ms.max(1),
            registry_wait_poll_ms: config.pipeline.registry_wait_poll_ms.max(1),
            ..config.pipeline
        },
        prefetch: PrefetchConfig {
            decode_radius,
            cache_radius,
        },
        user_data: UserDataConfig {
            persist_interval_ms: config.user_data.persist_interval_ms.max(10),
            ..config.user_data
        },
        logging: config.logging,
    }
}

/// Reads `path`, creating it with defaults first if it does not exist.
pub fn load_or_create_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let default_text = toml::to_string(&Config::default())?;
        std::fs::write(path, default_text)?;
    }

    let text = std::fs::read_to_string(path)?;
    let config = toml::from_str::<Config>(&text)?;
    Ok(sanitize_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.prefetch.decode_radius, 10);
        assert_eq!(config.prefetch.cache_radius, 100);
        assert_eq!(config.pipeline.worker_pass_sleep_ms, 16);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [prefetch]
            decode_radius = 4
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.prefetch.decode_radius, 4);
        assert_eq!(config.prefetch.cache_radius, 100);
        assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn test_sanitize_keeps_cache_window_at_least_decode_window() {
        let mut config = Config::default();
        config.prefetch.decode_radius = 0;
        config.prefetch.cache_radius = 0;
        config.pipeline.worker_pass_sleep_ms = 0;
        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.prefetch.decode_radius, 1);
        assert_eq!(sanitized.prefetch.cache_radius, 1);
        assert_eq!(sanitized.pipeline.worker_pass_sleep_ms, 1);
    }

    #[test]
    fn test_unknown_log_level_falls_back_to_info() {
        let mut config = Config::default();
        config.logging.level = "chatty".to_string();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);
    }
}
