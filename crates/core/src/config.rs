//! Viewer configuration
//!
//! Every tunable has a default. Values can be overridden from a TOML file
//! and then from environment variables:
//!
//! - `PAGEVIEW_CACHE_MB`: bitmap cache capacity in MB (default: 128)
//! - `PAGEVIEW_UPGRADE_THRESHOLD`: quality-upgrade threshold factor (default: 1.4)
//! - `PAGEVIEW_SETTLE_MS`: settle delay before a quality upgrade (default: 250)
//! - `PAGEVIEW_ZOOM_ANIMATION_MS`: animated zoom duration (default: 200)
//! - `PAGEVIEW_RENDER_WORKERS`: render thread cap for concurrent rasterizers

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pageview_cache::DEFAULT_CAPACITY_BYTES;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Bitmap cache capacity in bytes
    pub cache_capacity_bytes: usize,
    /// A cached page is re-rendered once the display scale exceeds its
    /// rendered scale by this factor
    pub upgrade_threshold: f32,
    pub settle_delay_ms: u64,
    pub zoom_animation_ms: u64,
    /// Base render scale as a multiple of the fit scale
    pub render_headroom: f32,
    /// Minimum zoom as a multiple of the fit scale
    pub min_scale_factor: f32,
    /// Maximum zoom as a multiple of the fit scale
    pub max_scale_factor: f32,
    /// Vertical gap between pages in document units
    pub page_gap: f32,
    /// Pages preloaded on each side of the visible range
    pub preload_neighbors: usize,
    /// Factor applied by zoom in / zoom out
    pub zoom_step: f32,
    /// Double-tap zooms in below this multiple of the fit scale, else resets
    pub double_tap_threshold: f32,
    /// Double-tap zoom-in target as a multiple of the fit scale
    pub double_tap_target: f32,
    /// Fling velocity retained per 16 ms frame
    pub fling_decay: f32,
    /// Render thread cap, used only for rasterizers that render concurrently
    pub render_workers: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: DEFAULT_CAPACITY_BYTES,
            upgrade_threshold: 1.4,
            settle_delay_ms: 250,
            zoom_animation_ms: 200,
            render_headroom: 2.0,
            min_scale_factor: 0.5,
            max_scale_factor: 4.0,
            page_gap: 16.0,
            preload_neighbors: 1,
            zoom_step: 1.25,
            double_tap_threshold: 1.5,
            double_tap_target: 2.5,
            fling_decay: 0.92,
            render_workers: pageview_scheduler::num_cpus(),
        }
    }
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache capacity in megabytes.
    pub fn with_cache_mb(mut self, mb: usize) -> Self {
        self.cache_capacity_bytes = mb * 1024 * 1024;
        self
    }

    pub fn with_cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    pub fn with_upgrade_threshold(mut self, threshold: f32) -> Self {
        self.upgrade_threshold = threshold;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_zoom_animation(mut self, duration: Duration) -> Self {
        self.zoom_animation_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_page_gap(mut self, gap: f32) -> Self {
        self.page_gap = gap;
        self
    }

    pub fn with_render_workers(mut self, workers: usize) -> Self {
        self.render_workers = workers;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn zoom_animation(&self) -> Duration {
        Duration::from_millis(self.zoom_animation_ms)
    }

    /// Loads configuration from the process environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from `PAGEVIEW_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mb) = parse_var::<usize, _>(&lookup, "PAGEVIEW_CACHE_MB")? {
            self.cache_capacity_bytes = mb * 1024 * 1024;
        }
        if let Some(threshold) = parse_var(&lookup, "PAGEVIEW_UPGRADE_THRESHOLD")? {
            self.upgrade_threshold = threshold;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEVIEW_SETTLE_MS")? {
            self.settle_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEVIEW_ZOOM_ANIMATION_MS")? {
            self.zoom_animation_ms = ms;
        }
        if let Some(workers) = parse_var(&lookup, "PAGEVIEW_RENDER_WORKERS")? {
            self.render_workers = workers;
        }
        Ok(())
    }

    /// Loads configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// ```toml
    /// cache_capacity_bytes = 67108864
    /// upgrade_threshold = 1.3
    /// settle_delay_ms = 300
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// File first, then environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_owned()));

        if self.cache_capacity_bytes == 0 {
            return invalid("cache_capacity_bytes must be positive");
        }
        if !(self.upgrade_threshold > 1.0) {
            return invalid("upgrade_threshold must be greater than 1.0");
        }
        if !(self.render_headroom > 0.0) {
            return invalid("render_headroom must be positive");
        }
        if !(self.min_scale_factor > 0.0) || self.min_scale_factor > self.max_scale_factor {
            return invalid("min_scale_factor must be positive and at most max_scale_factor");
        }
        if !(self.zoom_step > 1.0) {
            return invalid("zoom_step must be greater than 1.0");
        }
        if !(self.fling_decay > 0.0 && self.fling_decay < 1.0) {
            return invalid("fling_decay must lie strictly between 0 and 1");
        }
        if self.page_gap < 0.0 {
            return invalid("page_gap must not be negative");
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key: key.to_owned(), value }),
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.cache_capacity_bytes, 128 * 1024 * 1024);
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
        assert_eq!(config.zoom_animation(), Duration::from_millis(200));
        assert_eq!(config.render_headroom, 2.0);
        assert_eq!((config.min_scale_factor, config.max_scale_factor), (0.5, 4.0));
        assert_eq!(config.preload_neighbors, 1);
        assert!(config.render_workers > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ViewerConfig::new()
            .with_cache_mb(64)
            .with_upgrade_threshold(1.3)
            .with_settle_delay(Duration::from_millis(400));

        assert_eq!(config.cache_capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(config.upgrade_threshold, 1.3);
        assert_eq!(config.settle_delay_ms, 400);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            [("PAGEVIEW_CACHE_MB", "32"), ("PAGEVIEW_SETTLE_MS", " 125 ")].into_iter().collect();

        let mut config = ViewerConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.cache_capacity_bytes, 32 * 1024 * 1024);
        assert_eq!(config.settle_delay_ms, 125);
        assert_eq!(config.zoom_animation_ms, 200);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = ViewerConfig::default();
        let err = config
            .apply_env(|key| (key == "PAGEVIEW_UPGRADE_THRESHOLD").then(|| "lots".to_owned()))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "PAGEVIEW_UPGRADE_THRESHOLD"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ViewerConfig::from_toml("upgrade_threshold = 1.5\npage_gap = 8.0\n").unwrap();

        assert_eq!(config.upgrade_threshold, 1.5);
        assert_eq!(config.page_gap, 8.0);
        assert_eq!(config.settle_delay_ms, 250);
    }

    #[test]
    fn test_toml_validation() {
        let err = ViewerConfig::from_toml("min_scale_factor = 5.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ViewerConfig::from_toml("upgrade_threshold = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = ViewerConfig::new().with_cache_mb(16).with_page_gap(4.0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        assert_eq!(ViewerConfig::from_file(file.path()).unwrap(), config);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ViewerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
