//! Configuration loading and parsing.
//!
//! Parses `linewise.toml` (or an override path provided by the binary). Every
//! section and key is optional; absent keys take their defaults and unknown
//! fields are ignored so older binaries tolerate newer files. A file that
//! fails to parse is treated as absent.
//!
//! ```toml
//! [viewport]
//! line_height = 20.0
//! buffer_margin = 20
//!
//! [render]
//! full_render_threshold = 5000
//! batch_size = 500
//! frame_interval_ms = 16
//!
//! [cache]
//! render_cache_limit_mb = 50.0
//!
//! [io]
//! max_file_bytes = 1073741824
//! ```
//!
//! Values that would break windowing arithmetic are clamped back to their
//! defaults by [`Config::sanitize`].

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "linewise.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ViewportConfig {
    /// Pixel height of one rendered line.
    #[serde(default = "ViewportConfig::default_line_height")]
    pub line_height: f64,
    /// Extra lines materialized above and below the visible region.
    #[serde(default = "ViewportConfig::default_buffer_margin")]
    pub buffer_margin: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            line_height: Self::default_line_height(),
            buffer_margin: Self::default_buffer_margin(),
        }
    }
}

impl ViewportConfig {
    const fn default_line_height() -> f64 {
        20.0
    }
    const fn default_buffer_margin() -> usize {
        20
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Buffers with at most this many lines are fully materialized.
    #[serde(default = "RenderConfig::default_full_render_threshold")]
    pub full_render_threshold: usize,
    #[serde(default = "RenderConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "RenderConfig::default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            full_render_threshold: Self::default_full_render_threshold(),
            batch_size: Self::default_batch_size(),
            frame_interval_ms: Self::default_frame_interval_ms(),
        }
    }
}

impl RenderConfig {
    const fn default_full_render_threshold() -> usize {
        5000
    }
    const fn default_batch_size() -> usize {
        500
    }
    const fn default_frame_interval_ms() -> u64 {
        16
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_render_cache_limit_mb")]
    pub render_cache_limit_mb: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            render_cache_limit_mb: Self::default_render_cache_limit_mb(),
        }
    }
}

impl CacheConfig {
    const fn default_render_cache_limit_mb() -> f64 {
        50.0
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IoConfig {
    #[serde(default = "IoConfig::default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: Self::default_max_file_bytes(),
        }
    }
}

impl IoConfig {
    const fn default_max_file_bytes() -> u64 {
        1024 * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub io: IoConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

/// Best-effort config path: working directory first, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("linewise").join(CONFIG_FILE_NAME);
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let mut cfg = Config {
                raw: Some(content),
                file,
            };
            cfg.sanitize();
            Ok(cfg)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Reset values that windowing cannot work with. Returns how many keys
    /// were clamped.
    pub fn sanitize(&mut self) -> usize {
        let mut clamped = 0;
        let viewport = &mut self.file.viewport;
        if !(viewport.line_height.is_finite() && viewport.line_height > 0.0) {
            let raw = viewport.line_height;
            viewport.line_height = ViewportConfig::default_line_height();
            info!(target: "config", raw, clamped = viewport.line_height, "line_height_clamped");
            clamped += 1;
        }
        let render = &mut self.file.render;
        if render.batch_size == 0 {
            render.batch_size = RenderConfig::default_batch_size();
            info!(target: "config", raw = 0, clamped = render.batch_size, "batch_size_clamped");
            clamped += 1;
        }
        if render.frame_interval_ms == 0 {
            render.frame_interval_ms = RenderConfig::default_frame_interval_ms();
            info!(
                target: "config",
                raw = 0,
                clamped = render.frame_interval_ms,
                "frame_interval_clamped"
            );
            clamped += 1;
        }
        let cache = &mut self.file.cache;
        if !(cache.render_cache_limit_mb.is_finite() && cache.render_cache_limit_mb >= 0.0) {
            let raw = cache.render_cache_limit_mb;
            cache.render_cache_limit_mb = CacheConfig::default_render_cache_limit_mb();
            info!(
                target: "config",
                raw,
                clamped = cache.render_cache_limit_mb,
                "render_cache_limit_clamped"
            );
            clamped += 1;
        }
        clamped
    }
}
