//! Configuration management for CoverVid

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, CoverVidError};

pub mod run;
pub use run::*;

/// Default cover image file name, resolved inside the input directory
pub const DEFAULT_COVER: &str = "Cover.jpg";

/// Default number of files converted at the same time
pub const DEFAULT_PARALLEL: usize = 5;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External transcoder settings
    pub transcoder: TranscoderConfig,

    /// Defaults applied when the command line leaves a value out
    pub defaults: DefaultsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Settings for the ffmpeg/ffprobe gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,

    /// Path to the ffprobe binary
    pub ffprobe_path: PathBuf,

    /// Timeout for a single probe or conversion (in seconds)
    pub timeout_seconds: u64,

    /// Video codec used for the still-image track
    pub video_codec: String,

    /// Audio codec used for the output track
    pub audio_codec: String,

    /// ffmpeg `-loglevel` value
    pub ffmpeg_log_level: String,

    /// Extra arguments inserted before the output path
    pub extra_args: Vec<String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout_seconds: 3600, // 1 hour
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            ffmpeg_log_level: "error".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Defaults for run options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Cover image file name
    pub cover: String,

    /// Parallelism limit
    pub parallel: usize,

    /// Audio file extensions picked up by discovery (without the dot)
    pub extensions: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            cover: DEFAULT_COVER.to_string(),
            parallel: DEFAULT_PARALLEL,
            extensions: vec!["mp3".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CoverVidError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        match config_extension(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(CoverVidError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match config_extension(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| CoverVidError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| CoverVidError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(CoverVidError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| CoverVidError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.defaults.parallel == 0 {
            return Err(CoverVidError::config(
                "Parallel limit must be greater than 0"
            ));
        }

        if self.defaults.cover.trim().is_empty() {
            return Err(CoverVidError::config("Cover file name must not be empty"));
        }

        if self.defaults.extensions.is_empty() {
            return Err(CoverVidError::config(
                "At least one audio extension must be configured"
            ));
        }

        if self.transcoder.timeout_seconds == 0 {
            return Err(CoverVidError::config(
                "Transcoder timeout must be greater than 0"
            ));
        }

        Ok(())
    }
}

fn config_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
