//! Error types and handling for CoverVid

use std::path::PathBuf;
use thiserror::Error;

use crate::transcode::TranscodeError;

/// Result type alias for CoverVid operations
pub type Result<T> = std::result::Result<T, CoverVidError>;

/// Main error type for CoverVid operations
#[derive(Debug, Error)]
pub enum CoverVidError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Input directory or cover image could not be used
    #[error("Discovery failed: {message} (path: {path:?})")]
    DiscoveryError { message: String, path: PathBuf },

    /// Metadata probe failed for a job
    #[error("Failed to read metadata of {file:?}: {source}")]
    MetadataError {
        file: PathBuf,
        #[source]
        source: TranscodeError,
    },

    /// Transcoding failed for a job
    #[error("Failed to convert {file:?}: {source}")]
    ConversionError {
        file: PathBuf,
        #[source]
        source: TranscodeError,
    },

    /// The transcoder failed its startup check
    #[error("{name} is not usable: {source}")]
    TranscoderUnavailable {
        name: String,
        #[source]
        source: TranscodeError,
    },

    /// A job task panicked instead of returning
    #[error("Task for {file:?} panicked: {message}")]
    TaskPanicked { file: PathBuf, message: String },

    /// The batch stopped on its first failing job
    #[error("Batch aborted after {converted} converted file(s), {not_started} not started: {source}")]
    BatchAborted {
        #[source]
        source: Box<CoverVidError>,
        converted: usize,
        not_started: usize,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// System resource errors
    #[error("System resource error: {message}")]
    SystemError { message: String },
}

impl CoverVidError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S, path: PathBuf) -> Self {
        Self::DiscoveryError {
            message: message.into(),
            path,
        }
    }

    /// Create a new metadata error
    pub fn metadata(file: PathBuf, source: TranscodeError) -> Self {
        Self::MetadataError { file, source }
    }

    /// Create a new conversion error
    pub fn conversion(file: PathBuf, source: TranscodeError) -> Self {
        Self::ConversionError { file, source }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    /// The job error behind a batch abort, or `self` for any other error
    pub fn root_job_error(&self) -> &CoverVidError {
        match self {
            Self::BatchAborted { source, .. } => source.root_job_error(),
            other => other,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::DiscoveryError { path: file, .. }
            | Self::MetadataError { file, .. }
            | Self::ConversionError { file, .. }
            | Self::TaskPanicked { file, .. } => Some(file),

            Self::BatchAborted { source, .. } => source.file_path(),

            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::IoError(e) => format!("File system error: {}", e),
            Self::DiscoveryError { message, .. } => message.clone(),
            Self::MetadataError { file, source } => {
                format!("Could not read tags of \"{}\": {}", file.display(), source)
            }
            Self::ConversionError { file, source } => {
                format!("Could not convert \"{}\": {}", file.display(), source)
            }
            Self::BatchAborted { source, converted, not_started } => {
                format!(
                    "{} ({} file(s) converted before the abort, {} never started)",
                    source.user_message(),
                    converted,
                    not_started
                )
            }
            other => other.to_string(),
        }
    }
}

// Convert serde errors to our error type
impl From<toml::de::Error> for CoverVidError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for CoverVidError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}
