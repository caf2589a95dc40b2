//! Immutable per-run options

use std::path::{Path, PathBuf};

use crate::config::{DefaultsConfig, DEFAULT_COVER, DEFAULT_PARALLEL};
use crate::error::{Result, CoverVidError};

/// Options for one batch run. Built once before discovery and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Directory scanned for audio files
    pub directory: PathBuf,

    /// Cover image, already resolved inside `directory`
    pub cover: PathBuf,

    /// Directory that receives the videos
    pub output_dir: PathBuf,

    /// Maximum number of jobs in flight
    pub parallel: usize,

    /// Name outputs `{artist} - {title}.mp4` from the audio tags
    pub metadata: bool,

    /// Audio extensions accepted by discovery, lowercase without the dot
    pub extensions: Vec<String>,
}

impl RunConfig {
    /// Create a run over `directory` with every other option at its default
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        let directory = directory.as_ref().to_path_buf();
        Self {
            cover: directory.join(DEFAULT_COVER),
            output_dir: directory.clone(),
            directory,
            parallel: DEFAULT_PARALLEL,
            metadata: false,
            extensions: vec!["mp3".to_string()],
        }
    }

    /// Create a run whose unset options come from the `[defaults]` section
    pub fn with_defaults<P: AsRef<Path>>(directory: P, defaults: &DefaultsConfig) -> Self {
        Self::new(directory)
            .cover(&defaults.cover)
            .parallel(defaults.parallel)
            .extensions(defaults.extensions.clone())
    }

    /// Set the cover image. Only the file name is kept; it is always looked
    /// up inside the input directory.
    pub fn cover<S: AsRef<Path>>(mut self, cover: S) -> Self {
        let name = cover
            .as_ref()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COVER));
        self.cover = self.directory.join(name);
        self
    }

    /// Set the output directory
    pub fn output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    /// Set the parallelism limit
    pub fn parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable metadata naming
    pub fn metadata(mut self, metadata: bool) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the accepted audio extensions
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Validate the options that do not touch the file system
    pub fn validate(&self) -> Result<()> {
        if self.parallel == 0 {
            return Err(CoverVidError::config(
                "Parallel limit must be at least 1"
            ));
        }

        if self.extensions.is_empty() {
            return Err(CoverVidError::config(
                "At least one audio extension is required"
            ));
        }

        Ok(())
    }

    /// Whether `path` has one of the accepted audio extensions
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|accepted| *accepted == ext)
            })
            .unwrap_or(false)
    }
}
