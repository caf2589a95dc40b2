//! Per-file work: naming the output and driving the transcoder

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::{Result, CoverVidError};
use crate::transcode::{AudioMetadata, ConversionRequest, TranscodeError, Transcoder};

pub mod discovery;

pub use discovery::*;

/// Extension of every produced video
pub const OUTPUT_EXTENSION: &str = "mp4";

/// One audio file queued for conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Position in admission order
    pub index: usize,
    pub path: PathBuf,
}

impl Job {
    pub fn new(index: usize, path: PathBuf) -> Self {
        Self { index, path }
    }

    /// File name for logs and progress messages
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Work executed once per job by the batch coordinator.
#[async_trait]
pub trait JobTask: Send + Sync {
    /// Produce the output of `job`, returning its path.
    async fn process(&self, job: &Job) -> Result<PathBuf>;
}

/// Output path named after the input file: `{stem}.mp4`
pub fn output_from_stem(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    output_dir.join(format!("{}.{}", stem, OUTPUT_EXTENSION))
}

/// Output path named after the tags: `{artist} - {title}.mp4`
pub fn output_from_tags(artist: &str, title: &str, output_dir: &Path) -> PathBuf {
    output_dir.join(format!(
        "{} - {}.{}",
        sanitize_component(artist),
        sanitize_component(title),
        OUTPUT_EXTENSION
    ))
}

/// Keep tag text from introducing path separators.
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// The audio + cover → video task, optionally probing tags first.
pub struct ConversionTask {
    transcoder: Arc<dyn Transcoder>,
    run: Arc<RunConfig>,
    timeout: Duration,
}

impl ConversionTask {
    /// Create a new task bound to a transcoder and the run options
    pub fn new(transcoder: Arc<dyn Transcoder>, run: Arc<RunConfig>, timeout: Duration) -> Self {
        Self {
            transcoder,
            run,
            timeout,
        }
    }

    async fn probe(&self, job: &Job) -> Result<AudioMetadata> {
        with_timeout(self.timeout, self.transcoder.probe(&job.path))
            .await
            .map_err(|e| CoverVidError::metadata(job.path.clone(), e))
    }

    async fn convert(&self, job: &Job, request: ConversionRequest) -> Result<PathBuf> {
        debug!("Converting {:?} -> {:?}", job.path, request.output);

        with_timeout(self.timeout, self.transcoder.convert(&request))
            .await
            .map_err(|e| CoverVidError::conversion(job.path.clone(), e))?;

        Ok(request.output)
    }

    fn request(&self, job: &Job, output: PathBuf, bitrate: Option<u32>) -> ConversionRequest {
        ConversionRequest {
            audio: job.path.clone(),
            cover: self.run.cover.clone(),
            output,
            audio_bitrate_kbps: bitrate,
        }
    }
}

#[async_trait]
impl JobTask for ConversionTask {
    async fn process(&self, job: &Job) -> Result<PathBuf> {
        if !self.run.metadata {
            let output = output_from_stem(&job.path, &self.run.output_dir);
            return self.convert(job, self.request(job, output, None)).await;
        }

        // The probe settles before conversion starts.
        let meta = self.probe(job).await?;
        let artist = meta.artist.as_deref().ok_or_else(|| {
            CoverVidError::metadata(job.path.clone(), TranscodeError::MissingTag { tag: "artist" })
        })?;
        let title = meta.title.as_deref().ok_or_else(|| {
            CoverVidError::metadata(job.path.clone(), TranscodeError::MissingTag { tag: "title" })
        })?;

        debug!("Tags of {}: {} - {}", job.display_name(), artist, title);

        let output = output_from_tags(artist, title, &self.run.output_dir);
        self.convert(job, self.request(job, output, meta.bit_rate_kbps()))
            .await
    }
}

/// Run one transcoder call, failing with `Timeout` once `timeout` elapses
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> std::result::Result<T, TranscodeError>
where
    F: Future<Output = std::result::Result<T, TranscodeError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| TranscodeError::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
}
