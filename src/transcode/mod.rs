//! Gateway to the external audio/video transcoder

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub mod error;
pub mod ffmpeg;

pub use error::TranscodeError;
pub use ffmpeg::FfmpegTranscoder;

/// Tags and stream facts read from an audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMetadata {
    /// Overall bit rate in bits per second
    pub bit_rate: Option<u64>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
}

impl AudioMetadata {
    /// Bit rate rounded to whole kbit/s, the unit ffmpeg's `-b:a` takes
    pub fn bit_rate_kbps(&self) -> Option<u32> {
        self.bit_rate
            .and_then(|bps| u32::try_from(bps.saturating_add(500) / 1000).ok())
            .filter(|kbps| *kbps > 0)
    }
}

/// One audio + cover → video conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub audio: PathBuf,
    pub cover: PathBuf,
    pub output: PathBuf,
    /// Output audio bitrate override in kbit/s
    pub audio_bitrate_kbps: Option<u32>,
}

/// A transcoder that can probe audio files and render cover videos.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Reads metadata from an audio file.
    async fn probe(&self, audio: &Path) -> Result<AudioMetadata, TranscodeError>;

    /// Renders one video from an audio track and a still image.
    async fn convert(&self, request: &ConversionRequest) -> Result<(), TranscodeError>;

    /// Checks that the transcoder can run at all.
    async fn validate(&self) -> Result<(), TranscodeError> {
        Ok(())
    }
}
