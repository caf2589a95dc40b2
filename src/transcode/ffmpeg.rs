//! ffmpeg/ffprobe backed transcoder.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{AudioMetadata, ConversionRequest, TranscodeError, Transcoder};
use crate::config::TranscoderConfig;

/// Transcoder that shells out to ffmpeg and ffprobe.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    /// Creates a new transcoder with the given configuration.
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TranscoderConfig::default())
    }

    /// Builds ffmpeg arguments for a still-image video.
    ///
    /// The cover is looped as the only video frame source and the output ends
    /// with the audio track.
    pub fn build_convert_args(&self, request: &ConversionRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            request.audio.to_string_lossy().to_string(),
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            request.cover.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-map".to_string(),
            "1:v:0".to_string(),
            "-c:v".to_string(),
            self.config.video_codec.clone(),
            "-tune".to_string(),
            "stillimage".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.config.audio_codec.clone(),
        ];

        if let Some(kbps) = request.audio_bitrate_kbps {
            args.extend(["-b:a".to_string(), format!("{}k", kbps)]);
        }

        args.push("-shortest".to_string());
        args.extend(self.config.extra_args.iter().cloned());
        args.extend([
            "-f".to_string(),
            "mp4".to_string(),
            request.output.to_string_lossy().to_string(),
        ]);

        args
    }

    /// Builds ffprobe arguments for a JSON format dump.
    fn build_probe_args(audio: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            audio.to_string_lossy().to_string(),
        ]
    }

    /// Parses `ffprobe -show_format` JSON into metadata.
    pub fn parse_probe_output(output: &str) -> Result<AudioMetadata, TranscodeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            bit_rate: Option<String>,
            duration: Option<String>,
            #[serde(default)]
            tags: HashMap<String, String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| TranscodeError::ProbeParse {
                reason: e.to_string(),
            })?;

        // Tag keys differ in case between containers (ID3 vs Vorbis comments).
        let tags: HashMap<String, String> = probe
            .format
            .tags
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        let tag = |name: &str| {
            tags.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(AudioMetadata {
            bit_rate: probe.format.bit_rate.and_then(|b| b.parse::<u64>().ok()),
            artist: tag("artist"),
            title: tag("title"),
            duration_secs: probe.format.duration.and_then(|d| d.parse::<f64>().ok()),
        })
    }

    async fn run(&self, program: &Path, args: &[String]) -> Result<Output, TranscodeError> {
        debug!("Running {} {}", program.display(), args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::BinaryNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscodeError::process_failed(
                program.to_string_lossy(),
                output.status.code(),
                &output.stderr,
            ));
        }

        Ok(output)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, audio: &Path) -> Result<AudioMetadata, TranscodeError> {
        let output = self
            .run(&self.config.ffprobe_path, &Self::build_probe_args(audio))
            .await?;
        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<(), TranscodeError> {
        self.run(&self.config.ffmpeg_path, &self.build_convert_args(request))
            .await?;
        Ok(())
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        let version = ["-version".to_string()];
        self.run(&self.config.ffmpeg_path, &version).await?;
        self.run(&self.config.ffprobe_path, &version).await?;
        Ok(())
    }
}
