//! Errors raised by the transcoding gateway.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while probing or converting a file.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The ffmpeg or ffprobe binary could not be started.
    #[error("Binary not found: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The external process exited unsuccessfully.
    #[error("{program} exited with code {code:?}{}", stderr_suffix(.stderr))]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The invocation did not finish in time.
    #[error("Timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// ffprobe produced output we could not read.
    #[error("Failed to parse probe output: {reason}")]
    ProbeParse { reason: String },

    /// A tag required for naming is absent.
    #[error("Missing \"{tag}\" tag")]
    MissingTag { tag: &'static str },

    /// I/O error while talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    /// Creates a process failure keeping only the tail of stderr.
    pub fn process_failed(program: impl Into<String>, code: Option<i32>, stderr: &[u8]) -> Self {
        const MAX_STDERR: usize = 2000;

        let text = String::from_utf8_lossy(stderr);
        let text = text.trim();
        let tail = if text.len() > MAX_STDERR {
            let mut start = text.len() - MAX_STDERR;
            while !text.is_char_boundary(start) {
                start += 1;
            }
            &text[start..]
        } else {
            text
        };

        Self::ProcessFailed {
            program: program.into(),
            code,
            stderr: tail.to_string(),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}
