//! CoverVid - Batch Audio to Cover-Video Converter
//!
//! Turns every audio track in a directory into an `.mp4` that shows a single
//! cover image for the length of the track. The heavy lifting is done by an
//! external transcoder (ffmpeg); this crate discovers the files, runs a
//! bounded number of conversions at once and reports progress.
//!
//! # Features
//!
//! - **Bounded Parallelism**: at most `parallel` conversions in flight
//! - **Metadata Naming**: optional `{artist} - {title}.mp4` output names
//! - **Fail-Fast**: the first failing file stops the batch, running files drain
//! - **Timeouts**: every probe and conversion runs under a deadline
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use covervid::{run_batch, FfmpegTranscoder, LogReporter, RunConfig};
//!
//! # async fn example() -> covervid::Result<()> {
//! let run = RunConfig::new("/music/album").parallel(8).metadata(true);
//!
//! let outcome = run_batch(
//!     &run,
//!     Arc::new(FfmpegTranscoder::with_defaults()),
//!     Duration::from_secs(3600),
//!     Arc::new(LogReporter),
//! ).await?;
//!
//! println!("{} files converted", outcome.converted_count());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod processing;
pub mod transcode;

// Re-export commonly used types
pub use config::{Config, RunConfig, TranscoderConfig};
pub use error::{Result, CoverVidError};
pub use parallel::{
    run_batch, BatchCoordinator, BatchOutcome, ChannelReporter, LogReporter, ProgressReporter,
    ProgressUpdate, SpinnerReporter,
};
pub use processing::{ConversionTask, Job, JobTask};
pub use transcode::{FfmpegTranscoder, TranscodeError, Transcoder};

use tracing::info;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG`
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init() {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish()
    ).is_ok() {
        info!("CoverVid v{} initialized", VERSION);
    }
}

/// Initialize logging from the `[logging]` section of a configuration
pub fn init_with_config(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let builder = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.logging.json_format {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    };

    if installed {
        info!("CoverVid v{} initialized with custom config", VERSION);
    }
}
