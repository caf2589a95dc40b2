//! Progress reporting for batch runs

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Progress update event
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Started {
        total_files: usize,
        cover: PathBuf,
        output_dir: PathBuf,
        parallel: usize,
    },
    FileStarted {
        filename: String,
    },
    /// A job settled, successfully or not
    Tick {
        finished: usize,
        total: usize,
    },
    BatchCompleted {
        converted: usize,
    },
    BatchAborted {
        error: String,
    },
}

impl ProgressUpdate {
    /// `finished/total` for tick events
    pub fn tick_text(&self) -> Option<String> {
        match self {
            Self::Tick { finished, total } => Some(format!("{}/{}", finished, total)),
            _ => None,
        }
    }
}

/// Sink for progress events. Called from worker tasks, so it must not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Terminal spinner showing `Finished files: n/total` and the latest started file
pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    /// Create a new spinner reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("    {spinner:.green}    Finished files: {pos}/{len}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Started { total_files, .. } => {
                self.bar.set_length(total_files as u64);
                self.bar.set_position(0);
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
            ProgressUpdate::FileStarted { filename } => {
                self.bar.set_message(filename);
            }
            ProgressUpdate::Tick { finished, .. } => {
                self.bar.set_position(finished as u64);
            }
            ProgressUpdate::BatchCompleted { .. } | ProgressUpdate::BatchAborted { .. } => {
                self.bar.finish_and_clear();
            }
        }
    }
}

/// Reporter that only writes log lines, for quiet and JSON runs
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, update: ProgressUpdate) {
        match &update {
            ProgressUpdate::FileStarted { filename } => debug!("Started: {}", filename),
            ProgressUpdate::Tick { .. } => {
                if let Some(text) = update.tick_text() {
                    info!("Finished files: {}", text);
                }
            }
            _ => {}
        }
    }
}

/// Reporter that fans updates out to any number of subscribers
pub struct ChannelReporter {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl ChannelReporter {
    /// Create a reporter buffering up to `capacity` updates per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, update: ProgressUpdate) {
        // No subscribers is fine.
        let _ = self.sender.send(update);
    }
}
