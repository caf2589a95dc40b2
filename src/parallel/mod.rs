//! Bounded-concurrency batch execution
//!
//! The [`BatchCoordinator`] admits jobs in input order while keeping at most
//! `max_concurrent` of them in flight. The first failing job stops admission;
//! jobs already running are allowed to finish and are counted, then the first
//! error is returned wrapped in [`CoverVidError::BatchAborted`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::{Result, CoverVidError};
use crate::processing::{discover, with_timeout, ConversionTask, Job, JobTask};
use crate::transcode::Transcoder;

pub mod progress;

pub use progress::*;

/// Drives a batch of jobs through a fixed-size worker pool
pub struct BatchCoordinator {
    max_concurrent: usize,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchCoordinator {
    /// Create a new coordinator. `max_concurrent` must be at least 1.
    pub fn new(max_concurrent: usize, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(CoverVidError::config("Parallel limit must be at least 1"));
        }

        Ok(Self {
            max_concurrent,
            reporter,
        })
    }

    /// Run every job through `task`.
    ///
    /// Returns the produced paths in completion order, or the first job error
    /// once all admitted jobs have settled.
    pub async fn run(&self, jobs: Vec<Job>, task: Arc<dyn JobTask>) -> Result<BatchOutcome> {
        let start_time = Instant::now();
        let total = jobs.len();
        let state = Arc::new(Mutex::new(BatchState::new(total)));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();
        let mut admitted = 0usize;

        debug!("Running {} jobs with {} workers", total, self.max_concurrent);

        for job in jobs {
            // A worker records its outcome before releasing its permit, so a
            // failure is always visible here before the next admission.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| CoverVidError::system(format!("Worker pool closed: {}", e)))?;

            if lock(&state).is_aborted() {
                debug!("Not admitting {} after failure", job.display_name());
                break;
            }

            admitted += 1;
            let task = Arc::clone(&task);
            let state = Arc::clone(&state);
            let reporter = Arc::clone(&self.reporter);

            workers.spawn(async move {
                let _permit = permit;

                reporter.report(ProgressUpdate::FileStarted {
                    filename: job.display_name(),
                });

                let outcome = AssertUnwindSafe(task.process(&job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(CoverVidError::TaskPanicked {
                            file: job.path.clone(),
                            message: panic_message(panic.as_ref()),
                        })
                    });

                // Report under the lock so ticks arrive in counter order.
                let mut state = lock(&state);
                let finished = state.record(&job, outcome);
                reporter.report(ProgressUpdate::Tick { finished, total });
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                // Panics are caught inside the worker; this is cancellation.
                warn!("Worker ended abnormally: {}", e);
            }
        }

        let state = std::mem::replace(&mut *lock(&state), BatchState::new(total));
        state.finish(admitted, start_time.elapsed())
    }
}

/// Shared bookkeeping of a running batch
#[derive(Debug)]
pub struct BatchState {
    total: usize,
    finished: usize,
    converted: Vec<PathBuf>,
    first_error: Option<CoverVidError>,
    later_failures: usize,
    overwritten: usize,
}

impl BatchState {
    fn new(total: usize) -> Self {
        Self {
            total,
            finished: 0,
            converted: Vec::new(),
            first_error: None,
            later_failures: 0,
            overwritten: 0,
        }
    }

    /// Whether a job has failed
    pub fn is_aborted(&self) -> bool {
        self.first_error.is_some()
    }

    /// Record a settled job and return the new finished count
    fn record(&mut self, job: &Job, outcome: Result<PathBuf>) -> usize {
        debug_assert!(self.finished < self.total);
        self.finished += 1;

        match outcome {
            Ok(output) => {
                debug!("Converted {} -> {:?}", job.display_name(), output);
                if self.converted.contains(&output) {
                    warn!("{} overwrote an earlier output: {:?}", job.display_name(), output);
                    self.overwritten += 1;
                }
                self.converted.push(output);
            }
            Err(e) if self.first_error.is_none() => {
                error!("{}", e.user_message());
                self.first_error = Some(e);
            }
            Err(e) => {
                warn!("Further failure while draining: {}", e.user_message());
                self.later_failures += 1;
            }
        }

        self.finished
    }

    fn finish(self, admitted: usize, elapsed: Duration) -> Result<BatchOutcome> {
        let not_started = self.total - admitted;
        if self.overwritten > 0 {
            warn!("{} output(s) were written more than once", self.overwritten);
        }

        if let Some(error) = self.first_error {
            if self.later_failures > 0 {
                warn!("{} more job(s) failed after the first error", self.later_failures);
            }
            return Err(CoverVidError::BatchAborted {
                source: Box::new(error),
                converted: self.converted.len(),
                not_started,
            });
        }

        Ok(BatchOutcome {
            total: self.total,
            converted: self.converted,
            elapsed,
        })
    }
}

/// Result of a successful batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub total: usize,
    /// Output paths in completion order
    pub converted: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// Number of produced videos
    pub fn converted_count(&self) -> usize {
        self.converted.len()
    }

    /// Throughput over the whole run
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.converted.len() as f64 / self.elapsed.as_secs_f64()
    }
}

/// Discover, convert and report one directory.
///
/// Discovery errors are returned before any job is admitted.
pub async fn run_batch(
    run: &RunConfig,
    transcoder: Arc<dyn Transcoder>,
    timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<BatchOutcome> {
    run.validate()?;
    let jobs = discover(run).await?;

    with_timeout(timeout, transcoder.validate()).await
        .map_err(|source| CoverVidError::TranscoderUnavailable {
            name: transcoder.name().to_string(),
            source,
        })?;

    tokio::fs::create_dir_all(&run.output_dir).await
        .map_err(|e| CoverVidError::system(format!("Failed to create output directory: {}", e)))?;

    info!("Audio files found: {}", jobs.len());
    info!("Background image: {}", run.cover.display());
    info!("Output directory: {}", run.output_dir.display());
    info!("Processing {} files in parallel", run.parallel);

    reporter.report(ProgressUpdate::Started {
        total_files: jobs.len(),
        cover: run.cover.clone(),
        output_dir: run.output_dir.clone(),
        parallel: run.parallel,
    });

    let coordinator = BatchCoordinator::new(run.parallel, Arc::clone(&reporter))?;
    let task = Arc::new(ConversionTask::new(transcoder, Arc::new(run.clone()), timeout));

    match coordinator.run(jobs, task).await {
        Ok(outcome) => {
            reporter.report(ProgressUpdate::BatchCompleted {
                converted: outcome.converted_count(),
            });
            info!("{} files converted in {:.2}s", outcome.converted_count(), outcome.elapsed.as_secs_f64());
            Ok(outcome)
        }
        Err(e) => {
            reporter.report(ProgressUpdate::BatchAborted {
                error: e.user_message(),
            });
            Err(e)
        }
    }
}

fn lock(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
