//! Batch coordinator behavior against scripted tasks and transcoders.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use covervid::transcode::{AudioMetadata, ConversionRequest};
use covervid::{
    run_batch, BatchCoordinator, ChannelReporter, CoverVidError, Job, JobTask, ProgressUpdate,
    RunConfig, TranscodeError, Transcoder,
};

fn jobs(count: usize) -> Vec<Job> {
    (0..count)
        .map(|i| Job::new(i, PathBuf::from(format!("/music/track{i}.mp3"))))
        .collect()
}

/// Task that sleeps per job and tracks how many run at once.
#[derive(Default)]
struct TrackingTask {
    delays_ms: HashMap<usize, u64>,
    failing: HashSet<usize>,
    panicking: HashSet<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    invocations: Mutex<Vec<usize>>,
}

#[async_trait]
impl JobTask for TrackingTask {
    async fn process(&self, job: &Job) -> covervid::Result<PathBuf> {
        self.invocations.lock().unwrap().push(job.index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays_ms.get(&job.index).copied().unwrap_or(5);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&job.index) {
            panic!("malformed file {}", job.index);
        }
        if self.failing.contains(&job.index) {
            return Err(CoverVidError::conversion(
                job.path.clone(),
                TranscodeError::process_failed("ffmpeg", Some(1), b"broken"),
            ));
        }
        Ok(PathBuf::from(format!("/out/track{}.mp4", job.index)))
    }
}

fn drain(receiver: &mut tokio::sync::broadcast::Receiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = receiver.try_recv() {
        updates.push(update);
    }
    updates
}

fn ticks(updates: &[ProgressUpdate]) -> Vec<(usize, usize)> {
    updates
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Tick { finished, total } => Some((*finished, *total)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn twelve_jobs_five_workers_all_succeed() {
    let reporter = Arc::new(ChannelReporter::new(256));
    let mut receiver = reporter.subscribe();
    let task = Arc::new(TrackingTask::default());

    let coordinator = BatchCoordinator::new(5, reporter.clone()).unwrap();
    let outcome = coordinator.run(jobs(12), task.clone()).await.unwrap();

    assert_eq!(outcome.total, 12);
    assert_eq!(outcome.converted_count(), 12);

    let expected: Vec<_> = (1..=12).map(|n| (n, 12)).collect();
    assert_eq!(ticks(&drain(&mut receiver)), expected);

    let mut invoked = task.invocations.lock().unwrap().clone();
    invoked.sort_unstable();
    assert_eq!(invoked, (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn never_exceeds_the_parallel_limit() {
    for (limit, count) in [(1, 6), (2, 9), (3, 3), (4, 17)] {
        let task = Arc::new(TrackingTask {
            delays_ms: (0..count).map(|i| (i, (i as u64 * 7) % 13 + 1)).collect(),
            ..Default::default()
        });

        let coordinator = BatchCoordinator::new(limit, Arc::new(ChannelReporter::new(1))).unwrap();
        let outcome = coordinator.run(jobs(count), task.clone()).await.unwrap();

        assert_eq!(outcome.converted_count(), count);
        assert!(task.max_in_flight.load(Ordering::SeqCst) <= limit);
        assert_eq!(task.invocations.lock().unwrap().len(), count);
    }
}

#[tokio::test]
async fn limit_above_job_count_starts_everything() {
    let task = Arc::new(TrackingTask {
        delays_ms: (0..3).map(|i| (i, 50)).collect(),
        ..Default::default()
    });

    let coordinator = BatchCoordinator::new(10, Arc::new(ChannelReporter::new(1))).unwrap();
    coordinator.run(jobs(3), task.clone()).await.unwrap();

    assert_eq!(task.max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn admission_follows_input_order() {
    let task = Arc::new(TrackingTask::default());

    let coordinator = BatchCoordinator::new(1, Arc::new(ChannelReporter::new(1))).unwrap();
    coordinator.run(jobs(5), task.clone()).await.unwrap();

    assert_eq!(*task.invocations.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn first_failure_stops_admission_and_drains_running_jobs() {
    // Job 0 is slow, job 1 fails fast: job 2 waits for a slot that only
    // frees after the failure is recorded, so it is never admitted.
    let task = Arc::new(TrackingTask {
        delays_ms: HashMap::from([(0, 80), (1, 5)]),
        failing: HashSet::from([1]),
        ..Default::default()
    });
    let reporter = Arc::new(ChannelReporter::new(64));
    let mut receiver = reporter.subscribe();

    let coordinator = BatchCoordinator::new(2, reporter.clone()).unwrap();
    let err = coordinator.run(jobs(3), task.clone()).await.unwrap_err();

    match &err {
        CoverVidError::BatchAborted { source, converted, not_started } => {
            assert!(matches!(**source, CoverVidError::ConversionError { .. }));
            assert_eq!(source.file_path(), Some(&PathBuf::from("/music/track1.mp3")));
            assert_eq!(*converted, 1);
            assert_eq!(*not_started, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut invoked = task.invocations.lock().unwrap().clone();
    invoked.sort_unstable();
    assert_eq!(invoked, vec![0, 1]);
    assert_eq!(ticks(&drain(&mut receiver)), vec![(1, 3), (2, 3)]);
}

#[tokio::test]
async fn panicking_task_is_a_job_failure() {
    let task = Arc::new(TrackingTask {
        panicking: HashSet::from([0]),
        ..Default::default()
    });

    let coordinator = BatchCoordinator::new(1, Arc::new(ChannelReporter::new(1))).unwrap();
    let err = coordinator.run(jobs(2), task.clone()).await.unwrap_err();

    match err.root_job_error() {
        CoverVidError::TaskPanicked { message, .. } => assert!(message.contains("malformed")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*task.invocations.lock().unwrap(), vec![0]);
}

/// Transcoder that records the order of probe and convert calls per file.
#[derive(Default)]
struct RecordingTranscoder {
    failing_probe: HashSet<String>,
    events: Mutex<Vec<(String, &'static str)>>,
    written: Mutex<Vec<PathBuf>>,
}

fn stem(path: &Path) -> String {
    path.file_stem().unwrap().to_string_lossy().to_string()
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    fn name(&self) -> &str {
        "recording"
    }

    async fn probe(&self, audio: &Path) -> Result<AudioMetadata, TranscodeError> {
        let name = stem(audio);
        self.events.lock().unwrap().push((name.clone(), "probe-start"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.events.lock().unwrap().push((name.clone(), "probe-end"));

        if self.failing_probe.contains(&name) {
            return Err(TranscodeError::ProbeParse { reason: "corrupt header".to_string() });
        }
        Ok(AudioMetadata {
            bit_rate: Some(192_000),
            artist: Some("Artist".to_string()),
            title: Some(format!("Song {name}")),
            duration_secs: Some(60.0),
        })
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<(), TranscodeError> {
        let name = stem(&request.audio);
        self.events.lock().unwrap().push((name, "convert"));
        self.written.lock().unwrap().push(request.output.clone());
        Ok(())
    }
}

fn album(tracks: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for track in tracks {
        std::fs::write(dir.path().join(track), b"audio").unwrap();
    }
    std::fs::write(dir.path().join("Cover.jpg"), b"image").unwrap();
    dir
}

#[tokio::test]
async fn metadata_probe_precedes_conversion_for_every_job() {
    let dir = album(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
    let out = dir.path().join("videos");
    let transcoder = Arc::new(RecordingTranscoder::default());
    let run = RunConfig::new(dir.path()).output_dir(&out).parallel(3).metadata(true);

    let outcome = run_batch(
        &run,
        transcoder.clone(),
        Duration::from_secs(5),
        Arc::new(ChannelReporter::new(64)),
    )
    .await
    .unwrap();

    assert_eq!(outcome.converted_count(), 4);
    assert!(out.is_dir());

    let events = transcoder.events.lock().unwrap();
    for name in ["a", "b", "c", "d"] {
        let position = |kind: &str| {
            events
                .iter()
                .position(|(n, k)| n == name && *k == kind)
                .unwrap()
        };
        assert!(position("probe-end") < position("convert"));
    }

    let written = transcoder.written.lock().unwrap();
    assert!(written.contains(&out.join("Artist - Song a.mp4")));
}

#[tokio::test]
async fn metadata_failure_on_second_of_three_aborts_the_batch() {
    let dir = album(&["1.mp3", "2.mp3", "3.mp3"]);
    let transcoder = Arc::new(RecordingTranscoder {
        failing_probe: HashSet::from(["2".to_string()]),
        ..Default::default()
    });
    let run = RunConfig::new(dir.path()).parallel(2).metadata(true);

    let err = run_batch(
        &run,
        transcoder.clone(),
        Duration::from_secs(5),
        Arc::new(ChannelReporter::new(64)),
    )
    .await
    .unwrap_err();

    match err.root_job_error() {
        CoverVidError::MetadataError { file, .. } => assert!(file.ends_with("2.mp3")),
        other => panic!("unexpected error: {other}"),
    }

    let events = transcoder.events.lock().unwrap();
    // Job 2 never reaches conversion; job 1 drains to completion.
    assert!(!events.iter().any(|(n, k)| n == "2" && *k == "convert"));
    assert!(events.iter().any(|(n, k)| n == "1" && *k == "convert"));
    // Job 3 is admitted only if job 1 freed a slot before job 2 failed,
    // in which case it must also have run to completion.
    if events.iter().any(|(n, _)| n == "3") {
        assert!(events.iter().any(|(n, k)| n == "3" && *k == "convert"));
    }
}

#[tokio::test]
async fn plain_mode_names_outputs_after_inputs() {
    let dir = album(&["track1.mp3"]);
    let transcoder = Arc::new(RecordingTranscoder::default());
    let run = RunConfig::new(dir.path());

    let outcome = run_batch(
        &run,
        transcoder.clone(),
        Duration::from_secs(5),
        Arc::new(ChannelReporter::new(8)),
    )
    .await
    .unwrap();

    assert_eq!(outcome.converted, vec![dir.path().join("track1.mp4")]);
    assert!(transcoder.events.lock().unwrap().iter().all(|(_, k)| *k == "convert"));
}

#[tokio::test]
async fn discovery_errors_come_before_any_task() {
    let transcoder = Arc::new(RecordingTranscoder::default());

    let empty = album(&[]);
    let err = run_batch(
        &RunConfig::new(empty.path()),
        transcoder.clone(),
        Duration::from_secs(5),
        Arc::new(ChannelReporter::new(8)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoverVidError::DiscoveryError { .. }));

    let no_cover = TempDir::new().unwrap();
    std::fs::write(no_cover.path().join("a.mp3"), b"audio").unwrap();
    let err = run_batch(
        &RunConfig::new(no_cover.path()),
        transcoder.clone(),
        Duration::from_secs(5),
        Arc::new(ChannelReporter::new(8)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CoverVidError::DiscoveryError { .. }));

    assert!(transcoder.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn run_reports_start_and_completion() {
    let dir = album(&["a.mp3", "b.mp3"]);
    let reporter = Arc::new(ChannelReporter::new(64));
    let mut receiver = reporter.subscribe();

    run_batch(
        &RunConfig::new(dir.path()).parallel(2),
        Arc::new(RecordingTranscoder::default()),
        Duration::from_secs(5),
        reporter.clone(),
    )
    .await
    .unwrap();

    let updates = drain(&mut receiver);
    assert!(matches!(
        updates.first(),
        Some(ProgressUpdate::Started { total_files: 2, parallel: 2, .. })
    ));
    assert_eq!(
        updates.last(),
        Some(&ProgressUpdate::BatchCompleted { converted: 2 })
    );
}

/// Transcoder whose startup check never answers.
struct HungTranscoder {
    inner: RecordingTranscoder,
}

#[async_trait]
impl Transcoder for HungTranscoder {
    fn name(&self) -> &str {
        "hung"
    }

    async fn probe(&self, audio: &Path) -> Result<AudioMetadata, TranscodeError> {
        self.inner.probe(audio).await
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<(), TranscodeError> {
        self.inner.convert(request).await
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn hung_transcoder_check_times_out_before_admission() {
    let dir = album(&["a.mp3"]);
    let transcoder = Arc::new(HungTranscoder {
        inner: RecordingTranscoder::default(),
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        run_batch(
            &RunConfig::new(dir.path()),
            transcoder.clone(),
            Duration::from_millis(50),
            Arc::new(ChannelReporter::new(8)),
        ),
    )
    .await
    .expect("run_batch must settle within the per-call timeout");

    match result.unwrap_err() {
        CoverVidError::TranscoderUnavailable { name, source } => {
            assert_eq!(name, "hung");
            assert!(matches!(source, TranscodeError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(transcoder.inner.events.lock().unwrap().is_empty());
}
