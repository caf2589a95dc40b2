//! Input discovery and cover validation

use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::{Result, CoverVidError};
use crate::processing::Job;

/// Find the audio files of a run, in sorted order, and check the cover.
///
/// Only the top level of the directory is scanned. Fails before any work
/// starts when the directory is unreadable, holds no matching files, or the
/// cover image is missing.
pub async fn discover(run: &RunConfig) -> Result<Vec<Job>> {
    let mut entries = fs::read_dir(&run.directory)
        .await
        .map_err(|e| unreadable(run, e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| unreadable(run, e))? {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false)
            || fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);

        if is_file && run.accepts(&path) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(CoverVidError::discovery(
            format!(
                "No audio files ({}) found in the input directory",
                run.extensions.join(", ")
            ),
            run.directory.clone(),
        ));
    }

    let cover_is_file = fs::metadata(&run.cover)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !cover_is_file {
        return Err(CoverVidError::discovery(
            format!("\"{}\" does not exist", run.cover.display()),
            run.cover.clone(),
        ));
    }

    // Sort files for consistent admission order
    files.sort();
    debug!("Discovered {} audio files in {:?}", files.len(), run.directory);

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(index, path)| Job::new(index, path))
        .collect())
}

fn unreadable(run: &RunConfig, e: std::io::Error) -> CoverVidError {
    CoverVidError::discovery(
        format!(
            "Invalid directory. Either it does not exist or it cannot be read: {}",
            e
        ),
        run.directory.clone(),
    )
}
