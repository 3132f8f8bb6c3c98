// src/cleanup.rs

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, error, info, instrument};

/// Outcome of one purge pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Delete every entry inside each area, then the area directory itself.
///
/// A failed entry is logged and skipped; one area failing does not stop the
/// next. Areas that do not exist are skipped silently.
#[instrument(level = "info", skip(areas), fields(areas = areas.len()))]
pub fn purge_areas(areas: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for area in areas {
        purge_area(area, &mut report);
    }
    if !report.removed.is_empty() || !report.failed.is_empty() {
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "cleanup finished"
        );
    }
    report
}

fn purge_area(area: &Path, report: &mut CleanupReport) {
    let entries = match fs::read_dir(area) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            error!(area = %area.display(), "cannot list area: {}", e);
            report.failed.push(area.to_path_buf());
            return;
        }
    };

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                error!(area = %area.display(), "cannot read entry: {}", e);
                continue;
            }
        };
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), "deleted");
                report.removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(path = %path.display(), "error deleting: {}", e);
                report.failed.push(path);
            }
        }
    }

    match fs::remove_dir(area) {
        Ok(()) => {
            debug!(area = %area.display(), "deleted area");
            report.removed.push(area.to_path_buf());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            error!(area = %area.display(), "error deleting area: {}", e);
            report.failed.push(area.to_path_buf());
        }
    }
}

/// Purge `areas` in the background once `delay` has passed.
///
/// Returns immediately; nothing is reported back to the caller. Must be
/// called from within a tokio runtime.
pub fn schedule_cleanup(areas: Vec<PathBuf>, delay: Duration) {
    debug!(?delay, areas = areas.len(), "cleanup scheduled");
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = tokio::task::spawn_blocking(move || purge_areas(&areas)).await {
            error!("cleanup task failed: {}", e);
        }
    });
}
