use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_IMPORT_COMMIT_INTERVAL;
use crate::data::{self, repository};
use crate::error::AppError;
use crate::models::task::TaskEvent;
use crate::services::scan_service::{self, ScannedImage};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub recursive: bool,
    /// Candidates between commits, and between progress events.
    pub commit_interval: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            commit_interval: DEFAULT_IMPORT_COMMIT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ImportReport {
    /// One id per candidate that made it into the catalog, whether it was
    /// inserted now or already known.
    pub asset_ids: Vec<i64>,
    pub processed: usize,
    pub cancelled: bool,
}

struct ImportRun<'a, F> {
    conn: &'a Connection,
    options: &'a ImportOptions,
    cancel: &'a CancellationToken,
    on_event: F,
    report: ImportReport,
}

impl<F> ImportRun<'_, F>
where
    F: FnMut(TaskEvent),
{
    fn ingest(&mut self, image: &ScannedImage) -> Result<(), AppError> {
        self.report.processed += 1;

        match repository::upsert_asset(self.conn, &image.to_new_asset()) {
            Ok(id) => self.report.asset_ids.push(id),
            Err(err) => {
                tracing::warn!(path = %image.full_path, error = %err, "failed to catalog image");
            }
        }

        if self.report.processed % self.options.commit_interval == 0 {
            data::checkpoint(self.conn)?;
            let processed = self.report.processed;
            (self.on_event)(TaskEvent::Progress {
                processed,
                total: 0,
            });
            (self.on_event)(TaskEvent::Status(format!("Imported: {processed}")));
        }
        Ok(())
    }

    fn import_target(&mut self, target: &Path) -> Result<(), AppError> {
        if target.is_file() {
            if let Some(image) = scan_service::scanned_image_from_path(target) {
                (self.on_event)(TaskEvent::Status(format!("Importing: {}", image.file_name)));
                self.ingest(&image)?;
            }
        } else if target.is_dir() {
            (self.on_event)(TaskEvent::Status(format!(
                "Scanning directory: {}",
                target.display()
            )));
            for image in scan_service::scan_directory(target, self.options.recursive) {
                if self.cancel.is_cancelled() {
                    self.report.cancelled = true;
                    break;
                }
                self.ingest(&image)?;
            }
        } else {
            tracing::warn!(target = %target.display(), "import target does not exist");
        }
        Ok(())
    }
}

/// Catalogs every image under `targets`, committing every
/// `options.commit_interval` candidates.
///
/// Cancellation commits the work done so far and returns the ids gathered up
/// to that point. A failed commit rolls back the uncommitted tail and aborts.
pub fn run_import<F>(
    conn: &Connection,
    targets: &[PathBuf],
    options: &ImportOptions,
    cancel: &CancellationToken,
    on_event: F,
) -> Result<ImportReport, AppError>
where
    F: FnMut(TaskEvent),
{
    let options = ImportOptions {
        commit_interval: options.commit_interval.max(1),
        ..options.clone()
    };
    let mut run = ImportRun {
        conn,
        options: &options,
        cancel,
        on_event,
        report: ImportReport::default(),
    };

    (run.on_event)(TaskEvent::Status("Preparing scan...".to_string()));
    data::begin(conn)?;

    for target in targets {
        if cancel.is_cancelled() {
            run.report.cancelled = true;
        }
        if run.report.cancelled {
            break;
        }
        if let Err(err) = run.import_target(target) {
            data::rollback(conn);
            return Err(err);
        }
    }

    data::commit(conn)?;

    let processed = run.report.processed;
    (run.on_event)(TaskEvent::Progress {
        processed,
        total: 0,
    });
    tracing::info!(
        processed,
        cataloged = run.report.asset_ids.len(),
        cancelled = run.report.cancelled,
        "import finished"
    );
    Ok(run.report)
}
