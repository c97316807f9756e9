use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_TAGGING_CHUNK_SIZE;
use crate::data::{self, repository};
use crate::error::AppError;
use crate::models::asset::{Asset, AssetTarget};
use crate::models::tag::{TagScore, WritePolicy};
use crate::models::task::TaskEvent;
use crate::services::tagger_engine::TaggingEngine;

/// Processed assets between progress events and commits.
pub const PROGRESS_INTERVAL: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggingPhase {
    Idle,
    ClearingOverwriteTargets,
    FetchingBatch,
    SkipCheck,
    Predicting,
    Writing,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TaggingReport {
    pub processed: usize,
    pub skipped: usize,
    pub labels_written: usize,
    pub failed_predictions: usize,
    pub cancelled: bool,
}

/// Writes `labels` for one asset with the conflict behavior `policy` asks for.
/// Returns how many rows were inserted or changed; failed rows are logged and
/// left out.
pub fn write_labels(
    conn: &Connection,
    asset_id: i64,
    labels: &[TagScore],
    is_prediction: bool,
    policy: WritePolicy,
) -> usize {
    let mode = policy.store_write();
    labels
        .iter()
        .filter(|label| {
            match repository::write_association(
                conn,
                asset_id,
                &label.name,
                label.confidence,
                is_prediction,
                mode,
            ) {
                Ok(changed) => changed,
                Err(err) => {
                    tracing::warn!(asset_id, tag = %label.name, error = %err, "failed to write label");
                    false
                }
            }
        })
        .count()
}

struct TaggingRun<'a, F> {
    conn: &'a Connection,
    engine: &'a dyn TaggingEngine,
    policy: WritePolicy,
    cancel: &'a CancellationToken,
    on_event: F,
    total: usize,
    phase: TaggingPhase,
    /// Predictions not yet written, in processing order.
    pending: Vec<(i64, Vec<TagScore>)>,
    report: TaggingReport,
}

impl<F> TaggingRun<'_, F>
where
    F: FnMut(TaskEvent),
{
    fn enter(&mut self, phase: TaggingPhase) {
        if self.phase != phase {
            tracing::trace!(from = ?self.phase, to = ?phase, "tagging phase");
            self.phase = phase;
        }
    }

    fn check_cancel(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.report.cancelled = true;
        }
        self.report.cancelled
    }

    fn clear_targets(&mut self, ids: &[i64]) -> Result<(), AppError> {
        self.enter(TaggingPhase::ClearingOverwriteTargets);
        (self.on_event)(TaskEvent::Status("Clearing existing tags...".to_string()));
        data::begin(self.conn)?;
        for &id in ids {
            if self.check_cancel() {
                break;
            }
            if let Err(err) = repository::clear_associations(self.conn, id) {
                tracing::warn!(asset_id = id, error = %err, "failed to clear tags");
            }
        }
        data::commit(self.conn)
    }

    fn already_tagged(&self, asset_id: i64) -> bool {
        if self.pending.iter().any(|(id, _)| *id == asset_id) {
            return true;
        }
        repository::has_associations(self.conn, asset_id).unwrap_or_else(|err| {
            tracing::warn!(asset_id, error = %err, "skip check failed");
            false
        })
    }

    fn tag_asset(&mut self, asset: &Asset) -> Result<(), AppError> {
        self.enter(TaggingPhase::SkipCheck);
        if self.policy == WritePolicy::Skip && self.already_tagged(asset.id) {
            tracing::debug!(asset_id = asset.id, "already tagged, skipping");
            self.report.skipped += 1;
        } else {
            self.enter(TaggingPhase::Predicting);
            let labels = match self.engine.predict(&AssetTarget::from(asset)) {
                Ok(labels) => labels,
                Err(err) => {
                    tracing::warn!(
                        path = %asset.file_path,
                        engine = self.engine.name(),
                        error = %err,
                        "prediction failed"
                    );
                    self.report.failed_predictions += 1;
                    Vec::new()
                }
            };
            self.pending.push((asset.id, labels));
        }

        self.report.processed += 1;
        if self.report.processed % PROGRESS_INTERVAL == 0 {
            self.flush()?;
            self.emit_progress();
        }
        Ok(())
    }

    /// Writes the buffered predictions in one write transaction.
    fn flush(&mut self) -> Result<(), AppError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.enter(TaggingPhase::Writing);
        data::begin(self.conn)?;
        let is_prediction = self.engine.is_prediction();
        for (asset_id, labels) in self.pending.drain(..) {
            self.report.labels_written +=
                write_labels(self.conn, asset_id, &labels, is_prediction, self.policy);
        }
        data::commit(self.conn)
    }

    fn emit_progress(&mut self) {
        let (processed, total) = (self.report.processed, self.total);
        (self.on_event)(TaskEvent::Progress { processed, total });
        (self.on_event)(TaskEvent::Status(format!("Processing: {processed}/{total}")));
    }

    fn run(&mut self, ids: &[i64], chunk_size: usize) -> Result<(), AppError> {
        if self.policy == WritePolicy::Overwrite {
            self.clear_targets(ids)?;
        }

        for chunk in ids.chunks(chunk_size) {
            if self.check_cancel() {
                break;
            }
            self.enter(TaggingPhase::FetchingBatch);
            let assets = repository::get_assets_by_ids(self.conn, chunk)?;

            for asset in &assets {
                if self.check_cancel() {
                    break;
                }
                self.tag_asset(asset)?;
            }
        }
        self.flush()
    }
}

/// Applies `engine` to the assets in `ids`, in order, under `policy`.
///
/// Predictions run outside any transaction. Their labels are written in one
/// short write transaction every [`PROGRESS_INTERVAL`] assets, so a cancelled
/// run keeps what it wrote and other tasks are never locked out during
/// inference. Ids with no catalog row are passed over. A failed fetch or
/// commit rolls back the open write and is returned.
pub fn run_tagging<F>(
    conn: &Connection,
    ids: &[i64],
    engine: &dyn TaggingEngine,
    policy: WritePolicy,
    chunk_size: usize,
    cancel: &CancellationToken,
    on_event: F,
) -> Result<TaggingReport, AppError>
where
    F: FnMut(TaskEvent),
{
    let mut run = TaggingRun {
        conn,
        engine,
        policy,
        cancel,
        on_event,
        total: ids.len(),
        phase: TaggingPhase::Idle,
        pending: Vec::new(),
        report: TaggingReport::default(),
    };
    let chunk_size = if chunk_size == 0 {
        DEFAULT_TAGGING_CHUNK_SIZE
    } else {
        chunk_size
    };

    tracing::info!(
        total = ids.len(),
        engine = engine.name(),
        %policy,
        "tagging started"
    );

    if let Err(err) = run.run(ids, chunk_size) {
        data::rollback(conn);
        tracing::error!(error = %err, processed = run.report.processed, "tagging aborted");
        return Err(err);
    }

    run.enter(TaggingPhase::Done);
    if run.report.processed % PROGRESS_INTERVAL != 0 || run.report.processed == 0 {
        run.emit_progress();
    }
    tracing::info!(
        processed = run.report.processed,
        skipped = run.report.skipped,
        labels = run.report.labels_written,
        failed = run.report.failed_predictions,
        cancelled = run.report.cancelled,
        "tagging finished"
    );
    Ok(run.report)
}
