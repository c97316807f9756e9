use std::path::PathBuf;
use std::sync::Arc;

use super::tagging_commands::spawn_tagging;
use super::{send_event, spawn_task, TaskHandle};
use crate::error::AppError;
use crate::models::tag::WritePolicy;
use crate::models::task::{EventSender, TaskKind};
use crate::services::import_service::{self, ImportOptions, ImportReport};
use crate::services::tagger_engine::TaggingEngine;
use crate::services::tagging_service::TaggingReport;
use crate::state::AppState;

/// Imports `targets` (image files or directories) in the background.
pub fn spawn_import(
    state: &Arc<AppState>,
    targets: Vec<PathBuf>,
    recursive: bool,
    events: EventSender,
) -> TaskHandle<ImportReport> {
    let options = ImportOptions {
        recursive,
        commit_interval: state.config.import_commit_interval,
    };
    spawn_task(state, TaskKind::Import, events, move |conn, cancel, events| {
        import_service::run_import(conn, &targets, &options, cancel, |event| {
            send_event(events, event)
        })
    })
}

/// Imports `targets`, then tags whatever the import cataloged.
///
/// Tagging starts only after the import has finished, and is not started when
/// the import was cancelled or found nothing. Both tasks report on `events`.
pub async fn import_then_tag(
    state: &Arc<AppState>,
    targets: Vec<PathBuf>,
    recursive: bool,
    engine: Arc<dyn TaggingEngine>,
    policy: WritePolicy,
    events: EventSender,
) -> Result<(ImportReport, Option<TaggingReport>), AppError> {
    let import = spawn_import(state, targets, recursive, events.clone())
        .wait()
        .await?;
    if import.cancelled || import.asset_ids.is_empty() {
        return Ok((import, None));
    }

    let tagging = spawn_tagging(state, import.asset_ids.clone(), engine, policy, events)
        .wait()
        .await?;
    Ok((import, Some(tagging)))
}
