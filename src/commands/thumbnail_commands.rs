use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{send_event, spawn_task, TaskHandle};
use crate::error::AppError;
use crate::models::task::{EventSender, TaskId, TaskKind};
use crate::services::thumbnail_service::{self, ThumbnailReport};
use crate::state::AppState;

/// Keeps at most one thumbnail run alive. Scheduling a new run cancels the
/// current one and waits for it before starting.
#[derive(Default)]
pub struct ThumbnailScheduler {
    current: Mutex<Option<TaskHandle<ThumbnailReport>>>,
}

impl ThumbnailScheduler {
    async fn replace(
        &self,
        state: &Arc<AppState>,
        items: Vec<(i64, PathBuf)>,
        events: EventSender,
    ) -> TaskId {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel();
            if let Err(err) = previous.wait().await {
                tracing::warn!(error = %err, "previous thumbnail run ended badly");
            }
        }

        let handle = spawn_thumbnails(state, items, events);
        let id = handle.id();
        *current = Some(handle);
        id
    }

    async fn take(&self) -> Option<TaskHandle<ThumbnailReport>> {
        self.current.lock().await.take()
    }
}

/// Starts a thumbnail run without touching the scheduler.
pub fn spawn_thumbnails(
    state: &Arc<AppState>,
    items: Vec<(i64, PathBuf)>,
    events: EventSender,
) -> TaskHandle<ThumbnailReport> {
    let bounds = state.config.thumbnail_size;
    spawn_task(state, TaskKind::Thumbnail, events, move |conn, cancel, events| {
        Ok(thumbnail_service::run_thumbnails(
            conn,
            &items,
            bounds,
            cancel,
            |event| send_event(events, event),
        ))
    })
}

/// Replaces whatever thumbnail run is in flight with one for `items`, e.g.
/// when the visible page changes.
pub async fn schedule_thumbnails(
    state: &Arc<AppState>,
    items: Vec<(i64, PathBuf)>,
    events: EventSender,
) -> TaskId {
    state.thumbnails.replace(state, items, events).await
}

/// Waits for the scheduled run, if any, and returns its report.
pub async fn wait_thumbnails(state: &AppState) -> Result<Option<ThumbnailReport>, AppError> {
    match state.thumbnails.take().await {
        Some(handle) => handle.wait().await.map(Some),
        None => Ok(None),
    }
}
