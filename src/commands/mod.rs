pub mod catalog_commands;
pub mod import_commands;
pub mod tagging_commands;
pub mod thumbnail_commands;

use std::sync::Arc;

use rusqlite::Connection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::data;
use crate::error::AppError;
use crate::models::task::{EventSender, TaskEvent, TaskId, TaskKind};
use crate::state::AppState;

/// A background task started by one of the `spawn_*` commands.
///
/// Dropping the handle detaches the task; it keeps running until it finishes
/// or its token is cancelled.
pub struct TaskHandle<T> {
    id: TaskId,
    kind: TaskKind,
    cancel: CancellationToken,
    join: JoinHandle<Result<T, AppError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the task and returns its result. A task that panicked or was
    /// aborted by the runtime is reported as [`AppError::General`].
    pub async fn wait(self) -> Result<T, AppError> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(AppError::General(format!(
                "{} task {} did not complete: {err}",
                self.kind, self.id
            ))),
        }
    }
}

/// Forwards an event to the caller. A closed channel only means nobody is
/// listening any more.
pub(crate) fn send_event(events: &EventSender, event: TaskEvent) {
    let _ = events.send(event);
}

/// Runs `body` on the blocking pool with its own catalog connection.
///
/// The task is registered with `state` for cancellation and removed again when
/// it ends. `Finished` or `Failed` is sent as the last event.
pub(crate) fn spawn_task<T, F>(
    state: &Arc<AppState>,
    kind: TaskKind,
    events: EventSender,
    body: F,
) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &CancellationToken, &EventSender) -> Result<T, AppError> + Send + 'static,
{
    let (id, cancel) = state.register_task(kind);
    let task_state = Arc::clone(state);
    let task_cancel = cancel.clone();

    let join = tokio::task::spawn_blocking(move || {
        tracing::info!(%kind, task = %id, "task started");
        let result = data::open_connection(&task_state.db_path)
            .and_then(|conn| body(&conn, &task_cancel, &events));

        match &result {
            Ok(_) => {
                tracing::info!(%kind, task = %id, cancelled = task_cancel.is_cancelled(), "task finished");
                send_event(&events, TaskEvent::Finished);
            }
            Err(err) => {
                tracing::error!(%kind, task = %id, error = %err, "task failed");
                send_event(&events, TaskEvent::Failed(err.to_string()));
            }
        }
        task_state.finish_task(id);
        result
    });

    TaskHandle {
        id,
        kind,
        cancel,
        join,
    }
}
