use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::commands::thumbnail_commands::ThumbnailScheduler;
use crate::config::CatalogConfig;
use crate::data;
use crate::error::AppError;
use crate::models::task::{TaskId, TaskKind};

struct ActiveTask {
    kind: TaskKind,
    cancel: CancellationToken,
}

/// Shared handle to the catalog: where it lives, how it is tuned, and which
/// background tasks are running against it.
pub struct AppState {
    pub db_path: PathBuf,
    pub config: CatalogConfig,
    pub thumbnails: ThumbnailScheduler,
    tasks: Mutex<HashMap<TaskId, ActiveTask>>,
}

impl AppState {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            config,
            thumbnails: ThumbnailScheduler::default(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Validates `config`, creates the data directory and makes sure the
    /// catalog can be opened and migrated before anything else runs.
    pub fn open(config: CatalogConfig) -> Result<Self, AppError> {
        config.validate()?;
        config.ensure_data_dir()?;
        data::open_connection(&config.db_path)?;
        tracing::info!(catalog = %config.db_path.display(), "catalog ready");
        Ok(Self::new(config))
    }

    /// Opens a fresh connection for foreground work.
    pub fn connection(&self) -> Result<Connection, AppError> {
        data::open_connection(&self.db_path)
    }

    pub fn register_task(&self, kind: TaskKind) -> (TaskId, CancellationToken) {
        let id = TaskId::new_v4();
        let cancel = CancellationToken::new();
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.insert(
            id,
            ActiveTask {
                kind,
                cancel: cancel.clone(),
            },
        );
        (id, cancel)
    }

    /// Requests cancellation of one task. Returns false if it is not running.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match tasks.get(&id) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Requests cancellation of every running task, or only those of `kind`.
    pub fn cancel_all(&self, kind: Option<TaskKind>) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.values() {
            if kind.map_or(true, |k| k == task.kind) {
                task.cancel.cancel();
            }
        }
    }

    pub fn finish_task(&self, id: TaskId) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.remove(&id);
    }

    pub fn active_tasks(&self) -> Vec<(TaskId, TaskKind)> {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.iter().map(|(id, task)| (*id, task.kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(CatalogConfig::default())
    }

    #[test]
    fn cancel_is_task_specific() {
        let state = test_state();
        let (a, token_a) = state.register_task(TaskKind::Import);
        let (_, token_b) = state.register_task(TaskKind::Import);

        assert!(state.cancel_task(a));

        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
    }

    #[test]
    fn cancel_all_can_target_one_kind() {
        let state = test_state();
        let (_, import) = state.register_task(TaskKind::Import);
        let (_, tagging) = state.register_task(TaskKind::Tagging);

        state.cancel_all(Some(TaskKind::Tagging));
        assert!(!import.is_cancelled());
        assert!(tagging.is_cancelled());

        state.cancel_all(None);
        assert!(import.is_cancelled());
    }

    #[test]
    fn finished_tasks_leave_the_registry() {
        let state = test_state();
        let (id, _) = state.register_task(TaskKind::Thumbnail);
        assert_eq!(state.active_tasks(), vec![(id, TaskKind::Thumbnail)]);

        state.finish_task(id);
        assert!(state.active_tasks().is_empty());
        assert!(!state.cancel_task(id));
    }

    #[test]
    fn open_creates_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let config = CatalogConfig {
            db_path: dir.path().join("nested/catalog.db"),
            ..CatalogConfig::default()
        };

        let state = AppState::open(config).unwrap();
        assert!(state.db_path.exists());
        assert_eq!(
            crate::data::repository::count_assets(&state.connection().unwrap()).unwrap(),
            0
        );
    }
}
