use std::sync::Arc;

use super::{send_event, spawn_task, TaskHandle};
use crate::config::CatalogConfig;
use crate::error::AppError;
use crate::models::tag::WritePolicy;
use crate::models::task::{EventSender, TaskKind};
use crate::services::tagger_engine::{PatternEngine, TaggingEngine};
use crate::services::tagging_service::{self, TaggingReport};
use crate::state::AppState;

/// Which strategy a tagging run uses.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum EngineChoice {
    Classifier,
    Pattern(String),
}

/// Builds the engine for `choice`. The classifier loads its model and label
/// table here, so missing files surface before any task starts.
pub fn load_engine(
    config: &CatalogConfig,
    choice: &EngineChoice,
) -> Result<Arc<dyn TaggingEngine>, AppError> {
    match choice {
        EngineChoice::Pattern(pattern) => Ok(Arc::new(PatternEngine::new(pattern))),
        EngineChoice::Classifier => load_classifier(config),
    }
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &CatalogConfig) -> Result<Arc<dyn TaggingEngine>, AppError> {
    use crate::services::tagger_engine::ClassifierEngine;

    Ok(Arc::new(ClassifierEngine::from_config(config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(config: &CatalogConfig) -> Result<Arc<dyn TaggingEngine>, AppError> {
    Err(AppError::Config(format!(
        "classifier unavailable: built without the `onnx` feature (model {})",
        config.model_path().display()
    )))
}

/// Tags `ids` in the background with `engine` under `policy`.
pub fn spawn_tagging(
    state: &Arc<AppState>,
    ids: Vec<i64>,
    engine: Arc<dyn TaggingEngine>,
    policy: WritePolicy,
    events: EventSender,
) -> TaskHandle<TaggingReport> {
    let chunk_size = state.config.tagging_chunk_size;
    spawn_task(state, TaskKind::Tagging, events, move |conn, cancel, events| {
        tagging_service::run_tagging(
            conn,
            &ids,
            engine.as_ref(),
            policy,
            chunk_size,
            cancel,
            |event| send_event(events, event),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repository;
    use crate::models::asset::NewAsset;
    use crate::models::task::TaskEvent;

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let config = CatalogConfig {
            db_path: dir.join("catalog.db"),
            ..CatalogConfig::default()
        };
        Arc::new(AppState::open(config).unwrap())
    }

    #[test]
    fn pattern_choice_builds_pattern_engine() {
        let engine = load_engine(
            &CatalogConfig::default(),
            &EngineChoice::Pattern("(.*?)_image".to_string()),
        )
        .unwrap();
        assert_eq!(engine.name(), "pattern");
        assert!(!engine.is_prediction());
    }

    #[test]
    fn classifier_with_missing_model_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = CatalogConfig {
            models_dir: dir.path().join("models"),
            ..CatalogConfig::default()
        };
        let result = load_engine(&config, &EngineChoice::Classifier);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn spawned_tagging_writes_labels_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let id = repository::upsert_asset(
            &state.connection().unwrap(),
            &NewAsset {
                file_path: "/photos/sunset_image_02.png".to_string(),
                file_name: "sunset_image_02.png".to_string(),
                dir_path: "/photos".to_string(),
                file_size: 1,
            },
        )
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_tagging(
            &state,
            vec![id],
            Arc::new(PatternEngine::new("(.*?)_image")),
            WritePolicy::Append,
            tx,
        );
        let report = handle.wait().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.labels_written, 1);
        let tags = repository::list_associations(&state.connection().unwrap(), id).unwrap();
        assert_eq!(tags[0].name, "sunset");

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(TaskEvent::Finished)));
        assert!(state.active_tasks().is_empty());
    }

    #[tokio::test]
    async fn unopenable_catalog_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let config = CatalogConfig {
            db_path: dir.path().join("missing_dir/catalog.db"),
            ..CatalogConfig::default()
        };
        let state = Arc::new(AppState::new(config));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = spawn_tagging(
            &state,
            vec![1],
            Arc::new(PatternEngine::new("x")),
            WritePolicy::Append,
            tx,
        );

        assert!(handle.wait().await.is_err());
        assert!(matches!(rx.try_recv(), Ok(TaskEvent::Failed(_))));
    }
}
