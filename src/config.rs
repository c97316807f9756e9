use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CLASSIFIER_THRESHOLD: f32 = 0.35;
pub const DEFAULT_MODEL_INPUT_SIZE: u32 = 448;
pub const DEFAULT_THUMBNAIL_SIZE: [u32; 2] = [256, 256];
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_IMPORT_COMMIT_INTERVAL: usize = 50;
pub const DEFAULT_TAGGING_CHUNK_SIZE: usize = 500;

const APP_NAME: &str = "tagshelf";
const DB_FILE_NAME: &str = "tagshelf.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    pub models_dir: PathBuf,
    pub model_file: String,
    pub label_file: String,
    pub classifier_threshold: f32,
    pub model_input_size: u32,
    pub thumbnail_size: [u32; 2],
    pub page_size: usize,
    pub import_commit_interval: usize,
    pub tagging_chunk_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            models_dir: data_dir.join("models"),
            model_file: "model.onnx".to_string(),
            label_file: "tag_mapping.json".to_string(),
            classifier_threshold: DEFAULT_CLASSIFIER_THRESHOLD,
            model_input_size: DEFAULT_MODEL_INPUT_SIZE,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            import_commit_interval: DEFAULT_IMPORT_COMMIT_INTERVAL,
            tagging_chunk_size: DEFAULT_TAGGING_CHUNK_SIZE,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
}

impl CatalogConfig {
    /// Reads a JSON config file. A missing file yields the defaults; unknown
    /// or omitted fields fall back to their defaults as well.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.0..1.0).contains(&self.classifier_threshold) {
            return Err(AppError::Config(format!(
                "classifier_threshold must be in [0, 1): {}",
                self.classifier_threshold
            )));
        }
        if self.model_input_size == 0 {
            return Err(AppError::Config("model_input_size must be positive".to_string()));
        }
        if self.thumbnail_size.contains(&0) {
            return Err(AppError::Config("thumbnail_size must be positive".to_string()));
        }
        if self.import_commit_interval == 0 || self.tagging_chunk_size == 0 {
            return Err(AppError::Config(
                "import_commit_interval and tagging_chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }

    pub fn label_path(&self) -> PathBuf {
        self.models_dir.join(&self.label_file)
    }

    pub fn ensure_data_dir(&self) -> Result<(), AppError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
