use serde::{Deserialize, Serialize};

pub type TaskId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Import,
    Thumbnail,
    Tagging,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Thumbnail => write!(f, "thumbnail"),
            Self::Tagging => write!(f, "tagging"),
        }
    }
}

/// Notification sent from a background task to whoever started it.
///
/// Delivery is best effort: a dropped receiver simply stops receiving.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress { processed: usize, total: usize },
    Status(String),
    ThumbnailReady {
        asset_id: i64,
        preview: image::RgbImage,
    },
    FileMissing { asset_id: i64, path: String },
    Finished,
    Failed(String),
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<TaskEvent>;
