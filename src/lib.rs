pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub(crate) mod paths;
pub mod services;
pub mod state;

pub use commands::TaskHandle;
pub use config::CatalogConfig;
pub use error::AppError;
pub use models::tag::WritePolicy;
pub use models::task::{EventSender, TaskEvent, TaskId, TaskKind};
pub use services::tagger_engine::{ClassifierEngine, LabelTable, PatternEngine, TaggingEngine};
pub use state::AppState;

const DEFAULT_LOG_FILTER: &str = "tagshelf=info";

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `tagshelf=info`. Calling it again, or after another subscriber was set, is
/// a no-op.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
