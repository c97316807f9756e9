//! Foreground catalog reads and edits. Each call opens its own connection.

use crate::data::repository;
use crate::error::AppError;
use crate::models::asset::{Asset, AssetFilter, AssetPage};
use crate::models::tag::TagScore;
use crate::state::AppState;

pub fn query_assets(
    state: &AppState,
    page: usize,
    filter: &AssetFilter,
) -> Result<AssetPage, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    repository::query_assets(&conn, page, state.config.page_size, filter).map_err(AppError::warn)
}

pub fn get_asset(state: &AppState, id: i64) -> Result<Option<Asset>, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    repository::get_asset(&conn, id).map_err(AppError::warn)
}

pub fn list_directories(state: &AppState) -> Result<Vec<String>, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    repository::list_directories(&conn).map_err(AppError::warn)
}

pub fn list_all_tag_names(state: &AppState) -> Result<Vec<String>, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    repository::list_all_tag_names(&conn).map_err(AppError::warn)
}

pub fn list_associations(state: &AppState, asset_id: i64) -> Result<Vec<TagScore>, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    repository::list_associations(&conn, asset_id).map_err(AppError::warn)
}

/// Forgets every asset cataloged directly in `dir`. Files on disk are left
/// alone. Returns the number of assets removed.
pub fn remove_directory(state: &AppState, dir: &str) -> Result<usize, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    let removed = repository::delete_assets_by_dir(&conn, dir).map_err(AppError::warn)?;
    tracing::info!(dir, removed, "directory removed from catalog");
    Ok(removed)
}

pub fn delete_asset(state: &AppState, id: i64) -> Result<bool, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    Ok(repository::delete_asset(&conn, id).map_err(AppError::warn)? > 0)
}

pub fn mark_viewed(state: &AppState, id: i64) -> Result<bool, AppError> {
    let conn = state.connection().map_err(AppError::warn)?;
    Ok(repository::mark_viewed(&conn, id).map_err(AppError::warn)? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::models::asset::NewAsset;
    use crate::models::tag::StoreWrite;

    fn seeded_state(dir: &std::path::Path) -> (AppState, i64, i64) {
        let config = CatalogConfig {
            db_path: dir.join("catalog.db"),
            page_size: 1,
            ..CatalogConfig::default()
        };
        let state = AppState::open(config).unwrap();
        let conn = state.connection().unwrap();
        let add = |path: &str, dir: &str, name: &str| {
            repository::upsert_asset(
                &conn,
                &NewAsset {
                    file_path: path.to_string(),
                    file_name: name.to_string(),
                    dir_path: dir.to_string(),
                    file_size: 1,
                },
            )
            .unwrap()
        };
        let a = add("/trip/beach.png", "/trip", "beach.png");
        let b = add("/home/cat.png", "/home", "cat.png");
        repository::write_association(&conn, a, "sea", 0.9, true, StoreWrite::Replace).unwrap();
        (state, a, b)
    }

    #[test]
    fn query_uses_configured_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _, b) = seeded_state(dir.path());

        let page = query_assets(&state, 1, &AssetFilter::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.assets.len(), 1);
        assert_eq!(page.assets[0].id, b);
    }

    #[test]
    fn remove_directory_drops_assets_and_their_labels() {
        let dir = tempfile::tempdir().unwrap();
        let (state, a, b) = seeded_state(dir.path());

        assert_eq!(remove_directory(&state, "/trip/").unwrap(), 1);
        assert!(get_asset(&state, a).unwrap().is_none());
        assert!(list_associations(&state, a).unwrap().is_empty());
        assert!(get_asset(&state, b).unwrap().is_some());
        assert_eq!(list_directories(&state).unwrap(), vec!["/home".to_string()]);
    }

    #[test]
    fn mark_viewed_and_delete_report_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (state, a, _) = seeded_state(dir.path());

        assert!(mark_viewed(&state, a).unwrap());
        assert!(get_asset(&state, a).unwrap().unwrap().last_viewed.is_some());
        assert!(delete_asset(&state, a).unwrap());
        assert!(!delete_asset(&state, a).unwrap());
        assert!(!mark_viewed(&state, a).unwrap());
        assert_eq!(list_all_tag_names(&state).unwrap(), vec!["sea".to_string()]);
    }
}
