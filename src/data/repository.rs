use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::AppError;
use crate::models::asset::{Asset, AssetFilter, AssetPage, NewAsset};
use crate::models::tag::{StoreWrite, TagScore};
use crate::paths::normalize_dir;

const ASSET_COLUMNS: &str =
    "i.id, i.file_path, i.file_name, i.dir_path, COALESCE(i.file_size, 0), i.created_at, i.last_viewed";

/// Upper bound on ids bound into a single `IN (...)` list.
const MAX_IDS_PER_QUERY: usize = 500;

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(0)?,
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        dir_path: row.get(3)?,
        file_size: row.get(4)?,
        created_at: row.get(5)?,
        last_viewed: row.get(6)?,
    })
}

// ---------------------------------------------------------------- assets

/// Inserts the asset if its path is unseen and returns its id either way.
/// Existing rows, and their tag associations, are left untouched.
pub fn upsert_asset(conn: &Connection, asset: &NewAsset) -> Result<i64, AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO images (file_path, file_name, dir_path, file_size)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            asset.file_path,
            asset.file_name,
            asset.dir_path,
            asset.file_size
        ],
    )?;
    let id = conn.query_row(
        "SELECT id FROM images WHERE file_path = ?1",
        params![asset.file_path],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_asset(conn: &Connection, id: i64) -> Result<Option<Asset>, AppError> {
    let asset = conn
        .query_row(
            &format!("SELECT {ASSET_COLUMNS} FROM images i WHERE i.id = ?1"),
            params![id],
            asset_from_row,
        )
        .optional()?;
    Ok(asset)
}

/// Fetches assets for `ids`, returned in the order the ids were given.
/// Ids with no row are dropped.
pub fn get_assets_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Asset>, AppError> {
    let mut found: HashMap<i64, Asset> = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM images i WHERE i.id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), asset_from_row)?;
        for row in rows {
            let asset = row?;
            found.insert(asset.id, asset);
        }
    }

    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}

pub fn count_assets(conn: &Connection) -> Result<i64, AppError> {
    let count = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
    Ok(count)
}

pub fn delete_asset(conn: &Connection, id: i64) -> Result<usize, AppError> {
    let count = conn.execute("DELETE FROM images WHERE id = ?1", params![id])?;
    Ok(count)
}

/// Removes every asset whose containing directory is exactly `dir`.
/// Subdirectories are not touched; files on disk are never touched.
pub fn delete_assets_by_dir(conn: &Connection, dir: &str) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM images WHERE dir_path = ?1",
        params![normalize_dir(dir)],
    )?;
    Ok(count)
}

pub fn list_directories(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT DISTINCT dir_path FROM images ORDER BY dir_path")?;
    let dirs = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(dirs)
}

pub fn mark_viewed(conn: &Connection, id: i64) -> Result<usize, AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE images SET last_viewed = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    Ok(count)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One page of assets matching every filter, newest first, plus the total
/// number of matches. Pages are 1-based.
pub fn query_assets(
    conn: &Connection,
    page: usize,
    page_size: usize,
    filter: &AssetFilter,
) -> Result<AssetPage, AppError> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let offset = (page - 1).saturating_mul(page_size);

    let mut conditions: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    for tag in &filter.tags {
        conditions.push(
            "EXISTS (SELECT 1 FROM image_tags it JOIN tags t ON it.tag_id = t.id
                     WHERE it.image_id = i.id AND t.name = ?)",
        );
        values.push(Value::Text(tag.trim().to_string()));
    }

    if let Some(keyword) = filter.path_keyword.as_deref().filter(|k| !k.is_empty()) {
        conditions.push("(i.file_name LIKE ? ESCAPE '\\' OR i.file_path LIKE ? ESCAPE '\\')");
        let pattern = format!("%{}%", escape_like(keyword));
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    if let Some(dir) = filter.exact_dir.as_deref().filter(|d| !d.is_empty()) {
        conditions.push("i.dir_path = ?");
        values.push(Value::Text(normalize_dir(dir)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM images i{where_clause}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(i64::try_from(page_size).unwrap_or(i64::MAX)));
    values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM images i{where_clause} ORDER BY i.id DESC LIMIT ? OFFSET ?"
    ))?;
    let assets = stmt
        .query_map(params_from_iter(values.iter()), asset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AssetPage { assets, total })
}

// ---------------------------------------------------------------- tags

pub fn upsert_tag(conn: &Connection, name: &str) -> Result<i64, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::General("tag name is empty".to_string()));
    }

    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
    let id = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

pub fn list_all_tag_names(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

// ---------------------------------------------------------------- associations

pub fn clear_associations(conn: &Connection, asset_id: i64) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM image_tags WHERE image_id = ?1",
        params![asset_id],
    )?;
    Ok(count)
}

pub fn has_associations(conn: &Connection, asset_id: i64) -> Result<bool, AppError> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM image_tags WHERE image_id = ?1)",
        params![asset_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Associates `tag_name` with the asset, creating the tag if needed.
/// Returns whether a row was inserted or changed.
pub fn write_association(
    conn: &Connection,
    asset_id: i64,
    tag_name: &str,
    confidence: f64,
    is_prediction: bool,
    mode: StoreWrite,
) -> Result<bool, AppError> {
    let tag_id = upsert_tag(conn, tag_name)?;

    let sql = match mode {
        StoreWrite::Replace => {
            "INSERT INTO image_tags (image_id, tag_id, confidence, is_prediction)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(image_id, tag_id) DO UPDATE SET
                 confidence = excluded.confidence,
                 is_prediction = excluded.is_prediction"
        }
        StoreWrite::InsertIfAbsent => {
            "INSERT OR IGNORE INTO image_tags (image_id, tag_id, confidence, is_prediction)
             VALUES (?1, ?2, ?3, ?4)"
        }
    };

    let changed = conn.execute(sql, params![asset_id, tag_id, confidence, is_prediction])?;
    Ok(changed > 0)
}

pub fn list_associations(conn: &Connection, asset_id: i64) -> Result<Vec<TagScore>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT t.name, it.confidence FROM tags t
         JOIN image_tags it ON t.id = it.tag_id
         WHERE it.image_id = ?1
         ORDER BY it.confidence DESC, t.name ASC",
    )?;
    let tags = stmt
        .query_map(params![asset_id], |row| {
            Ok(TagScore {
                name: row.get(0)?,
                confidence: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}
