use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::models::asset::NewAsset;
use crate::paths::{path_string, split_path};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct ScannedImage {
    pub full_path: String,
    pub file_name: String,
    pub dir_path: String,
    pub size: u64,
}

impl ScannedImage {
    pub fn to_new_asset(&self) -> NewAsset {
        NewAsset {
            file_path: self.full_path.clone(),
            file_name: self.file_name.clone(),
            dir_path: self.dir_path.clone(),
            file_size: i64::try_from(self.size).unwrap_or(i64::MAX),
        }
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Builds a scan record for a single file, or `None` if it is not a readable
/// image file.
pub fn scanned_image_from_path(path: &Path) -> Option<ScannedImage> {
    if !is_image_file(path) {
        return None;
    }
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
            return None;
        }
    };
    if !metadata.is_file() {
        return None;
    }

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let (file_name, dir_path) = split_path(&canonical)?;
    Some(ScannedImage {
        full_path: path_string(&canonical),
        file_name,
        dir_path,
        size: metadata.len(),
    })
}

fn entry_to_scanned(entry: &DirEntry) -> Option<ScannedImage> {
    if entry.file_type().is_dir() || !is_image_file(entry.path()) {
        return None;
    }
    let metadata = match std::fs::metadata(entry.path()) {
        Ok(m) => m,
        Err(err) => {
            tracing::warn!(path = %entry.path().display(), error = %err, "skipping unreadable file");
            return None;
        }
    };
    if !metadata.is_file() {
        return None;
    }

    let (file_name, dir_path) = split_path(entry.path())?;
    Some(ScannedImage {
        full_path: path_string(entry.path()),
        file_name,
        dir_path,
        size: metadata.len(),
    })
}

/// Lazily walks `root` and yields every image file found, in walk order.
///
/// With `recursive == false` only the root's immediate files are visited.
/// A missing root yields nothing; unreadable entries are logged and skipped.
pub fn scan_directory(root: &Path, recursive: bool) -> impl Iterator<Item = ScannedImage> {
    let root: Option<PathBuf> = match root.canonicalize() {
        Ok(p) if p.is_dir() => Some(p),
        Ok(p) => {
            tracing::warn!(root = %p.display(), "scan root is not a directory");
            None
        }
        Err(err) => {
            tracing::warn!(root = %root.display(), error = %err, "scan root does not exist");
            None
        }
    };

    root.into_iter().flat_map(move |root| {
        let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }
        walker.into_iter().filter_map(|entry| match entry {
            Ok(entry) => entry_to_scanned(&entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
    })
}
