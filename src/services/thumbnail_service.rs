use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::data::repository;
use crate::error::AppError;
use crate::models::task::TaskEvent;
use crate::paths::path_string;
use crate::services::image_io;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ThumbnailReport {
    pub generated: usize,
    pub missing: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Largest size that fits `(width, height)` inside `bounds` with the aspect
/// ratio kept. Images already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, bounds: [u32; 2]) -> (u32, u32) {
    let [max_w, max_h] = bounds;
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width).min(max_w), scaled(height).min(max_h))
}

/// Decodes `path` and scales it down into `bounds`.
pub fn render_preview(path: &Path, bounds: [u32; 2]) -> Result<RgbImage, AppError> {
    let rgb = image_io::load_oriented(path)?.into_rgb8();
    let (width, height) = fit_within(rgb.width(), rgb.height(), bounds);
    if (width, height) == rgb.dimensions() {
        return Ok(rgb);
    }
    Ok(image::imageops::resize(&rgb, width, height, FilterType::Lanczos3))
}

/// Produces previews for `items` in order.
///
/// An asset whose file is gone is removed from the catalog and reported with
/// [`TaskEvent::FileMissing`]. Files that fail to decode produce no event.
pub fn run_thumbnails<F>(
    conn: &Connection,
    items: &[(i64, PathBuf)],
    bounds: [u32; 2],
    cancel: &CancellationToken,
    mut on_event: F,
) -> ThumbnailReport
where
    F: FnMut(TaskEvent),
{
    let mut report = ThumbnailReport::default();

    for (asset_id, path) in items {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let asset_id = *asset_id;

        if !path.exists() {
            if let Err(err) = repository::delete_asset(conn, asset_id) {
                tracing::warn!(asset_id, error = %err, "failed to drop missing asset");
            }
            report.missing += 1;
            on_event(TaskEvent::FileMissing {
                asset_id,
                path: path_string(path),
            });
            continue;
        }

        match render_preview(path, bounds) {
            Ok(preview) => {
                report.generated += 1;
                on_event(TaskEvent::ThumbnailReady { asset_id, preview });
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no preview");
                report.failed += 1;
            }
        }
    }

    tracing::debug!(
        generated = report.generated,
        missing = report.missing,
        failed = report.failed,
        cancelled = report.cancelled,
        "thumbnail run finished"
    );
    report
}
