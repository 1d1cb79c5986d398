use crate::error::AppError;
use crate::metadata::ImageUpload;
use crate::walker;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Walks `root` and turns every allowed image file into an upload, reading
/// files on a pool of `num_workers` threads. Files that cannot be read are
/// logged and skipped.
pub fn prepare_directory(
    root: &Path,
    allowed_extensions: &HashSet<String>,
    num_workers: usize,
) -> Result<Vec<ImageUpload>, AppError> {
    let (paths_tx, paths_rx) = crossbeam_channel::unbounded();
    walker::start_walking(root, allowed_extensions, paths_tx)?;

    let paths: Vec<PathBuf> = paths_rx.iter().collect();
    log::info!("Preparing {} files with {} workers", paths.len(), num_workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers.max(1))
        .build()
        .map_err(|e| AppError::Generic(e.to_string()))?;

    let uploads: Vec<ImageUpload> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| match prepare_upload(path, None, None) {
                Ok(upload) => Some(upload),
                Err(e) => {
                    log::warn!("Failed to prepare image {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    });

    log::info!("Prepared {} uploads.", uploads.len());
    Ok(uploads)
}

pub fn prepare_upload(
    path: &Path,
    title: Option<String>,
    description: Option<String>,
) -> Result<ImageUpload, AppError> {
    log::trace!("Reading image file: {:?}", path);
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(AppError::Validation(format!("{:?} is empty", path)));
    }

    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    if content_type.type_() != mime::IMAGE {
        return Err(AppError::Validation(format!(
            "{:?} is not an image ({})",
            path, content_type
        )));
    }

    let (width, height) = match image::image_dimensions(path) {
        Ok((w, h)) => (Some(w), Some(h)),
        Err(e) => {
            log::debug!("Could not get dimensions for {:?}: {}", path, e);
            (None, None)
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone())
    });

    log::debug!(
        "Prepared {:?}: {} bytes, {}, {:?}x{:?}",
        path,
        bytes.len(),
        content_type,
        width,
        height
    );

    Ok(ImageUpload {
        bytes,
        file_name,
        content_type: content_type.essence_str().to_string(),
        title,
        description: description.unwrap_or_default(),
        width,
        height,
    })
}
