use crate::error::AppError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn start_walking(
    root: &Path,
    allowed_extensions: &HashSet<String>,
    paths_tx: crossbeam_channel::Sender<PathBuf>,
) -> Result<(), AppError> {
    log::info!("Starting file discovery in {:?}", root);
    log::debug!("Configured allowed extensions: {:?}", allowed_extensions);

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }

        let path = entry.path();
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if allowed_extensions.contains(&ext.to_lowercase()) => {
                log::debug!("Queueing image file: {:?}", path);
                paths_tx.send(path.to_path_buf())?;
            }
            Some(_) => log::trace!("Skipping file due to unsupported extension: {:?}", path),
            None => log::trace!("Skipping file with no extension: {:?}", path),
        }
    }

    log::info!("File discovery complete.");
    Ok(())
}
