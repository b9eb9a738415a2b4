use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};
use crate::ui::Ui;

/// Extract every file of a zip archive into the destination directory.
///
/// Directory prefixes inside the archive are dropped and existing files of
/// the same name are overwritten. Returns the extracted paths.
pub fn extract_zip(zip_path: &Path, dest_dir: &Path, ui: &mut impl Ui) -> Result<Vec<PathBuf>> {
    let archive_err = |source| PipelineError::Archive {
        path: zip_path.to_path_buf(),
        source,
    };

    let file = File::open(zip_path).map_err(|e| PipelineError::io(zip_path, e))?;
    let reader = BufReader::new(file);
    let mut archive = ZipArchive::new(reader).map_err(archive_err)?;

    fs::create_dir_all(dest_dir).map_err(|e| PipelineError::io(dest_dir, e))?;

    let total_files = archive.len();
    let mut extracted = Vec::with_capacity(total_files);

    for i in 0..total_files {
        let mut file = archive.by_index(i).map_err(archive_err)?;

        if file.is_dir() {
            continue;
        }

        // Get the file name, stripping any directory prefix
        let name = file.name().to_string();
        let Some(file_name) = Path::new(&name).file_name().map(|n| n.to_owned()) else {
            tracing::warn!("skipping archive entry without a file name: {}", name);
            continue;
        };

        let dest_path = dest_dir.join(&file_name);
        let mut dest_file =
            File::create(&dest_path).map_err(|e| PipelineError::io(&dest_path, e))?;

        io::copy(&mut file, &mut dest_file).map_err(|e| PipelineError::io(&dest_path, e))?;

        tracing::debug!("extracted {} -> {}", name, dest_path.display());
        ui.set_progress(i as u64 + 1, total_files as u64, "Extracting");
        extracted.push(dest_path);
    }

    ui.clear_progress();
    ui.log(format!("Extracted {} files", extracted.len()));
    Ok(extracted)
}
