use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DatasetSpec;
use crate::error::{PipelineError, Result};

/// Local data directory holding the archive and the unpacked registry files
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Open the data directory, creating it if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PipelineError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Open an existing data directory without touching the filesystem
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the single source file for a dataset.
    ///
    /// Matching is by `*<identifier>.txt` against regular files directly in
    /// the data directory. No match and more than one match are both errors.
    pub fn locate(&self, dataset: &DatasetSpec) -> Result<PathBuf> {
        let pattern = format!(
            "{}/*{}.txt",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            glob::Pattern::escape(&dataset.identifier)
        );

        let paths = glob::glob(&pattern)
            .map_err(|e| PipelineError::Config(format!("bad file pattern {}: {}", pattern, e)))?;

        let mut matches = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                PipelineError::io(path, e.into())
            })?;
            if path.is_file() {
                matches.push(path);
            }
        }
        matches.sort();

        match matches.len() {
            0 => Err(PipelineError::MissingDatasetFile {
                identifier: dataset.identifier.clone(),
                pattern: dataset.file_glob(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(PipelineError::AmbiguousDatasetFile {
                identifier: dataset.identifier.clone(),
                pattern: dataset.file_glob(),
                matches,
            }),
        }
    }

    /// Check that every given dataset resolves to exactly one file
    pub fn verify<'a>(
        &self,
        datasets: impl IntoIterator<Item = &'a DatasetSpec>,
    ) -> Result<Vec<(&'a DatasetSpec, PathBuf)>> {
        datasets
            .into_iter()
            .map(|dataset| self.locate(dataset).map(|path| (dataset, path)))
            .collect()
    }
}
