//! Pipeline configuration.
//!
//! Everything the two stages need (archive location, request headers, local
//! data directory, destination and the dataset list) lives in one immutable
//! [`PipelineConfig`]. The defaults reproduce the FAA registry setup; a TOML
//! file can override any field.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const DEFAULT_ARCHIVE_URL: &str = "https://registry.faa.gov/database/ReleasableAircraft.zip";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://registry.faa.gov/aircraftinquiry/";

/// Registry files in archive order. `DEREG` ships in the archive but is not loaded.
pub const DEFAULT_DATASETS: &[(&str, bool)] = &[
    ("ACFTREF", true),
    ("DEALER", true),
    ("DEREG", false),
    ("DOCINDEX", true),
    ("ENGINE", true),
    ("MASTER", true),
    ("RESERVED", true),
];

/// Where the archive comes from and how to ask for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSource {
    pub url: String,
    /// File name of the downloaded archive inside the data directory
    pub file_name: String,
    pub user_agent: String,
    pub referer: String,
    pub accept_encoding: String,
}

impl Default for ArchiveSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_ARCHIVE_URL.to_string(),
            file_name: "ReleasableAircraft.zip".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            accept_encoding: "compress, gzip".to_string(),
        }
    }
}

/// One registry file and whether it is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub identifier: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl DatasetSpec {
    pub fn new(identifier: impl Into<String>, enabled: bool) -> Self {
        Self {
            identifier: identifier.into(),
            enabled,
        }
    }

    /// Destination table name
    pub fn table_name(&self) -> String {
        self.identifier.to_lowercase()
    }

    /// Glob matched against file names in the data directory
    pub fn file_glob(&self) -> String {
        format!("*{}.txt", self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    /// Schema namespace the tables are created in
    pub dataset_name: String,
    /// Holds the downloaded archive and the unpacked files
    pub data_dir: PathBuf,
    /// SQLite database file
    pub destination: PathBuf,
    pub delimiter: char,
    pub archive: ArchiveSource,
    pub datasets: Vec<DatasetSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "load_airframes".to_string(),
            dataset_name: "src_airframes".to_string(),
            data_dir: PathBuf::from("./data"),
            destination: PathBuf::from("./data/airframes.sqlite"),
            delimiter: ',',
            archive: ArchiveSource::default(),
            datasets: DEFAULT_DATASETS
                .iter()
                .map(|(id, enabled)| DatasetSpec::new(*id, *enabled))
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// used when present, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match user_config_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!("using config file {}", path.display());
                    Self::from_file(&path)?
                }
                _ => Self::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_data_dir(self, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..self
        }
    }

    pub fn with_destination(self, destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            ..self
        }
    }

    pub fn with_archive_url(self, url: impl Into<String>) -> Self {
        Self {
            archive: ArchiveSource {
                url: url.into(),
                ..self.archive
            },
            ..self
        }
    }

    /// Datasets that are loaded, in configured order
    pub fn enabled_datasets(&self) -> impl Iterator<Item = &DatasetSpec> {
        self.datasets.iter().filter(|d| d.enabled)
    }

    pub fn dataset(&self, identifier: &str) -> Option<&DatasetSpec> {
        self.datasets
            .iter()
            .find(|d| d.identifier.eq_ignore_ascii_case(identifier))
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive.file_name)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.dataset_name) {
            return Err(PipelineError::Config(format!(
                "dataset_name {:?} must be a plain identifier",
                self.dataset_name
            )));
        }
        if ["main", "temp"].contains(&self.dataset_name.to_lowercase().as_str()) {
            return Err(PipelineError::Config(format!(
                "dataset_name {:?} is reserved by SQLite",
                self.dataset_name
            )));
        }
        if !self.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "delimiter {:?} must be a single ASCII character",
                self.delimiter
            )));
        }
        if self.archive.url.trim().is_empty() {
            return Err(PipelineError::Config("archive url is empty".to_string()));
        }
        let file_name = Path::new(&self.archive.file_name);
        if file_name.file_name() != Some(file_name.as_os_str()) {
            return Err(PipelineError::Config(format!(
                "archive file_name {:?} must be a bare file name",
                self.archive.file_name
            )));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            let valid = !dataset.identifier.is_empty()
                && !dataset.identifier.starts_with('_')
                && dataset
                    .identifier
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(PipelineError::Config(format!(
                    "dataset identifier {:?} may only contain letters, digits, '_' and '-', and may not start with '_'",
                    dataset.identifier
                )));
            }
            if !seen.insert(dataset.table_name()) {
                return Err(PipelineError::Config(format!(
                    "dataset identifier {} is listed twice",
                    dataset.identifier
                )));
            }
        }

        if self.enabled_datasets().next().is_none() {
            return Err(PipelineError::Config("no dataset is enabled".to_string()));
        }

        Ok(())
    }
}

/// Per-user config file, e.g. `~/.config/airframes/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "airframes").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
