//! Delimited text reader for the registry files.
//!
//! The header row names the columns; every cell stays text. Column names are
//! normalised to lower snake_case so they can be used as SQL identifiers
//! without surprises (`N-NUMBER` becomes `n_number`).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// One data row, cell by cell. Empty cells are `None`.
pub type Row = Vec<Option<String>>;

pub struct DelimitedReader<R: Read> {
    source: PathBuf,
    reader: csv::Reader<R>,
    columns: Vec<String>,
}

impl DelimitedReader<BufReader<File>> {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_reader(BufReader::new(file), delimiter, path)
    }
}

impl<R: Read> DelimitedReader<R> {
    /// Wrap a reader and consume its header row. `source` labels errors.
    pub fn from_reader(reader: R, delimiter: u8, source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers = reader.byte_headers().map_err(|e| PipelineError::Csv {
            path: source.clone(),
            source: e,
        })?;

        if headers.is_empty() {
            return Err(PipelineError::NoHeader { path: source });
        }

        let raw: Vec<String> = headers
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();
        let columns = normalize_columns(&raw);

        Ok(Self {
            source,
            reader,
            columns,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Iterate the data rows. A row whose width differs from the header is an error.
    pub fn rows(&mut self) -> impl Iterator<Item = Result<Row>> + '_ {
        let source = &self.source;
        self.reader.byte_records().map(move |record| {
            let record = record.map_err(|e| PipelineError::Csv {
                path: source.clone(),
                source: e,
            })?;
            Ok(record.iter().map(cell).collect())
        })
    }
}

fn cell(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Turn a raw header into a lower snake_case identifier
pub fn normalize_column_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !name.is_empty() {
                name.push('_');
            }
            pending_separator = false;
            name.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    name
}

/// Normalise a header row. Blank names become `unnamed_<index>` (0-based) and
/// repeated names get a numeric suffix.
pub fn normalize_columns(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();

    raw.iter()
        .enumerate()
        .map(|(idx, header)| {
            let mut base = normalize_column_name(header);
            if base.is_empty() {
                base = format!("unnamed_{}", idx);
            }

            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}
