//! The two stages: fetch the archive, then load the registry tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::{DatasetSpec, PipelineConfig};
use crate::download::{extract_zip, DataDir, RegistryClient};
use crate::error::Result;
use crate::parser::DelimitedReader;
use crate::ui::{Phase, Ui};
use crate::writer::{LoadRecord, SqliteWriter};

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub archive: PathBuf,
    pub bytes: u64,
    pub extracted: Vec<PathBuf>,
}

/// Download the archive, unpack it into the data directory and check that
/// every enabled dataset has exactly one source file.
pub fn fetch(config: &PipelineConfig, ui: &mut impl Ui) -> Result<FetchReport> {
    let data_dir = DataDir::create(&config.data_dir)?;
    let client = RegistryClient::new(&config.archive)?;
    let archive = config.archive_path();

    ui.set_phase(Phase::Downloading);
    ui.set_info(client.url());
    let bytes = client.download_archive(&archive, ui)?;

    ui.set_phase(Phase::Extracting);
    let extracted = extract_zip(&archive, data_dir.root(), ui)?;

    ui.set_phase(Phase::Verifying);
    for (dataset, path) in data_dir.verify(config.enabled_datasets())? {
        tracing::debug!("{} -> {}", dataset.identifier, path.display());
    }

    ui.set_phase(Phase::Complete);
    tracing::info!(
        "fetched {} ({} bytes, {} files)",
        archive.display(),
        bytes,
        extracted.len()
    );

    Ok(FetchReport {
        archive,
        bytes,
        extracted,
    })
}

/// Outcome of replacing one table
#[derive(Debug, Clone, Serialize)]
pub struct TableLoad {
    pub identifier: String,
    pub table_name: String,
    pub source_file: PathBuf,
    pub row_count: u64,
}

/// Summary of one loader run
#[derive(Debug, Clone, Serialize)]
pub struct LoadInfo {
    pub load_id: String,
    pub pipeline_name: String,
    pub dataset_name: String,
    pub destination: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableLoad>,
}

impl LoadInfo {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }
}

impl fmt::Display for LoadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pipeline {} load {} to {:?} (dataset {})",
            self.pipeline_name, self.load_id, self.destination, self.dataset_name
        )?;
        for table in &self.tables {
            writeln!(
                f,
                "  {:<10} {:>9} rows from {}",
                table.table_name,
                table.row_count,
                table.source_file.display()
            )?;
        }
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        write!(
            f,
            "{} tables, {} rows in {:.1}s",
            self.tables.len(),
            self.total_rows(),
            elapsed
        )
    }
}

/// Replace the destination table of every given dataset, in order.
///
/// The first failure stops the run: tables already replaced stay replaced,
/// the remaining ones are not touched.
pub fn load(
    config: &PipelineConfig,
    datasets: &[&DatasetSpec],
    ui: &mut impl Ui,
) -> Result<LoadInfo> {
    let started_at = Utc::now();
    let load_id = new_load_id(&started_at);
    let data_dir = DataDir::open(&config.data_dir);
    let mut writer = SqliteWriter::open(&config.destination, &config.dataset_name)?;

    ui.set_phase(Phase::Loading);
    tracing::info!(
        "load {} into {} ({} datasets)",
        load_id,
        writer.path().display(),
        datasets.len()
    );

    let mut tables = Vec::with_capacity(datasets.len());
    for (idx, dataset) in datasets.iter().enumerate() {
        ui.set_info(format!(
            "{} ({}/{})",
            dataset.identifier,
            idx + 1,
            datasets.len()
        ));
        let table = load_table(&mut writer, &data_dir, dataset, config, &load_id, ui)?;
        ui.log(format!("{}: {} rows", table.table_name, table.row_count));
        tables.push(table);
    }

    writer.finalize()?;
    ui.set_phase(Phase::Complete);

    Ok(LoadInfo {
        load_id,
        pipeline_name: config.pipeline_name.clone(),
        dataset_name: config.dataset_name.clone(),
        destination: config.destination.clone(),
        started_at,
        finished_at: Utc::now(),
        tables,
    })
}

fn load_table(
    writer: &mut SqliteWriter,
    data_dir: &DataDir,
    dataset: &DatasetSpec,
    config: &PipelineConfig,
    load_id: &str,
    ui: &mut impl Ui,
) -> Result<TableLoad> {
    let source_file = data_dir.locate(dataset)?;
    let table_name = dataset.table_name();
    tracing::info!("{} <- {}", table_name, source_file.display());

    let mut reader = DelimitedReader::open(&source_file, config.delimiter as u8)?;
    let columns = reader.columns().to_vec();
    tracing::debug!("{} columns: {:?}", table_name, columns);

    let loaded_at = Utc::now().to_rfc3339();
    let record = LoadRecord {
        load_id,
        pipeline_name: &config.pipeline_name,
        source_file: &source_file,
        loaded_at: &loaded_at,
    };

    let row_count = writer.replace_table(&table_name, &columns, reader.rows(), &record, |n| {
        ui.set_progress(n, 0, format!("{}: {} rows", table_name, n))
    })?;
    ui.clear_progress();

    tracing::info!("{}: replaced with {} rows", table_name, row_count);

    Ok(TableLoad {
        identifier: dataset.identifier.clone(),
        table_name,
        source_file,
        row_count,
    })
}

/// Load ids are the start time as fractional unix seconds
fn new_load_id(started_at: &DateTime<Utc>) -> String {
    format!(
        "{}.{:06}",
        started_at.timestamp(),
        started_at.timestamp_subsec_micros()
    )
}
