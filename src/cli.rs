use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "airframes")]
#[command(version, about = "Load the FAA aircraft registry into SQLite")]
pub struct Cli {
    /// Config file (TOML); defaults to the per-user config if present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the archive and the unpacked files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// SQLite database to load into
    #[arg(long, global = true)]
    pub destination: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and unpack the registry archive
    Fetch,

    /// Replace the destination tables with the unpacked files
    Load(LoadArgs),

    /// Fetch, then load
    Sync(LoadArgs),

    /// List configured datasets
    ListDatasets,
}

#[derive(Args, Debug, Default)]
pub struct LoadArgs {
    /// Only load these datasets (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub only: Option<Vec<String>>,

    /// Skip these datasets (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Print the load summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load the configuration and apply command-line overrides
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(dest) = &self.destination {
            config = config.with_destination(dest);
        }
        Ok(config)
    }
}
