pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod ui;
pub mod writer;

pub use cli::{Cli, Commands};
pub use config::{DatasetSpec, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{fetch, load, FetchReport, LoadInfo, TableLoad};
pub use ui::{ConsoleUi, Phase, SilentUi, Ui};
