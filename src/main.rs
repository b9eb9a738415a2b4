use airframes::{
    cli::{Cli, Commands, LoadArgs},
    filter::resolve_datasets,
    logging,
    pipeline::{fetch, load},
    ConsoleUi, PipelineConfig,
};
use anyhow::{Context, Result};
use std::time::Instant;

fn main() -> Result<()> {
    logging::init_logging()?;
    let cli = Cli::parse_args();
    let config = cli.resolve_config().context("Failed to load configuration")?;
    let mut ui = ConsoleUi::new();

    match cli.command {
        Commands::Fetch => {
            let start = Instant::now();
            let report = fetch(&config, &mut ui).context("Fetch failed")?;
            println!(
                "Fetched {:?} ({} files) in {:.1}s",
                report.archive,
                report.extracted.len(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Load(args) => {
            run_load(&config, args, &mut ui)?;
        }

        Commands::Sync(args) => {
            fetch(&config, &mut ui).context("Fetch failed")?;
            run_load(&config, args, &mut ui)?;
        }

        Commands::ListDatasets => {
            println!("Datasets in {:?}:\n", config.data_dir);
            for dataset in &config.datasets {
                println!(
                    "  {:<10} -> {}.{:<10} {}",
                    dataset.file_glob(),
                    config.dataset_name,
                    dataset.table_name(),
                    if dataset.enabled { "" } else { "(disabled)" }
                );
            }
        }
    }

    Ok(())
}

fn run_load(config: &PipelineConfig, args: LoadArgs, ui: &mut ConsoleUi) -> Result<()> {
    let datasets = resolve_datasets(config, args.only, args.exclude)?;
    let info = load(config, &datasets, ui).context("Load failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info);
    }
    Ok(())
}
