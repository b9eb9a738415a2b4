use crate::config::{DatasetSpec, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Resolves which datasets to load based on `--only`/`--exclude` filters.
///
/// The result keeps configured order and never contains a disabled dataset.
pub fn resolve_datasets<'a>(
    config: &'a PipelineConfig,
    only: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
) -> Result<Vec<&'a DatasetSpec>> {
    match (only, exclude) {
        (Some(_), Some(_)) => Err(PipelineError::Config(
            "Cannot use both --only and --exclude at the same time".to_string(),
        )),
        (Some(only_list), None) => {
            let wanted = lookup_all(config, &only_list)?;
            if let Some(disabled) = wanted.iter().find(|d| !d.enabled) {
                return Err(PipelineError::Config(format!(
                    "dataset {} is disabled in the configuration",
                    disabled.identifier
                )));
            }

            let datasets: Vec<_> = config
                .enabled_datasets()
                .filter(|d| wanted.contains(d))
                .collect();
            tracing::debug!("loading only {:?}", identifiers(&datasets));
            Ok(datasets)
        }
        (None, Some(exclude_list)) => {
            let skipped = lookup_all(config, &exclude_list)?;
            let datasets: Vec<_> = config
                .enabled_datasets()
                .filter(|d| !skipped.contains(d))
                .collect();
            if datasets.is_empty() {
                return Err(PipelineError::Config(
                    "every enabled dataset is excluded".to_string(),
                ));
            }
            tracing::debug!("loading {:?} after exclusions", identifiers(&datasets));
            Ok(datasets)
        }
        (None, None) => Ok(config.enabled_datasets().collect()),
    }
}

fn lookup_all<'a>(config: &'a PipelineConfig, names: &[String]) -> Result<Vec<&'a DatasetSpec>> {
    names
        .iter()
        .map(|name| {
            config
                .dataset(name.trim())
                .ok_or_else(|| PipelineError::Config(format!("Unknown dataset: {}", name)))
        })
        .collect()
}

fn identifiers<'a>(datasets: &[&'a DatasetSpec]) -> Vec<&'a str> {
    datasets.iter().map(|d| d.identifier.as_str()).collect()
}
