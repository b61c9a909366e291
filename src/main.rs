use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use football_etl::column_mapping::ColumnMappings;
use football_etl::config::PipelineConfig;
use football_etl::pipeline;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    let mappings = ColumnMappings::load(config.column_mapping_path.as_deref())
        .context("unable to load column mappings")?;

    let mut pipeline = pipeline::http_football_pipeline(&config, mappings)
        .context("unable to build pipeline")?;
    let summary = pipeline.run().context("pipeline run failed")?;

    info!(
        tasks = ?summary.executed,
        combined = %config.combined_csv_path().display(),
        output = %config.team_perspective_csv_path().display(),
        "pipeline complete"
    );
    Ok(())
}
