//! Memsweep CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use memsweep::cli::{handle_error, Cli};
use memsweep::{ConfigLoader, ExperimentRunner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(err) = result {
        handle_error(err);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(samples) = cli.samples {
        config.sweep.samples = samples;
    }
    if !cli.workloads.is_empty() {
        config
            .workloads
            .retain(|w| cli.workloads.contains(&w.name));
        anyhow::ensure!(
            !config.workloads.is_empty(),
            "no configured workload matches {:?}",
            cli.workloads
        );
    }
    anyhow::ensure!(
        !config.workloads.is_empty(),
        "no workloads configured; add a `workloads` section to memsweep.yaml"
    );

    let runner = ExperimentRunner::new(config);
    runner.run(&cli.output_directory).await?;
    Ok(())
}
