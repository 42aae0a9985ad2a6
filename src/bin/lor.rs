//! CLI entry point: runs a fresh simulation or loads a prior snapshot, then prints the
//! post-run analysis (spec.md §6, §4.9).

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lines_of_rings::config::{Args, Config};
use lines_of_rings::{analyze, persistence, runtime};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;

    let snapshot = if config.load_from.is_empty() {
        tracing::info!(
            traders = config.traders,
            alpha = config.bad_behavior,
            "starting simulation"
        );
        let system = runtime::init_system(&config).await?;
        tracing::info!("simulation initialized");

        tracing::info!(seconds = config.run_time_secs, "running simulation");
        runtime::run_simulation(system.clone(), &config).await?;
        tracing::info!("simulation stopped");

        let snapshot = system.lock().await.snapshot();
        persistence::save(&snapshot, &config.save_to)?;
        tracing::info!(path = %config.save_to, "system saved");
        snapshot
    } else {
        let snapshot = persistence::load(&config.load_from)?;
        tracing::info!(path = %config.load_from, "system loaded");
        snapshot
    };

    analyze::analyze(&snapshot);
    Ok(())
}
