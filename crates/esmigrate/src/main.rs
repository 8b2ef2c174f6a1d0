//! esmigrate CLI
//!
//! Streams documents between Elasticsearch clusters.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use esmigrate::config::CONFIG_TEMPLATE;
use esmigrate::migration::probe_both;
use esmigrate::{Migration, MigrationConfig, StreamEnd};

#[derive(Parser)]
#[command(name = "esmigrate")]
#[command(version)]
#[command(about = "Migrate documents between Elasticsearch clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bulk writer count override
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE", env = "ESMIGRATE_CONFIG")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE", env = "ESMIGRATE_CONFIG")]
        config: PathBuf,

        /// Also connect to both clusters and report their dialects
        #[arg(long)]
        probe: bool,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { config } => run_migration(&config, cli.workers).await,
        Commands::Validate { config, probe } => validate_config(&config, probe).await,
        Commands::Init { output } => generate_config(&output),
    }
}

fn load_config(path: &Path, workers: Option<usize>) -> anyhow::Result<MigrationConfig> {
    info!("Loading configuration from {:?}", path);
    let mut config = MigrationConfig::from_file(path)?;
    if let Some(workers) = workers {
        config.options.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn run_migration(config_path: &Path, workers: Option<usize>) -> anyhow::Result<()> {
    let config = load_config(config_path, workers)?;
    let migration = Migration::new(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling migration");
            on_signal.cancel();
        }
    });

    info!("Starting migration...");
    let stats = match migration.run(&cancel).await {
        Ok(stats) => stats,
        Err(e) => {
            error!("migration failed: {}", e);
            return Err(e.into());
        }
    };

    println!("\nMigration Complete!");
    println!("   Read:       {}", stats.read);
    println!("   Written:    {}", stats.written);
    println!("   Rejected:   {}", stats.rejected);
    println!("   Failed:     {}", stats.failed);
    println!("   Batches:    {}", stats.batches);
    println!("   Duration:   {:.2}s", stats.duration_secs);
    println!("   Throughput: {:.0} docs/sec", stats.throughput());
    if let StreamEnd::Aborted(reason) = &stats.stream_end {
        println!("   Scroll aborted early: {}", reason);
    }

    Ok(())
}

async fn validate_config(config_path: &Path, probe: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, None)?;

    println!("Configuration is valid!");
    println!("   Source:  {}", config.source.url);
    println!("   Target:  {}", config.target.url);
    println!("   Indices: {}", config.options.indices);
    println!("   Workers: {}", config.options.workers);

    if probe {
        let (source, target) = probe_both(&config).await?;
        println!("   Source dialect: {}", source.dialect());
        println!("   Target dialect: {}", target.dialect());
    }

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, CONFIG_TEMPLATE)?;
    println!("Generated configuration: {:?}", output);
    println!("   Edit the file and run: esmigrate run --config {:?}", output);
    Ok(())
}
