//! monaco CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "monaco")]
#[command(about = "Deploy configuration as code", long_about = None)]
struct Cli {
    /// Emit logs and reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the configs of a manifest
    Deploy {
        /// Path to the JSON manifest
        manifest: PathBuf,
        /// Only deploy these environments
        #[arg(short, long)]
        environment: Vec<String>,
        /// Keep deploying configs that do not depend on a failed one
        #[arg(long, env = "MONACO_CONTINUE_ON_ERROR")]
        continue_on_error: bool,
        /// Deploy environments one after another
        #[arg(long)]
        sequential: bool,
        /// Abandon the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the deployment order of each environment
    Order {
        /// Path to the JSON manifest
        manifest: PathBuf,
        /// Only show these environments
        #[arg(short, long)]
        environment: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Deploy {
            manifest,
            environment,
            continue_on_error,
            sequential,
            timeout,
        } => {
            let options = commands::deploy::DeployOptions {
                environments: environment,
                continue_on_error,
                sequential,
                timeout,
                json: cli.json,
            };
            commands::deploy::run(&manifest, options).await?;
        }
        Commands::Order {
            manifest,
            environment,
        } => {
            commands::order::run(&manifest, &environment, cli.json)?;
        }
    }

    Ok(())
}
