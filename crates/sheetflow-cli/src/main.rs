mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sheetflow",
    version,
    about = "Declarative tabular ETL: fetch, interpret, validate, load into SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipelines of a project
    Run {
        /// Path to project YAML file
        project: PathBuf,
        /// Run only this pipeline (repeatable)
        #[arg(long = "pipeline", value_name = "NAME")]
        pipelines: Vec<String>,
    },
    /// Validate a project and assemble its pipelines without running them
    Check {
        /// Path to project YAML file
        project: PathBuf,
    },
    /// Print each pipeline's block execution order
    Graph {
        /// Path to project YAML file
        project: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { project, pipelines } => commands::run::execute(&project, pipelines).await,
        Commands::Check { project } => {
            commands::check::execute(&project)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Graph { project } => {
            commands::graph::execute(&project)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
