//! clinical-etl CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use clinical_etl::{
    commands::{
        cmd_aggregates, cmd_init, cmd_list_jobs, cmd_report, cmd_run, cmd_status,
        print_aggregates, print_init, print_jobs, print_report, print_run, print_status,
        RunOptions,
    },
    config::Config,
    error::{Error, Result},
    jobs::{JobService, JobStatus},
    progress::LogWriterFactory,
    store::EtlDb,
};
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "clinical-etl")]
#[command(version, about = "Batch ETL for clinical measurement CSV files", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CLINICAL_ETL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Process a CSV file and wait for the job to finish
    Run {
        /// CSV file, relative to the configured data directory unless absolute
        file: String,

        /// Job ID (reuse to re-run a job idempotently)
        #[arg(long)]
        job_id: Option<String>,

        /// Study the file belongs to
        #[arg(long)]
        study_id: Option<String>,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the status of a job
    Status {
        /// Job ID
        job_id: String,
    },

    /// List recent jobs
    Jobs {
        /// Maximum number of jobs
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show stored results and quality reports for a job
    Report {
        /// Job ID
        job_id: String,
    },

    /// List per-participant measurement aggregates
    Aggregates {
        /// Only this study
        #[arg(long)]
        study: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().map(init_base_dir);
        let config = cmd_init(base_dir, force).await?;
        if cli.json {
            println!(
                "{}",
                serde_json::json!({
                    "configFile": config.paths.config_file,
                    "dbFile": config.paths.db_file,
                })
            );
        } else {
            print_init(&config);
        }
        return Ok(());
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "clinical-etl", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = EtlDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Run {
            file,
            job_id,
            study_id,
            no_progress,
        } => {
            let service = JobService::new(config.clone(), db);
            let options = RunOptions {
                job_id,
                study_id,
                show_progress: !no_progress && !cli.json,
            };

            let record = cmd_run(&config, &service, &file, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_run(&record);
            }

            if record.status == JobStatus::Failed {
                std::process::exit(1);
            }
        }

        Commands::Status { job_id } => {
            let service = JobService::new(config, db);
            let view = cmd_status(&service, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_status(&view);
            }
        }

        Commands::Jobs { limit } => {
            let jobs = cmd_list_jobs(&db, limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print_jobs(&jobs);
            }
        }

        Commands::Report { job_id } => {
            let report = cmd_report(&db, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Aggregates { study } => {
            let rows = cmd_aggregates(&db, study.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_aggregates(&rows);
            }
        }
    }

    Ok(())
}

/// `--config` may name either a .toml file or a directory
fn init_base_dir(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
