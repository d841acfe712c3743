//! qase-report CLI - publish test results to Qase TestOps.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use qase_reporter::adapter::JunitAdapter;
use qase_reporter::config::{self, Config, Mode};
use qase_reporter::logging::init_logging;
use qase_reporter::reporter::print_summary;
use qase_reporter::{QaseReporter, RunState};

#[derive(Parser)]
#[command(name = "qase-report")]
#[command(about = "Publish test results to Qase TestOps", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "qase.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import JUnit XML files and publish the results
    Import {
        /// JUnit XML files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Override the reporting mode (testops, report, off)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Publish into an existing run
        #[arg(long)]
        run_id: Option<u64>,
    },

    /// Create a test run and print its id
    StartRun {
        /// Run title, `%DATE%` is replaced with the current time
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Mark a test run as complete
    CompleteRun {
        /// Run to complete
        #[arg(long)]
        run_id: u64,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Project code
        #[arg(short, long, default_value = "DEMO")]
        project: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            files,
            mode,
            run_id,
        } => {
            let mut config = load(&cli.config, cli.verbose)?;
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if run_id.is_some() {
                config.testops.run.id = run_id;
            }
            import(config, &files).await
        }
        Commands::StartRun { title } => {
            let mut config = load(&cli.config, cli.verbose)?;
            config.mode = Mode::TestOps;
            if let Some(title) = title {
                config.testops.run.title = title;
            }
            start_run(config).await
        }
        Commands::CompleteRun { run_id } => {
            let mut config = load(&cli.config, cli.verbose)?;
            config.mode = Mode::TestOps;
            config.testops.run.id = Some(run_id);
            config.testops.run.complete = Some(true);
            complete_run(config).await
        }
        Commands::Validate => {
            init_logging(cli.verbose);
            validate_config(&cli.config)
        }
        Commands::Init { project, force } => init_config(&cli.config, &project, force),
    }
}

/// Loads the config file (if present) plus environment, then sets up
/// logging with the combined debug flag.
fn load(path: &Path, verbose: bool) -> Result<Config> {
    let config = config::load_with_env(Some(path))
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    init_logging(verbose || config.debug);
    debug!(path = %path.display(), mode = %config.mode, "loaded configuration");
    Ok(config)
}

async fn import(config: Config, files: &[PathBuf]) -> Result<()> {
    let adapter = JunitAdapter::new();
    let mut results = Vec::new();
    for file in files {
        let parsed = adapter
            .parse_file(file)
            .with_context(|| format!("Failed to import {}", file.display()))?;
        info!(file = %file.display(), results = parsed.len(), "imported JUnit XML");
        results.extend(parsed);
    }

    let reporter = QaseReporter::from_config(&config);
    reporter.start_test_run().await;
    for result in results {
        reporter.add_test_result(result);
    }

    let spinner = spinner("Publishing results...");
    let summary = reporter.publish().await;
    reporter.complete().await;
    spinner.finish_and_clear();

    print_summary(reporter.mode(), &summary);
    Ok(())
}

async fn start_run(config: Config) -> Result<()> {
    let reporter = QaseReporter::from_config(&config);
    reporter.start_test_run().await;

    match reporter.run_state() {
        Some(RunState::Resolved(id)) => println!("{}", id),
        state => eprintln!(
            "Could not start a test run ({}), see the log for details",
            state.map_or_else(|| "testops disabled".to_string(), |s| format!("{:?}", s))
        ),
    }
    Ok(())
}

async fn complete_run(config: Config) -> Result<()> {
    let run_id = config.testops.run.id.unwrap_or_default();
    let reporter = QaseReporter::from_config(&config);
    reporter.start_test_run().await;
    reporter.complete().await;

    match reporter.run_state() {
        Some(RunState::Complete) => println!("Completed run {}", run_id),
        _ => eprintln!("Run {} was not completed, see the log for details", run_id),
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::load_with_env(Some(config_path))
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Mode: {}", config.mode);
            println!("  Fallback: {}", config.fallback);
            if config.mode == Mode::TestOps {
                let testops = &config.testops;
                println!("  Project: {}", testops.project.as_deref().unwrap_or_default());
                println!("  API: {}", testops.api_base_url());
                println!("  Batch size: {}", testops.batch.effective_size());
                println!("  Upload attachments: {}", testops.upload_attachments);
                if let Some(id) = testops.run.id {
                    println!("  Run: {}", id);
                }
            }
            if config.mode == Mode::Report || config.fallback == Mode::Report {
                println!("  Report path: {}", config.report.resolved_path().display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(path: &Path, project: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        eprintln!(
            "{} already exists. Remove it first or pass --force.",
            path.display()
        );
        std::process::exit(1);
    }

    let config = format!(
        r#"# Reporting mode: testops, report or off
mode = "testops"
# Used when testops cannot start
fallback = "report"

[testops]
project = "{}"
# Prefer QASE_API_TOKEN over storing the token here
# api_token = ""
upload_attachments = true

[testops.run]
title = "Automated run %DATE%"
# Publish into an existing run instead of creating one
# id = 1
complete = true

[testops.batch]
size = 200

[report]
path = "build/qase-report"
"#,
        project
    );

    std::fs::write(path, config)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    println!();
    println!("Set QASE_API_TOKEN, then run:");
    println!("  qase-report import junit.xml");

    Ok(())
}

fn spinner(message: &'static str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
