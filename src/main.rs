use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use perfbisect::bisect::{Driver, GitBisect, SearchOutcome};
use perfbisect::cli::Cli;
use perfbisect::config::BisectConfig;
use perfbisect::evaluator::Evaluator;
use perfbisect::executor::ProcessRunner;
use perfbisect::report;
use std::fs::{self, File};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit code for configuration and setup errors
const EXIT_USAGE: u8 = 2;

/// Log to stderr and to the run's main log file
fn init_tracing(debug: bool, main_log: File) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(main_log)),
        )
        .init();
}

fn load_config(args: &Cli) -> Result<BisectConfig> {
    let mut config = match &args.config {
        Some(path) => BisectConfig::from_file(path)?,
        None => BisectConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

fn run(args: &Cli) -> Result<ExitCode> {
    let config = load_config(args)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create {}", config.log_dir.display()))?;
    let main_log_path = config.log_dir.join(format!("bisect_main_{}.log", stamp));
    let main_log = File::create(&main_log_path)
        .with_context(|| format!("Failed to create {}", main_log_path.display()))?;
    init_tracing(args.debug, main_log);

    let runner = ProcessRunner::new().with_log_dir(&config.log_dir);
    let evaluator = Evaluator::from_config(runner.clone(), &config)?;
    let primitive = GitBisect::new(runner, &config.primary_tree_path, config.command_timeout());
    let mut driver = Driver::new(primitive, evaluator, config.search.clone());

    let bisect_report = driver.run(&args.good, &args.bad);

    info!("Bisect Summary:");
    for line in report::render_summary(&bisect_report).lines() {
        info!("{}", line);
    }
    match report::write_summary(&config.log_dir, &stamp, &bisect_report) {
        Ok(files) => info!("Summary written to {}", files.text.display()),
        Err(e) => warn!("Failed to write summary: {:#}", e),
    }

    Ok(match bisect_report.outcome {
        SearchOutcome::Converged { first_bad } => {
            println!("{}", first_bad);
            ExitCode::SUCCESS
        }
        SearchOutcome::Aborted { error } => {
            eprintln!("perfbisect: bisect aborted: {}", error);
            ExitCode::FAILURE
        }
    })
}

fn main() -> ExitCode {
    let args = Cli::parse();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("perfbisect: {:#}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}
