//! pagecheck CLI
//!
//! Runs YAML browser specs and writes `test-results.json`.
//! Exit code is 0 when every test passes, 1 when any fails, 2 on harness errors.

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pagecheck_e2e::playwright::Browser;
use pagecheck_e2e::config::DEFAULT_CONFIG_FILE;
use pagecheck_e2e::{DriverKind, E2eConfig, E2eResult, TestRunner, TestSuiteResult};

#[derive(Parser, Debug)]
#[command(name = "pagecheck")]
#[command(about = "Browser smoke tests driven from Rust")]
#[command(version)]
struct Args {
    /// Configuration file path [default: ./pagecheck.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to test specs directory
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only tests matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific test by name
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Page driver (playwright, http)
    #[arg(long)]
    driver: Option<DriverKind>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Extra attempts for failing tests
    #[arg(long)]
    retries: Option<u32>,

    /// Base URL for relative navigation targets
    #[arg(long)]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let config = match &args.config {
        Some(path) => E2eConfig::from_file(path)?,
        None => E2eConfig::load(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    let mut config = config.with_env_overrides()?;

    if let Some(specs) = args.specs {
        config.specs_dir = specs;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(driver) = args.driver {
        config.driver = driver;
    }
    if let Some(browser) = args.browser {
        config.playwright.browser = browser;
    }
    if args.headed {
        config.playwright.headless = false;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if args.base_url.is_some() {
        config.base_url = args.base_url;
    }
    config.validate()?;

    let runner = TestRunner::with_config(config);

    let results = if let Some(name) = args.name {
        TestSuiteResult::from_single(runner.run_test(&name).await?)
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;

    Ok(results.success())
}
