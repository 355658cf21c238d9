//! Command line interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::catalog::CatalogUploader;
use crate::config::AppixConfig;
use crate::events::LoggingEventSink;
use crate::manifest::Manifest;
use crate::observability::{init_tracing, LogFormat};
use crate::settings::DevelopmentSettings;
use crate::watch::{reload_signal_for, watch_app, PushLauncher, UploaderLauncher};

/// Package, test, build and publish apps to the app catalog.
#[derive(Debug, Parser)]
#[command(name = "appix")]
#[command(version)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Path to config file (default: ~/.appix/config.json)
    #[arg(short, long, global = true, env = "APPIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target environment whose catalog receives the app
    #[arg(short, long, global = true)]
    pub env: Option<String>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Test, build and upload the app once
    Push {
        /// App directory
        #[arg(default_value = ".")]
        app_path: PathBuf,

        /// Do not run the manifest's test stages
        #[arg(long)]
        skip_tests: bool,

        /// Per-attempt upload timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Push the app now and again on every change
    Watch {
        /// App directory
        #[arg(default_value = ".")]
        app_path: PathBuf,

        /// Do not signal the browser after pushes
        #[arg(long)]
        no_browser: bool,

        /// Do not run the manifest's test stages
        #[arg(long)]
        skip_tests: bool,
    },
}

/// Loads the configuration and applies the global flags.
pub fn load_config(cli: &Cli) -> Result<AppixConfig> {
    let mut config = AppixConfig::load(cli.config.as_deref()).context("Loading configuration")?;
    if let Some(env) = &cli.env {
        config = config.with_target_env(env);
    }
    if cli.verbose {
        config = config.with_verbose(true);
    }
    Ok(config)
}

fn uploader_for(config: &AppixConfig, app_dir: &Path) -> CatalogUploader {
    CatalogUploader::from_config(config, app_dir)
        .with_events(Arc::new(LoggingEventSink::debug()))
}

fn app_dir(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("App folder {} not found", path.display()))
}

/// Runs `appix push`.
pub async fn run_push(
    config: &AppixConfig,
    app_path: &Path,
    skip_tests: bool,
    timeout: Option<u64>,
) -> Result<String> {
    let app_dir = app_dir(app_path)?;
    let catalog_url = config.catalog_url()?;
    let timeout = timeout.unwrap_or(config.upload_timeout_seconds);

    let uri = uploader_for(config, &app_dir)
        .push(catalog_url, timeout, &Manifest::path_in(&app_dir), skip_tests)
        .await?;
    Ok(uri)
}

/// Runs `appix watch`.
pub async fn run_watch(
    config: &AppixConfig,
    app_path: &Path,
    no_browser: bool,
    skip_tests: bool,
) -> Result<()> {
    let app_dir = app_dir(app_path)?;
    let catalog_url = config.catalog_url()?;

    let settings = DevelopmentSettings::read_or_create(&app_dir)
        .context("Preparing development settings")?;
    info!(session_id = %settings.session_id, "Development session");

    let uploader = Arc::new(uploader_for(config, &app_dir));
    let launcher: Arc<dyn PushLauncher> = Arc::new(
        UploaderLauncher::new(uploader, catalog_url, Manifest::path_in(&app_dir))
            .with_timeout_seconds(config.upload_timeout_seconds)
            .with_skip_tests(skip_tests),
    );

    watch_app(&app_dir, launcher, reload_signal_for(no_browser), config.debounce()).await?;
    Ok(())
}

/// Runs a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(cli.verbose, format);

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Push {
            app_path,
            skip_tests,
            timeout,
        } => {
            let uri = run_push(&config, app_path, *skip_tests, *timeout).await?;
            println!("{uri}");
            Ok(())
        }
        Commands::Watch {
            app_path,
            no_browser,
            skip_tests,
        } => run_watch(&config, app_path, *no_browser, *skip_tests).await,
    }
}
