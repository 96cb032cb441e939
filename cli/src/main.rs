//! Prints file changes under one or more directories until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use watch_tree::{ChangeEvent, DirectoryWatcher, WatchConfig};

#[derive(Parser, Debug)]
#[command(name = "watch-tree")]
#[command(about = "Watch directories recursively and print changed files")]
struct Cli {
    /// Directories to watch.
    roots: Vec<PathBuf>,

    /// TOML config file with roots and patterns. Flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only report files whose name matches this regex.
    #[arg(long)]
    filter: Option<String>,

    /// Never report files whose name matches this regex.
    #[arg(long)]
    ignore_files: Option<String>,

    /// Do not watch directories whose name matches this regex.
    #[arg(long)]
    ignore_directories: Option<String>,

    /// Print each event as a JSON object.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn watch_config(&self) -> Result<WatchConfig> {
        let base = match &self.config {
            Some(path) => WatchConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => WatchConfig::new(),
        };

        let overrides = WatchConfig {
            roots: self.roots.clone(),
            filter: self.filter.clone(),
            ignore_files: self.ignore_files.clone(),
            ignore_directories: self.ignore_directories.clone(),
        };

        let config = base.merge(overrides);
        if config.roots.is_empty() {
            bail!("no directories to watch; pass them as arguments or in --config");
        }
        Ok(config)
    }
}

fn print_event(event: &ChangeEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => error!("Failed to serialize event: {e}"),
        }
    } else {
        println!("{}", event.filepath.display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.watch_config()?;
    let json = cli.json;

    let mut watcher = DirectoryWatcher::builder()
        .roots(&config.roots)
        .options(config.filter_options()?)
        .on_change(move |event| print_event(&event, json))
        .on_error(|e| error!("{e}"))
        .build()?;

    watcher.start().await?;
    info!("Watching {} directories", watcher.stats().await.watched_directories);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    watcher.dispose().await;
    Ok(())
}
