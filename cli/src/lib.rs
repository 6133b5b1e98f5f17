//! Watch a directory and report each wakeup until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dirwatch::{Backend, WatchConfig, WatcherHandle, WatcherStats};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "dirwatch")]
#[command(about = "Watch a directory for created, modified and deleted entries")]
pub struct Cli {
    /// Directory to watch. Overrides `path` from the config file.
    pub directory: Option<PathBuf>,

    /// TOML file with watch settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use the polling backend instead of the native one
    #[arg(long)]
    pub poll: bool,

    /// Polling interval in milliseconds (polling backend only)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Print delivery statistics as JSON on exit
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Merge the config file (if any) with command-line overrides.
    pub fn watch_config(&self) -> Result<WatchConfig> {
        let mut config = match (&self.config, &self.directory) {
            (Some(file), _) => WatchConfig::load(file)
                .with_context(|| format!("failed to load config from {}", file.display()))?,
            (None, Some(directory)) => WatchConfig::new(directory),
            (None, None) => anyhow::bail!("no directory given; pass DIRECTORY or --config"),
        };

        if let Some(directory) = &self.directory {
            config.path = directory.clone();
        }
        if self.poll {
            config.backend = Backend::Poll;
        }
        if let Some(interval) = self.poll_interval_ms {
            config = config.with_poll_interval(Duration::from_millis(interval));
        }
        Ok(config)
    }
}

/// Run the watcher until Ctrl-C or until the watch loop exits on its own.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.watch_config()?;
    let path = config.path.clone();

    let handle = tokio::task::spawn_blocking(move || WatcherHandle::start(config))
        .await?
        .with_context(|| format!("failed to watch {}", path.display()))?;
    let handle = Arc::new(handle);

    let mut waiter = {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || report_wakeups(&handle))
    };

    let wakeups = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            handle.stop();
            waiter.await?
        }
        wakeups = &mut waiter => {
            warn!("Watch on [{}] ended ({:?})", path.display(), handle.state());
            wakeups?
        }
    };

    info!("Observed {wakeups} wakeup(s)");
    if cli.json {
        println!("{}", stats_json(&handle.stats())?);
    }
    Ok(())
}

/// Block on the handle, logging each wakeup. Returns how many there were.
fn report_wakeups(handle: &WatcherHandle) -> u64 {
    let mut wakeups = 0;
    while handle.wait_for_event().is_ok() {
        wakeups += 1;
        info!("Change detected in [{}] (#{wakeups})", handle.directory().display());
    }
    wakeups
}

fn stats_json(stats: &WatcherStats) -> Result<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}
