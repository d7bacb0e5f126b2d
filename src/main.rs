use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use tokio::sync::mpsc;

use clusterview::app::{App, AppEvent};
use clusterview::cluster::{parse_server_url, ClusterClient, ClusterTree};
use clusterview::config::Config;
use clusterview::ui;

/// Get the config directory path (~/.config/clusterview/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("clusterview"))
}

#[derive(Parser, Debug)]
#[command(name = "clusterview", about = "Terminal browser for live cluster resources")]
struct Args {
    /// Config file (default: ~/.config/clusterview/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API server address, e.g. http://127.0.0.1:8001 for `kubectl proxy`
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Children shown per page
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    page_size: Option<u64>,

    /// Show every child at once
    #[arg(long)]
    no_paging: bool,

    /// Start with this filter applied
    #[arg(long, value_name = "TEXT")]
    filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they stay out of the alternate screen
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(server) = args.server {
        config.server = server;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = usize::try_from(page_size).context("Page size out of range")?;
    }
    if args.no_paging {
        config.progressive_loading = false;
    }
    tracing::debug!(config = ?config, "Effective configuration");

    let server = parse_server_url(&config.server)
        .with_context(|| format!("Invalid server address '{}'", config.server))?;
    let token = std::env::var("CLUSTERVIEW_TOKEN")
        .ok()
        .or_else(|| config.token.clone())
        .map(SecretString::from);

    let client = ClusterClient::new(server, token, config.request_timeout())
        .context("Failed to create HTTP client")?;

    let kinds = config.kinds();
    if kinds.is_empty() {
        anyhow::bail!("No known resource kinds in watch_kinds");
    }
    let source = ClusterTree::new(client, kinds);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let mut app = App::new(&config, source, event_tx);
    if let Some(filter) = args.filter.as_deref() {
        app.engine.set_filter(filter);
    }
    app.start_watches(&config);

    ui::run(&mut app, event_rx).await?;
    Ok(())
}
