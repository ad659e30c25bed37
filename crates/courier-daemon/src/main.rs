//! # courier-daemon
//!
//! Courier daemon binary — wires together settings, storage, the event
//! queue, the connection manager, and the pipeline workers, then runs until
//! interrupted.

#![deny(unsafe_code)]

mod app;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courier_settings::CourierSettings;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Courier daemon.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Multi-account message ingestion and dispatch daemon")]
struct Cli {
    /// Path to the settings file (default `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Consumer worker count (overrides settings).
    #[arg(long)]
    workers: Option<usize>,
}

fn init_tracing(settings: &CourierSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.filter.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(courier_settings::settings_path);
    let settings = courier_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    init_tracing(&settings);
    tracing::info!(
        name = %settings.name,
        settings = %settings_path.display(),
        "courier starting"
    );

    let db_path = args
        .db_path
        .unwrap_or_else(|| expand_tilde(&settings.database.path));
    ensure_parent_dir(&db_path)?;

    let app = app::App::build(&settings, &db_path, args.workers).context("failed to start")?;
    tracing::info!(db = %db_path.display(), workers = app.worker_count(), "pipeline running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    app.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["courier"]);
        assert!(cli.settings.is_none());
        assert!(cli.db_path.is_none());
        assert!(cli.workers.is_none());
    }

    #[test]
    fn cli_overrides() {
        let cli = Cli::parse_from([
            "courier",
            "--settings",
            "/tmp/settings.json",
            "--db-path",
            "/tmp/courier.db",
            "--workers",
            "8",
        ]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/settings.json")));
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/courier.db")));
        assert_eq!(cli.workers, Some(8));
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/x/y.db");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("x/y.db"));
        assert_eq!(expand_tilde("/abs/p.db"), PathBuf::from("/abs/p.db"));
    }

    #[test]
    fn ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("courier.db");
        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().exists());
    }
}
