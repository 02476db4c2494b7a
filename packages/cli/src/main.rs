#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line uploader and dataset manager for the field sync service.
//!
//! `field_sync upload` parses boundary files, matches them against the
//! datasets already known to the session, resolves attribute mappings
//! (interactively when the file's columns are not recognized), and
//! persists the result to the signed-in owner's hierarchy or the local
//! anonymous cache. `login`, `logout`, `refresh`, and `datasets` manage
//! the session and the cached cloud snapshot.
//!
//! Uses `indicatif-log-bridge` (via [`progress::init_logger`]) to route
//! `log` output through `indicatif::MultiProgress` so that log lines and
//! progress bars never fight for the terminal.

mod config;
mod progress;
mod prompt;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use field_sync_models::{Provenance, UploadEvent};
use field_sync_remote::HttpBoundaryApi;
use field_sync_session::{Reconciler, Session};
use field_sync_store::CacheStore;
use field_sync_upload::{LayerSink, Uploader};
use indicatif::MultiProgress;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::progress::IndicatifProgress;
use crate::prompt::DialoguerPrompt;

/// Command-line interface for the field sync service.
#[derive(Parser)]
#[command(name = "field_sync", about = "Upload and manage field boundary datasets")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "field-sync.toml")]
    config: PathBuf,

    /// Cache/session directory (overrides the configured one).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Boundary service base URL (overrides the configured one).
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and upload one or more boundary files.
    Upload {
        /// Files to upload, processed in order.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// When an upload overwrites an existing dataset, also remove
        /// hierarchy rows absent from the upload.
        #[arg(long)]
        replace_missing: bool,
    },
    /// List the known datasets and where the listing came from.
    Datasets,
    /// Sign in and migrate anonymous uploads to the owner's hierarchy.
    Login {
        /// Owner id to sign in as (falls back to the configured one).
        owner_id: Option<String>,
    },
    /// Sign out and clear the cached cloud snapshot.
    Logout,
    /// Re-fetch the signed-in owner's hierarchy into the cache.
    Refresh,
}

/// On-disk record of the signed-in owner, so the session survives
/// process restarts.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    owner_id: String,
}

/// [`LayerSink`] that narrates each layer as it becomes ready to draw.
struct LogSink;

impl LayerSink for LogSink {
    fn layer_ready(&self, event: &UploadEvent) {
        let target = event.matched_dataset_id.as_ref().map_or_else(
            || "new dataset".to_string(),
            |id| format!("updates dataset {id}"),
        );
        log::info!(
            "Layer \"{}\" ready ({} feature(s), {target})",
            event.name,
            event.geojson.features.len(),
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = progress::init_logger();

    let mut config = config::load_config(&cli.config)?;
    config.apply_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(url) = cli.api_url {
        config.api_url = Some(url);
    }

    let store = CacheStore::new(config.data_dir());
    let api = HttpBoundaryApi::new(config.api_url(), config.api_key.clone());
    let mut session = load_session(&config);

    match cli.command {
        Commands::Upload {
            paths,
            replace_missing,
        } => {
            run_upload(
                &multi,
                &config,
                &store,
                &api,
                &mut session,
                &paths,
                replace_missing,
            )
            .await?;
        }
        Commands::Datasets => run_datasets(&config, &store, &api, &mut session).await,
        Commands::Login { owner_id } => {
            run_login(&multi, &config, &store, &api, &mut session, owner_id).await?;
        }
        Commands::Logout => run_logout(&config, &store, &api, &mut session).await,
        Commands::Refresh => run_refresh(&config, &store, &api, &mut session).await?,
    }

    Ok(())
}

async fn run_upload(
    multi: &MultiProgress,
    config: &Config,
    store: &CacheStore,
    api: &HttpBoundaryApi,
    session: &mut Session,
    paths: &[PathBuf],
    replace_missing: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = DialoguerPrompt;
    let progress = IndicatifProgress::records_bar(multi, "Preparing upload");

    let uploader = Uploader::new(store, api, &prompt)
        .with_policy(config.chunk_policy())
        .with_thresholds(config.thresholds())
        .with_limits(config.limits())
        .with_sink(Arc::new(LogSink))
        .with_replace_missing(replace_missing)
        .with_progress(Arc::clone(&progress));

    let summary = uploader.process_batch(session, paths).await;
    progress.finish(format!(
        "{} of {} file(s) uploaded",
        summary.succeeded, summary.processed
    ));

    if summary.succeeded == 0 && summary.processed > 0 {
        return Err("no files were uploaded".into());
    }
    Ok(())
}

async fn run_datasets(
    config: &Config,
    store: &CacheStore,
    api: &HttpBoundaryApi,
    session: &mut Session,
) {
    let reconciler = Reconciler::new(store, api, config.chunk_policy());
    let listing = reconciler.datasets(session).await;

    match listing.provenance {
        Provenance::Cloud => println!("Datasets (live):"),
        Provenance::Cache => println!("Datasets (cached snapshot; remote unreachable):"),
        Provenance::Local => println!("Datasets (local, not signed in):"),
        Provenance::Error => println!("Datasets (unavailable; remote and cache both failed):"),
    }

    if listing.datasets.is_empty() {
        println!("  (none)");
        return;
    }
    for entry in &listing.datasets {
        println!(
            "  {:<32} {:>6} feature(s)  updated {}",
            entry.name,
            entry.feature_count,
            entry.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

async fn run_login(
    multi: &MultiProgress,
    config: &Config,
    store: &CacheStore,
    api: &HttpBoundaryApi,
    session: &mut Session,
    owner_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(owner_id) = owner_id.or_else(|| config.owner_id.clone()) else {
        return Err("no owner id given and none configured".into());
    };

    let progress = IndicatifProgress::records_bar(multi, "Signing in");
    let reconciler =
        Reconciler::new(store, api, config.chunk_policy()).with_progress(Arc::clone(&progress));
    let report = reconciler.login(session, &owner_id).await;
    progress.finish(format!("Signed in as {owner_id}"));

    save_session(config, &owner_id)?;

    if report.failed > 0 {
        log::warn!(
            "Migrated {} anonymous upload(s); {} kept local after failures",
            report.migrated,
            report.failed
        );
    } else if report.migrated > 0 {
        log::info!("Migrated {} anonymous upload(s)", report.migrated);
    }
    Ok(())
}

async fn run_logout(
    config: &Config,
    store: &CacheStore,
    api: &HttpBoundaryApi,
    session: &mut Session,
) {
    let reconciler = Reconciler::new(store, api, config.chunk_policy());
    reconciler.logout(session).await;
    clear_session(config);
    log::info!("Signed out");
}

async fn run_refresh(
    config: &Config,
    store: &CacheStore,
    api: &HttpBoundaryApi,
    session: &mut Session,
) -> Result<(), Box<dyn std::error::Error>> {
    let reconciler = Reconciler::new(store, api, config.chunk_policy());
    let entries = reconciler.refresh(session).await?;
    println!("Refreshed {} dataset(s) into the cache", entries.len());
    Ok(())
}

fn session_path(config: &Config) -> PathBuf {
    config.data_dir().join("session.json")
}

/// Restores the session recorded by a previous `login`, if any.
fn load_session(config: &Config) -> Session {
    let mut session = Session::new();
    match std::fs::read_to_string(session_path(config)) {
        Ok(text) => match serde_json::from_str::<SessionRecord>(&text) {
            Ok(record) => session.set_authenticated(&record.owner_id),
            Err(e) => log::warn!("Ignoring unreadable session file: {e}"),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Ignoring unreadable session file: {e}"),
    }
    session
}

fn save_session(config: &Config, owner_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = session_path(config);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let record = SessionRecord {
        owner_id: owner_id.to_string(),
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    Ok(())
}

/// Removes the session file; a missing one is fine.
fn clear_session(config: &Config) {
    if let Err(e) = std::fs::remove_file(session_path(config)) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("Could not remove session file: {e}");
        }
    }
}
