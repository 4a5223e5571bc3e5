//! # Auto Media Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento configurazione (file JSON + override da CLI)
//! - Avvio del watcher della pipeline scelta, oppure one-shot / cleanup / statistiche
//! - Shutdown pulito su SIGINT/SIGTERM
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (pipeline, flag, override)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` vince)
//! 3. Carica e valida la configurazione
//! 4. `--once` / `--cleanup` / `--stats` eseguono e terminano, altrimenti avvia il watcher
//! 5. Al segnale: stop, attesa dei file in elaborazione, riepilogo, exit 0
//!
//! ## Esempio di utilizzo:
//! ```bash
//! auto-media-optimizer image
//! auto-media-optimizer image --once
//! auto-media-optimizer video --stats
//! auto-media-optimizer video --cleanup --dir videos
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auto_media_optimizer::platform::PlatformCommands;
use auto_media_optimizer::{
    BatchOptimizer, Config, FileManager, HistoricalReport, MediaKind, MediaWatcher, SharedStats,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pipeline {
    Image,
    Video,
}

impl From<Pipeline> for MediaKind {
    fn from(pipeline: Pipeline) -> Self {
        match pipeline {
            Pipeline::Image => MediaKind::Image,
            Pipeline::Video => MediaKind::Video,
        }
    }
}

#[derive(Parser)]
#[command(name = "auto-media-optimizer")]
#[command(about = "Watch asset folders and optimize new images and videos in place")]
struct Args {
    /// Which pipeline to run
    #[arg(value_enum)]
    pipeline: Pipeline,

    /// Optimize the files already in the watched folders, then exit
    #[arg(long, conflicts_with_all = ["cleanup", "stats"])]
    once: bool,

    /// Delete every backup (.original) of this pipeline's kind and exit
    #[arg(long, conflicts_with = "stats")]
    cleanup: bool,

    /// Print savings recomputed from the backups on disk and exit
    #[arg(long)]
    stats: bool,

    /// Configuration file (defaults are used when missing)
    #[arg(short, long, default_value = "media-optimizer.json")]
    config: PathBuf,

    /// Watched directory; repeat to watch several (replaces the configured list)
    #[arg(short, long = "dir")]
    dirs: Vec<PathBuf>,

    /// Quiet period before a detected file is processed
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Maximum number of files optimized at the same time
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let kind = MediaKind::from(args.pipeline);
    let config = load_config(&args, kind).await?;
    let pipeline = config.pipeline(kind);

    if args.cleanup {
        FileManager::cleanup_backups(&pipeline.watched_dirs, kind).await?;
        return Ok(());
    }

    if args.stats {
        let report = HistoricalReport::scan(&pipeline.watched_dirs, kind).await;
        println!("{}", report.render());
        return Ok(());
    }

    print_banner(kind, &config);

    let stats = SharedStats::default();

    if args.once {
        let batch = BatchOptimizer::from_config(kind, &config, stats);
        let summary = batch.run().await.map_err(|e| {
            error!("❌ {} optimization failed: {}", capitalized(kind), e);
            e
        })?;
        info!("📊 Summary: {}", summary.format_summary());
        return Ok(());
    }

    let mut watcher = MediaWatcher::from_config(kind, &config, stats.clone());
    if let Err(e) = watcher.start().await {
        error!("❌ Failed to start {} optimizer: {}", kind, e);
        return Err(e.into());
    }

    info!("✅ {} optimizer is running. Press Ctrl+C to stop.", capitalized(kind));

    shutdown_signal().await?;

    info!("🛑 Shutting down {} optimizer...", kind);
    watcher.stop();
    watcher.wait_idle().await;

    info!("📊 Session summary: {}", stats.snapshot().format_summary());
    Ok(())
}

/// Configuration file plus CLI overrides
async fn load_config(args: &Args, kind: MediaKind) -> Result<Config> {
    let mut config = Config::from_file(&args.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let pipeline = config.pipeline_mut(kind);
    if !args.dirs.is_empty() {
        pipeline.watched_dirs = args.dirs.clone();
        pipeline.ensure_dirs.retain(|dir| args.dirs.contains(dir));
    }
    if let Some(debounce_ms) = args.debounce_ms {
        pipeline.debounce_ms = debounce_ms;
    }
    if let Some(max_concurrent) = args.max_concurrent {
        pipeline.max_concurrent = max_concurrent;
    }

    config.validate()?;
    Ok(config)
}

fn print_banner(kind: MediaKind, config: &Config) {
    let pipeline = config.pipeline(kind);
    let icon = match kind {
        MediaKind::Image => "🖼️ ",
        MediaKind::Video => "🎬",
    };

    info!("{} Auto {} optimizer", icon, capitalized(kind));
    info!("📁 Monitoring folders:");
    for dir in &pipeline.watched_dirs {
        info!("   - {}", dir.display());
    }
    info!("🎯 Supported formats: {}", pipeline.extensions.join(", "));
    info!("⏱️  Debounce: {} ms, max concurrent: {}", pipeline.debounce_ms, pipeline.max_concurrent);
    info!("💻 Platform: {}", PlatformCommands::system_info());
}

fn capitalized(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "Image",
        MediaKind::Video => "Video",
    }
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    }
    Ok(())
}
