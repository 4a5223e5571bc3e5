//! # Batch Optimizer Module
//!
//! Ottimizzazione one-shot (`--once`) dei file già presenti nelle directory
//! monitorate, con lo stesso safe replace del watcher.
//!
//! ## Responsabilità:
//! - Raccolta dei file tracciati non ancora ottimizzati
//! - Elaborazione concorrente limitata da un `Semaphore` (`max_concurrent`)
//! - Barra di avanzamento e statistiche di sessione
//!
//! Un file più piccolo del suo backup `.original` è già stato ottimizzato:
//! rielaborarlo sovrascriverebbe il backup con byte già compressi, quindi
//! viene saltato. Un file ripristinato dopo un errore ha la stessa dimensione
//! del backup e viene ritentato.
//!
//! ## Esempio:
//! ```ignore
//! let batch = BatchOptimizer::from_config(MediaKind::Image, &config, stats.clone());
//! let summary = batch.run().await?;
//! println!("{}", summary.format_summary());
//! ```

use crate::config::{Config, PipelineConfig};
use crate::error::OptimizeError;
use crate::file_manager::{FileManager, MediaKind};
use crate::optimizer::codec::codec_for;
use crate::optimizer::path_resolver::PathResolver;
use crate::optimizer::task_optimizer::{TaskOptimizer, TaskOutcome};
use crate::progress::{OptimizationStats, ProgressManager, SharedStats};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Optimizes the files already present in a pipeline's directories
pub struct BatchOptimizer {
    kind: MediaKind,
    pipeline: PipelineConfig,
    optimizer: Arc<TaskOptimizer>,
    stats: SharedStats,
}

impl BatchOptimizer {
    pub fn new(kind: MediaKind, pipeline: PipelineConfig, optimizer: TaskOptimizer, stats: SharedStats) -> Self {
        Self {
            kind,
            pipeline,
            optimizer: Arc::new(optimizer),
            stats,
        }
    }

    pub fn from_config(kind: MediaKind, config: &Config, stats: SharedStats) -> Self {
        let optimizer = TaskOptimizer::new(codec_for(kind, config), config.size_threshold);
        Self::new(kind, config.pipeline(kind).clone(), optimizer, stats)
    }

    /// Tracked files below the watched directories that were not optimized yet
    pub fn pending_files(&self) -> Vec<PathBuf> {
        let dirs = &self.pipeline.watched_dirs;
        let optimized: HashSet<PathBuf> = FileManager::find_backups(dirs, self.kind)
            .iter()
            .filter_map(|backup| {
                let current = PathResolver::current_for_backup(backup)?;
                let backup_len = std::fs::metadata(backup).ok()?.len();
                let current_len = std::fs::metadata(&current).ok()?.len();
                (current_len < backup_len).then_some(current)
            })
            .collect();

        let mut files = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                warn!("⚠️  Folder not found: {}", dir.display());
                continue;
            }
            for entry in WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if FileManager::is_hidden(path) || FileManager::is_backup(path) || !self.pipeline.tracks(path) {
                    continue;
                }
                if optimized.contains(path) {
                    continue;
                }
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        files.dedup();
        files
    }

    /// Optimize every pending file, then return the session totals
    pub async fn run(&self) -> Result<OptimizationStats, OptimizeError> {
        self.optimizer.codec().check_dependencies().await?;

        let files = self.pending_files();
        if files.is_empty() {
            info!("No {}s to optimize", self.kind);
            return Ok(self.stats.snapshot());
        }
        info!("Found {} {}s to optimize", files.len(), self.kind);

        let progress = ProgressManager::bar(files.len() as u64);
        let semaphore = Arc::new(Semaphore::new(self.pipeline.max_concurrent.max(1)));

        let mut tasks = Vec::with_capacity(files.len());
        for path in files {
            let optimizer = Arc::clone(&self.optimizer);
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Abandoned;
                };
                optimizer.process(&path).await
            }));
        }

        for task in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("❌ Optimization task failed: {}", e);
                    TaskOutcome::Failed {
                        error: OptimizeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)),
                    }
                }
            };
            self.stats.record(&outcome);
            progress.inc(1);
        }

        let summary = self.stats.snapshot();
        progress.finish_with_message(summary.format_summary());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::task_optimizer::tests::{FakeCodec, Script};
    use tempfile::TempDir;

    fn batch_with(codec: Arc<FakeCodec>, kind: MediaKind, dirs: Vec<PathBuf>) -> BatchOptimizer {
        let defaults = match kind {
            MediaKind::Image => PipelineConfig::image_defaults(),
            MediaKind::Video => PipelineConfig::video_defaults(),
        };
        let pipeline = PipelineConfig {
            watched_dirs: dirs,
            max_concurrent: 2,
            ..defaults
        };
        BatchOptimizer::new(kind, pipeline, TaskOptimizer::new(codec, 1.0), SharedStats::default())
    }

    #[tokio::test]
    async fn test_existing_files_are_optimized_once() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("a.jpg"), vec![0u8; 1000]).unwrap();
        std::fs::write(dir.join("nested/b.PNG"), vec![0u8; 1000]).unwrap();
        std::fs::write(dir.join("notes.txt"), b"not media").unwrap();
        std::fs::write(dir.join(".hidden.jpg"), vec![0u8; 1000]).unwrap();

        let codec = Arc::new(FakeCodec::new(MediaKind::Image, Script::Write(vec![1u8; 400])));
        let batch = batch_with(codec.clone(), MediaKind::Image, vec![dir.clone()]);

        assert_eq!(batch.pending_files(), vec![dir.join("a.jpg"), dir.join("nested/b.PNG")]);

        let summary = batch.run().await.unwrap();
        assert_eq!(codec.calls(), 2);
        assert_eq!(summary.files_optimized, 2);
        assert_eq!(summary.total_original_size, 2000);
        assert_eq!(summary.total_optimized_size, 800);
        assert_eq!(summary.overall_reduction_percent(), 60.0);
        assert_eq!(std::fs::read(dir.join("a.jpg.original")).unwrap(), vec![0u8; 1000]);

        // A second run finds nothing left to do and keeps the backups intact
        assert!(batch.pending_files().is_empty());
        batch.run().await.unwrap();
        assert_eq!(codec.calls(), 2);
        assert_eq!(std::fs::read(dir.join("a.jpg.original")).unwrap(), vec![0u8; 1000]);
    }

    #[tokio::test]
    async fn test_normalized_videos_are_not_reprocessed() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        std::fs::write(dir.join("intro.mp4"), vec![0u8; 300]).unwrap();
        std::fs::write(dir.join("intro.mov.original"), vec![0u8; 1200]).unwrap();
        std::fs::write(dir.join("new.webm"), vec![0u8; 800]).unwrap();

        let codec = Arc::new(FakeCodec::new(MediaKind::Video, Script::Write(vec![1u8; 100])));
        let batch = batch_with(codec, MediaKind::Video, vec![dir.clone()]);

        assert_eq!(batch.pending_files(), vec![dir.join("new.webm")]);
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_restored() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        std::fs::write(dir.join("clip.mp4"), b"original video").unwrap();

        let codec = Arc::new(FakeCodec::new(MediaKind::Video, Script::Fail));
        let batch = batch_with(codec, MediaKind::Video, vec![dir.clone(), dir.join("missing")]);

        let summary = batch.run().await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.files_optimized, 0);
        assert_eq!(std::fs::read(dir.join("clip.mp4")).unwrap(), b"original video");

        // The backup left by the failed attempt does not mark the file as done
        assert!(dir.join("clip.mp4.original").exists());
        assert_eq!(batch.pending_files(), vec![dir.join("clip.mp4")]);
    }
}
