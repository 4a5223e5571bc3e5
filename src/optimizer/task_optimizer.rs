//! # Task Optimizer Module
//!
//! Worker per l'ottimizzazione di singoli file con safe replace.
//! Separato dal watcher per maggiore modularità e testabilità (il codec è un
//! trait, nei test viene sostituito da un codec finto).
//!
//! ## Macchina a stati per file:
//! ```text
//! Processing ──► backup ──► encode ──► verifica ──► swap ──► Succeeded
//!                   │          │           │          │
//!                   └──────────┴─────┬─────┴──────────┘
//!                                    ▼
//!                           Failed ──► Restored
//! ```
//!
//! ## Garanzie:
//! - Il backup `<path>.original` esiste prima che il path venga sovrascritto
//! - L'encoder scrive sempre su un file temporaneo nascosto, mai sul sorgente
//! - Lo swap è un rename di un file completo nella stessa directory
//! - Dopo ogni tentativo `path` contiene i byte ottimizzati o gli originali

use crate::{
    error::OptimizeError,
    file_manager::FileManager,
    optimizer::codec::MediaCodec,
    optimizer::path_resolver::PathResolver,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How one optimization attempt ended
#[derive(Debug)]
pub enum TaskOutcome {
    /// Optimized bytes swapped into `final_path`; backup retained
    Optimized {
        final_path: PathBuf,
        original_size: u64,
        optimized_size: u64,
    },
    /// Encoded output was not small enough; original left untouched
    Kept {
        original_size: u64,
        optimized_size: u64,
    },
    /// Attempt failed and the original bytes were copied back from the backup
    Restored {
        original_size: u64,
        error: OptimizeError,
    },
    /// Attempt failed and nothing could be restored
    Failed { error: OptimizeError },
    /// File disappeared before or during the attempt
    Abandoned,
}

impl TaskOutcome {
    /// Path holding the media after the attempt, if the attempt wrote to disk
    pub fn written_path<'a>(&'a self, source: &'a Path) -> Option<&'a Path> {
        match self {
            Self::Optimized { final_path, .. } => Some(final_path.as_path()),
            Self::Restored { .. } => Some(source),
            _ => None,
        }
    }
}

/// Worker per elaborazione singoli file
pub struct TaskOptimizer {
    codec: Arc<dyn MediaCodec>,
    size_threshold: f64,
}

impl TaskOptimizer {
    pub fn new(codec: Arc<dyn MediaCodec>, size_threshold: f64) -> Self {
        Self {
            codec,
            size_threshold,
        }
    }

    pub fn codec(&self) -> &Arc<dyn MediaCodec> {
        &self.codec
    }

    /// Run the safe replace state machine for one file
    pub async fn process(&self, path: &Path) -> TaskOutcome {
        let file_name = display_name(path);

        // Re-verify existence: the file may have vanished since the timer fired
        let original_size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("File vanished before processing: {}", path.display());
                return TaskOutcome::Abandoned;
            }
            Err(e) => {
                error!("❌ Cannot read {}: {}", file_name, e);
                return TaskOutcome::Failed { error: e.into() };
            }
        };

        info!(
            "🔄 Optimizing {}: {} ({})",
            self.codec.kind(),
            file_name,
            FileManager::format_size(original_size)
        );

        let backup_path = PathResolver::backup_path(path);
        if let Err(e) = tokio::fs::copy(path, &backup_path).await {
            if e.kind() == ErrorKind::NotFound {
                debug!("File vanished while backing up: {}", path.display());
                return TaskOutcome::Abandoned;
            }
            error!("❌ Could not back up {}: {}", file_name, e);
            return TaskOutcome::Failed { error: e.into() };
        }
        debug!("💾 Backup written: {}", backup_path.display());

        match self.encode_and_swap(path, original_size).await {
            Ok(outcome) => {
                if let TaskOutcome::Kept { .. } = outcome {
                    // The original is untouched, so its backup is redundant
                    if let Err(e) = tokio::fs::remove_file(&backup_path).await {
                        warn!("⚠️  Could not remove redundant backup {}: {}", backup_path.display(), e);
                    }
                }
                outcome
            }
            Err(error) => self.restore(path, &backup_path, original_size, error).await,
        }
    }

    /// Steps that may fail after the backup exists
    async fn encode_and_swap(&self, path: &Path, original_size: u64) -> Result<TaskOutcome, OptimizeError> {
        let file_name = display_name(path);
        let final_path = PathResolver::final_path(path, self.codec.as_ref());
        let changes_extension = PathResolver::changes_extension(path, self.codec.as_ref());

        // Normalizing must never clobber an unrelated file (intro.mov next to intro.mp4)
        if changes_extension && tokio::fs::try_exists(&final_path).await.unwrap_or(true) {
            warn!(
                "⚠️  {} already exists, leaving {} as it is",
                display_name(&final_path),
                file_name
            );
            return Err(OptimizeError::OutputExists(final_path));
        }

        let temp_output = PathResolver::temp_output(&final_path)?;

        let encoded = self.codec.optimize(path, temp_output.path()).await?;

        // Post-condition: trust the bytes on disk, not the codec's report
        let optimized_size = tokio::fs::metadata(temp_output.path())
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if optimized_size == 0 {
            return Err(OptimizeError::EmptyOutput(encoded.path));
        }

        if optimized_size as f64 >= original_size as f64 * self.size_threshold {
            info!(
                "⏭️  {}: {} → {}, keeping original",
                file_name,
                FileManager::format_size(original_size),
                FileManager::format_size(optimized_size)
            );
            return Ok(TaskOutcome::Kept {
                original_size,
                optimized_size,
            });
        }

        // Temporary files are created 0600; the swapped file keeps the source's mode
        let permissions = tokio::fs::metadata(path).await?.permissions();
        tokio::fs::set_permissions(temp_output.path(), permissions).await?;

        if changes_extension {
            temp_output.persist_noclobber(&final_path).map_err(|e| {
                if e.error.kind() == ErrorKind::AlreadyExists {
                    OptimizeError::OutputExists(final_path.clone())
                } else {
                    OptimizeError::Io(e.error)
                }
            })?;
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("⚠️  Could not remove {} after normalization: {}", path.display(), e);
            }
        } else {
            temp_output
                .persist(&final_path)
                .map_err(|e| OptimizeError::Io(e.error))?;
        }

        info!(
            "✅ {}: {} → {} ({:.1}% saved)",
            file_name,
            FileManager::format_size(original_size),
            FileManager::format_size(optimized_size),
            FileManager::calculate_reduction(original_size, optimized_size)
        );
        info!(
            "💾 Original backed up as: {}",
            display_name(&PathResolver::backup_path(path))
        );

        Ok(TaskOutcome::Optimized {
            final_path,
            original_size,
            optimized_size,
        })
    }

    /// Copy the backup back over `path`, through a temporary sibling
    async fn restore(
        &self,
        path: &Path,
        backup_path: &Path,
        original_size: u64,
        error: OptimizeError,
    ) -> TaskOutcome {
        let file_name = display_name(path);
        error!("❌ Failed to optimize {}: {}", file_name, error);

        let restored = async {
            let temp = PathResolver::temp_output(path)?;
            tokio::fs::copy(backup_path, temp.path()).await?;
            temp.persist(path).map_err(|e| e.error)?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        match restored {
            Ok(()) => {
                info!("🔙 Restored original file from backup: {}", file_name);
                TaskOutcome::Restored {
                    original_size,
                    error,
                }
            }
            Err(e) => {
                error!("❌ Could not restore {} from {}: {}", file_name, backup_path.display(), e);
                TaskOutcome::Failed { error }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
