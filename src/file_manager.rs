//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file comuni a entrambe le pipeline.
//!
//! ## Responsabilità:
//! - Determinazione tipo media (immagine vs video) dall'estensione
//! - Naming dei backup (`<nome><ext>.original`) e riconoscimento dei backup
//! - Filtro dei file nascosti (dotfile), usati anche come file temporanei
//! - Fingerprint (dimensione + mtime) per riconoscere le scritture della pipeline
//! - Cleanup esplicito dei backup nelle directory monitorate
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, SVG
//! - **Video**: MP4, AVI, MOV, MKV, WebM, FLV, WMV, M4V
//!
//! ## Esempio:
//! ```ignore
//! let backup = FileManager::backup_path(Path::new("assets/hero.jpg"));
//! assert_eq!(backup, PathBuf::from("assets/hero.jpg.original"));
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Suffix appended to the full file name of a backup
pub const BACKUP_SUFFIX: &str = ".original";

/// Kind of media handled by a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a path by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        if FileManager::is_image(path) {
            Some(Self::Image)
        } else if FileManager::is_video(path) {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Size and modification time of a file, used to recognise our own writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Manages file operations shared by the pipelines
pub struct FileManager;

impl FileManager {
    /// Check if a file is an image
    pub fn is_image(path: &Path) -> bool {
        matches!(
            Self::extension(path).as_deref(),
            Some("jpg" | "jpeg" | "png" | "webp" | "svg")
        )
    }

    /// Check if a file is a video
    pub fn is_video(path: &Path) -> bool {
        matches!(
            Self::extension(path).as_deref(),
            Some("mp4" | "avi" | "mov" | "mkv" | "webm" | "flv" | "wmv" | "m4v")
        )
    }

    /// Lowercased extension without the dot
    pub fn extension(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Backup location for a media file: `<name><ext>.original`
    pub fn backup_path(original: &Path) -> PathBuf {
        let mut backup = original.as_os_str().to_owned();
        backup.push(BACKUP_SUFFIX);
        PathBuf::from(backup)
    }

    /// Check if a path names a backup file
    pub fn is_backup(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(BACKUP_SUFFIX))
            .unwrap_or(false)
    }

    /// Inverse of [`FileManager::backup_path`]
    pub fn original_from_backup(backup: &Path) -> Option<PathBuf> {
        let name = backup.file_name()?.to_string_lossy();
        let stripped = name.strip_suffix(BACKUP_SUFFIX)?;
        if stripped.is_empty() {
            return None;
        }
        Some(backup.with_file_name(stripped))
    }

    /// Dotfiles are never treated as media (temporary encoder outputs are dotfiles)
    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// Current fingerprint of a file, `None` if it cannot be read
    pub async fn fingerprint(path: &Path) -> Option<Fingerprint> {
        let metadata = fs::metadata(path).await.ok()?;
        Some(Fingerprint {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    /// Find every backup of the given kind below the directories
    pub fn find_backups(dirs: &[PathBuf], kind: MediaKind) -> Vec<PathBuf> {
        let mut backups = Vec::new();

        for dir in dirs.iter().filter(|d| d.is_dir()) {
            for entry in WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if !Self::is_backup(path) {
                    continue;
                }
                let matches_kind = Self::original_from_backup(path)
                    .and_then(|original| MediaKind::from_path(&original))
                    == Some(kind);
                if matches_kind {
                    backups.push(path.to_path_buf());
                }
            }
        }

        backups.sort();
        backups
    }

    /// Delete every backup of the given kind. Irreversible; operator-invoked only.
    pub async fn cleanup_backups(dirs: &[PathBuf], kind: MediaKind) -> Result<usize> {
        info!("🧹 Cleaning up {} backup files...", kind);

        let mut removed = 0;
        for backup in Self::find_backups(dirs, kind) {
            match fs::remove_file(&backup).await {
                Ok(()) => {
                    info!("🗑️  Removed: {}", backup.display());
                    removed += 1;
                }
                Err(e) => warn!("⚠️  Could not remove {}: {}", backup.display(), e),
            }
        }

        info!("✅ Backup cleanup completed ({} files removed)", removed);
        Ok(removed)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
