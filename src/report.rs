//! # Historical Report Module
//!
//! Ricostruisce le statistiche di risparmio dalle coppie `<file>.original` /
//! file corrente presenti su disco, senza stato in memoria. Funziona quindi
//! anche dopo un riavvio del processo.
//!
//! ## Esempio:
//! ```ignore
//! let report = HistoricalReport::scan(&config.video.watched_dirs, MediaKind::Video).await;
//! println!("{}", report.render());
//! ```

use crate::file_manager::{FileManager, MediaKind};
use crate::optimizer::path_resolver::PathResolver;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One backup paired with the file that replaced it
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub current: PathBuf,
    pub backup: PathBuf,
    pub original_size: u64,
    pub optimized_size: u64,
}

impl ReportEntry {
    pub fn savings_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.optimized_size)
    }
}

/// Savings recomputed from the backups found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalReport {
    pub kind: MediaKind,
    pub entries: Vec<ReportEntry>,
}

impl HistoricalReport {
    /// Pair every backup of `kind` under `dirs` with its current file.
    ///
    /// Backups whose current file is gone are skipped.
    pub async fn scan(dirs: &[PathBuf], kind: MediaKind) -> Self {
        let mut entries = Vec::new();

        for backup in FileManager::find_backups(dirs, kind) {
            let Some(current) = PathResolver::current_for_backup(&backup) else {
                debug!("No current file for backup {}", backup.display());
                continue;
            };

            let (Ok(original), Ok(optimized)) = (
                tokio::fs::metadata(&backup).await,
                tokio::fs::metadata(&current).await,
            ) else {
                continue;
            };

            entries.push(ReportEntry {
                current,
                backup,
                original_size: original.len(),
                optimized_size: optimized.len(),
            });
        }

        Self { kind, entries }
    }

    pub fn total_original(&self) -> u64 {
        self.entries.iter().map(|e| e.original_size).sum()
    }

    pub fn total_optimized(&self) -> u64 {
        self.entries.iter().map(|e| e.optimized_size).sum()
    }

    pub fn savings_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.total_original(), self.total_optimized())
    }

    /// Operator-facing listing with one line per file and the totals
    pub fn render(&self) -> String {
        let mut out = format!("📊 {} optimization statistics\n", capitalize(self.kind.label()));

        if self.entries.is_empty() {
            out.push_str(&format!("   No optimized {}s found.\n", self.kind));
            return out;
        }

        for entry in &self.entries {
            out.push_str(&format!(
                "   {}: {} → {} ({:.1}% saved)\n",
                file_name(&entry.current),
                FileManager::format_size(entry.original_size),
                FileManager::format_size(entry.optimized_size),
                entry.savings_percent()
            ));
        }

        let saved = self.total_original().saturating_sub(self.total_optimized());
        out.push_str(&format!(
            "\n   Files: {}\n   Total: {} → {}\n   Saved: {} ({:.1}%)\n",
            self.entries.len(),
            FileManager::format_size(self.total_original()),
            FileManager::format_size(self.total_optimized()),
            FileManager::format_size(saved),
            self.savings_percent()
        ));
        out
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_pairs_backups_with_current_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        std::fs::create_dir_all(dir.join("sub")).unwrap();

        std::fs::write(dir.join("a.jpg"), vec![0u8; 400]).unwrap();
        std::fs::write(dir.join("a.jpg.original"), vec![0u8; 1000]).unwrap();
        std::fs::write(dir.join("sub/b.png"), vec![0u8; 50]).unwrap();
        std::fs::write(dir.join("sub/b.png.original"), vec![0u8; 100]).unwrap();
        // orphan backup and unrelated video backup
        std::fs::write(dir.join("gone.webp.original"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.join("c.mp4.original"), vec![0u8; 10]).unwrap();

        let report = HistoricalReport::scan(&[dir.clone()], MediaKind::Image).await;

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.total_original(), 1100);
        assert_eq!(report.total_optimized(), 450);
        assert_eq!(report.entries[0].current, dir.join("a.jpg"));
        assert_eq!(report.entries[0].savings_percent(), 60.0);

        let rendered = report.render();
        assert!(rendered.contains("a.jpg"));
        assert!(rendered.contains("Files: 2"));
    }

    #[tokio::test]
    async fn test_video_report_follows_mp4_normalization() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        std::fs::write(dir.join("intro.mp4"), vec![0u8; 300]).unwrap();
        std::fs::write(dir.join("intro.mov.original"), vec![0u8; 1200]).unwrap();

        let report = HistoricalReport::scan(&[dir.clone()], MediaKind::Video).await;

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].current, dir.join("intro.mp4"));
        assert_eq!(report.savings_percent(), 75.0);
    }

    #[tokio::test]
    async fn test_empty_report() {
        let temp_dir = TempDir::new().unwrap();
        let report =
            HistoricalReport::scan(&[temp_dir.path().join("missing")], MediaKind::Video).await;
        assert!(report.entries.is_empty());
        assert_eq!(report.savings_percent(), 0.0);
        assert!(report.render().contains("No optimized videos found"));
    }
}
