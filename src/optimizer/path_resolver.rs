//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path usati dal safe replace:
//! backup, file temporaneo di output e path finale. Evita duplicazione tra
//! TaskOptimizer, report storico e watcher.

use crate::file_manager::FileManager;
use crate::optimizer::codec::MediaCodec;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Utility per calcolare i path in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Path finale dopo lo swap: stesso nome, estensione del codec se la impone.
    ///
    /// Il confronto dell'estensione ignora le maiuscole: `clip.MP4` resta
    /// `clip.MP4`, altrimenti su filesystem case-insensitive il rename e la
    /// rimozione del vecchio path toccherebbero lo stesso file.
    pub fn final_path(input_path: &Path, codec: &dyn MediaCodec) -> PathBuf {
        match codec.output_extension() {
            Some(ext) if FileManager::extension(input_path).as_deref() != Some(ext) => {
                input_path.with_extension(ext)
            }
            _ => input_path.to_path_buf(),
        }
    }

    /// True se lo swap cambia l'estensione (es. `clip.mov` → `clip.mp4`)
    pub fn changes_extension(input_path: &Path, codec: &dyn MediaCodec) -> bool {
        Self::final_path(input_path, codec) != input_path
    }

    /// Backup sibling di un file (`<nome><ext>.original`)
    pub fn backup_path(input_path: &Path) -> PathBuf {
        FileManager::backup_path(input_path)
    }

    /// Crea il file temporaneo di output nella stessa directory del path finale.
    ///
    /// Il nome inizia con un punto, così il watcher lo ignora, e mantiene
    /// l'estensione finale, che gli encoder usano per scegliere il formato.
    /// Stessa directory = stesso filesystem, quindi lo swap è un rename.
    pub fn temp_output(final_path: &Path) -> std::io::Result<NamedTempFile> {
        let dir = final_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let suffix = final_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        debug!("Temporary output: {}", temp.path().display());
        Ok(temp)
    }

    /// Path corrente di un file che ha un backup, tenendo conto della
    /// normalizzazione a `.mp4` dei video
    pub fn current_for_backup(backup: &Path) -> Option<PathBuf> {
        let original = FileManager::original_from_backup(backup)?;
        if original.exists() {
            return Some(original);
        }
        if FileManager::is_video(&original) {
            let normalized = original.with_extension("mp4");
            if normalized.exists() {
                return Some(normalized);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageSettings, VideoSettings};
    use crate::image_processor::ImageProcessor;
    use crate::video_processor::VideoProcessor;
    use tempfile::TempDir;

    #[test]
    fn test_final_path_per_codec() {
        let image = ImageProcessor::new(ImageSettings::default());
        let video = VideoProcessor::new(VideoSettings::default(), "ffmpeg", "ffprobe");

        assert_eq!(
            PathResolver::final_path(Path::new("assets/a.PNG"), &image),
            PathBuf::from("assets/a.PNG")
        );
        assert_eq!(
            PathResolver::final_path(Path::new("videos/b.mov"), &video),
            PathBuf::from("videos/b.mp4")
        );
        assert!(PathResolver::changes_extension(Path::new("videos/b.mov"), &video));
        assert!(!PathResolver::changes_extension(Path::new("videos/b.mp4"), &video));
    }

    #[test]
    fn test_uppercase_mp4_keeps_its_path() {
        let video = VideoProcessor::new(VideoSettings::default(), "ffmpeg", "ffprobe");

        assert_eq!(
            PathResolver::final_path(Path::new("videos/clip.MP4"), &video),
            PathBuf::from("videos/clip.MP4")
        );
        assert!(!PathResolver::changes_extension(Path::new("videos/clip.MP4"), &video));
        assert_eq!(
            PathResolver::final_path(Path::new("videos/clip.MOV"), &video),
            PathBuf::from("videos/clip.mp4")
        );
    }

    #[test]
    fn test_temp_output_is_hidden_sibling() {
        let temp_dir = TempDir::new().unwrap();
        let final_path = temp_dir.path().join("hero.jpg");

        let temp = PathResolver::temp_output(&final_path).unwrap();

        assert_eq!(temp.path().parent(), Some(temp_dir.path()));
        assert!(FileManager::is_hidden(temp.path()));
        assert_eq!(FileManager::extension(temp.path()).as_deref(), Some("jpg"));
        assert_ne!(temp.path(), final_path.as_path());
    }

    #[test]
    fn test_current_for_backup_follows_mp4_normalization() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("clip.mp4"), b"new").unwrap();
        std::fs::write(dir.join("clip.mov.original"), b"old").unwrap();
        std::fs::write(dir.join("gone.jpg.original"), b"old").unwrap();

        assert_eq!(
            PathResolver::current_for_backup(&dir.join("clip.mov.original")),
            Some(dir.join("clip.mp4"))
        );
        assert_eq!(PathResolver::current_for_backup(&dir.join("gone.jpg.original")), None);
    }
}
