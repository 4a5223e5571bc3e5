//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione delle due pipeline (immagini e video).
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con un blocco `PipelineConfig` per ogni tipo di media
//! - Definisce `CompressionSettings` con i parametri di encoding immagini e video
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri principali:
//! - `image.debounce_ms`: attesa prima di processare un'immagine (default: 2000)
//! - `video.debounce_ms`: attesa prima di processare un video (default: 5000)
//! - `*.max_concurrent`: ottimizzazioni parallele massime (default: 4 immagini, 1 video)
//! - `compression.video.crf`: CRF video (0-51, default: 23, più basso = migliore qualità)
//! - `size_threshold`: sostituisce solo se `ottimizzato < originale * threshold` (default: 1.0)
//!
//! ## Esempio:
//! ```ignore
//! let mut config = Config::default();
//! config.video.max_concurrent = 2;
//! config.validate()?;
//! ```

use crate::file_manager::MediaKind;
use crate::error::OptimizeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// JPEG encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JpegSettings {
    pub quality: u8,
    pub progressive: bool,
}

/// PNG encoder settings (compression level 0-9)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PngSettings {
    pub compression_level: u8,
    pub progressive: bool,
}

/// WebP encoder settings (effort 0-6)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebpSettings {
    pub quality: u8,
    pub effort: u8,
}

/// Image re-encoding policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Images wider than this are scaled down, never up
    pub max_dimension: u32,
    pub jpeg: JpegSettings,
    pub png: PngSettings,
    pub webp: WebpSettings,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            jpeg: JpegSettings { quality: 85, progressive: true },
            png: PngSettings { compression_level: 8, progressive: true },
            webp: WebpSettings { quality: 85, effort: 6 },
        }
    }
}

/// Video encoding policy passed to ffmpeg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Constant Rate Factor (0-51, lower = better quality, bigger file)
    pub crf: u8,
    /// x264 preset (encode speed vs compression)
    pub preset: String,
    pub max_bitrate: String,
    pub buffer_size: String,
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: f64,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            crf: 23,
            preset: "medium".to_string(),
            max_bitrate: "2M".to_string(),
            buffer_size: "4M".to_string(),
            max_width: 1920,
            max_height: 1080,
            max_fps: 30.0,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Encoding settings for both pipelines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub image: ImageSettings,
    pub video: VideoSettings,
}

/// Settings of one watch pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directories monitored recursively; missing ones are skipped
    pub watched_dirs: Vec<PathBuf>,
    /// Tracked extensions, lowercase with leading dot
    pub extensions: Vec<String>,
    /// Quiet period before a detected file is processed
    pub debounce_ms: u64,
    /// Upper bound on optimizations running at the same time
    pub max_concurrent: usize,
    /// Directories created at startup when absent
    #[serde(default)]
    pub ensure_dirs: Vec<PathBuf>,
}

impl PipelineConfig {
    pub fn image_defaults() -> Self {
        Self {
            watched_dirs: default_asset_dirs(),
            extensions: to_extensions(&[".jpg", ".jpeg", ".png", ".webp", ".svg"]),
            debounce_ms: 2000,
            max_concurrent: 4,
            ensure_dirs: Vec::new(),
        }
    }

    pub fn video_defaults() -> Self {
        let mut watched_dirs = default_asset_dirs();
        watched_dirs.push(PathBuf::from("videos"));

        Self {
            watched_dirs,
            extensions: to_extensions(&[
                ".mp4", ".avi", ".mov", ".mkv", ".webm", ".flv", ".wmv", ".m4v",
            ]),
            // Videos are larger and take longer to finish writing
            debounce_ms: 5000,
            max_concurrent: 1,
            ensure_dirs: vec![PathBuf::from("videos")],
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Case-insensitive check against the tracked extension set
    pub fn tracks(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

fn default_asset_dirs() -> Vec<PathBuf> {
    ["assets", "assets2", "assest3"].iter().map(PathBuf::from).collect()
}

fn to_extensions(exts: &[&str]) -> Vec<String> {
    exts.iter().map(|e| e.to_string()).collect()
}

/// Configuration for the watch pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub image: PipelineConfig,
    pub video: PipelineConfig,
    pub compression: CompressionSettings,
    /// ffmpeg program name or path
    pub ffmpeg: String,
    /// ffprobe program name or path
    pub ffprobe: String,
    /// Replace only if optimized size < original size * threshold
    pub size_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: PipelineConfig::image_defaults(),
            video: PipelineConfig::video_defaults(),
            compression: CompressionSettings::default(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            size_threshold: 1.0,
        }
    }
}

impl Config {
    pub fn pipeline(&self, kind: MediaKind) -> &PipelineConfig {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
        }
    }

    pub fn pipeline_mut(&mut self, kind: MediaKind) -> &mut PipelineConfig {
        match kind {
            MediaKind::Image => &mut self.image,
            MediaKind::Video => &mut self.video,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let invalid = |msg: &str| Err(OptimizeError::Validation(msg.to_string()));
        let image = &self.compression.image;
        let video = &self.compression.video;

        if image.jpeg.quality == 0 || image.jpeg.quality > 100 {
            return invalid("JPEG quality must be between 1 and 100");
        }
        if image.webp.quality == 0 || image.webp.quality > 100 {
            return invalid("WebP quality must be between 1 and 100");
        }
        if image.png.compression_level > 9 {
            return invalid("PNG compression level must be between 0 and 9");
        }
        if image.webp.effort > 6 {
            return invalid("WebP effort must be between 0 and 6");
        }
        if image.max_dimension == 0 {
            return invalid("Maximum image dimension must be greater than 0");
        }

        if video.crf > 51 {
            return invalid("Video CRF must be between 0 and 51");
        }
        if video.max_width == 0 || video.max_height == 0 {
            return invalid("Maximum video dimensions must be greater than 0");
        }
        if video.max_fps <= 0.0 {
            return invalid("Maximum video frame rate must be greater than 0");
        }

        if self.size_threshold <= 0.0 || self.size_threshold > 1.0 {
            return invalid("Size threshold must be between 0.0 and 1.0");
        }

        for (name, pipeline) in [("image", &self.image), ("video", &self.video)] {
            if pipeline.max_concurrent == 0 {
                return Err(OptimizeError::Validation(format!(
                    "Number of concurrent {} optimizations must be greater than 0",
                    name
                )));
            }
            if pipeline.extensions.is_empty() {
                return Err(OptimizeError::Validation(format!(
                    "The {} pipeline must track at least one extension",
                    name
                )));
            }
            if let Some(bad) = pipeline.extensions.iter().find(|e| !e.starts_with('.')) {
                return Err(OptimizeError::Validation(format!(
                    "Extension '{}' must start with a dot",
                    bad
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from file, falling back to defaults when absent
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let mut config: Config = serde_json::from_str(&content)?;
        for pipeline in [&mut config.image, &mut config.video] {
            pipeline.extensions = pipeline.extensions.iter().map(|e| e.to_lowercase()).collect();
        }
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
