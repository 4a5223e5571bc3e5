//! # Codec Backend
//!
//! Trait comune ai due encoder, così che lo stesso `TaskOptimizer` e lo stesso
//! `MediaWatcher` servano sia la pipeline immagini sia quella video.
//!
//! ## Implementazioni:
//! - `ImageProcessor`: in-process con il crate `image`, stesso formato dell'input
//! - `VideoProcessor`: ffprobe + ffmpeg come sottoprocesso, output sempre `.mp4`

use crate::config::Config;
use crate::error::OptimizeError;
use crate::file_manager::MediaKind;
use crate::image_processor::ImageProcessor;
use crate::video_processor::VideoProcessor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedFile {
    /// Where the encoder wrote its output
    pub path: PathBuf,
    pub original_size: u64,
    pub optimized_size: u64,
}

/// An encoder that turns one media file into an optimized copy
#[async_trait]
pub trait MediaCodec: Send + Sync {
    fn kind(&self) -> MediaKind;

    /// Extension (without dot) of every output; `None` keeps the source's
    fn output_extension(&self) -> Option<&str> {
        None
    }

    /// Verify external tools before the pipeline subscribes to anything
    async fn check_dependencies(&self) -> Result<(), OptimizeError> {
        Ok(())
    }

    /// Encode `input` into `output`. Must not touch `input`.
    async fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizedFile, OptimizeError>;
}

#[async_trait]
impl MediaCodec for ImageProcessor {
    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    async fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizedFile, OptimizeError> {
        ImageProcessor::optimize(self, input, output).await
    }
}

#[async_trait]
impl MediaCodec for VideoProcessor {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn output_extension(&self) -> Option<&str> {
        Some("mp4")
    }

    async fn check_dependencies(&self) -> Result<(), OptimizeError> {
        VideoProcessor::check_dependencies(self).await
    }

    async fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizedFile, OptimizeError> {
        VideoProcessor::optimize(self, input, output).await
    }
}

/// Build the codec serving a pipeline
pub fn codec_for(kind: MediaKind, config: &Config) -> Arc<dyn MediaCodec> {
    match kind {
        MediaKind::Image => Arc::new(ImageProcessor::new(config.compression.image.clone())),
        MediaKind::Video => Arc::new(VideoProcessor::new(
            config.compression.video.clone(),
            config.ffmpeg.clone(),
            config.ffprobe.clone(),
        )),
    }
}
