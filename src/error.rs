//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file spariti, permessi, etc.)
//! - `Image`: Errori di decodifica/codifica immagini
//! - `FFmpegExit` / `FFmpegTerminated`: Encoder video fallito
//! - `Encode`: Encoder immagine (JPEG/PNG/WebP) fallito
//! - `EmptyOutput`: Post-condizione violata (output a zero byte o mancante)
//! - `OutputExists`: Il path normalizzato (`.mp4`) appartiene già a un altro file
//! - `MissingDependency`: Tool esterno mancante (ffmpeg) con istruzioni
//! - `Watch`: Errori del sottosistema di watching
//! - `Validation`: Errori di validazione configurazione
//!
//! ## Esempio:
//! ```ignore
//! if !ffmpeg_available {
//!     return Err(OptimizeError::MissingDependency {
//!         tool: "ffmpeg".to_string(),
//!         guidance: PlatformCommands::install_guidance("ffmpeg"),
//!     });
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for media optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("FFmpeg exited with code {0}")]
    FFmpegExit(i32),

    #[error("FFmpeg was terminated by a signal")]
    FFmpegTerminated,

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Optimized output is empty or missing: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Dependency missing: {tool}\n{guidance}")]
    MissingDependency { tool: String, guidance: String },

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Validation(String),
}
