//! # Auto Media Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per diverse operazioni
//! - `file_manager`: Tipi di media, naming dei backup, cleanup
//! - `image_processor`: Ottimizzazione immagini in-process (JPEG/PNG/WebP, SVG copiati)
//! - `video_processor`: Ottimizzazione video con ffprobe/ffmpeg (output MP4)
//! - `optimizer`: Watcher, ottimizzazione one-shot, safe replace e trait dei codec
//! - `progress`: Spinner e statistiche di sessione
//! - `report`: Statistiche storiche ricostruite dai backup su disco
//! - `platform`: Comandi esterni e istruzioni di installazione
//!
//! ## Utilizzo:
//! ```ignore
//! use auto_media_optimizer::{Config, MediaKind, MediaWatcher, SharedStats};
//!
//! let config = Config::default();
//! let mut watcher = MediaWatcher::from_config(MediaKind::Image, &config, SharedStats::default());
//! watcher.start().await?;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod report;
pub mod utils;
pub mod video_processor;

pub use config::Config;
pub use error::OptimizeError;
pub use file_manager::{FileManager, MediaKind};
pub use optimizer::{BatchOptimizer, MediaWatcher, TaskOptimizer, TaskOutcome};
pub use progress::{OptimizationStats, SharedStats};
pub use report::HistoricalReport;
