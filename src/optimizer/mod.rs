//! # Optimizer Module
//!
//! Modulo che separa le responsabilità della pipeline in sottomoduli:
//! - `watcher`: Coordinatore degli eventi filesystem (debounce, in-flight, stop)
//! - `batch`: Ottimizzazione one-shot dei file già presenti
//! - `task_optimizer`: Safe replace per singoli file (backup, encode, swap, restore)
//! - `codec`: Trait comune agli encoder immagini e video
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod batch;
pub mod codec;
pub mod path_resolver;
pub mod task_optimizer;
pub mod watcher;

pub use batch::BatchOptimizer;
pub use codec::{codec_for, MediaCodec, OptimizedFile};
pub use path_resolver::PathResolver;
pub use task_optimizer::{TaskOptimizer, TaskOutcome};
pub use watcher::{FileState, MediaWatcher, WatchedFile};
