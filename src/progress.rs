//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo e le statistiche di sessione.
//!
//! ## Responsabilità:
//! - Spinner `indicatif` per operazioni indeterminate (encode video)
//! - Barra di avanzamento per l'ottimizzazione one-shot (`--once`)
//! - Tracking statistiche di ottimizzazione della sessione corrente
//! - Calcolo percentuali di riduzione e byte risparmiati
//! - Riepilogo finale stampato allo shutdown
//!
//! ## Statistiche tracciate:
//! - **files_processed**: Totale tentativi conclusi
//! - **files_optimized**: File effettivamente sostituiti
//! - **files_kept**: File lasciati invariati (output non più piccolo)
//! - **errors**: Tentativi falliti (ripristinati o meno)
//! - **total_original_size / total_optimized_size**: Byte dei soli file sostituiti
//!
//! I byte contano solo i file sostituiti, così il riepilogo di sessione
//! coincide con il report storico ricostruito dalle coppie `.original` su disco.
//!
//! ## Esempio:
//! ```ignore
//! let stats = SharedStats::default();
//! stats.record(&outcome);
//! println!("{}", stats.snapshot().format_summary());
//! ```

use crate::file_manager::FileManager;
use crate::optimizer::task_optimizer::TaskOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Factory for progress widgets
pub struct ProgressManager;

impl ProgressManager {
    /// Create a bar counting processed files
    pub fn bar(total_files: u64) -> ProgressBar {
        let bar = ProgressBar::new(total_files);

        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        bar
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Statistics tracker for optimization results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OptimizationStats {
    pub files_processed: usize,
    pub files_optimized: usize,
    pub files_kept: usize,
    pub errors: usize,
    pub total_original_size: u64,
    pub total_optimized_size: u64,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_optimized(&mut self, original_size: u64, new_size: u64) {
        self.files_processed += 1;
        self.files_optimized += 1;
        self.total_original_size += original_size;
        self.total_optimized_size += new_size;
    }

    pub fn add_kept(&mut self) {
        self.files_processed += 1;
        self.files_kept += 1;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    /// Fold one attempt into the counters. Abandoned attempts are not counted.
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Optimized {
                original_size,
                optimized_size,
                ..
            } => self.add_optimized(*original_size, *optimized_size),
            TaskOutcome::Kept { .. } => self.add_kept(),
            TaskOutcome::Restored { .. } | TaskOutcome::Failed { .. } => self.add_error(),
            TaskOutcome::Abandoned => {}
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_optimized_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.total_original_size, self.total_optimized_size)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Optimized: {} | Kept: {} | Errors: {} | {} → {} | Total saved: {} ({:.1}%)",
            self.files_processed,
            self.files_optimized,
            self.files_kept,
            self.errors,
            FileManager::format_size(self.total_original_size),
            FileManager::format_size(self.total_optimized_size),
            FileManager::format_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}

/// Session statistics shared between concurrent attempts
#[derive(Debug, Clone, Default)]
pub struct SharedStats {
    inner: Arc<Mutex<OptimizationStats>>,
}

impl SharedStats {
    fn lock(&self) -> MutexGuard<'_, OptimizationStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, outcome: &TaskOutcome) {
        self.lock().record(outcome);
    }

    pub fn snapshot(&self) -> OptimizationStats {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OptimizeError;
    use std::path::PathBuf;

    #[test]
    fn test_record_outcomes() {
        let mut stats = OptimizationStats::new();
        stats.record(&TaskOutcome::Optimized {
            final_path: PathBuf::from("a.jpg"),
            original_size: 1_000_000,
            optimized_size: 400_000,
        });
        stats.record(&TaskOutcome::Kept {
            original_size: 100,
            optimized_size: 120,
        });
        stats.record(&TaskOutcome::Restored {
            original_size: 50,
            error: OptimizeError::FFmpegExit(1),
        });
        stats.record(&TaskOutcome::Abandoned);

        assert_eq!(stats.files_processed, 3);
        assert_eq!(stats.files_optimized, 1);
        assert_eq!(stats.files_kept, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.bytes_saved(), 600_000);
        assert_eq!(stats.overall_reduction_percent(), 60.0);
    }

    #[test]
    fn test_empty_stats() {
        let stats = OptimizationStats::new();
        assert_eq!(stats.overall_reduction_percent(), 0.0);
        assert!(stats.format_summary().contains("Processed: 0 files"));
    }

    #[test]
    fn test_shared_stats_snapshot() {
        let shared = SharedStats::default();
        let clone = shared.clone();
        clone.record(&TaskOutcome::Failed {
            error: OptimizeError::FFmpegTerminated,
        });
        assert_eq!(shared.snapshot().errors, 1);
    }

    #[test]
    fn test_shared_stats_survive_poisoned_lock() {
        let shared = SharedStats::default();
        let inner = Arc::clone(&shared.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("worker panicked while holding the stats");
        })
        .join();
        assert!(shared.inner.is_poisoned());

        shared.record(&TaskOutcome::Kept {
            original_size: 10,
            optimized_size: 12,
        });
        assert_eq!(shared.snapshot().files_kept, 1);
    }
}
