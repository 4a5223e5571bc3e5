//! # Watch Coordinator Module
//!
//! Coordinatore che possiede le sottoscrizioni al filesystem e la mappa dei
//! file in volo. Uno per tipo di media (immagini / video).
//!
//! ## Responsabilità:
//! - Sottoscrizione ricorsiva (`notify`) a ogni directory monitorata esistente
//! - Filtro eventi: estensione, file nascosti, backup `.original`, file già in volo
//! - Debounce: un solo timer per path, eventi successivi accorpati
//! - Dispatch al `TaskOptimizer` con concorrenza limitata da un `Semaphore`
//! - Soppressione delle proprie scritture (fingerprint dopo swap/restore)
//! - `stop()` idempotente: stacca le sottoscrizioni e annulla i debounce pendenti,
//!   i tentativi già in `Processing` arrivano in fondo
//!
//! ## Ciclo di vita di un file:
//! ```text
//! evento ──► Detected ──► Debouncing ──(timer, file esiste)──► Processing
//!                              │                                   │
//!                     (file sparito / stop)            Succeeded | Failed ──► Restored
//!                              ▼                                   ▼
//!                         abbandonato                   rimosso dalla mappa
//! ```
//!
//! ## Esempio:
//! ```ignore
//! let mut watcher = MediaWatcher::from_config(MediaKind::Video, &config, stats.clone());
//! watcher.start().await?;
//! tokio::signal::ctrl_c().await?;
//! watcher.stop();
//! watcher.wait_idle().await;
//! ```

use crate::config::{Config, PipelineConfig};
use crate::error::OptimizeError;
use crate::file_manager::{FileManager, Fingerprint, MediaKind};
use crate::optimizer::codec::codec_for;
use crate::optimizer::task_optimizer::{TaskOptimizer, TaskOutcome};
use crate::progress::SharedStats;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the channel bridging notify's thread to the runtime
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long a self-write fingerprint outlives the debounce window
const OWN_WRITE_GRACE: Duration = Duration::from_secs(60);

/// Lifecycle state of a watched file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Detected,
    Debouncing,
    Processing,
    Succeeded,
    Failed,
    Restored,
}

/// A file known to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub state: FileState,
    pub original_size: Option<u64>,
    pub optimized_size: Option<u64>,
}

impl WatchedFile {
    fn new(path: PathBuf, kind: MediaKind) -> Self {
        Self {
            path,
            kind,
            state: FileState::Detected,
            original_size: None,
            optimized_size: None,
        }
    }

    /// Move to the terminal state matching an attempt's outcome
    fn finish(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Optimized {
                original_size,
                optimized_size,
                ..
            } => {
                self.state = FileState::Succeeded;
                self.original_size = Some(*original_size);
                self.optimized_size = Some(*optimized_size);
            }
            TaskOutcome::Kept {
                original_size,
                optimized_size,
            } => {
                self.state = FileState::Succeeded;
                self.original_size = Some(*original_size);
                self.optimized_size = Some(*optimized_size);
            }
            TaskOutcome::Restored { original_size, .. } => {
                self.state = FileState::Restored;
                self.original_size = Some(*original_size);
            }
            TaskOutcome::Failed { .. } | TaskOutcome::Abandoned => {
                self.state = FileState::Failed;
            }
        }
    }
}

/// In-flight map entry
struct InFlight {
    file: WatchedFile,
    /// Debounce timer; taken once the attempt enters Processing
    timer: Option<JoinHandle<()>>,
}

/// Fingerprints of the files the pipeline wrote itself.
///
/// The echo of a swap arrives within one debounce window, so entries older
/// than `ttl` are dropped whenever a new write is recorded.
#[derive(Debug)]
struct OwnWrites {
    ttl: Duration,
    entries: HashMap<PathBuf, (Fingerprint, Instant)>,
}

impl OwnWrites {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    fn record(&mut self, path: PathBuf, fingerprint: Fingerprint, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, written_at)| now.saturating_duration_since(*written_at) < ttl);
        self.entries.insert(path, (fingerprint, now));
    }

    /// True when `current` is exactly what was recorded for `path`.
    /// A mismatch means the file was edited since, so the entry is dropped.
    fn matches(&mut self, path: &Path, current: Option<Fingerprint>) -> bool {
        let Some((recorded, _)) = self.entries.get(path) else {
            return false;
        };
        if current == Some(*recorded) {
            true
        } else {
            self.entries.remove(path);
            false
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// State shared between the coordinator, its event loop and its timers
struct Shared {
    kind: MediaKind,
    pipeline: PipelineConfig,
    optimizer: TaskOptimizer,
    semaphore: Semaphore,
    stats: SharedStats,
    in_flight: Mutex<HashMap<PathBuf, InFlight>>,
    own_writes: Mutex<OwnWrites>,
    idle: Notify,
    stopped: AtomicBool,
}

impl Shared {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<PathBuf, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn own_writes(&self) -> MutexGuard<'_, OwnWrites> {
        self.own_writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove a path from the in-flight map, waking `wait_idle` when it empties
    fn release(&self, path: &Path) {
        let mut in_flight = self.in_flight();
        in_flight.remove(path);
        if in_flight.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn handle_event(self: &Arc<Self>, event: Event) {
        let paths: &[PathBuf] = match event.kind {
            EventKind::Create(_) => &event.paths,
            EventKind::Modify(ModifyKind::Metadata(_)) => return,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => return,
            // (from, to): only the destination is a new file
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.get(1..).unwrap_or_default()
            }
            EventKind::Modify(_) => &event.paths,
            _ => return,
        };

        for path in paths {
            self.handle_path(path);
        }
    }

    /// Filter one add/change notification and start debouncing it
    fn handle_path(self: &Arc<Self>, path: &Path) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if FileManager::is_hidden(path) || FileManager::is_backup(path) || !self.pipeline.tracks(path) {
            return;
        }
        if !path.is_file() {
            return;
        }
        if self.is_own_write(path) {
            debug!("Ignoring our own write to {}", path.display());
            return;
        }

        let mut in_flight = self.in_flight();
        if let Some(entry) = in_flight.get(path) {
            debug!("Coalescing event for {} ({:?})", path.display(), entry.file.state);
            return;
        }

        debug!("Debouncing {}", path.display());

        let mut file = WatchedFile::new(path.to_path_buf(), self.kind);
        file.state = FileState::Debouncing;

        let shared = Arc::clone(self);
        let timer_path = path.to_path_buf();
        let debounce = self.pipeline.debounce();
        // Spawned while the map is locked, so the timer always finds its entry
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            shared.dispatch(timer_path).await;
        });

        in_flight.insert(
            path.to_path_buf(),
            InFlight {
                file,
                timer: Some(timer),
            },
        );
    }

    /// True when the file on disk is exactly what the pipeline last wrote
    fn is_own_write(&self, path: &Path) -> bool {
        let current = std::fs::metadata(path).ok().map(|m| Fingerprint {
            len: m.len(),
            modified: m.modified().ok(),
        });
        self.own_writes().matches(path, current)
    }

    /// Debounce elapsed: re-check, wait for a slot, then run the attempt
    async fn dispatch(self: Arc<Self>, path: PathBuf) {
        if !path.exists() {
            debug!("File vanished during debounce: {}", path.display());
            self.release(&path);
            return;
        }
        if self.is_own_write(&path) {
            debug!("Ignoring our own write to {}", path.display());
            self.release(&path);
            return;
        }

        info!(
            "🆕 New {} detected: {}",
            self.kind,
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        // Still Debouncing while queued, so stop() can cancel it
        let Ok(_permit) = self.semaphore.acquire().await else {
            self.release(&path);
            return;
        };

        {
            let mut in_flight = self.in_flight();
            if self.stopped.load(Ordering::SeqCst) {
                in_flight.remove(&path);
                if in_flight.is_empty() {
                    self.idle.notify_waiters();
                }
                return;
            }
            match in_flight.get_mut(&path) {
                Some(entry) => {
                    entry.file.state = FileState::Processing;
                    // This task is the attempt now; stop() must not abort it
                    entry.timer = None;
                }
                None => return,
            }
        }

        let outcome = self.optimizer.process(&path).await;
        self.stats.record(&outcome);

        if let Some(written) = outcome.written_path(&path) {
            if let Some(fingerprint) = FileManager::fingerprint(written).await {
                self.own_writes()
                    .record(written.to_path_buf(), fingerprint, Instant::now());
            }
        }

        if let Some(entry) = self.in_flight().get_mut(&path) {
            entry.file.finish(&outcome);
            debug!("{} finished as {:?}", path.display(), entry.file.state);
        }
        if let TaskOutcome::Abandoned = outcome {
            debug!("Abandoned {}", path.display());
        }
        self.release(&path);
        debug!("📈 Session: {}", self.stats.snapshot().format_summary());
    }
}

/// Watches the directories of one pipeline and optimizes what appears in them
pub struct MediaWatcher {
    shared: Arc<Shared>,
    watchers: Vec<(PathBuf, RecommendedWatcher)>,
    event_loop: Option<JoinHandle<()>>,
}

impl MediaWatcher {
    pub fn new(kind: MediaKind, pipeline: PipelineConfig, optimizer: TaskOptimizer, stats: SharedStats) -> Self {
        let permits = pipeline.max_concurrent.max(1);
        let own_write_ttl = pipeline.debounce() * 2 + OWN_WRITE_GRACE;
        Self {
            shared: Arc::new(Shared {
                kind,
                pipeline,
                optimizer,
                semaphore: Semaphore::new(permits),
                stats,
                in_flight: Mutex::new(HashMap::new()),
                own_writes: Mutex::new(OwnWrites::new(own_write_ttl)),
                idle: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
            watchers: Vec::new(),
            event_loop: None,
        }
    }

    /// Coordinator for `kind` with the codec and settings from `config`
    pub fn from_config(kind: MediaKind, config: &Config, stats: SharedStats) -> Self {
        let optimizer = TaskOptimizer::new(codec_for(kind, config), config.size_threshold);
        Self::new(kind, config.pipeline(kind).clone(), optimizer, stats)
    }

    pub fn kind(&self) -> MediaKind {
        self.shared.kind
    }

    /// Directories with an active subscription
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watchers.iter().map(|(dir, _)| dir.clone()).collect()
    }

    /// Check dependencies, then subscribe to every existing watched directory.
    ///
    /// Existing files are not processed. Missing directories are skipped with a
    /// warning; a directory that cannot be watched is logged and skipped.
    pub async fn start(&mut self) -> Result<(), OptimizeError> {
        if !self.watchers.is_empty() || self.shared.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.shared.optimizer.codec().check_dependencies().await?;

        for dir in &self.shared.pipeline.ensure_dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await?;
                info!("📁 Created {} folder: {}", self.shared.kind, dir.display());
            }
        }

        let (tx, mut rx) = mpsc::channel::<(PathBuf, notify::Result<Event>)>(EVENT_CHANNEL_CAPACITY);

        for dir in &self.shared.pipeline.watched_dirs {
            if !dir.is_dir() {
                warn!("⚠️  Folder {} does not exist, skipping", dir.display());
                continue;
            }
            let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());

            let watcher = match subscribe(&dir, tx.clone()) {
                Ok(watcher) => watcher,
                Err(e) => {
                    warn!("⚠️  Could not watch {}: {}", dir.display(), e);
                    continue;
                }
            };

            info!("👀 Watching: {}", dir.display());
            self.watchers.push((dir, watcher));
        }
        drop(tx);

        if self.watchers.is_empty() {
            warn!("⚠️  No {} folders are being watched", self.shared.kind);
        }

        let shared = Arc::clone(&self.shared);
        self.event_loop = Some(tokio::spawn(async move {
            while let Some((dir, res)) = rx.recv().await {
                match res {
                    Ok(event) => shared.handle_event(event),
                    Err(e) => warn!("⚠️  Watch error in {}: {}", dir.display(), e),
                }
            }
        }));

        Ok(())
    }

    /// Treat `path` as if a change notification had arrived for it
    pub fn notify_change(&self, path: &Path) {
        self.shared.handle_path(path);
    }

    /// Detach subscriptions and cancel pending debounce timers. Idempotent.
    pub fn stop(&mut self) {
        let already_stopped = self.shared.stopped.swap(true, Ordering::SeqCst);

        self.watchers.clear();
        if let Some(event_loop) = self.event_loop.take() {
            event_loop.abort();
        }

        let mut in_flight = self.shared.in_flight();
        let pending: Vec<PathBuf> = in_flight
            .iter()
            .filter(|(_, entry)| entry.file.state == FileState::Debouncing)
            .map(|(path, _)| path.clone())
            .collect();
        for path in pending {
            if let Some(InFlight { timer: Some(timer), .. }) = in_flight.remove(&path) {
                timer.abort();
            }
            debug!("Cancelled pending {}", path.display());
        }
        if in_flight.is_empty() {
            self.shared.idle.notify_waiters();
        }

        if !already_stopped {
            info!("🛑 Stopped {} watcher", self.shared.kind);
        }
    }

    /// Resolve once no file is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.in_flight().is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight().len()
    }

    /// Current record for `path`, if in flight
    pub fn watched_file(&self, path: &Path) -> Option<WatchedFile> {
        self.shared.in_flight().get(path).map(|entry| entry.file.clone())
    }

    pub fn stats(&self) -> &SharedStats {
        &self.shared.stats
    }
}

impl Drop for MediaWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Subscribe to one directory, forwarding its events tagged with the directory
fn subscribe(
    dir: &Path,
    sender: mpsc::Sender<(PathBuf, notify::Result<Event>)>,
) -> Result<RecommendedWatcher, OptimizeError> {
    let label = dir.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // Runs on notify's thread; the receiver is gone only after stop()
        let _ = sender.blocking_send((label.clone(), res));
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}
