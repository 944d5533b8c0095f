//! Debounced package watcher
//!
//! Raw notify events are filtered (extensions, ignore patterns, `*.d.ts`),
//! coalesced per path within a debounce window, and emitted twice: as
//! individual `add`/`change`/`unlink` events and as one aggregated batch per
//! window. Ignored paths never surface, including during the initial scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Directory names that never produce events, regardless of caller options.
pub const ALWAYS_IGNORED: &[&str] = &["node_modules", ".devac", "dist", ".git", "build", "coverage"];

const DEFAULT_EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".cs", ".py",
];

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub debounce_ms: u64,
    /// Extensions with leading dot; files with other extensions are ignored.
    pub extensions: Vec<String>,
    /// Additional glob patterns to ignore, on top of `ALWAYS_IGNORED`.
    pub ignore_patterns: Vec<String>,
    /// When false, an initial scan emits `add` for every matching file
    /// already present.
    pub ignore_initial: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        WatcherOptions {
            debounce_ms: 100,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: Vec::new(),
            ignore_initial: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// One debounced window of primitive events.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<WatchEvent>,
}

#[derive(Debug, Clone)]
pub struct WatcherStats {
    pub is_watching: bool,
    pub events_processed: u64,
    pub last_event_time: Option<SystemTime>,
}

#[derive(Default)]
struct SharedStats {
    events_processed: AtomicU64,
    last_event_epoch_ms: AtomicU64,
}

pub struct PackageWatcher {
    root: PathBuf,
    options: WatcherOptions,
    ignore_set: GlobSet,
    watcher: Option<RecommendedWatcher>,
    debounce_task: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
}

impl PackageWatcher {
    pub fn new(root: impl AsRef<Path>, options: WatcherOptions) -> Result<Self> {
        let ignore_set = build_ignore_set(&options.ignore_patterns)?;
        Ok(PackageWatcher {
            root: root.as_ref().to_path_buf(),
            options,
            ignore_set,
            watcher: None,
            debounce_task: None,
            stopped: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SharedStats::default()),
        })
    }

    /// Begin watching. Returns the individual-event stream and the batch
    /// stream; consumers may use either or both.
    pub fn start(
        &mut self,
    ) -> Result<(
        mpsc::UnboundedReceiver<WatchEvent>,
        mpsc::UnboundedReceiver<EventBatch>,
    )> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<WatchEvent>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<WatchEvent>();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel::<EventBatch>();

        // Initial scan, before the notify subscription so pre-existing files
        // are not reported twice.
        if !self.options.ignore_initial {
            for entry in WalkDir::new(&self.root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !is_always_ignored(e.path()))
                .flatten()
            {
                let path = entry.path();
                if entry.file_type().is_file() && self.is_relevant(path) {
                    let _ = raw_tx.send(WatchEvent {
                        kind: WatchEventKind::Add,
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        let filter_root = self.root.clone();
        let filter_options = self.options.clone();
        let filter_ignore = self.ignore_set.clone();
        let notify_tx = raw_tx.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        error!("watch error: {e}");
                        return;
                    }
                };
                let kind = match event.kind {
                    notify::EventKind::Create(_) => WatchEventKind::Add,
                    notify::EventKind::Modify(_) => WatchEventKind::Change,
                    notify::EventKind::Remove(_) => WatchEventKind::Unlink,
                    _ => return,
                };
                for path in event.paths {
                    if !is_relevant_path(&path, &filter_root, &filter_options, &filter_ignore) {
                        continue;
                    }
                    if notify_tx
                        .send(WatchEvent {
                            kind,
                            path: path.clone(),
                        })
                        .is_err()
                    {
                        warn!("event channel closed; dropping {}", path.display());
                    }
                }
            })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);

        let debounce = Duration::from_millis(self.options.debounce_ms);
        let stopped = Arc::clone(&self.stopped);
        let stats = Arc::clone(&self.stats);
        self.debounce_task = Some(tokio::spawn(debounce_loop(
            raw_rx, event_tx, batch_tx, debounce, stopped, stats,
        )));

        info!("watching {}", self.root.display());
        Ok((event_rx, batch_rx))
    }

    /// Idempotent. Cancels pending debounce timers; no event fires after
    /// this returns.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watcher = None;
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        debug!("stopped watching {}", self.root.display());
    }

    pub fn get_stats(&self) -> WatcherStats {
        let last_ms = self.stats.last_event_epoch_ms.load(Ordering::Relaxed);
        WatcherStats {
            is_watching: self.watcher.is_some() && !self.stopped.load(Ordering::SeqCst),
            events_processed: self.stats.events_processed.load(Ordering::Relaxed),
            last_event_time: (last_ms > 0)
                .then(|| SystemTime::UNIX_EPOCH + Duration::from_millis(last_ms)),
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        is_relevant_path(path, &self.root, &self.options, &self.ignore_set)
    }
}

impl Drop for PackageWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Collect raw events into windows: the first event opens a window that
/// closes `debounce` later; everything arriving in between is coalesced per
/// path, then flushed as individual events plus one batch.
async fn debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<WatchEvent>,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
    batch_tx: mpsc::UnboundedSender<EventBatch>,
    debounce: Duration,
    stopped: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
) {
    loop {
        let Some(first) = raw_rx.recv().await else {
            return;
        };
        let mut window: Vec<WatchEvent> = vec![first];
        let deadline = tokio::time::sleep(debounce);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                more = raw_rx.recv() => match more {
                    Some(event) => window.push(event),
                    None => break,
                },
            }
        }

        if stopped.load(Ordering::SeqCst) {
            return;
        }

        let coalesced = coalesce(window);
        stats
            .events_processed
            .fetch_add(coalesced.len() as u64, Ordering::Relaxed);
        stats.last_event_epoch_ms.store(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            Ordering::Relaxed,
        );

        for event in &coalesced {
            if event_tx.send(event.clone()).is_err() {
                break;
            }
        }
        if batch_tx.send(EventBatch { events: coalesced }).is_err() {
            return;
        }
    }
}

/// One event per path per window. A change following an add stays an add;
/// otherwise the latest primitive wins.
fn coalesce(window: Vec<WatchEvent>) -> Vec<WatchEvent> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut merged: HashMap<PathBuf, WatchEventKind> = HashMap::new();
    for event in window {
        match merged.get(&event.path) {
            None => {
                order.push(event.path.clone());
                merged.insert(event.path, event.kind);
            }
            Some(WatchEventKind::Add) if event.kind == WatchEventKind::Change => {
                // The file is still new to consumers.
            }
            Some(_) => {
                merged.insert(event.path, event.kind);
            }
        }
    }
    order
        .into_iter()
        .map(|path| {
            let kind = merged[&path];
            WatchEvent { path, kind }
        })
        .collect()
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn is_always_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| ALWAYS_IGNORED.contains(&name))
        .unwrap_or(false)
}

fn is_relevant_path(
    path: &Path,
    root: &Path,
    options: &WatcherOptions,
    ignore_set: &GlobSet,
) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // Declaration files carry no structural content.
    if name.ends_with(".d.ts") {
        return false;
    }
    if !options.extensions.iter().any(|ext| name.ends_with(ext)) {
        return false;
    }
    for component in path.components() {
        if let Some(part) = component.as_os_str().to_str() {
            if ALWAYS_IGNORED.contains(&part) {
                return false;
            }
        }
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    if ignore_set.is_match(relative) || ignore_set.is_match(path) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn options_with(debounce_ms: u64, ignore_initial: bool) -> WatcherOptions {
        WatcherOptions {
            debounce_ms,
            ignore_initial,
            ..Default::default()
        }
    }

    async fn next_batch(
        rx: &mut mpsc::UnboundedReceiver<EventBatch>,
    ) -> Option<EventBatch> {
        timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    #[test]
    fn coalesce_merges_repeated_changes() {
        let path = PathBuf::from("a.ts");
        let window = vec![
            WatchEvent { kind: WatchEventKind::Change, path: path.clone() },
            WatchEvent { kind: WatchEventKind::Change, path: path.clone() },
            WatchEvent { kind: WatchEventKind::Change, path: path.clone() },
        ];
        let merged = coalesce(window);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, WatchEventKind::Change);
    }

    #[test]
    fn coalesce_keeps_add_over_trailing_change() {
        let path = PathBuf::from("a.ts");
        let window = vec![
            WatchEvent { kind: WatchEventKind::Add, path: path.clone() },
            WatchEvent { kind: WatchEventKind::Change, path: path.clone() },
        ];
        let merged = coalesce(window);
        assert_eq!(merged[0].kind, WatchEventKind::Add);
    }

    #[test]
    fn relevance_filter() {
        let options = WatcherOptions::default();
        let ignore = build_ignore_set(&["generated/**".to_string()]).unwrap();
        let root = Path::new("/pkg");
        let relevant = |p: &str| is_relevant_path(Path::new(p), root, &options, &ignore);

        assert!(relevant("/pkg/src/a.ts"));
        assert!(relevant("/pkg/src/b.py"));
        assert!(!relevant("/pkg/src/a.d.ts"));
        assert!(!relevant("/pkg/readme.md"));
        assert!(!relevant("/pkg/node_modules/x/y.ts"));
        assert!(!relevant("/pkg/.devac/seed/base/nodes.col"));
        assert!(!relevant("/pkg/generated/api.ts"));
    }

    #[tokio::test]
    async fn changes_are_batched() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = PackageWatcher::new(dir.path(), options_with(50, true)).unwrap();
        let (_events, mut batches) = watcher.start().unwrap();

        std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();

        let batch = next_batch(&mut batches).await.expect("batch expected");
        assert!(!batch.events.is_empty());
        let stats = watcher.get_stats();
        assert!(stats.is_watching);
        assert!(stats.events_processed >= 1);
        assert!(stats.last_event_time.is_some());
    }

    #[tokio::test]
    async fn initial_scan_reports_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pre.ts"), "export const x = 1;").unwrap();
        std::fs::write(dir.path().join("skip.d.ts"), "declare const x: number;").unwrap();

        let mut watcher = PackageWatcher::new(dir.path(), options_with(30, false)).unwrap();
        let (_events, mut batches) = watcher.start().unwrap();

        let batch = next_batch(&mut batches).await.expect("initial batch");
        let paths: Vec<String> = batch
            .events
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(paths.contains(&"pre.ts".to_string()));
        assert!(!paths.contains(&"skip.d.ts".to_string()));
        assert!(batch.events.iter().all(|e| e.kind == WatchEventKind::Add));
    }

    #[tokio::test]
    async fn ignore_initial_suppresses_preexisting_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pre.ts"), "export const x = 1;").unwrap();

        let mut watcher = PackageWatcher::new(dir.path(), options_with(30, true)).unwrap();
        let (_events, mut batches) = watcher.start().unwrap();

        // Nothing from the scan...
        let quiet = timeout(Duration::from_millis(200), batches.recv()).await;
        assert!(quiet.is_err());

        // ...but the first edit still fires.
        std::fs::write(dir.path().join("pre.ts"), "export const x = 2;").unwrap();
        let batch = next_batch(&mut batches).await.expect("edit batch");
        assert!(!batch.events.is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_silences_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = PackageWatcher::new(dir.path(), options_with(30, true)).unwrap();
        let (_events, mut batches) = watcher.start().unwrap();

        watcher.stop();
        watcher.stop();
        assert!(!watcher.get_stats().is_watching);

        std::fs::write(dir.path().join("late.ts"), "export const x = 1;").unwrap();
        let quiet = timeout(Duration::from_millis(200), batches.recv()).await;
        assert!(quiet.is_err() || quiet.unwrap().is_none());
    }
}
