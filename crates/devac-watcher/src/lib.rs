//! Devac Watcher — filesystem events to incremental seed writes

pub mod rename;
pub mod update;
pub mod watcher;

pub use rename::{FileChange, RenameConfidence, RenameDetector, RenameInfo};
pub use update::{BatchSummary, FileOutcome, UpdateAction, UpdateManager};
pub use watcher::{
    EventBatch, PackageWatcher, WatchEvent, WatchEventKind, WatcherOptions, WatcherStats,
};
