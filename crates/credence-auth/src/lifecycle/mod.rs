//! Foreground-return and periodic revalidation.

pub mod watcher;

pub use watcher::{ForegroundOutcome, LifecycleEvent, LifecycleWatcher};
