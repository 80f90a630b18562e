//! Projects-root watcher that invalidates cached code units.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::dispatch::loader::ModuleRegistry;

/// Watches the projects root and evicts changed units from a registry.
pub struct ModuleWatcher {
    root: PathBuf,
    registry: Arc<ModuleRegistry>,
}

impl ModuleWatcher {
    pub fn new(root: &Path, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            root: root.to_path_buf(),
            registry,
        }
    }

    /// Start watching in a background thread. Dropping the returned watcher
    /// stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let registry = self.registry.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in &event.paths {
                            if registry.invalidate(path) {
                                tracing::info!(path = ?path, "Module changed, cache entry dropped");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!(path = ?self.root, "Module watcher started");
        Ok(watcher)
    }
}
