//! Mapping file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::mapping::MappingDefinition;

/// Watches a mapping document (and its script) and yields freshly parsed definitions
///
/// A reload that fails to parse is logged and dropped; the session keeps
/// running with the previous definition.
pub struct MappingWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Arc<MappingDefinition>>,
}

impl MappingWatcher {
    /// Load the mapping once and start watching it
    pub async fn new(
        mapping_path: PathBuf,
        script_path: Option<PathBuf>,
    ) -> Result<(Self, Arc<MappingDefinition>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial = MappingDefinition::load(&mapping_path, script_path.as_deref())
            .await
            .context("Failed to load initial mapping")?;
        let initial = Arc::new(initial);

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let paths = (mapping_path.clone(), script_path.clone());
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_)) {
                        return;
                    }
                    debug!("Mapping file modified: {:?}", event.paths);

                    let (mapping_path, script_path) = paths.clone();
                    let tx = tx.clone();

                    runtime_handle.spawn(async move {
                        // Debounce: wait a bit for file writes to complete
                        tokio::time::sleep(Duration::from_millis(100)).await;

                        match MappingDefinition::load(&mapping_path, script_path.as_deref()).await {
                            Ok(definition) => {
                                info!("Mapping reloaded successfully");
                                if let Err(e) = tx.send(Arc::new(definition)).await {
                                    error!("Failed to send mapping update: {}", e);
                                }
                            },
                            Err(e) => {
                                warn!("Failed to reload mapping (keeping old mapping): {:#}", e);
                            },
                        }
                    });
                },
                Err(e) => {
                    error!("Watch error: {}", e);
                },
            }
        })?;

        watch_file(&mut watcher, &mapping_path)?;
        if let Some(script_path) = &script_path {
            watch_file(&mut watcher, script_path)?;
        }

        info!("Mapping watcher started for: {}", mapping_path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial,
        ))
    }

    /// Wait for the next successfully parsed mapping
    /// Returns None if the watcher has been closed
    pub async fn next_mapping(&mut self) -> Option<Arc<MappingDefinition>> {
        self.rx.recv().await
    }
}

fn watch_file(watcher: &mut RecommendedWatcher, path: &Path) -> Result<()> {
    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch file: {}", path.display()))
}
