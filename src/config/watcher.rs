//! Configuration file watcher for hot reload.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GateConfig;

/// Watch the config file and push validated reloads into `tx`.
///
/// The returned watcher must be kept alive for the watch to stay active.
/// A reload that fails to parse or validate keeps the current
/// configuration and only logs.
pub fn watch_config(
    path: PathBuf,
    tx: mpsc::UnboundedSender<GateConfig>,
) -> notify::Result<RecommendedWatcher> {
    let watch_path = path.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() {
                    tracing::info!("Config file change detected, reloading...");
                    match load_config(&path) {
                        Ok(new_config) => {
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(
                                "Failed to reload config: {}. Keeping current configuration.",
                                e
                            );
                        }
                    }
                }
            }
            Err(e) => tracing::error!("Watch error: {:?}", e),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

    tracing::info!(path = ?watch_path, "Config watcher started");
    Ok(watcher)
}
