//! Filesystem watching for referenced resources. Raw notify events are
//! bridged onto a tokio channel and coalesced per path over a debounce
//! window, so an editor writing a file in several syscalls produces one
//! re-render.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("failed to create watcher: {0}")]
    Create(#[from] notify::Error),
}

pub struct ResourceWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<PathBuf>,
}

impl ResourceWatcher {
    /// Watch `root` recursively. Must be called from inside a tokio runtime;
    /// the debounce task runs until the watcher is dropped.
    pub fn new(root: &Path, debounce: Duration) -> Result<Self, WatcherError> {
        let (raw_tx, raw_rx) = mpsc::channel(256);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if !is_save(&event.kind) {
                    return;
                }
                for path in event.paths {
                    // notify callbacks run on its own thread
                    let _ = raw_tx.blocking_send(path);
                }
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "watching resources");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(debounce_loop(raw_rx, tx, debounce));

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// The next saved path, after its debounce window. `None` once the
    /// watcher shuts down.
    pub async fn next_saved(&mut self) -> Option<PathBuf> {
        self.receiver.recv().await
    }
}

fn is_save(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

async fn debounce_loop(
    mut rx: mpsc::Receiver<PathBuf>,
    tx: mpsc::Sender<PathBuf>,
    window: Duration,
) {
    let mut pending: Vec<PathBuf> = Vec::new();
    loop {
        if pending.is_empty() {
            match rx.recv().await {
                Some(path) => pending.push(path),
                None => return,
            }
        }

        // collect everything that arrives inside the window
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(path) => {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                    None => break,
                },
            }
        }

        for path in pending.drain(..) {
            if tx.send(path).await.is_err() {
                return;
            }
        }
    }
}
