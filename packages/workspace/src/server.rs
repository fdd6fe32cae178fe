//! The engine facade an editor integration talks to: attach surfaces, feed
//! surface messages in, notify document changes and resource saves, and let
//! the router push renders, resyncs, and highlights back out.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tandem_engine::{widen_to_lines, DomSnapshot, EditOutcome};
use tandem_markup::Span;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clipboard;
use crate::config::SyncConfig;
use crate::errors::{SyncError, SyncResult};
use crate::host::{ClipboardService, FormatterService, TextHost};
use crate::protocol::{EngineMessage, SelectionKind, SurfaceMessage};
use crate::queue::{self, Job, JobQueues};
use crate::registry::{Registry, SurfaceId};
use crate::router;
use crate::watcher::{ResourceWatcher, WatcherError};

/// Everything the drivers need, shared behind one `Arc`. The registry lock
/// is only ever held for non-await sections.
pub struct SyncContext {
    pub host: Arc<dyn TextHost>,
    pub clipboard: Arc<dyn ClipboardService>,
    pub formatter: Arc<dyn FormatterService>,
    pub registry: RwLock<Registry>,
    pub config: SyncConfig,
    pub(crate) queues: JobQueues,
}

impl SyncContext {
    pub(crate) fn mark_edit_source(&self, uri: &str, id: SurfaceId) {
        self.registry.write().unwrap().mark_edit_source(uri, id);
    }

    pub(crate) fn clear_edit_source(&self, uri: &str, id: SurfaceId) {
        self.registry.write().unwrap().clear_edit_source(uri, id);
    }
}

pub struct SyncServer {
    ctx: Arc<SyncContext>,
}

impl SyncServer {
    pub fn new(
        host: Arc<dyn TextHost>,
        clipboard: Arc<dyn ClipboardService>,
        formatter: Arc<dyn FormatterService>,
    ) -> Self {
        Self::with_config(host, clipboard, formatter, SyncConfig::default())
    }

    pub fn with_config(
        host: Arc<dyn TextHost>,
        clipboard: Arc<dyn ClipboardService>,
        formatter: Arc<dyn FormatterService>,
        config: SyncConfig,
    ) -> Self {
        let queues = JobQueues::new(config.queue_capacity);
        Self {
            ctx: Arc::new(SyncContext {
                host,
                clipboard,
                formatter,
                registry: RwLock::new(Registry::new()),
                config,
                queues,
            }),
        }
    }

    pub fn context(&self) -> Arc<SyncContext> {
        self.ctx.clone()
    }

    /// Register a surface and push it an initial full render.
    pub async fn attach_surface(
        &self,
        uri: &str,
        sender: mpsc::Sender<EngineMessage>,
    ) -> SyncResult<SurfaceId> {
        let id = {
            self.ctx
                .registry
                .write()
                .unwrap()
                .attach_surface(uri, sender.clone())
        };
        info!(uri, surface = %id, "surface attached");

        let current = match self.ctx.host.read(uri).await {
            Ok(current) => current,
            Err(err) => {
                self.ctx.registry.write().unwrap().detach_surface(uri, id);
                return Err(err.into());
            }
        };
        let snapshot = DomSnapshot::parse(&current.text, current.version);
        {
            self.ctx
                .registry
                .write()
                .unwrap()
                .set_resource_links(uri, snapshot.resource_paths());
        }
        let _ = sender
            .send(EngineMessage::Render { html: current.text })
            .await;
        Ok(id)
    }

    pub fn detach_surface(&self, uri: &str, id: SurfaceId) {
        if self.ctx.registry.write().unwrap().detach_surface(uri, id) {
            info!(uri, surface = %id, "surface detached");
        }
    }

    /// Drops the document's surfaces, links, and queue worker. Queued jobs
    /// drain before the worker stops.
    pub fn close_document(&self, uri: &str) {
        self.ctx.queues.close(uri);
        self.ctx.registry.write().unwrap().close_document(uri);
        info!(uri, "document closed");
    }

    /// One inbound surface message, handled to completion: mutating messages
    /// are queued per document and awaited, read-only ones run inline.
    pub async fn handle_message(
        &self,
        uri: &str,
        surface: SurfaceId,
        message: SurfaceMessage,
    ) -> SyncResult<()> {
        match message {
            SurfaceMessage::Edit { data } => {
                if data.is_empty() {
                    return Ok(());
                }
                self.ctx.mark_edit_source(uri, surface);
                let (tx, rx) = oneshot::channel();
                let job = Job::Edit {
                    surface,
                    requests: data,
                    reply: tx,
                };
                let outcomes = self.await_reply(uri, surface, job, rx).await?;
                debug!(
                    uri,
                    applied = outcomes.iter().filter(|o| o.is_applied()).count(),
                    total = outcomes.len(),
                    "edit batch finished"
                );
                Ok(())
            }
            SurfaceMessage::Delete { data } => {
                self.submit_removal(uri, surface, Removal::Delete, data).await
            }
            SurfaceMessage::Cut { data } => {
                self.submit_removal(uri, surface, Removal::Cut, data).await
            }
            SurfaceMessage::Copy { data } => clipboard::copy(&self.ctx, uri, &data).await,
            SurfaceMessage::Paste { data } => {
                self.ctx.mark_edit_source(uri, surface);
                let (tx, rx) = oneshot::channel();
                let job = Job::Paste {
                    surface,
                    request: data,
                    reply: tx,
                };
                let outcome = self.await_reply(uri, surface, job, rx).await?;
                debug!(uri, applied = outcome.is_applied(), "paste finished");
                Ok(())
            }
            SurfaceMessage::Select { data } => {
                let current = self.ctx.host.read(uri).await?;
                let widened: Vec<Span> = data
                    .iter()
                    .map(|range| widen_to_lines(&current.text, *range))
                    .collect();
                self.ctx.host.set_selections(uri, &widened).await?;
                Ok(())
            }
            SurfaceMessage::Refresh => {
                let current = self.ctx.host.read(uri).await?;
                let snapshot = DomSnapshot::parse(&current.text, current.version);
                let sender = {
                    let mut registry = self.ctx.registry.write().unwrap();
                    registry.set_resource_links(uri, snapshot.resource_paths());
                    registry.sender_of(uri, surface)
                };
                if let Some(sender) = sender {
                    let _ = sender
                        .send(EngineMessage::Render { html: current.text })
                        .await;
                }
                Ok(())
            }
            SurfaceMessage::State { data } => {
                let siblings = {
                    self.ctx
                        .registry
                        .read()
                        .unwrap()
                        .siblings_of(uri, surface)
                };
                for sender in siblings {
                    let _ = sender
                        .send(EngineMessage::State { data: data.clone() })
                        .await;
                }
                Ok(())
            }
        }
    }

    /// The host's change notification for edits the engine did not make.
    /// Engine-made changes route inline from the apply driver instead.
    pub async fn document_changed(&self, uri: &str) -> SyncResult<()> {
        router::route_document_changed(&self.ctx, uri).await
    }

    /// A referenced file was saved; re-render every linked document.
    pub async fn resource_saved(&self, path: &str) -> SyncResult<()> {
        router::route_resource_saved(&self.ctx, path).await
    }

    /// The host's selection moved. Only human-originated kinds project out.
    pub async fn selection_changed(
        &self,
        uri: &str,
        ranges: &[Span],
        kind: SelectionKind,
    ) -> SyncResult<()> {
        router::route_selection(&self.ctx, uri, ranges, kind).await
    }

    /// Watch a directory tree and feed debounced saves into
    /// [`Self::resource_saved`] until the task is aborted.
    pub fn watch_resources(&self, root: &Path) -> Result<JoinHandle<()>, WatcherError> {
        let mut watcher =
            ResourceWatcher::new(root, Duration::from_millis(self.ctx.config.debounce_ms))?;
        let ctx = self.ctx.clone();
        Ok(tokio::spawn(async move {
            while let Some(path) = watcher.next_saved().await {
                let path = path.to_string_lossy();
                if let Err(err) = router::route_resource_saved(&ctx, &path).await {
                    warn!(path = %path, error = %err, "resource re-render failed");
                }
            }
        }))
    }

    async fn submit_removal(
        &self,
        uri: &str,
        surface: SurfaceId,
        removal: Removal,
        targets: Vec<tandem_engine::EditTarget>,
    ) -> SyncResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        self.ctx.mark_edit_source(uri, surface);
        let (tx, rx) = oneshot::channel();
        let job = match removal {
            Removal::Delete => Job::Delete {
                surface,
                targets,
                reply: tx,
            },
            Removal::Cut => Job::Cut {
                surface,
                targets,
                reply: tx,
            },
        };
        let outcome = self.await_reply(uri, surface, job, rx).await?;
        if let EditOutcome::Dropped(reason) = &outcome {
            debug!(uri, ?reason, "removal dropped");
        }
        Ok(())
    }

    /// Queue a job and wait for its reply. The suppression flag was marked by
    /// the caller; if the job never reaches a worker, un-mark it here.
    async fn await_reply<T>(
        &self,
        uri: &str,
        surface: SurfaceId,
        job: Job,
        rx: oneshot::Receiver<SyncResult<T>>,
    ) -> SyncResult<T> {
        let result = async {
            queue::submit(&self.ctx, uri, job).await?;
            rx.await
                .map_err(|_| SyncError::QueueClosed(uri.to_string()))?
        }
        .await;
        if result.is_err() {
            self.ctx.clear_edit_source(uri, surface);
        }
        result
    }
}

enum Removal {
    Delete,
    Cut,
}
