//! Per-document serial execution. The first submission for a document spawns
//! a worker task owning the receive side of a bounded channel; every later
//! job for that document lands on the same channel, so all edits for one
//! document are totally ordered while documents stay independent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::driver;
use crate::errors::{SyncError, SyncResult};
use crate::protocol::PasteRequest;
use crate::registry::SurfaceId;
use crate::server::SyncContext;
use tandem_engine::{EditOutcome, EditRequest, EditTarget};

pub(crate) enum Job {
    Edit {
        surface: SurfaceId,
        requests: Vec<EditRequest>,
        reply: oneshot::Sender<SyncResult<Vec<EditOutcome>>>,
    },
    Delete {
        surface: SurfaceId,
        targets: Vec<EditTarget>,
        reply: oneshot::Sender<SyncResult<EditOutcome>>,
    },
    Cut {
        surface: SurfaceId,
        targets: Vec<EditTarget>,
        reply: oneshot::Sender<SyncResult<EditOutcome>>,
    },
    Paste {
        surface: SurfaceId,
        request: PasteRequest,
        reply: oneshot::Sender<SyncResult<EditOutcome>>,
    },
}

pub(crate) struct JobQueues {
    capacity: usize,
    workers: Mutex<HashMap<String, mpsc::Sender<Job>>>,
}

impl JobQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Dropping the send side lets the worker drain what is queued and stop.
    pub fn close(&self, uri: &str) {
        self.workers.lock().unwrap().remove(uri);
    }

    fn sender_for(&self, ctx: &Arc<SyncContext>, uri: &str) -> mpsc::Sender<Job> {
        let mut workers = self.workers.lock().unwrap();
        if let Some(sender) = workers.get(uri) {
            return sender.clone();
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        spawn_worker(ctx.clone(), uri.to_string(), rx);
        workers.insert(uri.to_string(), tx.clone());
        tx
    }
}

pub(crate) async fn submit(ctx: &Arc<SyncContext>, uri: &str, job: Job) -> SyncResult<()> {
    let sender = ctx.queues.sender_for(ctx, uri);
    sender
        .send(job)
        .await
        .map_err(|_| SyncError::QueueClosed(uri.to_string()))
}

fn spawn_worker(ctx: Arc<SyncContext>, uri: String, mut rx: mpsc::Receiver<Job>) {
    tokio::spawn(async move {
        debug!(uri, "edit queue worker started");
        while let Some(job) = rx.recv().await {
            // a failed job replied with its error; the queue keeps going
            driver::run_job(&ctx, &uri, job).await;
        }
        debug!(uri, "edit queue worker stopped");
    });
}
