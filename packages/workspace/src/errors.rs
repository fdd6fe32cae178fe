use thiserror::Error;

/// Failures reported by the text-mutation host.
///
/// `Stale` is the only retryable case; everything else is fatal for the
/// current queue entry and leaves the queue running.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("stale write: expected version {expected}, document is at {current}")]
    Stale { expected: u64, current: u64 },

    #[error("document is not open: {0}")]
    DocumentClosed(String),

    #[error("edit range is outside the document")]
    InvalidRange,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host service error: {0}")]
    Service(String),
}

impl HostError {
    pub fn is_stale(&self) -> bool {
        matches!(self, HostError::Stale { .. })
    }
}

/// The error a queued job replies with when it fails outright. Dropped edits
/// are not errors; they come back as outcomes.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("edit queue closed for {0}")]
    QueueClosed(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
