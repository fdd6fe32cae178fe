use serde::{Deserialize, Serialize};

/// Tunables for the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Bound of each per-document job channel.
    pub queue_capacity: usize,
    /// Window over which filesystem save events for one path are coalesced.
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            debounce_ms: 100,
        }
    }
}
