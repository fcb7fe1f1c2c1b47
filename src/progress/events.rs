//! In-process event channel for run lifecycle and progress updates.
//!
//! The UI layer embedding the engine subscribes here; publishing is
//! fire-and-forget and a run never waits on (or fails because of) its
//! subscribers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::BackupDomain;
use crate::progress::{BackupProgress, Phase};

/// Maximum number of queued events per subscriber
const BROADCAST_CAPACITY: usize = 1000;

/// Events published over the lifetime of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BackupEvent {
    /// A run began with the resolved domain list
    #[serde(rename = "backup:started")]
    Started { domains: Vec<BackupDomain> },

    /// The run moved to a new phase
    #[serde(rename = "backup:phase")]
    PhaseChange { phase: Phase },

    /// An exporter took over a domain
    #[serde(rename = "backup:domain")]
    DomainChange {
        domain: BackupDomain,
        total_items: u64,
    },

    /// Periodic progress snapshot
    #[serde(rename = "backup:progress")]
    Progress(BackupProgress),

    /// A non-fatal error was counted
    #[serde(rename = "backup:error")]
    Error { message: String },

    /// The run finished and the archive is in place
    #[serde(rename = "backup:completed")]
    Completed { archive: String, duration_ms: u64 },

    /// The run failed or was cancelled
    #[serde(rename = "backup:failed")]
    Failed { error: String },
}

/// Broadcast channel carrying [`BackupEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<BackupEvent>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers; skipped silently when
    /// nobody is listening.
    pub fn publish(&self, event: BackupEvent) {
        match self.tx.send(event) {
            Ok(count) => {
                debug!("Published event to {} subscriber(s)", count);
            }
            Err(_) => {
                debug!("No subscribers for event, skipping");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
