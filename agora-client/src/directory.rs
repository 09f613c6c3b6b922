//! In-memory directory state for one engine instance.
//!
//! Readers get immutable `Arc<DirectorySnapshot>`s; every mutation builds a
//! new snapshot and publishes it through a `watch` channel. Load progress is
//! published on a separate channel so a failed load never has to touch the
//! snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agora_core::convert::refresh_listing;
use agora_core::{
    Assistant, AssistantCounts, AssistantId, AssistantListing, AssistantSummary, Clock,
    DeploymentId, Fingerprint, FullAssistant, GraphDiscovery, GraphTemplate, Timestamp,
};
use tokio::sync::watch;
use tracing::debug;

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Empty,
    Cache,
    Network,
}

/// One assistant in the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub assistant: Assistant,
    /// Set while the entry is a provisional insert not yet seen in a fetch.
    pub optimistic_since: Option<Timestamp>,
}

impl DirectoryEntry {
    pub fn is_provisional(&self) -> bool {
        self.optimistic_since.is_some()
    }
}

/// Immutable view of the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorySnapshot {
    pub deployment_id: Option<DeploymentId>,
    pub deployment_name: Option<String>,
    pub valid_graphs: Vec<GraphTemplate>,
    pub invalid_graphs: Vec<GraphTemplate>,
    pub assistants: Vec<DirectoryEntry>,
    pub assistant_counts: AssistantCounts,
    pub user_role: Option<String>,
    pub is_dev_admin: bool,
    pub scan_metadata: Option<serde_json::Value>,
    pub source: SnapshotSource,
    pub fingerprint: Option<Fingerprint>,
    pub loaded_at: Option<Timestamp>,
}

impl Default for DirectorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl DirectorySnapshot {
    pub fn empty() -> Self {
        Self {
            deployment_id: None,
            deployment_name: None,
            valid_graphs: Vec::new(),
            invalid_graphs: Vec::new(),
            assistants: Vec::new(),
            assistant_counts: AssistantCounts::new(),
            user_role: None,
            is_dev_admin: false,
            scan_metadata: None,
            source: SnapshotSource::Empty,
            fingerprint: None,
            loaded_at: None,
        }
    }

    pub fn entry(&self, assistant_id: &AssistantId) -> Option<&DirectoryEntry> {
        self.assistants
            .iter()
            .find(|entry| entry.assistant.id() == assistant_id)
    }

    pub fn find(&self, assistant_id: &AssistantId) -> Option<&Assistant> {
        self.entry(assistant_id).map(|entry| &entry.assistant)
    }

    pub fn assistant_ids(&self) -> Vec<&AssistantId> {
        self.assistants
            .iter()
            .map(|entry| entry.assistant.id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assistants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assistants.is_empty()
    }
}

/// Progress of the most recent directory load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed { message: String },
}

/// Owner of the in-memory directory.
pub struct DirectoryStore {
    snapshot: watch::Sender<Arc<DirectorySnapshot>>,
    status: watch::Sender<LoadStatus>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl std::fmt::Debug for DirectoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryStore")
            .field("assistants", &self.snapshot().len())
            .field("status", &self.status())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl DirectoryStore {
    /// `retention` bounds how long a provisional entry survives fetches
    /// that do not include it.
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(DirectorySnapshot::empty()));
        let (status, _) = watch::channel(LoadStatus::Idle);
        Self {
            snapshot,
            status,
            clock,
            retention,
        }
    }

    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DirectorySnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn status(&self) -> LoadStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LoadStatus> {
        self.status.subscribe()
    }

    pub fn set_status(&self, status: LoadStatus) {
        self.status.send_replace(status);
    }

    pub fn find(&self, assistant_id: &AssistantId) -> Option<Assistant> {
        self.snapshot().find(assistant_id).cloned()
    }

    /// Replace the directory with a fetched or cached listing.
    ///
    /// Backend order is kept. Full entries survive unless the listing is
    /// newer. Provisional entries missing from the listing are kept at the
    /// front while younger than the retention window; provisional entries
    /// present in the listing become confirmed.
    pub fn replace_on_fetch(
        &self,
        graphs: GraphDiscovery,
        listing: AssistantListing,
        source: SnapshotSource,
        fingerprint: Fingerprint,
    ) {
        let now = self.clock.now();
        let retention_ms = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);

        self.snapshot.send_modify(|current| {
            let fresh_ids: HashSet<AssistantId> = listing
                .assistants
                .iter()
                .map(|summary| summary.assistant_id.clone())
                .collect();

            let mut assistants: Vec<DirectoryEntry> = current
                .assistants
                .iter()
                .filter(|entry| !fresh_ids.contains(entry.assistant.id()))
                .filter(|entry| {
                    entry
                        .optimistic_since
                        .is_some_and(|since| (now - since).num_milliseconds() < retention_ms)
                })
                .cloned()
                .collect();
            let retained = assistants.len();

            for summary in listing.assistants {
                let assistant = match current.find(&summary.assistant_id) {
                    Some(existing) => refresh_listing(existing, summary),
                    None => Assistant::Lightweight(summary),
                };
                assistants.push(DirectoryEntry {
                    assistant,
                    optimistic_since: None,
                });
            }

            debug!(
                assistants = assistants.len(),
                retained_provisional = retained,
                source = ?source,
                fingerprint = %fingerprint,
                "directory replaced"
            );

            *current = Arc::new(DirectorySnapshot {
                deployment_id: Some(graphs.deployment_id),
                deployment_name: graphs.deployment_name,
                valid_graphs: graphs.valid_graphs,
                invalid_graphs: graphs.invalid_graphs,
                assistants,
                assistant_counts: graphs.assistant_counts,
                user_role: graphs.user_role,
                is_dev_admin: graphs.is_dev_admin,
                scan_metadata: graphs.scan_metadata,
                source,
                fingerprint: Some(fingerprint),
                loaded_at: Some(now),
            });
        });
    }

    /// Swap in the full form of an assistant, merged onto the entry as it
    /// is now.
    ///
    /// Listing fields come from the current entry. Returns the stored record,
    /// or `None` if the entry is gone or was relisted with a newer
    /// `updated_at` than the summary `full` was built from.
    pub fn replace_on_hydrate(&self, full: FullAssistant) -> Option<FullAssistant> {
        let mut applied = None;
        self.snapshot.send_if_modified(|current| {
            let Some(position) = current
                .assistants
                .iter()
                .position(|entry| entry.assistant.id() == &full.summary.assistant_id)
            else {
                return false;
            };
            let held = current.assistants[position].assistant.summary().clone();
            let merged = match refresh_listing(&Assistant::Full(full), held) {
                Assistant::Full(merged) => merged,
                Assistant::Lightweight(summary) => {
                    debug!(assistant_id = %summary.assistant_id, "hydration superseded by newer listing");
                    return false;
                }
            };
            let mut next = DirectorySnapshot::clone(current);
            next.assistants[position].assistant = Assistant::Full(merged.clone());
            *current = Arc::new(next);
            applied = Some(merged);
            true
        });
        applied
    }

    /// Insert a provisional entry at the front unless its id is present.
    /// Returns true if it was inserted.
    pub fn add_provisional(&self, summary: AssistantSummary) -> bool {
        let now = self.clock.now();
        self.snapshot.send_if_modified(|current| {
            if current.find(&summary.assistant_id).is_some() {
                return false;
            }
            let mut next = DirectorySnapshot::clone(current);
            next.assistants.insert(
                0,
                DirectoryEntry {
                    assistant: Assistant::Lightweight(summary),
                    optimistic_since: Some(now),
                },
            );
            *current = Arc::new(next);
            true
        })
    }

    /// Drop everything, as on logout.
    pub fn clear(&self) {
        self.snapshot
            .send_replace(Arc::new(DirectorySnapshot::empty()));
        self.status.send_replace(LoadStatus::Idle);
    }
}
