//! Optimistic inserts and their delayed reconciliation.
//!
//! A provisional entry is visible immediately. After the reconcile delay the
//! user's cache is dropped and the directory refetched, provided the session
//! that made the insert is still the current one.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{AgoraError, AssistantSummary};
use agora_storage::CacheStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::DirectoryStore;
use crate::discovery::{DiscoveryOrchestrator, LoadMode};
use crate::session::{SessionContext, SessionSlot};

/// Result of [`OptimisticCoordinator::add_provisional`].
#[derive(Debug)]
pub struct ProvisionalInsert {
    /// False when the id was already in the directory.
    pub inserted: bool,
    /// Scheduled reconciliation, if an insert happened.
    pub reconciliation: Option<JoinHandle<()>>,
}

pub struct OptimisticCoordinator {
    directory: Arc<DirectoryStore>,
    cache: Arc<CacheStore>,
    discovery: Arc<DiscoveryOrchestrator>,
    sessions: Arc<SessionSlot>,
    reconcile_delay: Duration,
}

impl std::fmt::Debug for OptimisticCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticCoordinator")
            .field("reconcile_delay", &self.reconcile_delay)
            .finish_non_exhaustive()
    }
}

impl OptimisticCoordinator {
    pub fn new(
        directory: Arc<DirectoryStore>,
        cache: Arc<CacheStore>,
        discovery: Arc<DiscoveryOrchestrator>,
        sessions: Arc<SessionSlot>,
        reconcile_delay: Duration,
    ) -> Self {
        Self {
            directory,
            cache,
            discovery,
            sessions,
            reconcile_delay,
        }
    }

    /// Insert `summary` at the front of the directory and schedule a
    /// reconciling refetch for `session`.
    ///
    /// Inserting an id that is already present changes nothing and
    /// schedules nothing.
    pub fn add_provisional(
        &self,
        session: Arc<SessionContext>,
        summary: AssistantSummary,
    ) -> ProvisionalInsert {
        let assistant_id = summary.assistant_id.clone();
        if !self.directory.add_provisional(summary) {
            debug!(assistant_id = %assistant_id, "provisional insert skipped, already present");
            return ProvisionalInsert {
                inserted: false,
                reconciliation: None,
            };
        }

        info!(
            assistant_id = %assistant_id,
            delay_ms = self.reconcile_delay.as_millis() as u64,
            "provisional assistant added"
        );
        let handle = tokio::spawn(reconcile(
            session,
            self.sessions.clone(),
            self.cache.clone(),
            self.discovery.clone(),
            self.reconcile_delay,
        ));
        ProvisionalInsert {
            inserted: true,
            reconciliation: Some(handle),
        }
    }
}

async fn reconcile(
    session: Arc<SessionContext>,
    sessions: Arc<SessionSlot>,
    cache: Arc<CacheStore>,
    discovery: Arc<DiscoveryOrchestrator>,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;

    if !sessions.is_current(&session) {
        debug!(user_id = %session.user_id, "session ended, reconciliation dropped");
        return;
    }

    let removed = cache.invalidate_user(&session.user_id).await;
    debug!(user_id = %session.user_id, removed, "cache dropped for reconciliation");

    match discovery.load(&session, LoadMode::ForceRefresh).await {
        Ok(_) | Err(AgoraError::SessionEnded) => {}
        Err(err) => {
            warn!(user_id = %session.user_id, error = %err, "reconciliation refetch failed");
        }
    }
}
