//! Discovery orchestrator: serve the directory from cache or fetch it.
//!
//! ```text
//! Idle -> CacheCheck -> CacheHit -----------------------> Populated
//!                    \-> CacheMiss -> FetchFresh -------> Populated
//!                                               \-------> Failed
//! ```
//!
//! A forced refresh starts at `FetchFresh`. A load whose session is no
//! longer current when an await returns is discarded without touching the
//! directory or the cache.

use std::sync::Arc;

use agora_core::convert::split_directory;
use agora_core::{
    AgoraError, AgoraResult, AssistantListing, DirectoryBackend, Fingerprint, GraphDiscovery,
    UserId,
};
use agora_storage::{CacheLayer, CacheStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::directory::{DirectoryStore, LoadStatus, SnapshotSource};
use crate::oracle::VersionOracle;
use crate::session::{SessionContext, SessionSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    CacheCheck,
    CacheHit,
    CacheMiss,
    FetchFresh,
    Populated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Serve from cache when both layers are valid.
    CacheFirst,
    /// Skip the cache check and fetch.
    ForceRefresh,
}

/// Summary of a completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub source: SnapshotSource,
    pub fingerprint: Fingerprint,
    pub assistants: usize,
}

pub struct DiscoveryOrchestrator {
    backend: Arc<dyn DirectoryBackend>,
    cache: Arc<CacheStore>,
    oracle: Arc<VersionOracle>,
    directory: Arc<DirectoryStore>,
    sessions: Arc<SessionSlot>,
    state: watch::Sender<DiscoveryState>,
}

impl std::fmt::Debug for DiscoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryOrchestrator")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DiscoveryOrchestrator {
    pub fn new(
        backend: Arc<dyn DirectoryBackend>,
        cache: Arc<CacheStore>,
        oracle: Arc<VersionOracle>,
        directory: Arc<DirectoryStore>,
        sessions: Arc<SessionSlot>,
    ) -> Self {
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            backend,
            cache,
            oracle,
            directory,
            sessions,
            state,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    fn transition(&self, next: DiscoveryState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "discovery transition");
    }

    fn ensure_current(
        &self,
        session: &Arc<SessionContext>,
        stage: &'static str,
    ) -> AgoraResult<()> {
        if self.sessions.is_current(session) {
            return Ok(());
        }
        debug!(user_id = %session.user_id, stage, "session changed, discarding load");
        Err(AgoraError::SessionEnded)
    }

    /// Load the directory for `session`.
    ///
    /// # Errors
    ///
    /// Returns the network error of a failed fetch. The in-memory directory
    /// is left exactly as it was. [`AgoraError::SessionEnded`] if `session`
    /// stopped being current while the load was suspended.
    pub async fn load(
        &self,
        session: &Arc<SessionContext>,
        mode: LoadMode,
    ) -> AgoraResult<LoadOutcome> {
        self.ensure_current(session, "start")?;
        self.directory.set_status(LoadStatus::Loading);

        if mode == LoadMode::CacheFirst {
            if let Some(outcome) = self.serve_from_cache(session).await? {
                self.transition(DiscoveryState::Populated);
                self.directory.set_status(LoadStatus::Ready);
                return Ok(outcome);
            }
            self.transition(DiscoveryState::CacheMiss);
        }

        self.fetch_fresh(session).await
    }

    async fn serve_from_cache(
        &self,
        session: &Arc<SessionContext>,
    ) -> AgoraResult<Option<LoadOutcome>> {
        self.transition(DiscoveryState::CacheCheck);
        let user_id = &session.user_id;

        self.oracle.refresh(&session.credential).await;
        let fingerprint = self.oracle.current_fingerprint();

        let graphs = self.cache.get::<GraphDiscovery>(user_id, &fingerprint).await;
        let listing = self
            .cache
            .get::<AssistantListing>(user_id, &fingerprint)
            .await;
        self.ensure_current(session, "cache_check")?;

        let (graphs, listing) = match (graphs, listing) {
            (Some(graphs), Some(listing)) => (graphs.into_value(), listing.into_value()),
            (graphs, _) => {
                debug!(
                    user_id = %user_id,
                    fingerprint = %fingerprint,
                    graphs_hit = graphs.is_some(),
                    "cache incomplete"
                );
                return Ok(None);
            }
        };

        if graphs.deployment_id != session.deployment_id {
            info!(
                user_id = %user_id,
                cached = %graphs.deployment_id,
                session = %session.deployment_id,
                "cached directory belongs to another deployment"
            );
            self.cache.invalidate_user(user_id).await;
            return Ok(None);
        }

        self.transition(DiscoveryState::CacheHit);
        let assistants = listing.len();
        self.directory.replace_on_fetch(
            graphs,
            listing,
            SnapshotSource::Cache,
            fingerprint.clone(),
        );
        info!(user_id = %user_id, fingerprint = %fingerprint, assistants, "directory served from cache");
        Ok(Some(LoadOutcome {
            source: SnapshotSource::Cache,
            fingerprint,
            assistants,
        }))
    }

    async fn fetch_fresh(&self, session: &Arc<SessionContext>) -> AgoraResult<LoadOutcome> {
        self.transition(DiscoveryState::FetchFresh);

        let fetched = self
            .backend
            .fetch_directory(&session.credential, &session.deployment_id)
            .await;
        self.ensure_current(session, "fetch")?;

        let response = match fetched {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    user_id = %session.user_id,
                    deployment_id = %session.deployment_id,
                    error = %err,
                    "directory fetch failed"
                );
                self.transition(DiscoveryState::Failed);
                self.directory.set_status(LoadStatus::Failed {
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };

        self.oracle.refresh(&session.credential).await;
        let fingerprint = self.oracle.current_fingerprint();
        self.ensure_current(session, "fingerprint")?;

        let (graphs, listing) = split_directory(response);
        self.persist(&session.user_id, &graphs, &listing, &fingerprint)
            .await;
        self.ensure_current(session, "persist")?;

        let assistants = listing.len();
        self.directory.replace_on_fetch(
            graphs,
            listing,
            SnapshotSource::Network,
            fingerprint.clone(),
        );
        self.transition(DiscoveryState::Populated);
        self.directory.set_status(LoadStatus::Ready);
        info!(
            user_id = %session.user_id,
            fingerprint = %fingerprint,
            assistants,
            "directory fetched"
        );

        Ok(LoadOutcome {
            source: SnapshotSource::Network,
            fingerprint,
            assistants,
        })
    }

    async fn persist(
        &self,
        user_id: &UserId,
        graphs: &GraphDiscovery,
        listing: &AssistantListing,
        fingerprint: &Fingerprint,
    ) {
        let results = [
            (
                CacheLayer::GraphDiscovery,
                self.cache.set(user_id, graphs, fingerprint).await,
            ),
            (
                CacheLayer::AssistantList,
                self.cache.set(user_id, listing, fingerprint).await,
            ),
        ];
        for (layer, result) in results {
            match result {
                Ok(outcome) => debug!(layer = %layer, outcome = ?outcome, "cache populated"),
                Err(err) => error!(layer = %layer, error = %err, "cache write rejected"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{ManualClock, VersionVector};
    use agora_storage::{CacheConfig, InMemoryKvStore};
    use agora_test_utils::fixtures::{credential, deployment, seeded_backend, user};
    use agora_test_utils::{FakeBackend, FakeCall};
    use std::time::Duration;

    struct Harness {
        backend: Arc<FakeBackend>,
        kv: InMemoryKvStore,
        directory: Arc<DirectoryStore>,
        sessions: Arc<SessionSlot>,
        orchestrator: DiscoveryOrchestrator,
    }

    fn harness() -> Harness {
        let backend = Arc::new(seeded_backend());
        let kv = InMemoryKvStore::new();
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(CacheStore::new(
            Arc::new(kv.clone()),
            clock.clone(),
            CacheConfig::default(),
        ));
        let oracle = Arc::new(VersionOracle::new(backend.clone()));
        let directory = Arc::new(DirectoryStore::new(clock, Duration::from_secs(60)));
        let sessions = Arc::new(SessionSlot::new());
        let orchestrator = DiscoveryOrchestrator::new(
            backend.clone(),
            cache,
            oracle,
            directory.clone(),
            sessions.clone(),
        );
        Harness {
            backend,
            kv,
            directory,
            sessions,
            orchestrator,
        }
    }

    impl Harness {
        fn login(&self, session: SessionContext) -> Arc<SessionContext> {
            let session = Arc::new(session);
            self.sessions.replace(Some(session.clone()));
            session
        }

        fn session(&self) -> Arc<SessionContext> {
            match self.sessions.current() {
                Some(current) => current,
                None => self.login(SessionContext::new(user(), credential(), deployment())),
            }
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let h = harness();
        let first = h
            .orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");
        assert_eq!(first.source, SnapshotSource::Network);
        assert_eq!(first.fingerprint.as_str(), "g1-a5-s1");
        assert_eq!(h.orchestrator.state(), DiscoveryState::Populated);

        let second = h
            .orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");
        assert_eq!(second.source, SnapshotSource::Cache);
        assert_eq!(h.backend.directory_calls(), 1);
        assert_eq!(h.directory.status(), LoadStatus::Ready);
    }

    #[tokio::test]
    async fn test_force_refresh_skips_cache() {
        let h = harness();
        h.orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");
        h.orchestrator
            .load(&h.session(), LoadMode::ForceRefresh)
            .await
            .expect("load");
        assert_eq!(h.backend.directory_calls(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_taken_after_fetch() {
        let h = harness();
        h.orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");
        h.backend.set_versions(VersionVector::new(1, 9, 1));
        let outcome = h
            .orchestrator
            .load(&h.session(), LoadMode::ForceRefresh)
            .await
            .expect("load");
        assert_eq!(outcome.fingerprint.as_str(), "g1-a9-s1");
        let raw = h.kv.raw("assistant-list:user-1").expect("entry written");
        let json: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(json["fingerprint"], "g1-a9-s1");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_snapshot_untouched() {
        let h = harness();
        h.orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");
        let before = h.directory.snapshot();

        h.backend.fail(FakeCall::Directory, 500);
        let result = h.orchestrator.load(&h.session(), LoadMode::ForceRefresh).await;
        agora_test_utils::assertions::assert_network_error(&result);
        assert!(Arc::ptr_eq(&before, &h.directory.snapshot()));
        assert_eq!(h.orchestrator.state(), DiscoveryState::Failed);
        assert!(matches!(h.directory.status(), LoadStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cached_directory_for_other_deployment_is_refetched() {
        let h = harness();
        h.orchestrator
            .load(&h.session(), LoadMode::CacheFirst)
            .await
            .expect("load");

        let other = h.login(SessionContext::new(user(), credential(), "dep-other"));
        let result = h.orchestrator.load(&other, LoadMode::CacheFirst).await;
        assert!(result.is_err(), "fake backend only knows dep-main");
        assert_eq!(h.backend.directory_calls(), 2);
        assert!(h.kv.raw("graph-discovery:user-1").is_none());
    }

    #[tokio::test]
    async fn test_load_for_replaced_session_is_refused() {
        let h = harness();
        let stale = h.session();
        h.login(SessionContext::new(user(), credential(), deployment()));

        let result = h.orchestrator.load(&stale, LoadMode::CacheFirst).await;
        assert!(matches!(result, Err(AgoraError::SessionEnded)));
        assert_eq!(h.backend.directory_calls(), 0);
        assert!(h.directory.snapshot().is_empty());
        assert_eq!(h.directory.status(), LoadStatus::Idle);
    }
}
