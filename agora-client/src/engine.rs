//! `SyncEngine`: the public face of the directory cache.
//!
//! Wires the version oracle, cache store, directory store, discovery,
//! hydration and optimistic coordinator together around one session slot.

use std::sync::{Arc, Mutex};

use agora_core::convert::summary_from_wire;
use agora_core::{
    AgoraError, AgoraResult, AssistantId, AssistantSummary, Clock, CreateAssistantRequest,
    DirectoryBackend, Fingerprint, FullAssistant, StoreError, VersionVector,
};
use agora_storage::{CacheLayer, CacheStats, CacheStore, KvStore, StoreUsage};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::directory::{DirectorySnapshot, DirectoryStore, LoadStatus};
use crate::discovery::{DiscoveryOrchestrator, DiscoveryState, LoadMode, LoadOutcome};
use crate::hydration::HydrationController;
use crate::notifications::{Notification, NotificationCenter, NotificationLevel};
use crate::optimistic::{OptimisticCoordinator, ProvisionalInsert};
use crate::oracle::VersionOracle;
use crate::session::{SessionContext, SessionSlot, SessionTasks};
use crate::settings::EngineSettings;

pub struct SyncEngine {
    backend: Arc<dyn DirectoryBackend>,
    settings: EngineSettings,
    cache: Arc<CacheStore>,
    oracle: Arc<VersionOracle>,
    directory: Arc<DirectoryStore>,
    discovery: Arc<DiscoveryOrchestrator>,
    hydration: HydrationController,
    optimistic: OptimisticCoordinator,
    notifications: NotificationCenter,
    sessions: Arc<SessionSlot>,
    tasks: Mutex<Option<SessionTasks>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("session", &self.sessions.current().map(|s| s.user_id.clone()))
            .field("fingerprint", &self.oracle.current_fingerprint())
            .field("status", &self.directory.status())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        backend: Arc<dyn DirectoryBackend>,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(kv, clock.clone(), settings.cache.clone()));
        let oracle = Arc::new(VersionOracle::new(backend.clone()));
        let directory = Arc::new(DirectoryStore::new(
            clock.clone(),
            settings.optimistic_retention,
        ));
        let sessions = Arc::new(SessionSlot::new());
        let discovery = Arc::new(DiscoveryOrchestrator::new(
            backend.clone(),
            cache.clone(),
            oracle.clone(),
            directory.clone(),
            sessions.clone(),
        ));
        let hydration =
            HydrationController::new(backend.clone(), directory.clone(), sessions.clone());
        let optimistic = OptimisticCoordinator::new(
            directory.clone(),
            cache.clone(),
            discovery.clone(),
            sessions.clone(),
            settings.reconcile_delay,
        );
        let notifications = NotificationCenter::new(clock, settings.notification_ttl);

        Self {
            backend,
            settings,
            cache,
            oracle,
            directory,
            discovery,
            hydration,
            optimistic,
            notifications,
            sessions,
            tasks: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a session: version polling and the stale sweep begin at once.
    ///
    /// Replaces any previous session. Logging in as a different user drops
    /// the in-memory directory of the previous one.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Unauthenticated`] if the credential is empty.
    pub fn login(&self, session: SessionContext) -> AgoraResult<()> {
        if session.credential.is_empty() {
            return Err(AgoraError::Unauthenticated);
        }

        let session = Arc::new(session);
        let previous = self.sessions.replace(Some(session.clone()));

        if let Some(previous) = previous {
            if previous.user_id != session.user_id
                || previous.deployment_id != session.deployment_id
            {
                self.directory.clear();
                self.oracle.reset();
            }
        }

        let tasks = SessionTasks::spawn(
            session.clone(),
            self.oracle.clone(),
            self.cache.clone(),
            self.settings.poll_interval,
        );
        self.replace_tasks(Some(tasks));
        info!(
            user_id = %session.user_id,
            deployment_id = %session.deployment_id,
            "session started"
        );
        Ok(())
    }

    /// End the session: background tasks stop immediately, in-memory state
    /// is cleared. The persistent cache is kept for the next login.
    pub fn logout(&self) {
        let previous = self.sessions.replace(None);
        self.stop_tasks();
        self.directory.clear();
        self.oracle.reset();
        self.notifications.clear();
        if let Some(previous) = previous {
            info!(user_id = %previous.user_id, "session ended");
        }
    }

    pub fn session(&self) -> Option<Arc<SessionContext>> {
        self.sessions.current()
    }

    pub fn is_polling(&self) -> bool {
        self.lock_tasks(|tasks| tasks.as_ref().is_some_and(|t| !t.is_finished()))
    }

    fn require_session(&self) -> AgoraResult<Arc<SessionContext>> {
        self.sessions
            .current()
            .filter(|session| !session.credential.is_empty())
            .ok_or(AgoraError::Unauthenticated)
    }

    fn stop_tasks(&self) {
        if let Some(tasks) = self.lock_tasks(Option::take) {
            tasks.stop();
        }
    }

    fn replace_tasks(&self, next: Option<SessionTasks>) {
        if let Some(old) = self.lock_tasks(|tasks| std::mem::replace(tasks, next)) {
            old.stop();
        }
    }

    fn lock_tasks<R>(&self, f: impl FnOnce(&mut Option<SessionTasks>) -> R) -> R {
        match self.tasks.lock() {
            Ok(mut tasks) => f(&mut tasks),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    // ------------------------------------------------------------------
    // Directory operations
    // ------------------------------------------------------------------

    /// Serve the directory from cache when valid, otherwise fetch it.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session, the network error of a failed
    /// fetch, or `SessionEnded` if the session changed mid-load.
    pub async fn load_directory(&self) -> AgoraResult<LoadOutcome> {
        let session = self.require_session()?;
        self.discovery.load(&session, LoadMode::CacheFirst).await
    }

    /// Fetch the directory regardless of cache state. A failure leaves the
    /// current directory in place and raises an error notification.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session, or the network error of the
    /// failed fetch.
    pub async fn refresh_directory(&self) -> AgoraResult<LoadOutcome> {
        let session = self.require_session()?;
        let result = self.discovery.load(&session, LoadMode::ForceRefresh).await;
        match &result {
            Ok(_) | Err(AgoraError::SessionEnded) => {}
            Err(err) => self.notifications.push(
                NotificationLevel::Error,
                format!("Failed to refresh assistants: {err}"),
            ),
        }
        result
    }

    /// Load the heavy fields of one assistant.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound` for an id outside the directory, or
    /// the network error of the detail fetch.
    pub async fn hydrate(&self, assistant_id: &AssistantId) -> AgoraResult<FullAssistant> {
        let session = self.require_session()?;
        self.hydration.hydrate(&session, assistant_id).await
    }

    /// Create an assistant on the backend and show it immediately.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, or the network error of the create call. Nothing
    /// is inserted when the call fails.
    pub async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> AgoraResult<AssistantSummary> {
        let session = self.require_session()?;
        let wire = match self
            .backend
            .create_assistant(&session.credential, &session.deployment_id, request)
            .await
        {
            Ok(wire) => wire,
            Err(err) => {
                warn!(user_id = %session.user_id, error = %err, "assistant create failed");
                self.notifications.push(
                    NotificationLevel::Error,
                    format!("Failed to create assistant: {err}"),
                );
                return Err(err.into());
            }
        };

        let summary = summary_from_wire(wire);
        self.optimistic.add_provisional(session, summary.clone());
        self.notifications.push(
            NotificationLevel::Success,
            format!("Created assistant {}", summary.name),
        );
        Ok(summary)
    }

    /// Show an assistant created elsewhere before the backend lists it.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session.
    pub fn add_provisional(&self, summary: AssistantSummary) -> AgoraResult<ProvisionalInsert> {
        let session = self.require_session()?;
        Ok(self.optimistic.add_provisional(session, summary))
    }

    /// Drop every cached layer of the current user, as after a mutation the
    /// version counters may not reflect yet.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session.
    pub async fn invalidate_cache(&self) -> AgoraResult<u64> {
        let session = self.require_session()?;
        let removed = self.cache.invalidate_user(&session.user_id).await;
        info!(user_id = %session.user_id, removed, "cache invalidated");
        Ok(removed)
    }

    /// Drop one layer of the current user's cache.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a session.
    pub async fn invalidate_layer(&self, layer: CacheLayer) -> AgoraResult<bool> {
        let session = self.require_session()?;
        Ok(self.cache.invalidate(layer, &session.user_id).await)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.directory.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DirectorySnapshot>> {
        self.directory.subscribe()
    }

    pub fn status(&self) -> LoadStatus {
        self.directory.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LoadStatus> {
        self.directory.subscribe_status()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn versions(&self) -> Option<VersionVector> {
        self.oracle.latest()
    }

    pub fn subscribe_versions(&self) -> watch::Receiver<Option<VersionVector>> {
        self.oracle.subscribe()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.oracle.current_fingerprint()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.active()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// # Errors
    ///
    /// Returns the store error if usage cannot be read.
    pub async fn store_usage(&self) -> Result<StoreUsage, StoreError> {
        self.cache.usage().await
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{BearerToken, ManualClock};
    use agora_storage::InMemoryKvStore;
    use agora_test_utils::assertions::assert_unauthenticated;
    use agora_test_utils::fixtures::{credential, deployment, seeded_backend, user};
    use agora_test_utils::FakeBackend;

    fn engine() -> (Arc<FakeBackend>, SyncEngine) {
        let backend = Arc::new(seeded_backend());
        let engine = SyncEngine::new(
            backend.clone(),
            Arc::new(InMemoryKvStore::new()),
            Arc::new(ManualClock::starting_now()),
            EngineSettings::default(),
        );
        (backend, engine)
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let (backend, engine) = engine();
        assert_unauthenticated(&engine.load_directory().await);
        assert_unauthenticated(&engine.hydrate(&AssistantId::new("a-1")).await);
        assert_unauthenticated(&engine.invalidate_cache().await);
        assert_eq!(backend.directory_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_credential_rejected_at_login() {
        let (_backend, engine) = engine();
        let result = engine.login(SessionContext::new(user(), BearerToken::new(""), deployment()));
        assert_unauthenticated(&result);
        assert!(engine.session().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_directory() {
        let (_backend, engine) = engine();
        engine
            .login(SessionContext::new(user(), credential(), deployment()))
            .expect("login");
        engine.load_directory().await.expect("load");
        assert_eq!(engine.snapshot().len(), 3);

        engine.logout();
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.status(), LoadStatus::Idle);
        assert!(engine.fingerprint().is_unversioned());
    }

    #[tokio::test]
    async fn test_invalidate_cache_forces_fetch() {
        let (backend, engine) = engine();
        engine
            .login(SessionContext::new(user(), credential(), deployment()))
            .expect("login");
        engine.load_directory().await.expect("load");
        assert_eq!(engine.invalidate_cache().await.expect("invalidate"), 2);
        engine.load_directory().await.expect("load");
        assert_eq!(backend.directory_calls(), 2);
    }
}
