//! Version oracle: the client's view of the backend version counters.
//!
//! Holds the last successfully fetched [`VersionVector`] in a `watch`
//! channel. A failed fetch keeps the previous vector; while none has ever
//! been fetched the fingerprint is [`Fingerprint::unversioned`].

use std::sync::Arc;

use agora_core::{AgoraError, AgoraResult, BearerToken, DirectoryBackend, Fingerprint, VersionVector};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct VersionOracle {
    backend: Arc<dyn DirectoryBackend>,
    latest: watch::Sender<Option<VersionVector>>,
}

impl std::fmt::Debug for VersionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionOracle")
            .field("latest", &self.latest())
            .finish_non_exhaustive()
    }
}

impl VersionOracle {
    pub fn new(backend: Arc<dyn DirectoryBackend>) -> Self {
        let (latest, _) = watch::channel(None);
        Self { backend, latest }
    }

    /// Fetch the counters once and publish them.
    ///
    /// Concurrent calls are allowed; whichever response is applied last
    /// wins. Subscribers are only woken when the vector actually changes.
    ///
    /// # Errors
    ///
    /// [`AgoraError::VersionFetch`] if the backend call fails. The last
    /// known vector is left in place.
    pub async fn try_refresh(&self, credential: &BearerToken) -> AgoraResult<VersionVector> {
        let state = self
            .backend
            .fetch_cache_state(credential)
            .await
            .map_err(|e| AgoraError::VersionFetch {
                reason: e.to_string(),
            })?;
        let vector = VersionVector::from(state);

        let previous = self.latest();
        let changed = self.latest.send_if_modified(|current| {
            if *current == Some(vector) {
                false
            } else {
                *current = Some(vector);
                true
            }
        });
        if changed {
            match previous {
                Some(previous) => info!(
                    fingerprint = %vector.fingerprint(),
                    changed = ?vector.changed_since(&previous),
                    "backend versions changed"
                ),
                None => debug!(fingerprint = %vector.fingerprint(), "backend versions known"),
            }
        }
        Ok(vector)
    }

    /// Like [`VersionOracle::try_refresh`], but degrades to the last known
    /// vector on failure.
    pub async fn refresh(&self, credential: &BearerToken) -> Option<VersionVector> {
        match self.try_refresh(credential).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                let fallback = self.latest();
                warn!(
                    error = %err,
                    fallback = %self.current_fingerprint(),
                    "version poll failed, keeping last known versions"
                );
                fallback
            }
        }
    }

    pub fn latest(&self) -> Option<VersionVector> {
        *self.latest.borrow()
    }

    pub fn current_fingerprint(&self) -> Fingerprint {
        self.latest()
            .map(|vector| vector.fingerprint())
            .unwrap_or_else(Fingerprint::unversioned)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<VersionVector>> {
        self.latest.subscribe()
    }

    /// Forget the known vector, as on logout.
    pub fn reset(&self) {
        self.latest.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_test_utils::fixtures::{credential, seeded_backend};
    use agora_test_utils::{EntityClass, FakeBackend, FakeCall};

    fn oracle_with(backend: Arc<FakeBackend>) -> VersionOracle {
        VersionOracle::new(backend)
    }

    #[tokio::test]
    async fn test_unversioned_before_first_fetch() {
        let oracle = oracle_with(Arc::new(seeded_backend()));
        assert!(oracle.latest().is_none());
        assert!(oracle.current_fingerprint().is_unversioned());
    }

    #[tokio::test]
    async fn test_refresh_publishes_fingerprint() {
        let oracle = oracle_with(Arc::new(seeded_backend()));
        let vector = oracle.refresh(&credential()).await.expect("vector");
        assert_eq!(vector, VersionVector::new(1, 5, 1));
        assert_eq!(oracle.current_fingerprint().as_str(), "g1-a5-s1");
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_last_known() {
        let backend = Arc::new(seeded_backend());
        let oracle = oracle_with(backend.clone());
        oracle.refresh(&credential()).await;

        backend.bump(EntityClass::Assistants);
        backend.fail(FakeCall::CacheState, 503);
        assert!(oracle.try_refresh(&credential()).await.is_err());
        let degraded = oracle.refresh(&credential()).await;
        assert_eq!(degraded, Some(VersionVector::new(1, 5, 1)));
        assert_eq!(oracle.current_fingerprint().as_str(), "g1-a5-s1");
    }

    #[tokio::test]
    async fn test_failure_without_history_stays_unversioned() {
        let backend = Arc::new(seeded_backend());
        backend.fail(FakeCall::CacheState, 500);
        let oracle = oracle_with(backend);
        assert!(oracle.refresh(&credential()).await.is_none());
        assert!(oracle.current_fingerprint().is_unversioned());
    }

    #[tokio::test]
    async fn test_subscribers_woken_only_on_change() {
        let backend = Arc::new(seeded_backend());
        let oracle = oracle_with(backend.clone());
        let mut rx = oracle.subscribe();

        oracle.refresh(&credential()).await;
        assert!(rx.has_changed().expect("sender alive"));
        rx.borrow_and_update();

        oracle.refresh(&credential()).await;
        assert!(!rx.has_changed().expect("sender alive"));

        backend.bump(EntityClass::Graphs);
        oracle.refresh(&credential()).await;
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), Some(VersionVector::new(2, 5, 1)));
    }
}
