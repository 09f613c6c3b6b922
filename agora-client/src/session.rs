//! Session identity and the background tasks that live for one session.
//!
//! A session owns two tasks: the version poller and the stale-entry sweep
//! that reacts to version changes. Both stop when the session ends.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use agora_core::{BearerToken, DeploymentId, UserId};
use agora_storage::CacheStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::oracle::VersionOracle;

/// Who is logged in, with what credential, against which deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    pub credential: BearerToken,
    pub deployment_id: DeploymentId,
}

impl SessionContext {
    pub fn new(
        user_id: impl Into<UserId>,
        credential: BearerToken,
        deployment_id: impl Into<DeploymentId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            credential,
            deployment_id: deployment_id.into(),
        }
    }
}

/// Current session, shared with background tasks.
///
/// Identity is by `Arc` pointer: logging in again, even as the same user,
/// produces a new session.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: RwLock<Option<Arc<SessionContext>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<SessionContext>> {
        self.current
            .read()
            .map(|current| current.clone())
            .unwrap_or_default()
    }

    /// Install `next`, returning the session it replaced.
    pub fn replace(&self, next: Option<Arc<SessionContext>>) -> Option<Arc<SessionContext>> {
        match self.current.write() {
            Ok(mut current) => std::mem::replace(&mut *current, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }

    pub fn is_current(&self, session: &Arc<SessionContext>) -> bool {
        self.current()
            .is_some_and(|current| Arc::ptr_eq(&current, session))
    }
}

/// Handles to the background tasks of one session.
#[derive(Debug)]
pub struct SessionTasks {
    shutdown: watch::Sender<bool>,
    poller: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl SessionTasks {
    /// Start polling versions every `poll_interval` (first poll immediately)
    /// and sweeping the user's stale cache entries whenever they change.
    pub fn spawn(
        session: Arc<SessionContext>,
        oracle: Arc<VersionOracle>,
        cache: Arc<CacheStore>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let poller = tokio::spawn(version_poll_task(
            oracle.clone(),
            session.credential.clone(),
            poll_interval,
            shutdown_rx.clone(),
        ));
        let sweeper = tokio::spawn(stale_sweep_task(
            oracle,
            cache,
            session.user_id.clone(),
            shutdown_rx,
        ));
        Self {
            shutdown,
            poller,
            sweeper,
        }
    }

    /// Signal shutdown and abort both tasks immediately.
    pub fn stop(self) {
        let _ = self.shutdown.send(true);
        self.poller.abort();
        self.sweeper.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.poller.is_finished() && self.sweeper.is_finished()
    }
}

async fn version_poll_task(
    oracle: Arc<VersionOracle>,
    credential: BearerToken,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Version poller started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                oracle.refresh(&credential).await;
            }
        }
    }

    info!("Version poller stopped");
}

async fn stale_sweep_task(
    oracle: Arc<VersionOracle>,
    cache: Arc<CacheStore>,
    user_id: UserId,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut versions = oracle.subscribe();
    versions.borrow_and_update();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = *versions.borrow_and_update();
                let Some(vector) = latest else {
                    continue;
                };
                let fingerprint = vector.fingerprint();
                let removed = cache.sweep(&user_id, &fingerprint).await;
                debug!(user_id = %user_id, fingerprint = %fingerprint, removed, "stale sweep");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_storage::{CacheConfig, InMemoryKvStore};
    use agora_test_utils::fixtures::{credential, deployment, seeded_backend, user};
    use agora_test_utils::{EntityClass, ManualClock};

    fn session() -> Arc<SessionContext> {
        Arc::new(SessionContext::new(user(), credential(), deployment()))
    }

    #[test]
    fn test_slot_identity_is_by_pointer() {
        let slot = SessionSlot::new();
        let first = session();
        assert!(slot.replace(Some(first.clone())).is_none());
        assert!(slot.is_current(&first));

        let same_user_again = session();
        let previous = slot.replace(Some(same_user_again.clone()));
        assert!(previous.is_some_and(|p| Arc::ptr_eq(&p, &first)));
        assert!(!slot.is_current(&first));
        assert!(slot.is_current(&same_user_again));

        slot.replace(None);
        assert!(slot.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_refreshes_on_interval_and_stops() {
        let backend = Arc::new(seeded_backend());
        let oracle = Arc::new(VersionOracle::new(backend.clone()));
        let cache = Arc::new(CacheStore::new(
            Arc::new(InMemoryKvStore::new()),
            Arc::new(ManualClock::starting_now()),
            CacheConfig::default(),
        ));
        let tasks = SessionTasks::spawn(session(), oracle.clone(), cache, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.cache_state_calls(), 1);
        assert_eq!(oracle.current_fingerprint().as_str(), "g1-a5-s1");

        backend.bump(EntityClass::Assistants);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.cache_state_calls(), 2);
        assert_eq!(oracle.current_fingerprint().as_str(), "g1-a6-s1");

        tasks.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.cache_state_calls(), 2);
    }
}
