//! User-facing notifications raised by the engine.
//!
//! Notifications expire after a fixed lifetime. Expired entries are pruned
//! whenever the active set is read.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_core::{Clock, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Notification {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

pub struct NotificationCenter {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<Vec<Notification>>,
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl NotificationCenter {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, level: NotificationLevel, message: impl Into<String>) {
        let created_at = self.clock.now();
        let lifetime = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let notification = Notification {
            level,
            message: message.into(),
            created_at,
            expires_at: created_at
                .checked_add_signed(lifetime)
                .unwrap_or(Timestamp::MAX_UTC),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }

    /// Unexpired notifications, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        let now = self.clock.now();
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|n| !n.is_expired(now));
        entries.clone()
    }

    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::ManualClock;

    #[test]
    fn test_notifications_expire() {
        let clock = ManualClock::starting_now();
        let center = NotificationCenter::new(Arc::new(clock.clone()), Duration::from_secs(8));
        center.push(NotificationLevel::Error, "refresh failed");
        clock.advance(Duration::from_secs(5));
        center.push(NotificationLevel::Info, "created");

        assert_eq!(center.active().len(), 2);
        clock.advance(Duration::from_secs(3));
        let active = center.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "created");
    }

    #[test]
    fn test_clear() {
        let center = NotificationCenter::new(
            Arc::new(ManualClock::starting_now()),
            Duration::from_secs(8),
        );
        center.push(NotificationLevel::Warning, "slow");
        center.clear();
        assert!(center.active().is_empty());
    }
}
