//! Persisted cache entry envelope and its validity rules.

use std::time::Duration;

use agora_core::{Fingerprint, Timestamp, UserId};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Envelope written for every cached payload.
///
/// Serialized as `{ payload, timestamp, userId, fingerprint }` with
/// `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub timestamp: i64,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub fingerprint: Fingerprint,
}

/// Outcome of checking an entry against the current time, fingerprint and
/// requesting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Expired { age_ms: i64, ttl_ms: i64 },
    FingerprintMismatch { stored: Fingerprint, expected: Fingerprint },
    WrongOwner { stored: UserId },
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    /// Short label used in log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            Validity::Valid => "valid",
            Validity::Expired { .. } => "expired",
            Validity::FingerprintMismatch { .. } => "fingerprint_mismatch",
            Validity::WrongOwner { .. } => "wrong_owner",
        }
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, timestamp: i64, user_id: UserId, fingerprint: Fingerprint) -> Self {
        Self {
            payload,
            timestamp,
            user_id,
            fingerprint,
        }
    }

    /// Age of the entry at `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }

    /// Check the entry in order: TTL, fingerprint, owner.
    ///
    /// An entry exactly `ttl` old is still valid.
    pub fn validate(
        &self,
        now_ms: i64,
        ttl: Duration,
        expected: &Fingerprint,
        user_id: &UserId,
    ) -> Validity {
        let age_ms = self.age_ms(now_ms);
        let ttl_ms = ttl_millis(ttl);
        if age_ms > ttl_ms {
            return Validity::Expired { age_ms, ttl_ms };
        }
        if &self.fingerprint != expected {
            return Validity::FingerprintMismatch {
                stored: self.fingerprint.clone(),
                expected: expected.clone(),
            };
        }
        if &self.user_id != user_id {
            return Validity::WrongOwner {
                stored: self.user_id.clone(),
            };
        }
        Validity::Valid
    }

    pub fn cached_at(&self) -> Option<Timestamp> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A valid cache hit, carrying when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    cached_at_ms: i64,
    fingerprint: Fingerprint,
}

impl<T> CacheRead<T> {
    pub(crate) fn from_entry(entry: CacheEntry<T>) -> Self {
        Self {
            value: entry.payload,
            cached_at_ms: entry.timestamp,
            fingerprint: entry.fingerprint,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn cached_at_ms(&self) -> i64 {
        self.cached_at_ms
    }

    pub fn cached_at(&self) -> Option<Timestamp> {
        DateTime::from_timestamp_millis(self.cached_at_ms)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// How stale the value is at `now_ms`.
    pub fn staleness(&self, now_ms: i64) -> Duration {
        let age = now_ms.saturating_sub(self.cached_at_ms).max(0);
        Duration::from_millis(age as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::VersionVector;

    fn entry(ts: i64) -> CacheEntry<u32> {
        CacheEntry::new(
            7,
            ts,
            UserId::new("u1"),
            VersionVector::new(1, 5, 1).fingerprint(),
        )
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(entry(1_000)).expect("serialize");
        assert_eq!(json["payload"], 7);
        assert_eq!(json["timestamp"], 1_000);
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["fingerprint"], "g1-a5-s1");
    }

    #[test]
    fn test_boundary_is_valid_and_one_past_is_expired() {
        let fp = VersionVector::new(1, 5, 1).fingerprint();
        let user = UserId::new("u1");
        let ttl = Duration::from_secs(60);
        let e = entry(0);

        assert!(e.validate(60_000, ttl, &fp, &user).is_valid());
        assert_eq!(
            e.validate(60_001, ttl, &fp, &user),
            Validity::Expired {
                age_ms: 60_001,
                ttl_ms: 60_000
            }
        );
    }

    #[test]
    fn test_ttl_checked_before_fingerprint() {
        let other = VersionVector::new(1, 6, 1).fingerprint();
        let v = entry(0).validate(
            10_000_000,
            Duration::from_secs(1),
            &other,
            &UserId::new("u1"),
        );
        assert_eq!(v.reason(), "expired");
    }

    #[test]
    fn test_fingerprint_and_owner_mismatch() {
        let fp = VersionVector::new(1, 5, 1).fingerprint();
        let ttl = Duration::from_secs(60);
        let e = entry(0);

        let other = VersionVector::new(1, 6, 1).fingerprint();
        assert_eq!(
            e.validate(1, ttl, &other, &UserId::new("u1")).reason(),
            "fingerprint_mismatch"
        );
        assert_eq!(
            e.validate(1, ttl, &fp, &UserId::new("u2")),
            Validity::WrongOwner {
                stored: UserId::new("u1")
            }
        );
    }

    #[test]
    fn test_cache_read_staleness() {
        let read = CacheRead::from_entry(entry(1_000));
        assert_eq!(read.staleness(4_000), Duration::from_millis(3_000));
        assert_eq!(read.staleness(0), Duration::ZERO);
        assert_eq!(*read.value(), 7);
    }
}
