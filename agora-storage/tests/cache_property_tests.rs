//! Property tests for cache entry validity and the cache store.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{AssistantListing, Fingerprint, ManualClock, UserId, VersionVector};
use agora_storage::{CacheConfig, CacheEntry, CacheStore, InMemoryKvStore, Validity};
use proptest::prelude::*;

fn arb_vector() -> impl Strategy<Value = VersionVector> {
    (0i64..4, 0i64..4, 0i64..4).prop_map(|(g, a, s)| VersionVector::new(g, a, s))
}

proptest! {
    #[test]
    fn prop_valid_iff_fresh_and_matching(
        written_at in 0i64..1_000_000_000_000,
        age_ms in 0i64..7_200_000,
        ttl_secs in 1u64..3_600,
        stored in arb_vector(),
        current in arb_vector(),
    ) {
        let user = UserId::new("u1");
        let entry = CacheEntry::new(0u8, written_at, user.clone(), stored.fingerprint());
        let ttl = Duration::from_secs(ttl_secs);

        let validity = entry.validate(written_at + age_ms, ttl, &current.fingerprint(), &user);
        let fresh = u128::try_from(age_ms).unwrap_or(0) <= ttl.as_millis();
        prop_assert_eq!(validity.is_valid(), fresh && stored == current);
        if !fresh {
            prop_assert!(
                matches!(validity, Validity::Expired { .. }),
                "expiry is checked first"
            );
        }
    }

    #[test]
    fn prop_entry_never_served_to_other_user(stored in arb_vector()) {
        let entry = CacheEntry::new(0u8, 0, UserId::new("u1"), stored.fingerprint());
        let validity = entry.validate(0, Duration::from_secs(60), &stored.fingerprint(), &UserId::new("u2"));
        prop_assert!(
            matches!(validity, Validity::WrongOwner { .. }),
            "expected WrongOwner, got {:?}",
            validity
        );
    }
}

#[tokio::test]
async fn read_after_version_change_deletes_entry() {
    let kv = InMemoryKvStore::new();
    let clock = ManualClock::starting_now();
    let store = CacheStore::new(Arc::new(kv.clone()), Arc::new(clock), CacheConfig::default());
    let user = UserId::new("u1");
    let before = VersionVector::new(1, 5, 1).fingerprint();
    let after = VersionVector::new(1, 6, 1).fingerprint();

    store
        .set(&user, &AssistantListing::default(), &before)
        .await
        .expect("write");
    assert!(store.get::<AssistantListing>(&user, &before).await.is_some());
    assert!(store.get::<AssistantListing>(&user, &after).await.is_none());
    assert!(kv.raw("assistant-list:u1").is_none());
    assert!(store
        .get::<AssistantListing>(&user, &Fingerprint::unversioned())
        .await
        .is_none());
    assert_eq!(store.stats().invalidated_on_read, 1);
}
