//! Backend version counters and the fingerprint derived from them.
//!
//! The backend bumps one counter per entity class on every mutation. The
//! client never writes these; it only compares them through a [`Fingerprint`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity classes tracked by the backend version counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    Graphs,
    Assistants,
    Schemas,
}

/// Monotonically non-decreasing counters owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VersionVector {
    pub graphs: i64,
    pub assistants: i64,
    pub schemas: i64,
}

impl VersionVector {
    pub fn new(graphs: i64, assistants: i64, schemas: i64) -> Self {
        Self {
            graphs,
            assistants,
            schemas,
        }
    }

    /// Deterministic cache-validity token for this vector.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(format!(
            "g{}-a{}-s{}",
            self.graphs, self.assistants, self.schemas
        ))
    }

    /// Entity classes whose counter differs from `previous`.
    pub fn changed_since(&self, previous: &VersionVector) -> Vec<EntityClass> {
        let mut changed = Vec::new();
        if self.graphs != previous.graphs {
            changed.push(EntityClass::Graphs);
        }
        if self.assistants != previous.assistants {
            changed.push(EntityClass::Assistants);
        }
        if self.schemas != previous.schemas {
            changed.push(EntityClass::Schemas);
        }
        changed
    }
}

/// String form of a [`VersionVector`], stored next to every cache entry.
///
/// Two fingerprints are equal iff their source vectors are field-wise equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

/// Sentinel used while no version vector has ever been observed.
const UNVERSIONED: &str = "unversioned";

impl Fingerprint {
    /// Fingerprint used before the first successful version fetch. Entries
    /// written under it are only bounded by their TTL.
    pub fn unversioned() -> Self {
        Self(UNVERSIONED.to_string())
    }

    pub fn is_unversioned(&self) -> bool {
        self.0 == UNVERSIONED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&VersionVector> for Fingerprint {
    fn from(value: &VersionVector) -> Self {
        value.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let v = VersionVector::new(1, 5, 1);
        assert_eq!(v.fingerprint().as_str(), "g1-a5-s1");
    }

    #[test]
    fn test_unversioned_never_matches_a_vector() {
        let v = VersionVector::default();
        assert_ne!(v.fingerprint(), Fingerprint::unversioned());
        assert!(Fingerprint::unversioned().is_unversioned());
        assert!(!v.fingerprint().is_unversioned());
    }

    #[test]
    fn test_changed_since() {
        let before = VersionVector::new(1, 5, 1);
        let after = VersionVector::new(1, 6, 1);
        assert_eq!(after.changed_since(&before), vec![EntityClass::Assistants]);
        assert!(after.changed_since(&after).is_empty());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_vector() -> impl Strategy<Value = VersionVector> {
        (any::<i64>(), any::<i64>(), any::<i64>())
            .prop_map(|(g, a, s)| VersionVector::new(g, a, s))
    }

    proptest! {
        #[test]
        fn prop_equal_vectors_equal_fingerprints(v in arb_vector()) {
            let copy = v;
            prop_assert_eq!(v.fingerprint(), copy.fingerprint());
        }

        #[test]
        fn prop_distinct_vectors_distinct_fingerprints(a in arb_vector(), b in arb_vector()) {
            prop_assert_eq!(a == b, a.fingerprint() == b.fingerprint());
        }

        #[test]
        fn prop_single_field_bump_changes_fingerprint(v in arb_vector(), field in 0usize..3) {
            let mut bumped = v;
            match field {
                0 => bumped.graphs = bumped.graphs.wrapping_add(1),
                1 => bumped.assistants = bumped.assistants.wrapping_add(1),
                _ => bumped.schemas = bumped.schemas.wrapping_add(1),
            }
            prop_assert_ne!(v.fingerprint(), bumped.fingerprint());
        }
    }
}
