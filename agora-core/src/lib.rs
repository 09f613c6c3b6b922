//! AGORA Core - Entity Types
//!
//! Data structures shared by every AGORA crate: identifiers, backend version
//! counters, directory entities, wire shapes and the pure converters between
//! them. This crate performs no I/O.

pub mod backend;
pub mod clock;
pub mod convert;
pub mod entities;
pub mod error;
pub mod identity;
pub mod version;
pub mod wire;

pub use backend::DirectoryBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entities::{
    Assistant, AssistantCounts, AssistantListing, AssistantSummary, FullAssistant,
    GraphDiscovery, GraphTemplate, PermissionLevel,
};
pub use error::{AgoraError, AgoraResult, ConfigError, NetworkError, StoreError};
pub use identity::{AssistantId, BearerToken, DeploymentId, GraphId, Timestamp, UserId};
pub use version::{EntityClass, Fingerprint, VersionVector};
pub use wire::{
    AccessibleGraphsResponse, AssistantDetailWire, AssistantWire, CacheStateResponse,
    CreateAssistantRequest,
};
