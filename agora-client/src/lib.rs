//! AGORA client: directory cache and sync engine.
//!
//! [`SyncEngine`] serves the assistant directory from a two-layer persistent
//! cache keyed by backend version fingerprints, hydrates assistants on
//! demand and shows optimistic inserts until the backend catches up.

pub mod api_client;
pub mod config;
pub mod constants;
pub mod directory;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hydration;
pub mod notifications;
pub mod optimistic;
pub mod oracle;
pub mod session;
pub mod settings;
pub mod telemetry;

pub use api_client::RestClient;
pub use directory::{DirectoryEntry, DirectorySnapshot, DirectoryStore, LoadStatus, SnapshotSource};
pub use discovery::{DiscoveryOrchestrator, DiscoveryState, LoadMode, LoadOutcome};
pub use engine::SyncEngine;
pub use hydration::HydrationController;
pub use notifications::{Notification, NotificationCenter, NotificationLevel};
pub use optimistic::{OptimisticCoordinator, ProvisionalInsert};
pub use oracle::VersionOracle;
pub use session::{SessionContext, SessionSlot, SessionTasks};
pub use settings::EngineSettings;
