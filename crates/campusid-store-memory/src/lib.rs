//! In-memory storage backends for the CampusID authorization subsystem.
//!
//! Single-process implementations of the `campusid-auth` storage traits,
//! intended for tests and development servers. All state lives in
//! `tokio::sync::RwLock`-guarded maps; the flow store honors TTLs and
//! the create-only / delete-once semantics the flow depends on.

pub mod audit;
pub mod clients;
pub mod directory;
pub mod flow;
pub mod sessions;

pub use audit::RecordingAuditSink;
pub use clients::InMemoryClientRegistry;
pub use directory::{DirectoryAccount, InMemoryDirectory};
pub use flow::InMemoryFlowStore;
pub use sessions::InMemorySsoSessionStore;
