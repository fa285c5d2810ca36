//! Domain types for the authorization subsystem.

pub mod client;
pub mod context;
pub mod identity;

pub use client::{AuthType, AuthenticationRecord, Client, ClientFirewall, ClientKind};
pub use context::RequestContext;
pub use identity::{AuthMethod, LoginCompletion, ResolvedIdentity};
