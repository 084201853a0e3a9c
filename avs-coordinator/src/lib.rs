//! # AVS Coordinator
//!
//! Arbitrates one process-wide audio session among independently created
//! media objects and reconciles it with OS interruptions, media services
//! resets and app foreground/background transitions.
//!
//! **Components:**
//! - Registry: weak references to registered media objects
//! - Session arbiter: reference-counted activation through the delegation port
//! - Interruption handler: pauses and resumes around OS interruptions
//! - Lifecycle bridge: background/foreground and teardown
//! - Delegation port: the host decides whether the session may be active

pub mod config;
mod context;
pub mod coordinator;
pub mod error;
pub mod host;
mod interruption;
mod lifecycle;
pub mod port;
pub mod registry;
pub mod script;
pub mod session;
pub mod signal;

pub use config::{Config, ConfigOverrides};
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use host::SharedHostPort;
pub use interruption::InterruptionState;
pub use port::{DelegationPort, PortError, PortResult, Tenant};
pub use registry::MediaObject;
pub use session::AudioMode;
pub use signal::{InterruptionEvent, Signal};
