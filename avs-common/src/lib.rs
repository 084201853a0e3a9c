//! # AVS Common Library
//!
//! Shared code for the audio session coordinator crates:
//! - Event types (SessionEvent enum) and the broadcast EventBus
//! - Media object handles and activity states
//! - Configuration file resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{ActivityState, EventBus, MediaHandle, SessionEvent};
