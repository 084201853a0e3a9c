//! Audio session arbitration and category handling

pub mod arbiter;
pub mod category;

pub use arbiter::SessionArbiter;
pub use category::{validate, AudioMode};
