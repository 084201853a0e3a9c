//! Error types for avs-coordinator
//!
//! Every failure is a value returned to the direct caller. OS-driven
//! operations publish the same values on the event bus instead.

use avs_common::MediaHandle;
use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Object identity is already present in the registry
    #[error("Media object already registered as {0}")]
    AlreadyRegistered(MediaHandle),

    /// Handle does not resolve to a live registered object
    #[error("Unknown media object: {0}")]
    UnknownObject(MediaHandle),

    /// Host refused to grant the audio session
    #[error("Audio session activation denied: {0}")]
    ActivationDenied(String),

    /// Host refused to deactivate; the local count still reached zero
    #[error("Audio session deactivation refused: {0}")]
    DeactivationRefused(String),

    /// Category/options combination is not recognized
    #[error("Invalid audio category: {0}")]
    InvalidCategory(String),

    /// Host rejected a valid category while the session was active
    #[error("Audio category refused: {0}")]
    CategoryRefused(String),

    /// No delegation port is bound (never bound, or torn down)
    #[error("Delegation port unavailable")]
    PortUnavailable,

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario script refers to something it never declared
    #[error("Scenario error: {0}")]
    Scenario(String),
}

impl Error {
    /// True when the caller must not produce audio
    pub fn denies_activation(&self) -> bool {
        matches!(self, Error::ActivationDenied(_) | Error::PortUnavailable)
    }
}

impl From<avs_common::Error> for Error {
    fn from(err: avs_common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Convenience Result type using the coordinator Error
pub type Result<T> = std::result::Result<T, Error>;
