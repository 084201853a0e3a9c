//! Delegation port: the host-side authority over the audio session
//!
//! The coordinator never decides whether audio focus is granted. It asks the
//! host through this port, tagging every call with the tenant it acts for so a
//! host embedding several independent experiences can route the decision.

use crate::error::{Error, Result};
use avs_common::events::{AudioCategory, CategoryOptions};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

/// Logical application on whose behalf a port call is made
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tenant {
    /// The whole process owns one session
    Process,
    /// One experience among several sharing the process
    Experience(String),
}

impl Tenant {
    /// Tenant for an optional experience id
    pub fn from_experience(id: Option<String>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Tenant::Experience(id),
            _ => Tenant::Process,
        }
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tenant::Process => write!(f, "process"),
            Tenant::Experience(id) => write!(f, "experience:{}", id),
        }
    }
}

/// Refusal returned by the host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct PortError {
    pub reason: String,
}

impl PortError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

pub type PortResult = std::result::Result<(), PortError>;

/// Host capability the coordinator calls outward on
///
/// Implementations may block. The coordinator never holds its own locks
/// while a port method runs, so an implementation may call back into the
/// coordinator (signals posted from here are queued, not run recursively).
pub trait DelegationPort: Send + Sync {
    /// Grant or release the audio session for `tenant`
    fn set_active(&self, tenant: &Tenant, active: bool) -> PortResult;

    /// Apply a category and its options for `tenant`
    fn set_category(
        &self,
        tenant: &Tenant,
        category: AudioCategory,
        options: CategoryOptions,
    ) -> PortResult;

    /// The tenant's app moved to the background
    fn did_background(&self, _tenant: &Tenant) {}

    /// The tenant's app returned to the foreground
    fn did_foreground(&self, _tenant: &Tenant) {}

    /// The tenant's coordinator is being torn down
    fn will_deallocate(&self, _tenant: &Tenant) {}
}

/// Binding from a coordinator to its port
///
/// The binding is released once, at teardown; afterwards every lookup
/// reports `PortUnavailable`.
pub struct PortBinding {
    tenant: Tenant,
    port: RwLock<Option<Arc<dyn DelegationPort>>>,
}

impl PortBinding {
    pub fn new(tenant: Tenant, port: Arc<dyn DelegationPort>) -> Self {
        Self {
            tenant,
            port: RwLock::new(Some(port)),
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Current port, if still bound
    pub fn get(&self) -> Result<Arc<dyn DelegationPort>> {
        self.port
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::PortUnavailable)
    }

    pub fn is_bound(&self) -> bool {
        self.port
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the binding, returning the port that was bound
    pub fn unbind(&self) -> Option<Arc<dyn DelegationPort>> {
        let port = self
            .port
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if port.is_some() {
            info!("Released delegation port binding for {}", self.tenant);
        }
        port
    }
}
