//! Reference host for several tenants sharing one process
//!
//! `SharedHostPort` is the policy side of the delegation port: it decides
//! which tenant gets audio focus. A tenant holding the session without
//! mixing keeps focus until it deactivates or goes away; everyone else may
//! share.

use crate::port::{DelegationPort, PortError, PortResult, Tenant};
use avs_common::events::{AudioCategory, CategoryOptions, InterruptionMode};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
struct TenantSession {
    active: bool,
    backgrounded: bool,
    category: Option<(AudioCategory, CategoryOptions)>,
}

impl TenantSession {
    fn exclusive(&self) -> bool {
        self.active
            && self
                .category
                .map(|(_, options)| options.interruption_mode == InterruptionMode::DoNotMix)
                .unwrap_or(true)
    }
}

#[derive(Default)]
pub struct SharedHostPort {
    tenants: Mutex<HashMap<Tenant, TenantSession>>,
}

impl SharedHostPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Tenant, TenantSession>> {
        self.tenants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tenants currently holding the session
    pub fn active_tenants(&self) -> Vec<Tenant> {
        let mut active: Vec<Tenant> = self
            .lock()
            .iter()
            .filter(|(_, session)| session.active)
            .map(|(tenant, _)| tenant.clone())
            .collect();
        active.sort_by_key(|tenant| tenant.to_string());
        active
    }

    pub fn is_backgrounded(&self, tenant: &Tenant) -> bool {
        self.lock()
            .get(tenant)
            .map(|session| session.backgrounded)
            .unwrap_or(false)
    }

    /// Last category applied by `tenant`
    pub fn category_of(&self, tenant: &Tenant) -> Option<(AudioCategory, CategoryOptions)> {
        self.lock().get(tenant).and_then(|session| session.category)
    }
}

impl DelegationPort for SharedHostPort {
    fn set_active(&self, tenant: &Tenant, active: bool) -> PortResult {
        let mut tenants = self.lock();
        if active {
            if let Some((holder, _)) = tenants
                .iter()
                .find(|(other, session)| *other != tenant && session.exclusive())
            {
                debug!("Denying focus to {}: held by {}", tenant, holder);
                return Err(PortError::new(format!("audio focus held by {}", holder)));
            }
        }
        tenants.entry(tenant.clone()).or_default().active = active;
        info!("Host set {} {}", tenant, if active { "active" } else { "inactive" });
        Ok(())
    }

    fn set_category(
        &self,
        tenant: &Tenant,
        category: AudioCategory,
        options: CategoryOptions,
    ) -> PortResult {
        self.lock().entry(tenant.clone()).or_default().category = Some((category, options));
        debug!("Host stored category {} for {}", category, tenant);
        Ok(())
    }

    fn did_background(&self, tenant: &Tenant) {
        self.lock().entry(tenant.clone()).or_default().backgrounded = true;
    }

    fn did_foreground(&self, tenant: &Tenant) {
        self.lock().entry(tenant.clone()).or_default().backgrounded = false;
    }

    fn will_deallocate(&self, tenant: &Tenant) {
        if self.lock().remove(tenant).is_some() {
            info!("Host forgot {}", tenant);
        }
    }
}
