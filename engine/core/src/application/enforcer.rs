// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Restriction Enforcer
//!
//! Applies a resolved restriction list to the host and undoes it again without
//! losing the device owner's own grants.
//!
//! ## Cycle Contract
//!
//! ```text
//! reset(memory from previous apply)     enable every app, re-grant remembered
//!                                       pairs, clear memory
//!        │  (fully completes first)
//!        ▼
//! apply(new restrictions, memory)       disable / revoke, remembering every
//!                                       pair that was user-granted
//! ```
//!
//! Host call failures are logged and skipped: partial enforcement is safer than
//! aborting the remaining list.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::capabilities::HostCapability;
use crate::domain::grant_memory::GrantMemory;
use crate::domain::policy_graph::{Restriction, RestrictionEntry};

/// Counters reported back to the enforcement loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub apps_disabled: usize,
    pub permissions_revoked: usize,
    pub user_grants_recorded: usize,
    pub host_failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub apps_enabled: usize,
    pub grants_restored: usize,
    pub host_failures: usize,
}

pub struct RestrictionEnforcer {
    host: Arc<dyn HostCapability>,
}

impl RestrictionEnforcer {
    pub fn new(host: Arc<dyn HostCapability>) -> Self {
        Self { host }
    }

    /// Re-enable every application, restore every remembered grant, then clear `memory`.
    pub async fn reset(&self, memory: &mut GrantMemory) -> ResetReport {
        let mut report = ResetReport::default();

        let enable = self.enable_all_applications().await;
        report.apps_enabled = enable.0;
        report.host_failures += enable.1;

        debug!(remembered = memory.len(), "Restoring user-granted permissions");
        for grant in memory.drain() {
            match self.host.grant(&grant.permission, &grant.app_id).await {
                Ok(()) => {
                    debug!(permission = %grant.permission, app_id = %grant.app_id, "Restored user grant");
                    report.grants_restored += 1;
                }
                Err(e) => {
                    warn!(
                        permission = %grant.permission,
                        app_id = %grant.app_id,
                        error = %e,
                        "Failed to restore user grant"
                    );
                    report.host_failures += 1;
                }
            }
        }

        report
    }

    /// Apply `restrictions` in order, recording user grants into `memory` before revoking them.
    pub async fn apply(&self, restrictions: &[RestrictionEntry], memory: &mut GrantMemory) -> ApplyReport {
        let mut report = ApplyReport::default();

        for entry in restrictions {
            match &entry.restriction {
                Restriction::DisableApp { app_id } => {
                    self.disable_application(app_id, &mut report).await;
                }
                Restriction::RestrictPermissionGlobally { permission } => {
                    let apps = match self.host.list_installed_apps().await {
                        Ok(apps) => apps,
                        Err(e) => {
                            warn!(permission = %permission, error = %e, "Cannot list installed applications");
                            report.host_failures += 1;
                            continue;
                        }
                    };
                    for app_id in &apps {
                        self.revoke_permission(permission, app_id, memory, &mut report).await;
                    }
                }
                Restriction::RestrictPermissionForApp { permission, app_id } => {
                    self.revoke_permission(permission, app_id, memory, &mut report).await;
                }
            }
        }

        info!(
            restrictions = restrictions.len(),
            apps_disabled = report.apps_disabled,
            permissions_revoked = report.permissions_revoked,
            user_grants_recorded = report.user_grants_recorded,
            "Applied restrictions"
        );
        report
    }

    /// Disable every third-party application. Used on fail-secure entry.
    pub async fn disable_all_applications(&self) -> usize {
        let apps = match self.host.list_installed_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "Cannot list installed applications");
                return 0;
            }
        };

        let mut disabled = 0;
        for app_id in &apps {
            match self.host.disable_app(app_id).await {
                Ok(()) => disabled += 1,
                Err(e) => warn!(app_id = %app_id, error = %e, "Failed to disable application"),
            }
        }
        disabled
    }

    /// Enable every third-party application. Returns `(enabled, failures)`.
    pub async fn enable_all_applications(&self) -> (usize, usize) {
        let apps = match self.host.list_installed_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "Cannot list installed applications");
                return (0, 1);
            }
        };

        let mut enabled = 0;
        let mut failures = 0;
        for app_id in &apps {
            match self.host.enable_app(app_id).await {
                Ok(()) => enabled += 1,
                Err(e) => {
                    warn!(app_id = %app_id, error = %e, "Failed to enable application");
                    failures += 1;
                }
            }
        }
        (enabled, failures)
    }

    async fn disable_application(&self, app_id: &str, report: &mut ApplyReport) {
        match self.host.is_app_installed(app_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(app_id = %app_id, "Application is not installed, nothing to disable");
                return;
            }
            Err(e) => {
                // unknown install state: attempt the disable anyway
                warn!(app_id = %app_id, error = %e, "Cannot query install state");
                report.host_failures += 1;
            }
        }

        match self.host.disable_app(app_id).await {
            Ok(()) => {
                debug!(app_id = %app_id, "Disabled application");
                report.apps_disabled += 1;
            }
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Failed to disable application");
                report.host_failures += 1;
            }
        }
    }

    async fn revoke_permission(
        &self,
        permission: &str,
        app_id: &str,
        memory: &mut GrantMemory,
        report: &mut ApplyReport,
    ) {
        match self.host.is_granted(permission, app_id).await {
            Ok(true) => {
                if memory.record(permission, app_id) {
                    report.user_grants_recorded += 1;
                }
                debug!(permission = %permission, app_id = %app_id, "Recorded user grant before revoking");
            }
            Ok(false) => {
                return;
            }
            Err(e) => {
                // grant state unknown: revoke without remembering, never re-grant blindly
                warn!(permission = %permission, app_id = %app_id, error = %e, "Cannot query grant state");
                report.host_failures += 1;
            }
        }

        match self.host.revoke(permission, app_id).await {
            Ok(()) => report.permissions_revoked += 1,
            Err(e) => {
                warn!(permission = %permission, app_id = %app_id, error = %e, "Failed to revoke permission");
                report.host_failures += 1;
            }
        }
    }
}
