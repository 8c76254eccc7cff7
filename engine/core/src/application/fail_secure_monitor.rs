// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fail-Secure Monitor
//!
//! Samples the location and connectivity capabilities at the start of each
//! sync cycle. Together with that cycle's fetch outcome and the recency of the
//! local data, the sample decides the next [`FailSecureState`]; the monitor
//! also performs the entry side effects.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Drive NORMAL ⇄ FAIL_SECURE transitions
//! - **Integration:** PositionSource + Connectivity + fetch outcome → decision → RestrictionEnforcer

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::enforcer::RestrictionEnforcer;
use crate::domain::capabilities::{CapabilityError, Connectivity, PositionSource};
use crate::domain::fail_secure::{FailSecureInputs, FailSecureReason, FailSecureState, FailSecureTransition};

/// Location and connectivity as sampled at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub location_enabled: bool,
    pub network_available: bool,
}

impl CapabilityStatus {
    /// A policy fetch is only attempted with both capabilities up.
    pub fn can_sync(&self) -> bool {
        self.location_enabled && self.network_available
    }

    pub fn with_sync_outcome(self, feed_available: bool, data_recent: bool) -> FailSecureInputs {
        FailSecureInputs {
            location_enabled: self.location_enabled,
            network_available: self.network_available,
            feed_available,
            data_recent,
        }
    }
}

/// Side effects performed on fail-secure entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockdownReport {
    pub apps_disabled: usize,
    pub location_forced: bool,
    pub wifi_forced: bool,
    pub mobile_data_forced: bool,
}

pub struct FailSecureMonitor {
    position: Arc<dyn PositionSource>,
    connectivity: Arc<dyn Connectivity>,
    enforcer: Arc<RestrictionEnforcer>,
    capability_timeout: Duration,
}

impl FailSecureMonitor {
    pub fn new(
        position: Arc<dyn PositionSource>,
        connectivity: Arc<dyn Connectivity>,
        enforcer: Arc<RestrictionEnforcer>,
        capability_timeout: Duration,
    ) -> Self {
        Self {
            position,
            connectivity,
            enforcer,
            capability_timeout,
        }
    }

    async fn bounded<F>(&self, capability: &'static str, call: F) -> bool
    where
        F: Future<Output = Result<bool, CapabilityError>>,
    {
        match tokio::time::timeout(self.capability_timeout, call).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(capability, error = %e, "Capability query failed, treating as unavailable");
                false
            }
            Err(_) => {
                warn!(
                    capability,
                    error = %CapabilityError::Timeout(self.capability_timeout),
                    "Capability query timed out, treating as unavailable"
                );
                false
            }
        }
    }

    pub async fn sample(&self) -> CapabilityStatus {
        let location_enabled = self.bounded("location", self.position.is_enabled()).await;
        let network_available = self
            .bounded("connectivity", self.connectivity.is_network_available())
            .await;

        CapabilityStatus {
            location_enabled,
            network_available,
        }
    }

    /// Decide the edge taken from `current`.
    pub fn evaluate(&self, current: FailSecureState, inputs: &FailSecureInputs) -> FailSecureTransition {
        let transition = FailSecureTransition::between(current, inputs);

        match transition {
            FailSecureTransition::Entered(reason) => {
                warn!(?reason, ?inputs, "Entering fail-secure mode");
            }
            FailSecureTransition::Remained(reason) => {
                info!(?reason, "Fail-secure conditions still hold");
            }
            FailSecureTransition::Exited => {
                info!("Fail-secure conditions cleared, resuming normal operation");
            }
            FailSecureTransition::Steady => {}
        }
        transition
    }

    /// Disable every third-party application and try to bring location and
    /// data connectivity back.
    pub async fn lockdown(&self, reason: FailSecureReason) -> LockdownReport {
        let apps_disabled = self.enforcer.disable_all_applications().await;

        let location_forced = self.force("location", self.position.force_enable()).await;
        let wifi_forced = self.force("wifi", self.connectivity.force_enable_wifi()).await;
        let mobile_data_forced = self
            .force("mobile_data", self.connectivity.force_enable_mobile_data())
            .await;

        let report = LockdownReport {
            apps_disabled,
            location_forced,
            wifi_forced,
            mobile_data_forced,
        };
        info!(?reason, ?report, "Fail-secure lockdown applied");
        report
    }

    async fn force<F>(&self, capability: &'static str, call: F) -> bool
    where
        F: Future<Output = Result<(), CapabilityError>>,
    {
        match tokio::time::timeout(self.capability_timeout, call).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(capability, error = %e, "Force-enable failed");
                false
            }
            Err(_) => {
                warn!(capability, "Force-enable timed out");
                false
            }
        }
    }
}
