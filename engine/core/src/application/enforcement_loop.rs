// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Enforcement Loop - owner task for all engine state
//!
//! Multiplexes the periodic activities and the position stream into one
//! serialized state-mutation path:
//!
//! ```text
//!  sync tick ──────────┐
//!  access-control tick ┤
//!  debug-position tick ┼──► select! ──► EngineState (single Mutex)
//!  position channel ───┤
//!  shutdown token ─────┘
//! ```
//!
//! The state lock is never held across an await: capability calls, the feed
//! fetch and the reset/apply pair run outside it, and only the merge of their
//! results happens under it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrate sync, fail-secure, resolution and enforcement

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::enforcer::RestrictionEnforcer;
use crate::application::fail_secure_monitor::FailSecureMonitor;
use crate::application::policy_sync::PolicySyncService;
use crate::application::query::RestrictionQuery;
use crate::application::resolver::{PolicyResolver, Resolution};
use crate::application::sync_reconciler::reconcile;
use crate::domain::capabilities::{
    Connectivity, DebugPositionFeed, HostCapability, PolicyFeed, PositionSource, SignatureVerifier,
};
use crate::domain::engine_config::EngineConfigSpec;
use crate::domain::events::{CycleId, EnforcementEvent};
use crate::domain::fail_secure::{FailSecureState, FailSecureTransition};
use crate::domain::geometry::Coordinate;
use crate::domain::grant_memory::GrantMemory;
use crate::domain::policy_graph::{PolicyGraph, RestrictionEntry};
use crate::domain::sync_state::SyncState;
use crate::infrastructure::event_bus::EventBus;

/// Everything the engine mutates, guarded by one lock.
#[derive(Debug, Default)]
pub struct EngineState {
    pub graph: PolicyGraph,
    pub sync_state: SyncState,
    pub grant_memory: GrantMemory,
    pub position: Option<Coordinate>,
    /// An operator override position is active; real fixes are ignored.
    pub debug_override_active: bool,
    pub fail_secure: FailSecureState,
    /// `None` until the first access-control cycle completes.
    pub active_restrictions: Option<Vec<RestrictionEntry>>,
}

impl EngineState {
    /// Policy data is usable once at least one update was reconciled.
    pub fn has_policy_data(&self) -> bool {
        self.sync_state.last_fetch.is_some()
    }
}

pub type SharedEngineState = Arc<Mutex<EngineState>>;

#[derive(Debug, Clone)]
pub struct EnforcementLoopConfig {
    pub sync_interval: Duration,
    pub access_control_interval: Duration,
    pub position_update_interval: Duration,
    pub debug_position_interval: Duration,
    pub recency_threshold: chrono::Duration,
    pub fetch_timeout: Duration,
    pub capability_timeout: Duration,
    pub max_delegation_hops: usize,
    /// Signature scheme updates must use
    pub algorithm: String,
    pub public_key: Option<String>,
    pub permission_prefix: String,
}

impl Default for EnforcementLoopConfig {
    fn default() -> Self {
        Self::from_spec(&EngineConfigSpec::default())
    }
}

impl EnforcementLoopConfig {
    pub fn from_spec(spec: &EngineConfigSpec) -> Self {
        Self {
            sync_interval: spec.intervals.sync(),
            access_control_interval: spec.intervals.access_control(),
            position_update_interval: spec.intervals.position_update(),
            debug_position_interval: spec.intervals.debug_position(),
            recency_threshold: spec.recency_threshold(),
            fetch_timeout: spec.timeouts.fetch(),
            capability_timeout: spec.timeouts.capability(),
            max_delegation_hops: spec.resolver.max_delegation_hops,
            algorithm: spec.feed.algorithm.clone(),
            public_key: spec.feed.public_key.clone(),
            permission_prefix: spec.permission_prefix.clone(),
        }
    }
}

/// External capabilities the engine drives.
#[derive(Clone)]
pub struct EngineCapabilities {
    pub host: Arc<dyn HostCapability>,
    pub position: Arc<dyn PositionSource>,
    pub connectivity: Arc<dyn Connectivity>,
    pub feed: Arc<dyn PolicyFeed>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub debug_feed: Option<Arc<dyn DebugPositionFeed>>,
}

pub struct EnforcementLoop {
    config: EnforcementLoopConfig,
    state: SharedEngineState,
    resolver: PolicyResolver,
    enforcer: Arc<RestrictionEnforcer>,
    monitor: FailSecureMonitor,
    sync: PolicySyncService,
    position: Arc<dyn PositionSource>,
    debug_feed: Option<Arc<dyn DebugPositionFeed>>,
    event_bus: EventBus,
    shutdown_token: CancellationToken,
}

impl EnforcementLoop {
    pub fn new(config: EnforcementLoopConfig, capabilities: EngineCapabilities, event_bus: EventBus) -> Self {
        let enforcer = Arc::new(RestrictionEnforcer::new(capabilities.host));
        let monitor = FailSecureMonitor::new(
            capabilities.position.clone(),
            capabilities.connectivity,
            enforcer.clone(),
            config.capability_timeout,
        );
        let sync = PolicySyncService::new(
            capabilities.feed,
            capabilities.verifier,
            config.algorithm.clone(),
            config.public_key.clone(),
            config.fetch_timeout,
        );
        Self {
            resolver: PolicyResolver::new(config.max_delegation_hops),
            state: Arc::new(Mutex::new(EngineState::default())),
            enforcer,
            monitor,
            sync,
            position: capabilities.position,
            debug_feed: capabilities.debug_feed,
            event_bus,
            shutdown_token: CancellationToken::new(),
            config,
        }
    }

    /// Read-only query handle sharing this engine's state
    pub fn query(&self) -> RestrictionQuery {
        RestrictionQuery::new(self.state.clone(), self.config.permission_prefix.clone())
    }

    pub fn state(&self) -> SharedEngineState {
        self.state.clone()
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(&self) {
        info!(
            sync_seconds = self.config.sync_interval.as_secs(),
            access_control_seconds = self.config.access_control_interval.as_secs(),
            debug_feed = self.debug_feed.is_some(),
            "Starting enforcement loop"
        );

        let mut sync_tick = ticker(self.config.sync_interval);
        let mut access_tick = ticker(self.config.access_control_interval);
        let mut debug_tick = self.debug_feed.as_ref().map(|_| ticker(self.config.debug_position_interval));
        let mut positions: Option<mpsc::Receiver<Coordinate>> = None;

        loop {
            tokio::select! {
                _ = sync_tick.tick() => {
                    let state = self.run_sync_cycle().await;
                    if state == FailSecureState::Normal && positions.is_none() {
                        info!(
                            interval_ms = self.config.position_update_interval.as_millis() as u64,
                            "Subscribing to position updates"
                        );
                        positions = Some(self.position.subscribe(self.config.position_update_interval));
                    }
                }
                _ = access_tick.tick() => {
                    self.run_access_control_cycle().await;
                }
                _ = next_tick(&mut debug_tick) => {
                    self.poll_debug_position().await;
                }
                fix = next_position(&mut positions) => {
                    match fix {
                        Some(position) => self.on_position(position),
                        None => {
                            warn!("Position stream ended, resubscribing on next sync cycle");
                            positions = None;
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping enforcement loop");
                    break;
                }
            }
        }

        info!("Enforcement loop stopped");
    }

    /// Sample the capabilities, fetch+reconcile when location and network are
    /// up, then decide fail-secure from the sample, the fetch outcome and the
    /// recency of the local data. In NORMAL every application is re-enabled.
    /// Returns the state the engine is in afterwards.
    pub async fn run_sync_cycle(&self) -> FailSecureState {
        let cycle_id = CycleId::new();
        debug!(%cycle_id, "Running sync cycle");

        let status = self.monitor.sample().await;
        let feed_available = if status.can_sync() {
            self.sync_policy(cycle_id).await
        } else {
            debug!(%cycle_id, ?status, "Location or network unavailable, skipping policy fetch");
            false
        };

        let (current, data_recent) = {
            let state = self.state.lock();
            (
                state.fail_secure,
                state.sync_state.is_recent(self.config.recency_threshold, Utc::now()),
            )
        };

        let inputs = status.with_sync_outcome(feed_available, data_recent);
        let transition = self.monitor.evaluate(current, &inputs);
        self.state.lock().fail_secure = transition.target();

        match transition {
            FailSecureTransition::Entered(reason) => {
                self.event_bus.publish(EnforcementEvent::FailSecureEntered {
                    cycle_id,
                    reason,
                    entered_at: Utc::now(),
                });
                self.monitor.lockdown(reason).await;
                return FailSecureState::FailSecure;
            }
            FailSecureTransition::Remained(reason) => {
                self.monitor.lockdown(reason).await;
                return FailSecureState::FailSecure;
            }
            FailSecureTransition::Exited => {
                self.event_bus.publish(EnforcementEvent::FailSecureExited {
                    cycle_id,
                    exited_at: Utc::now(),
                });
            }
            FailSecureTransition::Steady => {}
        }

        let (enabled, failures) = self.enforcer.enable_all_applications().await;
        debug!(%cycle_id, enabled, failures, "Re-enabled applications");

        FailSecureState::Normal
    }

    /// Fetch, verify and reconcile one delta. `false` when the feed could not
    /// deliver a usable update.
    async fn sync_policy(&self, cycle_id: CycleId) -> bool {
        let since = self.state.lock().sync_state.highest_timestamp_seen;

        match self.sync.fetch_update(since).await {
            Ok(update) => {
                let authorities_updated = update.authorities.len();
                let summary = {
                    let mut guard = self.state.lock();
                    let state = &mut *guard;
                    reconcile(update, &mut state.graph, &mut state.sync_state, Utc::now())
                };
                info!(
                    %cycle_id,
                    authorities_updated,
                    added = summary.authorities_added,
                    highest_timestamp_seen = summary.highest_timestamp_seen,
                    "Policy data synchronized"
                );
                self.event_bus.publish(EnforcementEvent::PolicySynced {
                    cycle_id,
                    authorities_updated,
                    highest_timestamp_seen: summary.highest_timestamp_seen,
                    synced_at: Utc::now(),
                });
                true
            }
            Err(e) => {
                warn!(%cycle_id, since, error = %e, "Policy sync failed, keeping cached policy data");
                self.event_bus.publish(EnforcementEvent::SyncFailed {
                    cycle_id,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
                false
            }
        }
    }

    /// Resolve the current position and re-enforce. Skipped in fail-secure
    /// mode, and until both policy data and a position are known.
    pub async fn run_access_control_cycle(&self) {
        let cycle_id = CycleId::new();
        debug!(%cycle_id, "Running access-control cycle");

        let (resolution, mut memory, previous) = {
            let mut state = self.state.lock();
            if state.fail_secure.is_fail_secure() {
                debug!(%cycle_id, "Fail-secure mode active, skipping access control");
                return;
            }
            if !state.has_policy_data() {
                debug!(%cycle_id, "No policy data yet, skipping access control");
                return;
            }
            let Some(position) = state.position else {
                debug!(%cycle_id, "No position known yet, skipping access control");
                return;
            };

            let resolution = match self.resolver.resolve(&state.graph, &position) {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(%cycle_id, %position, error = %e, "Resolution failed, enforcing partial chain");
                    self.event_bus.publish(EnforcementEvent::ResolutionFailed {
                        cycle_id,
                        position,
                        reason: e.to_string(),
                        failed_at: Utc::now(),
                    });
                    e.into_fail_closed()
                }
            };

            (
                resolution,
                std::mem::take(&mut state.grant_memory),
                state.active_restrictions.clone(),
            )
        };

        let reset = self.enforcer.reset(&mut memory).await;
        let restrictions = match resolution {
            Resolution::NotControlled => Vec::new(),
            Resolution::Controlled(entries) => entries,
        };
        let applied = self.enforcer.apply(&restrictions, &mut memory).await;

        let changed = previous.as_ref() != Some(&restrictions);
        {
            let mut state = self.state.lock();
            state.grant_memory = memory;
            state.active_restrictions = Some(restrictions.clone());
        }

        if !changed {
            return;
        }
        if restrictions.is_empty() {
            info!(%cycle_id, restored = reset.grants_restored, "Left controlled space, restrictions cleared");
            self.event_bus.publish(EnforcementEvent::RestrictionsCleared {
                cycle_id,
                restored_user_grants: reset.grants_restored,
                cleared_at: Utc::now(),
            });
        } else {
            let rendered: Vec<String> = restrictions.iter().map(ToString::to_string).collect();
            info!(%cycle_id, restrictions = ?rendered, "Active restrictions changed");
            self.event_bus.publish(EnforcementEvent::RestrictionsApplied {
                cycle_id,
                restrictions: rendered,
                revoked_user_grants: applied.user_grants_recorded,
                applied_at: Utc::now(),
            });
        }
    }

    /// Real position fix from the position capability.
    pub fn on_position(&self, position: Coordinate) {
        {
            let mut state = self.state.lock();
            if state.debug_override_active {
                debug!(%position, "Debug position override active, ignoring position fix");
                return;
            }
            if state.position == Some(position) {
                return;
            }
            state.position = Some(position);
        }
        debug!(%position, "Position updated");
        self.event_bus.publish(EnforcementEvent::PositionUpdated {
            position,
            from_debug_feed: false,
            updated_at: Utc::now(),
        });
    }

    /// Poll the operator override. A failed poll clears the override.
    pub async fn poll_debug_position(&self) {
        let Some(feed) = &self.debug_feed else {
            return;
        };

        let polled = match feed.poll().await {
            Ok(polled) => polled,
            Err(e) => {
                warn!(error = %e, "Cannot obtain debug position override");
                None
            }
        };

        match polled {
            Some(position) => {
                {
                    let mut state = self.state.lock();
                    state.position = Some(position);
                    state.debug_override_active = true;
                }
                info!(%position, "Debug position override in effect");
                self.event_bus.publish(EnforcementEvent::PositionUpdated {
                    position,
                    from_debug_feed: true,
                    updated_at: Utc::now(),
                });
            }
            None => {
                let mut state = self.state.lock();
                if state.debug_override_active {
                    info!("Debug position override released");
                }
                state.debug_override_active = false;
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn next_position(positions: &mut Option<mpsc::Receiver<Coordinate>>) -> Option<Coordinate> {
    match positions {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
