// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # In-Memory Capability Simulation
//!
//! Host, position, connectivity and feed capabilities backed by process
//! memory. Used by `spacegate run` for dry runs against a real policy server
//! and by the test suites to observe exactly which host calls the engine made.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::capabilities::{
    CapabilityError, Connectivity, FeedError, HostCapability, HostError, PolicyFeed, PositionSource,
};
use crate::domain::engine_config::SimulationConfig;
use crate::domain::geometry::Coordinate;

#[derive(Debug, Clone, Default)]
struct SimulatedApp {
    enabled: bool,
    granted: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct HostState {
    apps: BTreeMap<String, SimulatedApp>,
    revoke_calls: HashMap<(String, String), usize>,
    failing_revokes: BTreeSet<(String, String)>,
}

/// Package-manager stand-in holding third-party apps and their granted permissions.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        config.installed_apps.iter().fold(Self::new(), |host, app| {
            let granted: Vec<&str> = app.granted.iter().map(String::as_str).collect();
            host.with_app(&app.app_id, &granted)
        })
    }

    /// Install an enabled app with the given user grants.
    pub fn with_app(self, app_id: &str, granted: &[&str]) -> Self {
        self.state.lock().apps.insert(
            app_id.to_string(),
            SimulatedApp {
                enabled: true,
                granted: granted.iter().map(|p| p.to_string()).collect(),
            },
        );
        self
    }

    /// Make every `revoke(permission, app_id)` call fail.
    pub fn failing_revoke(self, permission: &str, app_id: &str) -> Self {
        self.state
            .lock()
            .failing_revokes
            .insert((permission.to_string(), app_id.to_string()));
        self
    }

    pub fn granted(&self, permission: &str, app_id: &str) -> bool {
        self.state
            .lock()
            .apps
            .get(app_id)
            .map(|app| app.granted.contains(permission))
            .unwrap_or(false)
    }

    pub fn is_enabled(&self, app_id: &str) -> bool {
        self.state.lock().apps.get(app_id).map(|app| app.enabled).unwrap_or(false)
    }

    pub fn revoke_calls(&self, permission: &str, app_id: &str) -> usize {
        self.state
            .lock()
            .revoke_calls
            .get(&(permission.to_string(), app_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Simulate the user revoking a permission from the system settings.
    pub fn user_revoke(&self, permission: &str, app_id: &str) {
        if let Some(app) = self.state.lock().apps.get_mut(app_id) {
            app.granted.remove(permission);
        }
    }
}

#[async_trait]
impl HostCapability for InMemoryHost {
    async fn is_granted(&self, permission: &str, app_id: &str) -> Result<bool, HostError> {
        Ok(self.granted(permission, app_id))
    }

    async fn revoke(&self, permission: &str, app_id: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let key = (permission.to_string(), app_id.to_string());
        *state.revoke_calls.entry(key.clone()).or_insert(0) += 1;
        if state.failing_revokes.contains(&key) {
            return Err(HostError::CallFailed(format!(
                "revoke {} from {} rejected",
                permission, app_id
            )));
        }
        match state.apps.get_mut(app_id) {
            Some(app) => {
                app.granted.remove(permission);
                debug!(permission, app_id, "simulated revoke");
                Ok(())
            }
            None => Err(HostError::AppNotInstalled(app_id.to_string())),
        }
    }

    async fn grant(&self, permission: &str, app_id: &str) -> Result<(), HostError> {
        match self.state.lock().apps.get_mut(app_id) {
            Some(app) => {
                app.granted.insert(permission.to_string());
                debug!(permission, app_id, "simulated grant");
                Ok(())
            }
            None => Err(HostError::AppNotInstalled(app_id.to_string())),
        }
    }

    async fn disable_app(&self, app_id: &str) -> Result<(), HostError> {
        match self.state.lock().apps.get_mut(app_id) {
            Some(app) => {
                app.enabled = false;
                Ok(())
            }
            None => Err(HostError::AppNotInstalled(app_id.to_string())),
        }
    }

    async fn enable_app(&self, app_id: &str) -> Result<(), HostError> {
        match self.state.lock().apps.get_mut(app_id) {
            Some(app) => {
                app.enabled = true;
                Ok(())
            }
            None => Err(HostError::AppNotInstalled(app_id.to_string())),
        }
    }

    async fn list_installed_apps(&self) -> Result<BTreeSet<String>, HostError> {
        Ok(self.state.lock().apps.keys().cloned().collect())
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool, HostError> {
        Ok(self.state.lock().apps.contains_key(app_id))
    }
}

#[derive(Debug, Default)]
struct PositionState {
    enabled: bool,
    position: Option<Coordinate>,
    force_enable_calls: usize,
}

/// Position source reporting a settable fix.
#[derive(Debug, Clone)]
pub struct SimulatedPositionSource {
    state: Arc<Mutex<PositionState>>,
}

impl Default for SimulatedPositionSource {
    fn default() -> Self {
        Self::new(true, None)
    }
}

impl SimulatedPositionSource {
    pub fn new(enabled: bool, position: Option<Coordinate>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PositionState {
                enabled,
                position,
                force_enable_calls: 0,
            })),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn set_position(&self, position: Coordinate) {
        self.state.lock().position = Some(position);
    }

    pub fn force_enable_calls(&self) -> usize {
        self.state.lock().force_enable_calls
    }
}

#[async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn is_enabled(&self) -> Result<bool, CapabilityError> {
        Ok(self.state.lock().enabled)
    }

    async fn force_enable(&self) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        state.enabled = true;
        state.force_enable_calls += 1;
        info!("Simulated location service force-enabled");
        Ok(())
    }

    fn subscribe(&self, interval: Duration) -> mpsc::Receiver<Coordinate> {
        let (tx, rx) = mpsc::channel(16);
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                let fix = {
                    let state = state.lock();
                    if state.enabled { state.position } else { None }
                };
                if let Some(position) = fix {
                    if tx.send(position).await.is_err() {
                        break;
                    }
                } else if tx.is_closed() {
                    break;
                }
            }
        });
        rx
    }
}

#[derive(Debug, Default)]
struct ConnectivityState {
    network_available: bool,
    wifi_force_enables: usize,
    mobile_data_force_enables: usize,
}

/// Connectivity whose availability is toggled by the caller.
#[derive(Debug, Clone)]
pub struct SimulatedConnectivity {
    state: Arc<Mutex<ConnectivityState>>,
}

impl SimulatedConnectivity {
    pub fn new(network_available: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectivityState {
                network_available,
                ..Default::default()
            })),
        }
    }

    pub fn set_network_available(&self, available: bool) {
        self.state.lock().network_available = available;
    }

    /// `(wifi, mobile data)` force-enable call counts.
    pub fn force_enable_calls(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.wifi_force_enables, state.mobile_data_force_enables)
    }
}

#[async_trait]
impl Connectivity for SimulatedConnectivity {
    async fn is_network_available(&self) -> Result<bool, CapabilityError> {
        Ok(self.state.lock().network_available)
    }

    async fn force_enable_wifi(&self) -> Result<(), CapabilityError> {
        self.state.lock().wifi_force_enables += 1;
        Ok(())
    }

    async fn force_enable_mobile_data(&self) -> Result<(), CapabilityError> {
        self.state.lock().mobile_data_force_enables += 1;
        Ok(())
    }
}

/// Feed answering from a queue of scripted responses; an empty queue is a transport failure.
#[derive(Debug, Default)]
pub struct ScriptedPolicyFeed {
    responses: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    requested_since: Mutex<Vec<i64>>,
}

impl ScriptedPolicyFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_blob(&self, blob: Vec<u8>) {
        self.responses.lock().push_back(Ok(blob));
    }

    pub fn push_failure(&self, reason: &str) {
        self.responses.lock().push_back(Err(reason.to_string()));
    }

    /// `since` values of every fetch so far.
    pub fn requested_since(&self) -> Vec<i64> {
        self.requested_since.lock().clone()
    }
}

#[async_trait]
impl PolicyFeed for ScriptedPolicyFeed {
    async fn fetch(&self, since: i64) -> Result<Vec<u8>, FeedError> {
        self.requested_since.lock().push(since);
        match self.responses.lock().pop_front() {
            Some(Ok(blob)) => Ok(blob),
            Some(Err(reason)) => Err(FeedError::Transport(reason)),
            None => Err(FeedError::Transport("no scripted response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine_config::SimulatedApp as SimulatedAppConfig;

    #[tokio::test]
    async fn test_host_from_config() {
        let host = InMemoryHost::from_config(&SimulationConfig {
            installed_apps: vec![SimulatedAppConfig {
                app_id: "com.example.maps".to_string(),
                granted: vec!["LOCATION".to_string()],
            }],
            location_enabled: true,
            network_available: true,
            position: None,
        });

        assert!(host.is_app_installed("com.example.maps").await.unwrap());
        assert!(host.is_granted("LOCATION", "com.example.maps").await.unwrap());
        assert!(!host.is_granted("CAMERA", "com.example.maps").await.unwrap());
    }

    #[tokio::test]
    async fn test_position_subscription_delivers_fix() {
        let source = SimulatedPositionSource::new(true, Some(Coordinate::flat(1.0, 2.0)));
        let mut rx = source.subscribe(Duration::from_millis(10));
        let fix = rx.recv().await.unwrap();
        assert_eq!(fix, Coordinate::flat(1.0, 2.0));
    }

    #[tokio::test]
    async fn test_scripted_feed_records_since() {
        let feed = ScriptedPolicyFeed::new();
        feed.push_blob(b"{}".to_vec());

        assert!(feed.fetch(0).await.is_ok());
        assert!(matches!(feed.fetch(42).await, Err(FeedError::Transport(_))));
        assert_eq!(feed.requested_since(), vec![0, 42]);
    }
}
