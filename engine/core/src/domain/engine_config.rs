// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema for a spacegate enforcement engine:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Policy feed endpoint and update verification key
// - Cadence of the sync, access-control and position activities
// - Fail-secure recency threshold and external call timeouts
// - Simulated host inventory for the CLI's dry-run mode

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::geometry::Coordinate;

pub const API_VERSION: &str = "spacegate.dev/v1";
pub const KIND: &str = "EngineConfig";
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["Ed25519", "SHA256withRSA", "SHA512withRSA"];

/// Upper bound on `spec.recency_threshold_seconds` (one year).
pub const MAX_RECENCY_THRESHOLD_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "spacegate.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: EngineConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable engine name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Local policy data older than this counts as stale when offline
    #[serde(default = "default_recency_threshold")]
    pub recency_threshold_seconds: u64,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Prefix stripped from permission names on the query surface
    #[serde(default = "default_permission_prefix")]
    pub permission_prefix: String,

    /// Simulated host used by `spacegate run`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the policy server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the delta endpoint; the `since` timestamp is appended as a segment
    #[serde(default = "default_updates_path")]
    pub updates_path: String,

    /// Key used to verify update signatures. Base64 raw key for Ed25519,
    /// SPKI PEM for the RSA algorithms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Signature scheme updates must carry: Ed25519, SHA256withRSA or SHA512withRSA
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Optional operator position-override endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_position_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_sync_seconds")]
    pub sync_seconds: u64,

    #[serde(default = "default_access_control_seconds")]
    pub access_control_seconds: u64,

    /// Requested interval between position fixes
    #[serde(default = "default_position_update_seconds")]
    pub position_update_seconds: u64,

    #[serde(default = "default_debug_position_seconds")]
    pub debug_position_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_fetch_timeout")]
    pub fetch_seconds: u64,

    /// Bound on location/connectivity status queries
    #[serde(default = "default_capability_timeout")]
    pub capability_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum delegation hops followed before resolution fails closed
    #[serde(default = "default_max_delegation_hops")]
    pub max_delegation_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub installed_apps: Vec<SimulatedApp>,

    #[serde(default = "default_true")]
    pub location_enabled: bool,

    #[serde(default = "default_true")]
    pub network_available: bool,

    /// Fixed position reported by the simulated position source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedApp {
    pub app_id: String,

    /// Permissions the user has granted to this app
    #[serde(default)]
    pub granted: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_recency_threshold() -> u64 {
    60
}

fn default_permission_prefix() -> String {
    "android.permission.".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_algorithm() -> String {
    "Ed25519".to_string()
}

fn default_updates_path() -> String {
    "/getDatabaseUpdates".to_string()
}

fn default_sync_seconds() -> u64 {
    20
}

fn default_access_control_seconds() -> u64 {
    10
}

fn default_position_update_seconds() -> u64 {
    1
}

fn default_debug_position_seconds() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_capability_timeout() -> u64 {
    5
}

fn default_max_delegation_hops() -> usize {
    16
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            updates_path: default_updates_path(),
            public_key: None,
            algorithm: default_algorithm(),
            debug_position_url: None,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            sync_seconds: default_sync_seconds(),
            access_control_seconds: default_access_control_seconds(),
            position_update_seconds: default_position_update_seconds(),
            debug_position_seconds: default_debug_position_seconds(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_seconds: default_fetch_timeout(),
            capability_seconds: default_capability_timeout(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_delegation_hops: default_max_delegation_hops(),
        }
    }
}

impl ResolverConfig {
    /// A zero hop limit would fail every delegation closed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_delegation_hops == 0 {
            anyhow::bail!("spec.resolver.max_delegation_hops must be at least 1");
        }
        Ok(())
    }
}

impl Default for EngineConfigSpec {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            intervals: IntervalConfig::default(),
            recency_threshold_seconds: default_recency_threshold(),
            timeouts: TimeoutConfig::default(),
            resolver: ResolverConfig::default(),
            permission_prefix: default_permission_prefix(),
            simulation: None,
        }
    }
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "spacegate".to_string(),
                version: None,
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl IntervalConfig {
    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_seconds)
    }

    pub fn access_control(&self) -> Duration {
        Duration::from_secs(self.access_control_seconds)
    }

    pub fn position_update(&self) -> Duration {
        Duration::from_secs(self.position_update_seconds)
    }

    pub fn debug_position(&self) -> Duration {
        Duration::from_secs(self.debug_position_seconds)
    }
}

impl TimeoutConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_seconds)
    }

    pub fn capability(&self) -> Duration {
        Duration::from_secs(self.capability_seconds)
    }
}

impl EngineConfigSpec {
    /// Saturates at [`chrono::Duration::MAX`] for values past its range.
    pub fn recency_threshold(&self) -> chrono::Duration {
        i64::try_from(self.recency_threshold_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl EngineConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover a configuration file in the standard locations.
    ///
    /// Order: `SPACEGATE_CONFIG_PATH`, `./spacegate.yaml`,
    /// `~/.spacegate/config.yaml`, `/etc/spacegate/config.yaml`.
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SPACEGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("./spacegate.yaml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".spacegate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/spacegate/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SPACEGATE_FEED_URL") {
            tracing::info!("Environment override: SPACEGATE_FEED_URL={}", url);
            self.spec.feed.base_url = url;
        }

        if let Ok(val) = std::env::var("SPACEGATE_RECENCY_THRESHOLD_SECONDS") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: SPACEGATE_RECENCY_THRESHOLD_SECONDS={}", seconds);
                    self.spec.recency_threshold_seconds = seconds;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SPACEGATE_RECENCY_THRESHOLD_SECONDS: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let intervals = &self.spec.intervals;
        if intervals.sync_seconds == 0 || intervals.access_control_seconds == 0 {
            anyhow::bail!("spec.intervals: sync and access-control intervals must be non-zero");
        }
        if intervals.position_update_seconds == 0 || intervals.debug_position_seconds == 0 {
            anyhow::bail!("spec.intervals: position intervals must be non-zero");
        }

        if self.spec.recency_threshold_seconds > MAX_RECENCY_THRESHOLD_SECONDS {
            anyhow::bail!(
                "spec.recency_threshold_seconds must be at most {} (got {})",
                MAX_RECENCY_THRESHOLD_SECONDS,
                self.spec.recency_threshold_seconds
            );
        }

        self.spec.resolver.validate()?;

        if self.spec.feed.base_url.is_empty() {
            anyhow::bail!("spec.feed.base_url cannot be empty");
        }

        match &self.spec.feed.public_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => anyhow::bail!("spec.feed.public_key is required to verify policy updates"),
        }

        if !SUPPORTED_ALGORITHMS.contains(&self.spec.feed.algorithm.as_str()) {
            anyhow::bail!(
                "Unsupported spec.feed.algorithm: '{}'. Must be one of {:?}",
                self.spec.feed.algorithm,
                SUPPORTED_ALGORITHMS
            );
        }

        if let Some(simulation) = &self.spec.simulation {
            for app in &simulation.installed_apps {
                if app.app_id.is_empty() {
                    anyhow::bail!("spec.simulation.installed_apps: app_id cannot be empty");
                }
            }
        }

        Ok(())
    }
}
