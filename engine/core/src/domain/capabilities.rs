// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # External Capability Ports
//!
//! The engine never touches the host platform directly. Every side effect and
//! every external observation goes through one of these traits, implemented in
//! `crate::infrastructure` (HTTP feed, signature verifier, in-memory simulation)
//! or by the embedding host.
//!
//! | Port | Used by |
//! |------|---------|
//! | [`HostCapability`] | restriction enforcer, fail-secure entry |
//! | [`PositionSource`] | enforcement loop, fail-secure monitor |
//! | [`Connectivity`] | fail-secure monitor |
//! | [`PolicyFeed`] | policy sync service |
//! | [`SignatureVerifier`] | policy sync service |
//! | [`DebugPositionFeed`] | enforcement loop (position override) |
//!
//! Failures are values, not panics: callers log them and keep going.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::geometry::Coordinate;
use super::policy_graph::PolicyGraphError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("application '{0}' is not installed")]
    AppNotInstalled(String),

    #[error("host call failed: {0}")]
    CallFailed(String),
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed request timed out after {0:?}")]
    Timeout(Duration),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("malformed update: {0}")]
    Malformed(String),

    #[error("invalid policy data: {0}")]
    InvalidPolicy(#[from] PolicyGraphError),

    #[error("update signature rejected (algorithm: {algorithm})")]
    SignatureRejected { algorithm: String },

    #[error("no public key configured for update verification")]
    MissingPublicKey,
}

/// Grant/revoke/enable/disable primitives of the host platform.
///
/// `list_installed_apps` returns third-party applications only; system
/// applications are never touched by the engine.
#[async_trait]
pub trait HostCapability: Send + Sync {
    async fn is_granted(&self, permission: &str, app_id: &str) -> Result<bool, HostError>;
    async fn revoke(&self, permission: &str, app_id: &str) -> Result<(), HostError>;
    async fn grant(&self, permission: &str, app_id: &str) -> Result<(), HostError>;
    async fn disable_app(&self, app_id: &str) -> Result<(), HostError>;
    async fn enable_app(&self, app_id: &str) -> Result<(), HostError>;
    async fn list_installed_apps(&self) -> Result<BTreeSet<String>, HostError>;
    async fn is_app_installed(&self, app_id: &str) -> Result<bool, HostError>;
}

/// Device position-fix source.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn is_enabled(&self) -> Result<bool, CapabilityError>;

    /// Used only on fail-secure entry so the device can recover a fix.
    async fn force_enable(&self) -> Result<(), CapabilityError>;

    /// Start delivering fixes roughly every `interval`. The stream ends when
    /// the receiver is dropped.
    fn subscribe(&self, interval: Duration) -> mpsc::Receiver<Coordinate>;
}

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Any transport (wifi or mobile data) is up.
    async fn is_network_available(&self) -> Result<bool, CapabilityError>;
    async fn force_enable_wifi(&self) -> Result<(), CapabilityError>;
    async fn force_enable_mobile_data(&self) -> Result<(), CapabilityError>;
}

/// Source of signed, incremental policy updates.
#[async_trait]
pub trait PolicyFeed: Send + Sync {
    /// Raw update blob containing every authority changed after `since`.
    async fn fetch(&self, since: i64) -> Result<Vec<u8>, FeedError>;
}

/// Signature check over an already-canonicalized message.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8], algorithm: &str, public_key: &str) -> bool;
}

/// Operator-controlled position override used for field testing.
#[async_trait]
pub trait DebugPositionFeed: Send + Sync {
    /// `Ok(None)` when no override is active.
    async fn poll(&self) -> Result<Option<Coordinate>, FeedError>;
}
