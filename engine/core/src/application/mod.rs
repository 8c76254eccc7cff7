// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Resolution, enforcement, fail-secure control, policy sync
//!   and the enforcement loop that ties them together

pub mod enforcement_loop;
pub mod enforcer;
pub mod fail_secure_monitor;
pub mod policy_sync;
pub mod query;
pub mod resolver;
pub mod sync_reconciler;

pub use enforcement_loop::{EngineCapabilities, EnforcementLoop, EnforcementLoopConfig, EngineState};
pub use query::RestrictionQuery;
pub use resolver::{PolicyResolver, Resolution, ResolutionError};
