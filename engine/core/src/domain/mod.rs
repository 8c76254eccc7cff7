// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Geometry, policy graph, enforcement bookkeeping and the
//!   capability ports the application layer drives

pub mod capabilities;
pub mod engine_config;
pub mod events;
pub mod fail_secure;
pub mod geometry;
pub mod grant_memory;
pub mod policy_graph;
pub mod sync_state;
