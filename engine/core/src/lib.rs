// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! spacegate core
//!
//! Geofenced permission-policy resolution and enforcement engine.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Resolve the restrictions in force at the device position
//!   and enforce them reversibly on the host

pub mod domain;
pub mod application;
pub mod infrastructure;
