// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure adapters
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** HTTP transports, update decoding and verification, the
//!   in-memory host simulation and the event bus

pub mod debug_position;
pub mod event_bus;
pub mod feed_codec;
pub mod http_feed;
pub mod signature;
pub mod simulation;
