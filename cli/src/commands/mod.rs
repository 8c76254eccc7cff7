// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for spacegate CLI

pub mod config;
pub mod resolve;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::resolve::ResolveArgs;
pub use self::run::RunArgs;
