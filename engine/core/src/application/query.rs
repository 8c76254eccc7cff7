// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Restriction query surface consumed by the host's permission-granting path.

use crate::application::enforcement_loop::SharedEngineState;
use crate::domain::fail_secure::FailSecureState;
use crate::domain::geometry::Coordinate;

#[derive(Clone)]
pub struct RestrictionQuery {
    state: SharedEngineState,
    permission_prefix: String,
}

impl RestrictionQuery {
    pub fn new(state: SharedEngineState, permission_prefix: impl Into<String>) -> Self {
        Self {
            state,
            permission_prefix: permission_prefix.into(),
        }
    }

    /// Active restrictions as `enforcer-permission-appId`, in application order.
    pub fn list_active_restrictions(&self) -> Vec<String> {
        self.state
            .lock()
            .active_restrictions
            .as_ref()
            .map(|entries| entries.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    /// Whether granting `permission` to `app_id` would contradict an active
    /// restriction. The host permission prefix is optional on `permission`.
    /// Always `false` before the first access-control cycle.
    pub fn is_restricted(&self, permission: &str, app_id: &str) -> bool {
        let permission = if self.permission_prefix.is_empty() {
            permission
        } else {
            permission
                .strip_prefix(self.permission_prefix.as_str())
                .unwrap_or(permission)
        };

        let state = self.state.lock();
        match &state.active_restrictions {
            Some(entries) => entries.iter().any(|e| e.restriction.blocks(permission, app_id)),
            None => false,
        }
    }

    pub fn fail_secure_state(&self) -> FailSecureState {
        self.state.lock().fail_secure
    }

    pub fn current_position(&self) -> Option<Coordinate> {
        self.state.lock().position
    }
}
