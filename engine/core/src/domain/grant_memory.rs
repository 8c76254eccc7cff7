// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A permission the device owner had granted to an app before a restriction revoked it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserGrantedPermission {
    pub permission: String,
    pub app_id: String,
}

/// Set of user grants revoked during the current enforcement cycle.
///
/// Populated by `apply`, drained by `reset`. Must be empty again before the
/// next cycle's `apply`, otherwise a later restore could re-grant something the
/// user revoked on their own in the meantime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantMemory {
    grants: BTreeSet<UserGrantedPermission>,
}

impl GrantMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the pair was already remembered.
    pub fn record(&mut self, permission: &str, app_id: &str) -> bool {
        self.grants.insert(UserGrantedPermission {
            permission: permission.to_string(),
            app_id: app_id.to_string(),
        })
    }

    pub fn contains(&self, permission: &str, app_id: &str) -> bool {
        self.grants.iter().any(|g| g.permission == permission && g.app_id == app_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserGrantedPermission> {
        self.grants.iter()
    }

    /// Empties the memory, handing back everything it held.
    pub fn drain(&mut self) -> Vec<UserGrantedPermission> {
        std::mem::take(&mut self.grants).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
