// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Graph Model
//!
//! The policy graph maps authority ids to [`Authority`] aggregates. Each
//! authority owns an ordered list of [`SpaceRecord`]s; each record couples a
//! polygonal [`Space`] with the restrictions the authority enforces there and
//! the sub-spaces it has delegated to other authorities.
//!
//! ```text
//! PolicyGraph
//!   └─ Authority "city"
//!        └─ SpaceRecord (space: downtown)
//!             ├─ RestrictionEntry  city / CAMERA / *
//!             └─ DelegationEntry   sub-space: campus  →  "university"
//! ```
//!
//! Delegation targets are plain authority ids and are looked up against the
//! graph at resolution time, so a delegate that arrives in a later sync is
//! picked up without re-fetching the delegator.
//!
//! Authorities are kept in a `BTreeMap`, which gives the resolver a stable
//! ascending-id scan order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::geometry::{Coordinate, Polygon};

/// Wildcard sentinel used by the policy feed for both restriction fields.
pub const WILDCARD: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyGraphError {
    #[error("restriction for enforcer '{enforcer_id}' wildcards both permission and app")]
    AmbiguousWildcard { enforcer_id: String },

    #[error("restriction for enforcer '{enforcer_id}' has an empty {field}")]
    EmptyField {
        enforcer_id: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub boundary: Polygon,
}

impl Space {
    pub fn new(id: impl Into<String>, boundary: Polygon) -> Self {
        Self {
            id: id.into(),
            boundary,
        }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.boundary.contains(point)
    }
}

/// A single enforcement directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Restriction {
    /// Disable the application entirely.
    DisableApp { app_id: String },
    /// Revoke the permission from every installed third-party application.
    RestrictPermissionGlobally { permission: String },
    /// Revoke the permission from one application.
    RestrictPermissionForApp { permission: String, app_id: String },
}

impl Restriction {
    /// Build a restriction from the feed's `(permission, appId)` pair.
    pub fn from_wire(
        enforcer_id: &str,
        permission: &str,
        app_id: &str,
    ) -> Result<Self, PolicyGraphError> {
        if permission.is_empty() {
            return Err(PolicyGraphError::EmptyField {
                enforcer_id: enforcer_id.to_string(),
                field: "permission",
            });
        }
        if app_id.is_empty() {
            return Err(PolicyGraphError::EmptyField {
                enforcer_id: enforcer_id.to_string(),
                field: "appId",
            });
        }

        match (permission == WILDCARD, app_id == WILDCARD) {
            (true, true) => Err(PolicyGraphError::AmbiguousWildcard {
                enforcer_id: enforcer_id.to_string(),
            }),
            (true, false) => Ok(Restriction::DisableApp {
                app_id: app_id.to_string(),
            }),
            (false, true) => Ok(Restriction::RestrictPermissionGlobally {
                permission: permission.to_string(),
            }),
            (false, false) => Ok(Restriction::RestrictPermissionForApp {
                permission: permission.to_string(),
                app_id: app_id.to_string(),
            }),
        }
    }

    /// The `(permission, appId)` pair in feed notation.
    pub fn wire_fields(&self) -> (&str, &str) {
        match self {
            Restriction::DisableApp { app_id } => (WILDCARD, app_id.as_str()),
            Restriction::RestrictPermissionGlobally { permission } => (permission.as_str(), WILDCARD),
            Restriction::RestrictPermissionForApp { permission, app_id } => {
                (permission.as_str(), app_id.as_str())
            }
        }
    }

    /// Whether granting `permission` to `app_id` is blocked by this restriction.
    pub fn blocks(&self, permission: &str, app_id: &str) -> bool {
        match self {
            Restriction::DisableApp { app_id: disabled } => disabled == app_id,
            Restriction::RestrictPermissionGlobally { permission: restricted } => {
                restricted == permission
            }
            Restriction::RestrictPermissionForApp {
                permission: restricted,
                app_id: target,
            } => restricted == permission && target == app_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestrictionEntry {
    pub enforcer_id: String,
    pub restriction: Restriction,
}

impl RestrictionEntry {
    pub fn new(enforcer_id: impl Into<String>, restriction: Restriction) -> Self {
        Self {
            enforcer_id: enforcer_id.into(),
            restriction,
        }
    }
}

impl fmt::Display for RestrictionEntry {
    /// `enforcer-permission-appId`, with `*` on the wildcarded side.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (permission, app_id) = self.restriction.wire_fields();
        write!(f, "{}-{}-{}", self.enforcer_id, permission, app_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationEntry {
    pub sub_space: Space,
    pub delegate_authority_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub space: Space,
    pub restrictions: Vec<RestrictionEntry>,
    pub delegations: Vec<DelegationEntry>,
}

impl SpaceRecord {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            restrictions: Vec::new(),
            delegations: Vec::new(),
        }
    }

    pub fn with_restriction(mut self, entry: RestrictionEntry) -> Self {
        self.restrictions.push(entry);
        self
    }

    pub fn with_delegation(mut self, sub_space: Space, delegate_authority_id: impl Into<String>) -> Self {
        self.delegations.push(DelegationEntry {
            sub_space,
            delegate_authority_id: delegate_authority_id.into(),
        });
        self
    }

    /// First delegation whose sub-space covers `point`.
    pub fn delegation_at(&self, point: &Coordinate) -> Option<&DelegationEntry> {
        self.delegations.iter().find(|d| d.sub_space.contains(point))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    pub id: String,
    pub records: Vec<SpaceRecord>,
}

impl Authority {
    pub fn new(id: impl Into<String>, records: Vec<SpaceRecord>) -> Self {
        Self {
            id: id.into(),
            records,
        }
    }

    /// First record, in list order, whose space contains `point`.
    pub fn record_at(&self, point: &Coordinate) -> Option<&SpaceRecord> {
        self.records.iter().find(|r| r.space.contains(point))
    }
}

/// Authority id → authority. Replacement happens per authority, never per record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyGraph {
    authorities: BTreeMap<String, Authority>,
}

impl PolicyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, authority_id: &str) -> Option<&Authority> {
        self.authorities.get(authority_id)
    }

    /// Insert or wholesale-replace an authority, returning the previous one.
    pub fn replace(&mut self, authority: Authority) -> Option<Authority> {
        self.authorities.insert(authority.id.clone(), authority)
    }

    /// Authorities in ascending id order.
    pub fn authorities(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.values()
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }
}

impl FromIterator<Authority> for PolicyGraph {
    fn from_iter<I: IntoIterator<Item = Authority>>(iter: I) -> Self {
        let mut graph = PolicyGraph::new();
        for authority in iter {
            graph.replace(authority);
        }
        graph
    }
}

/// One authority's slice of an incremental feed update.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityUpdate {
    pub timestamp: i64,
    pub authority: Authority,
}

/// Verified, decoded feed update ready for reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyUpdate {
    pub authorities: Vec<AuthorityUpdate>,
}
