// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::fail_secure::FailSecureReason;
use crate::domain::geometry::Coordinate;

/// Identifies one sync or access-control cycle across log lines and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(pub Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnforcementEvent {
    PolicySynced {
        cycle_id: CycleId,
        authorities_updated: usize,
        highest_timestamp_seen: i64,
        synced_at: DateTime<Utc>,
    },
    SyncFailed {
        cycle_id: CycleId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    FailSecureEntered {
        cycle_id: CycleId,
        reason: FailSecureReason,
        entered_at: DateTime<Utc>,
    },
    FailSecureExited {
        cycle_id: CycleId,
        exited_at: DateTime<Utc>,
    },
    RestrictionsApplied {
        cycle_id: CycleId,
        /// `enforcer-permission-appId` strings in application order.
        restrictions: Vec<String>,
        revoked_user_grants: usize,
        applied_at: DateTime<Utc>,
    },
    RestrictionsCleared {
        cycle_id: CycleId,
        restored_user_grants: usize,
        cleared_at: DateTime<Utc>,
    },
    ResolutionFailed {
        cycle_id: CycleId,
        position: Coordinate,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    PositionUpdated {
        position: Coordinate,
        from_debug_feed: bool,
        updated_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = EnforcementEvent::FailSecureEntered {
            cycle_id: CycleId::new(),
            reason: FailSecureReason::LocationDisabled,
            entered_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fail_secure_entered");
        assert_eq!(json["reason"], "location_disabled");

        let position = EnforcementEvent::PositionUpdated {
            position: Coordinate::flat(1.0, 1.0),
            from_debug_feed: true,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["type"], "position_updated");
        assert!(json.get("cycle_id").is_none());
    }
}
