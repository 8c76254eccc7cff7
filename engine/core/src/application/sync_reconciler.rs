// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::policy_graph::{PolicyGraph, PolicyUpdate};
use crate::domain::sync_state::SyncState;

/// What one reconcile changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub authorities_replaced: usize,
    pub authorities_added: usize,
    pub highest_timestamp_seen: i64,
}

/// Merge a verified update into the graph.
///
/// Each authority in the update replaces the stored one wholesale; authorities
/// absent from the update are untouched. `last_fetch` is stamped with `now`
/// even for an empty update, since an empty delta still proves the local data
/// is current.
pub fn reconcile(
    update: PolicyUpdate,
    graph: &mut PolicyGraph,
    sync_state: &mut SyncState,
    now: DateTime<Utc>,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();

    for entry in update.authorities {
        let authority_id = entry.authority.id.clone();
        let records = entry.authority.records.len();

        match graph.replace(entry.authority) {
            Some(_) => summary.authorities_replaced += 1,
            None => summary.authorities_added += 1,
        }
        if entry.timestamp > sync_state.highest_timestamp_seen {
            sync_state.highest_timestamp_seen = entry.timestamp;
        }

        debug!(
            authority_id = %authority_id,
            timestamp = entry.timestamp,
            records,
            "Reconciled authority"
        );
    }

    sync_state.last_fetch = Some(now);
    summary.highest_timestamp_seen = sync_state.highest_timestamp_seen;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::{Coordinate, Polygon};
    use crate::domain::policy_graph::{Authority, AuthorityUpdate, Restriction, RestrictionEntry, Space, SpaceRecord};

    fn authority(id: &str, permissions: &[&str]) -> Authority {
        let square = Polygon::new(vec![
            Coordinate::flat(0.0, 0.0),
            Coordinate::flat(0.0, 2.0),
            Coordinate::flat(2.0, 2.0),
            Coordinate::flat(2.0, 0.0),
        ]);
        let record = permissions.iter().fold(SpaceRecord::new(Space::new("zone", square)), |record, permission| {
            record.with_restriction(RestrictionEntry::new(
                id,
                Restriction::RestrictPermissionGlobally {
                    permission: permission.to_string(),
                },
            ))
        });
        Authority::new(id, vec![record])
    }

    fn update(entries: Vec<(i64, Authority)>) -> PolicyUpdate {
        PolicyUpdate {
            authorities: entries
                .into_iter()
                .map(|(timestamp, authority)| AuthorityUpdate { timestamp, authority })
                .collect(),
        }
    }

    #[test]
    fn test_later_fetch_replaces_not_merges() {
        let mut graph = PolicyGraph::new();
        let mut state = SyncState::new();
        let now = Utc::now();

        let first = reconcile(
            update(vec![(10, authority("a", &["CAMERA", "LOCATION"])), (11, authority("b", &["SMS"]))]),
            &mut graph,
            &mut state,
            now,
        );
        assert_eq!(first.authorities_added, 2);
        assert_eq!(state.highest_timestamp_seen, 11);

        let second = reconcile(update(vec![(20, authority("a", &["MICROPHONE"]))]), &mut graph, &mut state, now);
        assert_eq!(second.authorities_replaced, 1);
        assert_eq!(second.highest_timestamp_seen, 20);

        let a = graph.get("a").unwrap();
        assert_eq!(a.records.len(), 1);
        assert_eq!(a.records[0].restrictions.len(), 1);
        assert_eq!(a.records[0].restrictions[0].to_string(), "a-MICROPHONE-*");

        assert_eq!(graph.get("b").unwrap(), &authority("b", &["SMS"]));
    }

    #[test]
    fn test_highest_timestamp_never_decreases() {
        let mut graph = PolicyGraph::new();
        let mut state = SyncState::new();

        reconcile(update(vec![(50, authority("a", &[]))]), &mut graph, &mut state, Utc::now());
        reconcile(update(vec![(30, authority("b", &[]))]), &mut graph, &mut state, Utc::now());

        assert_eq!(state.highest_timestamp_seen, 50);
        assert!(graph.get("b").is_some());
    }

    #[test]
    fn test_empty_update_refreshes_recency() {
        let mut graph = PolicyGraph::new();
        let mut state = SyncState::new();
        let now = Utc::now();

        let summary = reconcile(PolicyUpdate::default(), &mut graph, &mut state, now);
        assert_eq!(summary, ReconcileSummary::default());
        assert_eq!(state.last_fetch, Some(now));
        assert!(graph.is_empty());
    }
}
