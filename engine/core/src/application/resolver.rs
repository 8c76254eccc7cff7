// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Resolver
//!
//! Answers "which restrictions are in force at this coordinate?" by walking the
//! delegation chain of the policy graph.
//!
//! ## Algorithm
//!
//! ```text
//! 1. scan authorities in ascending id order; the first one owning a record
//!    whose space contains P starts the chain          (none → NotControlled)
//! 2. loop:
//!      accumulate record.restrictions
//!      delegation covering P?  no  → Controlled(accumulated)
//!                              yes → record := delegate's record at P
//!                                    hops += 1, bail out past max_hops
//! ```
//!
//! Restrictions are returned in chain order: the delegator's entries precede
//! the delegate's. Every failure mode carries the restrictions accumulated up to
//! the broken link so the caller can fail closed on them.

use thiserror::Error;

use crate::domain::geometry::Coordinate;
use crate::domain::policy_graph::{PolicyGraph, RestrictionEntry, SpaceRecord};

pub const DEFAULT_MAX_DELEGATION_HOPS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NotControlled,
    Controlled(Vec<RestrictionEntry>),
}

impl Resolution {
    pub fn restrictions(&self) -> &[RestrictionEntry] {
        match self {
            Resolution::NotControlled => &[],
            Resolution::Controlled(entries) => entries,
        }
    }

    pub fn is_controlled(&self) -> bool {
        matches!(self, Resolution::Controlled(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("delegation chain exceeded {max_hops} hops (last authority: '{last_authority}')")]
    HopLimitExceeded {
        max_hops: usize,
        last_authority: String,
        partial: Vec<RestrictionEntry>,
    },

    #[error("delegation to unknown authority '{authority_id}'")]
    DanglingDelegation {
        authority_id: String,
        partial: Vec<RestrictionEntry>,
    },

    #[error("delegate authority '{authority_id}' has no space covering the position")]
    DelegateDoesNotCover {
        authority_id: String,
        partial: Vec<RestrictionEntry>,
    },
}

impl ResolutionError {
    /// Restrictions accumulated before the chain broke.
    pub fn partial(&self) -> &[RestrictionEntry] {
        match self {
            ResolutionError::HopLimitExceeded { partial, .. }
            | ResolutionError::DanglingDelegation { partial, .. }
            | ResolutionError::DelegateDoesNotCover { partial, .. } => partial,
        }
    }

    /// Fail-closed view: the position is controlled by whatever was resolved so far.
    pub fn into_fail_closed(self) -> Resolution {
        match self {
            ResolutionError::HopLimitExceeded { partial, .. }
            | ResolutionError::DanglingDelegation { partial, .. }
            | ResolutionError::DelegateDoesNotCover { partial, .. } => Resolution::Controlled(partial),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver {
    max_hops: usize,
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELEGATION_HOPS)
    }
}

impl PolicyResolver {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    pub fn resolve(
        &self,
        graph: &PolicyGraph,
        point: &Coordinate,
    ) -> Result<Resolution, ResolutionError> {
        let Some((mut authority_id, mut record)) = Self::root_record(graph, point) else {
            return Ok(Resolution::NotControlled);
        };

        let mut accumulated: Vec<RestrictionEntry> = Vec::new();
        let mut hops = 0usize;

        loop {
            accumulated.extend(record.restrictions.iter().cloned());

            let Some(delegation) = record.delegation_at(point) else {
                return Ok(Resolution::Controlled(accumulated));
            };

            if hops >= self.max_hops {
                return Err(ResolutionError::HopLimitExceeded {
                    max_hops: self.max_hops,
                    last_authority: authority_id.to_string(),
                    partial: accumulated,
                });
            }
            hops += 1;

            let delegate_id = delegation.delegate_authority_id.as_str();
            let Some(delegate) = graph.get(delegate_id) else {
                return Err(ResolutionError::DanglingDelegation {
                    authority_id: delegate_id.to_string(),
                    partial: accumulated,
                });
            };
            let Some(next) = delegate.record_at(point) else {
                return Err(ResolutionError::DelegateDoesNotCover {
                    authority_id: delegate_id.to_string(),
                    partial: accumulated,
                });
            };

            authority_id = delegate.id.as_str();
            record = next;
        }
    }

    fn root_record<'g>(graph: &'g PolicyGraph, point: &Coordinate) -> Option<(&'g str, &'g SpaceRecord)> {
        graph
            .authorities()
            .find_map(|authority| authority.record_at(point).map(|r| (authority.id.as_str(), r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Polygon;
    use crate::domain::policy_graph::{Authority, Restriction, Space};

    fn rect(id: &str, lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> Space {
        Space::new(
            id,
            Polygon::new(vec![
                Coordinate::flat(lat0, lon0),
                Coordinate::flat(lat0, lon1),
                Coordinate::flat(lat1, lon1),
                Coordinate::flat(lat1, lon0),
            ]),
        )
    }

    fn restrict(enforcer: &str, permission: &str, app: &str) -> RestrictionEntry {
        RestrictionEntry::new(enforcer, Restriction::from_wire(enforcer, permission, app).unwrap())
    }

    fn p() -> Coordinate {
        Coordinate::flat(1.0, 1.0)
    }

    #[test]
    fn test_uncontrolled_position() {
        let graph: PolicyGraph = vec![Authority::new(
            "a",
            vec![SpaceRecord::new(rect("far", 10.0, 10.0, 12.0, 12.0))],
        )]
        .into_iter()
        .collect();

        assert_eq!(PolicyResolver::default().resolve(&graph, &p()), Ok(Resolution::NotControlled));
        assert_eq!(
            PolicyResolver::default().resolve(&PolicyGraph::new(), &p()),
            Ok(Resolution::NotControlled)
        );
    }

    #[test]
    fn test_controlled_without_restrictions_is_still_controlled() {
        let graph: PolicyGraph = vec![Authority::new("a", vec![SpaceRecord::new(rect("s", 0.0, 0.0, 2.0, 2.0))])]
            .into_iter()
            .collect();

        let resolution = PolicyResolver::default().resolve(&graph, &p()).unwrap();
        assert!(resolution.is_controlled());
        assert!(resolution.restrictions().is_empty());
    }

    #[test]
    fn test_delegation_accumulates_delegator_first() {
        let graph: PolicyGraph = vec![
            Authority::new(
                "A",
                vec![SpaceRecord::new(rect("a-space", 0.0, 0.0, 4.0, 4.0))
                    .with_restriction(restrict("A", "X", "pkg1"))
                    .with_delegation(rect("a-sub", 0.5, 0.5, 1.5, 1.5), "B")],
            ),
            Authority::new(
                "B",
                vec![SpaceRecord::new(rect("b-space", 0.0, 0.0, 2.0, 2.0))
                    .with_restriction(restrict("B", "Y", "pkg2"))],
            ),
        ]
        .into_iter()
        .collect();

        let resolution = PolicyResolver::default().resolve(&graph, &p()).unwrap();
        assert_eq!(
            resolution,
            Resolution::Controlled(vec![restrict("A", "X", "pkg1"), restrict("B", "Y", "pkg2")])
        );
    }

    #[test]
    fn test_delegation_outside_sub_space_is_not_followed() {
        let graph: PolicyGraph = vec![
            Authority::new(
                "A",
                vec![SpaceRecord::new(rect("a-space", 0.0, 0.0, 4.0, 4.0))
                    .with_restriction(restrict("A", "X", "pkg1"))
                    .with_delegation(rect("a-sub", 3.0, 3.0, 3.5, 3.5), "B")],
            ),
            Authority::new(
                "B",
                vec![SpaceRecord::new(rect("b-space", 0.0, 0.0, 4.0, 4.0))
                    .with_restriction(restrict("B", "Y", "pkg2"))],
            ),
        ]
        .into_iter()
        .collect();

        let resolution = PolicyResolver::default().resolve(&graph, &p()).unwrap();
        assert_eq!(resolution.restrictions(), &[restrict("A", "X", "pkg1")]);
    }

    #[test]
    fn test_first_containing_record_wins_within_authority() {
        let graph: PolicyGraph = vec![Authority::new(
            "A",
            vec![
                SpaceRecord::new(rect("first", 0.0, 0.0, 2.0, 2.0)).with_restriction(restrict("A", "X", "pkg1")),
                SpaceRecord::new(rect("second", 0.0, 0.0, 3.0, 3.0)).with_restriction(restrict("A", "Z", "pkg9")),
            ],
        )]
        .into_iter()
        .collect();

        let resolution = PolicyResolver::default().resolve(&graph, &p()).unwrap();
        assert_eq!(resolution.restrictions(), &[restrict("A", "X", "pkg1")]);
    }

    #[test]
    fn test_overlapping_authorities_resolve_by_ascending_id() {
        let graph: PolicyGraph = vec![
            Authority::new(
                "zulu",
                vec![SpaceRecord::new(rect("z", 0.0, 0.0, 2.0, 2.0)).with_restriction(restrict("zulu", "Z", "pkg"))],
            ),
            Authority::new(
                "alpha",
                vec![SpaceRecord::new(rect("a", 0.0, 0.0, 2.0, 2.0)).with_restriction(restrict("alpha", "A", "pkg"))],
            ),
        ]
        .into_iter()
        .collect();

        let resolution = PolicyResolver::default().resolve(&graph, &p()).unwrap();
        assert_eq!(resolution.restrictions(), &[restrict("alpha", "A", "pkg")]);
    }

    #[test]
    fn test_delegation_cycle_terminates_at_hop_bound() {
        let graph: PolicyGraph = vec![
            Authority::new(
                "A",
                vec![SpaceRecord::new(rect("a", 0.0, 0.0, 2.0, 2.0))
                    .with_restriction(restrict("A", "X", "pkg1"))
                    .with_delegation(rect("a-sub", 0.0, 0.0, 2.0, 2.0), "B")],
            ),
            Authority::new(
                "B",
                vec![SpaceRecord::new(rect("b", 0.5, 0.5, 1.5, 1.5))
                    .with_restriction(restrict("B", "Y", "pkg2"))
                    .with_delegation(rect("b-sub", 0.5, 0.5, 1.5, 1.5), "A")],
            ),
        ]
        .into_iter()
        .collect();

        let err = PolicyResolver::new(5).resolve(&graph, &p()).unwrap_err();
        match &err {
            ResolutionError::HopLimitExceeded { max_hops, partial, .. } => {
                assert_eq!(*max_hops, 5);
                // root record plus one record per followed hop
                assert_eq!(partial.len(), 6);
                assert_eq!(partial[0], restrict("A", "X", "pkg1"));
                assert_eq!(partial[1], restrict("B", "Y", "pkg2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.into_fail_closed().is_controlled());
    }

    #[test]
    fn test_dangling_delegation_fails_closed_with_partial() {
        let graph: PolicyGraph = vec![Authority::new(
            "A",
            vec![SpaceRecord::new(rect("a", 0.0, 0.0, 2.0, 2.0))
                .with_restriction(restrict("A", "X", "pkg1"))
                .with_delegation(rect("a-sub", 0.0, 0.0, 2.0, 2.0), "ghost")],
        )]
        .into_iter()
        .collect();

        let err = PolicyResolver::default().resolve(&graph, &p()).unwrap_err();
        assert!(matches!(err, ResolutionError::DanglingDelegation { ref authority_id, .. } if authority_id == "ghost"));
        assert_eq!(err.into_fail_closed().restrictions(), &[restrict("A", "X", "pkg1")]);
    }

    #[test]
    fn test_delegate_without_covering_record_fails_closed() {
        let graph: PolicyGraph = vec![
            Authority::new(
                "A",
                vec![SpaceRecord::new(rect("a", 0.0, 0.0, 2.0, 2.0))
                    .with_restriction(restrict("A", "X", "pkg1"))
                    .with_delegation(rect("a-sub", 0.0, 0.0, 2.0, 2.0), "B")],
            ),
            Authority::new("B", vec![SpaceRecord::new(rect("b", 5.0, 5.0, 6.0, 6.0))]),
        ]
        .into_iter()
        .collect();

        let err = PolicyResolver::default().resolve(&graph, &p()).unwrap_err();
        assert!(matches!(err, ResolutionError::DelegateDoesNotCover { .. }));
        assert_eq!(err.into_fail_closed().restrictions(), &[restrict("A", "X", "pkg1")]);
    }
}
