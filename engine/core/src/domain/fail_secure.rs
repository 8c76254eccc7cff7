// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fail-Secure Decision
//!
//! Two-state machine evaluated once per sync cycle:
//!
//! | Location fix | Network | Policy feed | Local data recent | Next state |
//! |--------------|---------|-------------|-------------------|------------|
//! | disabled     | any     | any         | any               | `FailSecure` |
//! | enabled      | down    | any         | no                | `FailSecure` |
//! | enabled      | up      | failed      | no                | `FailSecure` |
//! | enabled      | any     | any         | yes               | `Normal` |
//! | enabled      | up      | ok          | any               | `Normal` |
//!
//! A capability that could not be queried (error or timeout) is reported as
//! unavailable, and a fetch that failed for any reason (timeout, transport,
//! malformed blob, rejected signature) counts as an unavailable feed. Either
//! pushes towards `FailSecure` once the local data is no longer recent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailSecureState {
    #[default]
    Normal,
    FailSecure,
}

impl FailSecureState {
    pub fn is_fail_secure(&self) -> bool {
        matches!(self, FailSecureState::FailSecure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailSecureReason {
    LocationDisabled,
    OfflineWithStaleData,
    FeedUnavailableWithStaleData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailSecureInputs {
    pub location_enabled: bool,
    pub network_available: bool,
    /// The policy fetch of this cycle succeeded.
    pub feed_available: bool,
    pub data_recent: bool,
}

impl FailSecureInputs {
    /// `Some(reason)` when the device must run fail-secure.
    pub fn violation(&self) -> Option<FailSecureReason> {
        if !self.location_enabled {
            return Some(FailSecureReason::LocationDisabled);
        }
        if self.data_recent {
            return None;
        }
        if !self.network_available {
            return Some(FailSecureReason::OfflineWithStaleData);
        }
        if !self.feed_available {
            return Some(FailSecureReason::FeedUnavailableWithStaleData);
        }
        None
    }

    pub fn next_state(&self) -> FailSecureState {
        match self.violation() {
            Some(_) => FailSecureState::FailSecure,
            None => FailSecureState::Normal,
        }
    }
}

/// Outcome of one evaluation, including the edge taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailSecureTransition {
    /// NORMAL → FAIL_SECURE
    Entered(FailSecureReason),
    /// FAIL_SECURE → FAIL_SECURE
    Remained(FailSecureReason),
    /// FAIL_SECURE → NORMAL
    Exited,
    /// NORMAL → NORMAL
    Steady,
}

impl FailSecureTransition {
    pub fn between(current: FailSecureState, inputs: &FailSecureInputs) -> Self {
        match (current, inputs.violation()) {
            (FailSecureState::Normal, Some(reason)) => FailSecureTransition::Entered(reason),
            (FailSecureState::FailSecure, Some(reason)) => FailSecureTransition::Remained(reason),
            (FailSecureState::FailSecure, None) => FailSecureTransition::Exited,
            (FailSecureState::Normal, None) => FailSecureTransition::Steady,
        }
    }

    pub fn target(&self) -> FailSecureState {
        match self {
            FailSecureTransition::Entered(_) | FailSecureTransition::Remained(_) => {
                FailSecureState::FailSecure
            }
            FailSecureTransition::Exited | FailSecureTransition::Steady => FailSecureState::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(location_enabled: bool, network_available: bool, data_recent: bool) -> FailSecureInputs {
        FailSecureInputs {
            location_enabled,
            network_available,
            feed_available: network_available,
            data_recent,
        }
    }

    fn feed_failed(data_recent: bool) -> FailSecureInputs {
        FailSecureInputs {
            feed_available: false,
            ..inputs(true, true, data_recent)
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(inputs(false, true, true).next_state(), FailSecureState::FailSecure);
        assert_eq!(inputs(false, false, false).next_state(), FailSecureState::FailSecure);
        assert_eq!(inputs(true, false, false).next_state(), FailSecureState::FailSecure);
        assert_eq!(inputs(true, false, true).next_state(), FailSecureState::Normal);
        assert_eq!(inputs(true, true, false).next_state(), FailSecureState::Normal);
        assert_eq!(inputs(true, true, true).next_state(), FailSecureState::Normal);
    }

    #[test]
    fn test_failed_fetch_only_matters_once_data_is_stale() {
        assert_eq!(feed_failed(true).next_state(), FailSecureState::Normal);
        assert_eq!(
            feed_failed(false).violation(),
            Some(FailSecureReason::FeedUnavailableWithStaleData)
        );
        assert_eq!(
            FailSecureInputs {
                network_available: false,
                ..feed_failed(false)
            }
            .violation(),
            Some(FailSecureReason::OfflineWithStaleData)
        );
    }

    #[test]
    fn test_location_reason_takes_priority() {
        assert_eq!(
            inputs(false, false, false).violation(),
            Some(FailSecureReason::LocationDisabled)
        );
        assert_eq!(
            inputs(true, false, false).violation(),
            Some(FailSecureReason::OfflineWithStaleData)
        );
    }

    #[test]
    fn test_transitions() {
        let bad = inputs(false, true, true);
        let good = inputs(true, true, true);

        assert_eq!(
            FailSecureTransition::between(FailSecureState::Normal, &bad),
            FailSecureTransition::Entered(FailSecureReason::LocationDisabled)
        );
        assert_eq!(
            FailSecureTransition::between(FailSecureState::FailSecure, &bad),
            FailSecureTransition::Remained(FailSecureReason::LocationDisabled)
        );
        assert_eq!(
            FailSecureTransition::between(FailSecureState::FailSecure, &good),
            FailSecureTransition::Exited
        );
        assert_eq!(
            FailSecureTransition::between(FailSecureState::Normal, &good),
            FailSecureTransition::Steady
        );
        assert_eq!(FailSecureTransition::Exited.target(), FailSecureState::Normal);
    }
}
