// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Delta-sync bookkeeping. Written only by the sync reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Highest authority timestamp reconciled so far; the next fetch asks for
    /// everything newer than this.
    pub highest_timestamp_seen: i64,
    /// Wall clock of the last successful reconcile. `None` until the first one.
    pub last_fetch: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the local policy data was refreshed less than `threshold` ago.
    /// Data that was never fetched is not recent.
    pub fn is_recent(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match self.last_fetch {
            Some(at) => now.signed_duration_since(at) < threshold,
            None => false,
        }
    }
}
