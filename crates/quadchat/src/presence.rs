// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Online/offline tracking driven entirely by channel events.

use std::collections::HashSet;

/// Presence as last reported by the channel.
///
/// Starts `Unknown` and returns there on every disconnect; the snapshot sent
/// after (re)connect makes it `Known`, after which join/leave events update
/// it incrementally.  Events arrive in order on a single connection, so no
/// merge logic is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PresenceTracker {
    #[default]
    Unknown,
    Known(HashSet<String>),
}

impl PresenceTracker {
    pub fn apply_snapshot(&mut self, user_ids: impl IntoIterator<Item = String>) {
        *self = Self::Known(user_ids.into_iter().collect());
    }

    /// Returns whether the visible state changed.
    pub fn user_online(&mut self, user_id: &str) -> bool {
        match self {
            // Incremental events before a snapshot are meaningless.
            Self::Unknown => false,
            Self::Known(online) => online.insert(user_id.to_owned()),
        }
    }

    /// Returns whether the visible state changed.
    pub fn user_offline(&mut self, user_id: &str) -> bool {
        match self {
            Self::Unknown => false,
            Self::Known(online) => online.remove(user_id),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::Unknown;
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Unknown presence reads as offline.
    pub fn is_online(&self, user_id: &str) -> bool {
        match self {
            Self::Unknown => false,
            Self::Known(online) => online.contains(user_id),
        }
    }

    pub fn online_count(&self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Known(online) => online.len(),
        }
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
