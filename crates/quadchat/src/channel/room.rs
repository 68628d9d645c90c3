// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::protocol::ClientEvent;

/// Tracks the single conversation room this connection is joined to.
///
/// Every join of a different room is preceded by a leave of the previous one,
/// so events from two conversations never interleave on one connection.
#[derive(Debug, Default)]
pub struct RoomTracker {
    current: Option<String>,
}

impl RoomTracker {
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Switch to `conversation_id`, returning the events to put on the wire.
    pub fn join(&mut self, conversation_id: &str) -> Vec<ClientEvent> {
        if self.current.as_deref() == Some(conversation_id) {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(2);
        if let Some(prev) = self.current.take() {
            out.push(ClientEvent::LeaveConversation { conversation_id: prev });
        }
        self.current = Some(conversation_id.to_owned());
        out.push(ClientEvent::JoinConversation { conversation_id: conversation_id.to_owned() });
        out
    }

    pub fn leave(&mut self) -> Option<ClientEvent> {
        self.current
            .take()
            .map(|conversation_id| ClientEvent::LeaveConversation { conversation_id })
    }

    /// Events that restore server-side state on a fresh connection: bind the
    /// user, ask for a presence snapshot, and re-enter the open room.
    pub fn resync(&self, user_id: &str) -> Vec<ClientEvent> {
        let mut out = vec![
            ClientEvent::Join { user_id: user_id.to_owned() },
            ClientEvent::PresenceRequest,
        ];
        if let Some(ref id) = self.current {
            out.push(ClientEvent::JoinConversation { conversation_id: id.clone() });
        }
        out
    }
}

#[cfg(test)]
#[path = "room_tests.rs"]
mod tests;
