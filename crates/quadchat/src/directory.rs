// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation directory: the user's conversation list and the active selection.

use std::collections::HashMap;

use crate::model::{Conversation, Message, MessagePreview};

/// Identifies one list refresh so late responses can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

/// Conversation list ordered by most recent activity.
///
/// The list is replaced wholesale on every refresh.  Refreshes may resolve
/// out of order; a result older than the newest applied one is dropped.
/// A badge cleared locally stays cleared against any refresh issued before
/// the clear.
#[derive(Debug, Default)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    active: Option<String>,
    issued: u64,
    applied: u64,
    loading: bool,
    /// Conversation id to the last ticket issued when its badge was cleared.
    cleared: HashMap<String, u64>,
}

impl ConversationDirectory {
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        self.loading = true;
        RefreshTicket(self.issued)
    }

    /// Apply a fetched list. Returns false when a newer refresh already landed.
    pub fn apply_refresh(&mut self, ticket: RefreshTicket, list: Vec<Conversation>) -> bool {
        if ticket.0 == self.issued {
            self.loading = false;
        }
        if ticket.0 <= self.applied {
            return false;
        }
        self.applied = ticket.0;
        self.conversations = list;
        for conv in &mut self.conversations {
            if self.cleared.get(&conv.id).is_some_and(|&floor| ticket.0 <= floor) {
                conv.unread_count = 0;
            }
        }
        self.cleared.retain(|_, floor| *floor > ticket.0);
        self.sort();
        true
    }

    pub fn fail_refresh(&mut self, ticket: RefreshTicket) {
        if ticket.0 == self.issued {
            self.loading = false;
        }
    }

    /// Insert or replace a single conversation (get-or-create result).
    pub fn upsert(&mut self, conversation: Conversation) {
        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => self.conversations.push(conversation),
        }
        self.sort();
    }

    /// Update the last-message snapshot after a local send.
    pub fn record_message(&mut self, message: &Message) -> bool {
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == message.conversation_id)
        else {
            return false;
        };
        conv.last_message = Some(MessagePreview::of(message));
        conv.updated_at = conv.updated_at.max(message.created_at);
        self.sort();
        true
    }

    /// Zero the unread badge. Returns whether it was non-zero.
    ///
    /// Refreshes already in flight carry the pre-read count, so they are
    /// held to zero for this conversation when they land.
    pub fn clear_unread(&mut self, conversation_id: &str) -> bool {
        if self.issued > self.applied {
            self.cleared.insert(conversation_id.to_owned(), self.issued);
        }
        match self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            Some(conv) if conv.unread_count > 0 => {
                conv.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    pub fn set_active(&mut self, conversation_id: Option<&str>) {
        self.active = conversation_id.map(String::from);
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    /// The conversation shared with `user_id`, if already listed.
    pub fn find_with(&self, user_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.includes(user_id))
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    fn sort(&mut self) {
        self.conversations.sort_by(|a, b| {
            b.last_activity().cmp(&a.last_activity()).then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
