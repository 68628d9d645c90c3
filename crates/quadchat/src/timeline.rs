// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message timeline for the open conversation.

use std::collections::HashSet;

use crate::model::{Message, MessagePage};

/// Proof that a page fetch was started for a particular selection.
///
/// Every selection change bumps the store's generation, so a ticket from
/// before the switch no longer matches and its page is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    conversation_id: String,
    generation: u64,
    page: u32,
}

impl LoadTicket {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The page number this ticket fetches (1 = newest).
    pub fn page(&self) -> u32 {
        self.page
    }
}

/// Chronological message log of the active conversation.
///
/// Holds at most one conversation.  Messages are unique by id and ordered by
/// `(created_at, id)` regardless of whether they came from a page fetch, a
/// confirmed send, or the channel.
#[derive(Debug, Default)]
pub struct TimelineStore {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    seen: HashSet<String>,
    generation: u64,
    loading: bool,
    /// Highest page merged so far.
    loaded_page: u32,
    has_more: bool,
}

impl TimelineStore {
    /// Switch to `conversation_id` and start loading its newest page.
    /// Any prior log is dropped.
    pub fn begin_load(&mut self, conversation_id: &str) -> LoadTicket {
        self.reset();
        self.conversation_id = Some(conversation_id.to_owned());
        self.loading = true;
        self.ticket(1)
    }

    /// Start fetching the next older page, if there is one and no load is
    /// already running.
    pub fn begin_older(&mut self) -> Option<LoadTicket> {
        if self.conversation_id.is_none() || self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(self.ticket(self.loaded_page + 1))
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.conversation_id.as_deref() == Some(ticket.conversation_id.as_str())
    }

    /// Merge a fetched page. Returns false if the selection changed meanwhile.
    pub fn apply_page(&mut self, ticket: &LoadTicket, page: MessagePage) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                conversation_id = %ticket.conversation_id,
                page = ticket.page,
                "discarding stale page"
            );
            return false;
        }
        self.loading = false;
        self.loaded_page = self.loaded_page.max(ticket.page);
        self.has_more = page.has_more;
        for message in page.messages {
            self.insert(message);
        }
        true
    }

    pub fn fail_load(&mut self, ticket: &LoadTicket) {
        if self.is_current(ticket) {
            self.loading = false;
        }
    }

    /// Append a live or confirmed message. Ignored unless it belongs to the
    /// open conversation; duplicates by id are dropped.
    pub fn append(&mut self, message: Message) -> bool {
        if self.conversation_id.as_deref() != Some(message.conversation_id.as_str()) {
            return false;
        }
        self.insert(message)
    }

    /// Flag every message as read after the server acknowledged it.
    pub fn mark_read(&mut self) {
        for message in &mut self.messages {
            message.read = true;
        }
    }

    /// Drop the log and invalidate any in-flight load.
    pub fn clear(&mut self) {
        self.reset();
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    fn ticket(&self, page: u32) -> LoadTicket {
        LoadTicket {
            conversation_id: self.conversation_id.clone().unwrap_or_default(),
            generation: self.generation,
            page,
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.conversation_id = None;
        self.messages.clear();
        self.seen.clear();
        self.loading = false;
        self.loaded_page = 0;
        self.has_more = false;
    }

    fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        let key = (message.created_at, message.id.as_str());
        let at = self.messages.partition_point(|m| (m.created_at, m.id.as_str()) <= key);
        self.messages.insert(at, message);
        true
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
