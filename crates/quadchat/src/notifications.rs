// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification bridge: REST history and live pushes merged into one feed.

use crate::model::{
    ItemStatus, Listing, Message, NavTarget, NotificationEntry, NotificationHistory,
    NotificationKind, NotificationPayload,
};

/// Prefix of entries synthesized from channel pushes. The server has never
/// seen these ids, so they are never sent back over REST.
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Newest-first notification list with an unread counter.
///
/// The counter starts from the server's authoritative value and then moves
/// with local transitions only: +1 per unread push, -1 per unread entry
/// marked read or deleted.  It never goes below zero.
#[derive(Debug, Default)]
pub struct NotificationFeed {
    entries: Vec<NotificationEntry>,
    unread: u32,
}

impl NotificationFeed {
    /// Replace the feed with fetched history.
    ///
    /// Local entries newer than the newest history entry arrived while the
    /// request was in flight. They are kept, and their unread ones are added
    /// on top of the server count.
    pub fn load(&mut self, history: NotificationHistory) {
        let newest = history.notifications.iter().map(|e| e.created_at).max();
        let mut entries: Vec<NotificationEntry> = self
            .entries
            .drain(..)
            .filter(|e| is_local_id(&e.id) && !matches!(newest, Some(n) if e.created_at <= n))
            .collect();
        let pending = entries.iter().filter(|e| !e.read).count() as u32;

        entries.extend(history.notifications);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.entries = entries;
        self.unread = history.unread_count.saturating_add(pending);
    }

    /// Synthesize an entry for a message from another user.
    pub fn push_message(&mut self, message: &Message, now: u64) -> &NotificationEntry {
        let body = match message.content.as_deref() {
            Some(text) if !text.is_empty() => text.to_owned(),
            _ => "Sent an image".to_owned(),
        };
        self.push(
            NotificationKind::Message,
            format!("New message from {}", message.sender.display_name),
            body,
            NotificationPayload {
                conversation_id: Some(message.conversation_id.clone()),
                ..Default::default()
            },
            now,
        )
    }

    /// Synthesize an entry for a newly posted item or book.
    pub fn push_listing(&mut self, listing: &Listing, now: u64) -> &NotificationEntry {
        let title = match listing {
            Listing::Item(item) => match item.status {
                ItemStatus::Lost => "New lost item reported",
                ItemStatus::Found => "New found item reported",
            },
            Listing::Book(_) => "New book listed",
        };
        self.push(
            listing.kind(),
            title.to_owned(),
            listing.title().to_owned(),
            listing.payload(),
            now,
        )
    }

    fn push(
        &mut self,
        kind: NotificationKind,
        title: String,
        message: String,
        payload: NotificationPayload,
        now: u64,
    ) -> &NotificationEntry {
        let entry = NotificationEntry {
            id: format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            kind,
            title,
            message,
            payload,
            read: false,
            created_at: now,
        };
        self.unread = self.unread.saturating_add(1);
        self.entries.insert(0, entry);
        &self.entries[0]
    }

    /// Returns whether the entry went from unread to read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Returns whether anything changed.
    pub fn mark_all_read(&mut self) -> bool {
        let changed = self.unread > 0 || self.entries.iter().any(|e| !e.read);
        for entry in &mut self.entries {
            entry.read = true;
        }
        self.unread = 0;
        changed
    }

    pub fn delete(&mut self, id: &str) -> Option<NotificationEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(pos);
        if !entry.read {
            self.unread = self.unread.saturating_sub(1);
        }
        Some(entry)
    }

    /// Mark read and resolve where the entry navigates to.
    /// Entries without a reference are inert.
    pub fn open(&mut self, id: &str) -> Option<NavTarget> {
        self.mark_read(id);
        self.entry(id)?.payload.target()
    }

    pub fn entry(&self, id: &str) -> Option<&NotificationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[NotificationEntry] {
        &self.entries
    }

    pub fn unread_count(&self) -> u32 {
        self.unread
    }
}

#[cfg(test)]
#[path = "notifications_tests.rs"]
mod tests;
