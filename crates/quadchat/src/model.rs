// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire and domain types shared by the REST client, the push channel, and
//! the session state machines. Timestamps are epoch milliseconds.

use serde::{Deserialize, Serialize};

/// A platform user as seen by the messaging core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// The authenticated user a session acts as.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    /// Bearer token for REST calls and the channel handshake.
    pub token: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), token: token.into() }
    }
}

/// Snapshot of the most recent message, embedded in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub message_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub has_attachment: bool,
    pub created_at: u64,
}

impl MessagePreview {
    pub fn of(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            sender_id: message.sender.id.clone(),
            content: message.content.clone(),
            has_attachment: message.attachment.is_some(),
            created_at: message.created_at,
        }
    }
}

/// A direct-message thread between exactly two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [UserSummary; 2],
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
    #[serde(default)]
    pub unread_count: u32,
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Conversation {
    /// The participant that is not `me`.
    pub fn counterpart(&self, me: &str) -> Option<&UserSummary> {
        self.participants.iter().find(|p| p.id != me)
    }

    pub fn includes(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// Timestamp used for most-recent-activity ordering.
    pub fn last_activity(&self) -> u64 {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(0)
            .max(self.updated_at)
            .max(self.created_at)
    }
}

/// Server-side reference to a stored image attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub content_type: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// A message as persisted by the server. Immutable except for `read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserSummary,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
    pub created_at: u64,
    #[serde(default)]
    pub read: bool,
}

/// One page of a conversation's history, oldest first within the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub total: u64,
}

/// Kind of a notification entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Item,
    Book,
}

/// Entities a notification can point at. History entries may carry more than
/// one reference; see [`NotificationPayload::target`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
}

/// Where clicking a notification navigates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    Book(String),
    Item(String),
    Conversation(String),
}

impl NotificationPayload {
    /// Resolve the navigation target: book, then item, then conversation.
    pub fn target(&self) -> Option<NavTarget> {
        if let Some(ref id) = self.book_id {
            return Some(NavTarget::Book(id.clone()));
        }
        if let Some(ref id) = self.item_id {
            return Some(NavTarget::Item(id.clone()));
        }
        self.conversation_id.as_ref().map(|id| NavTarget::Conversation(id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: NotificationPayload,
    #[serde(default)]
    pub read: bool,
    pub created_at: u64,
}

/// Response of the notification history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationHistory {
    pub notifications: Vec<NotificationEntry>,
    pub unread_count: u32,
}

/// Lost-and-found report status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Lost,
    Found,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListing {
    pub id: String,
    pub title: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub posted_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookListing {
    pub id: String,
    pub title: String,
    /// Asking price in cents.
    pub price_cents: u64,
    #[serde(default)]
    pub posted_by: Option<String>,
}

/// A newly posted listing. The variant is fixed by the channel event that
/// carried it, never inferred from which fields are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Item(ItemListing),
    Book(BookListing),
}

impl Listing {
    pub fn id(&self) -> &str {
        match self {
            Self::Item(item) => &item.id,
            Self::Book(book) => &book.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Item(item) => &item.title,
            Self::Book(book) => &book.title,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Item(_) => NotificationKind::Item,
            Self::Book(_) => NotificationKind::Book,
        }
    }

    /// Payload reference for a notification about this listing.
    pub fn payload(&self) -> NotificationPayload {
        match self {
            Self::Item(item) => {
                NotificationPayload { item_id: Some(item.id.clone()), ..Default::default() }
            }
            Self::Book(book) => {
                NotificationPayload { book_id: Some(book.id.clone()), ..Default::default() }
            }
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
