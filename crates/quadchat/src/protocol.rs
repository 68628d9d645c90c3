// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-channel wire protocol.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.
//! Event names are kebab-case; payload fields are snake_case.  Transport
//! lifecycle (connect/disconnect) is not on the wire and is reported to the
//! session as [`ChannelEvent::Connected`] / [`ChannelEvent::Disconnected`].

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ErrorCode};
use crate::model::{BookListing, ItemListing, Listing, Message};

// -- Outbound ----------------------------------------------------------------

/// Events the client sends over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Bind this connection to a user for presence and user-scoped pushes.
    Join { user_id: String },
    JoinConversation { conversation_id: String },
    LeaveConversation { conversation_id: String },
    /// Fan a server-confirmed message out to the other room members.
    SendMessage { conversation_id: String, message: Message },
    TypingStart { conversation_id: String, user_id: String },
    TypingStop { conversation_id: String, user_id: String },
    /// Ask the server for a fresh `presence-snapshot`.
    PresenceRequest,
}

impl ClientEvent {
    /// Room membership events are replayed on reconnect rather than dropped.
    pub fn is_room_membership(&self) -> bool {
        matches!(self, Self::JoinConversation { .. } | Self::LeaveConversation { .. })
    }
}

// -- Inbound -----------------------------------------------------------------

/// Events the server pushes over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    PresenceSnapshot { user_ids: Vec<String> },
    UserOnline { user_id: String },
    UserOffline { user_id: String },
    MessageDelivered { conversation_id: String, message: Message },
    UserTyping { conversation_id: String, user_id: String },
    UserStopTyping { conversation_id: String, user_id: String },
    NewItem(ItemListing),
    NewBook(BookListing),
}

impl ServerEvent {
    /// The listing carried by a `new-item` / `new-book` broadcast.
    pub fn listing(&self) -> Option<Listing> {
        match self {
            Self::NewItem(item) => Some(Listing::Item(item.clone())),
            Self::NewBook(book) => Some(Listing::Book(book.clone())),
            _ => None,
        }
    }
}

/// What the channel manager reports to the session dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}

/// Parse one inbound text frame.  Unknown or malformed events yield `None`.
pub fn parse_server_event(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            let name = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_default();
            tracing::debug!(event = %name, err = %e, "ignoring channel frame");
            None
        }
    }
}

/// Build the channel WebSocket URL from the configured endpoint.
///
/// `http(s)` schemes are rewritten to `ws(s)`; the bearer token is appended
/// as a `token` query parameter.
pub fn build_ws_url(channel_url: &str, token: &str) -> Result<String, ChatError> {
    let ws_base = if channel_url.starts_with("https://") {
        channel_url.replacen("https://", "wss://", 1)
    } else {
        channel_url.replacen("http://", "ws://", 1)
    };

    let mut url = reqwest::Url::parse(&ws_base).map_err(|e| {
        ErrorCode::Channel.to_error(format!("invalid channel url {channel_url:?}: {e}"))
    })?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
