// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state and the channel event dispatcher's pure core.

use tokio::time::Instant;

use crate::composer::{Composer, PreviewRegistry};
use crate::config::ClientConfig;
use crate::directory::ConversationDirectory;
use crate::error::ChatError;
use crate::model::epoch_ms;
use crate::notifications::NotificationFeed;
use crate::presence::PresenceTracker;
use crate::protocol::{ChannelEvent, ServerEvent};
use crate::timeline::TimelineStore;
use crate::typing::RemoteTyping;

/// Push channel status as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Re-render signal broadcast to subscribers after state changes.
///
/// Carries which part changed, not the data; read it back through the
/// session accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Connection(ConnectionStatus),
    Presence,
    Typing,
    Conversations,
    Timeline,
    Composer,
    Notifications,
    /// A background operation failed; show a transient notice.
    Notice(ChatError),
    /// The backend rejected the credentials; redirect to login.
    AuthRequired,
}

/// What the dispatcher must do after applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify(SessionUpdate),
    /// Re-fetch the conversation list over REST.
    RefreshConversations,
}

/// Everything one session knows.
#[derive(Debug)]
pub struct SessionState {
    pub user_id: String,
    pub connection: ConnectionStatus,
    pub presence: PresenceTracker,
    pub directory: ConversationDirectory,
    pub timeline: TimelineStore,
    pub typing: RemoteTyping,
    pub notifications: NotificationFeed,
    pub composer: Composer,
}

impl SessionState {
    pub fn new(user_id: &str, config: &ClientConfig, previews: PreviewRegistry) -> Self {
        Self {
            user_id: user_id.to_owned(),
            connection: ConnectionStatus::Connecting,
            presence: PresenceTracker::default(),
            directory: ConversationDirectory::default(),
            timeline: TimelineStore::default(),
            typing: RemoteTyping::new(config.remote_typing_expiry()),
            notifications: NotificationFeed::default(),
            composer: Composer::new(config.max_attachment_bytes, previews),
        }
    }

    /// Apply one channel event and report the follow-up work.
    pub fn apply(&mut self, event: ChannelEvent, now: Instant) -> Vec<Effect> {
        match event {
            ChannelEvent::Connected => {
                self.connection = ConnectionStatus::Connected;
                // Anything delivered while offline only shows up via REST.
                vec![
                    Effect::Notify(SessionUpdate::Connection(ConnectionStatus::Connected)),
                    Effect::RefreshConversations,
                ]
            }
            ChannelEvent::Disconnected => {
                self.connection = ConnectionStatus::Disconnected;
                let mut effects =
                    vec![Effect::Notify(SessionUpdate::Connection(ConnectionStatus::Disconnected))];
                if self.presence.is_known() {
                    self.presence.reset();
                    effects.push(Effect::Notify(SessionUpdate::Presence));
                }
                if self.typing.clear() {
                    effects.push(Effect::Notify(SessionUpdate::Typing));
                }
                effects
            }
            ChannelEvent::Server(event) => self.apply_server(event, now),
        }
    }

    fn apply_server(&mut self, event: ServerEvent, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            ServerEvent::PresenceSnapshot { user_ids } => {
                self.presence.apply_snapshot(user_ids);
                effects.push(Effect::Notify(SessionUpdate::Presence));
            }
            ServerEvent::UserOnline { user_id } => {
                if self.presence.user_online(&user_id) {
                    effects.push(Effect::Notify(SessionUpdate::Presence));
                }
            }
            ServerEvent::UserOffline { user_id } => {
                if self.presence.user_offline(&user_id) {
                    effects.push(Effect::Notify(SessionUpdate::Presence));
                }
            }
            ServerEvent::MessageDelivered { conversation_id, message } => {
                if conversation_id != message.conversation_id {
                    tracing::debug!(
                        %conversation_id,
                        message_id = %message.id,
                        "room and message disagree"
                    );
                }
                let from_other = message.sender.id != self.user_id;
                if from_other && self.typing.stop(&message.conversation_id, &message.sender.id) {
                    effects.push(Effect::Notify(SessionUpdate::Typing));
                }
                if from_other {
                    self.notifications.push_message(&message, epoch_ms());
                    effects.push(Effect::Notify(SessionUpdate::Notifications));
                }
                if self.timeline.append(message) {
                    effects.push(Effect::Notify(SessionUpdate::Timeline));
                }
                effects.push(Effect::RefreshConversations);
            }
            ServerEvent::UserTyping { conversation_id, user_id } => {
                if user_id != self.user_id && self.typing.start(&conversation_id, &user_id, now) {
                    effects.push(Effect::Notify(SessionUpdate::Typing));
                }
            }
            ServerEvent::UserStopTyping { conversation_id, user_id } => {
                if user_id != self.user_id && self.typing.stop(&conversation_id, &user_id) {
                    effects.push(Effect::Notify(SessionUpdate::Typing));
                }
            }
            broadcast @ (ServerEvent::NewItem(_) | ServerEvent::NewBook(_)) => {
                if let Some(listing) = broadcast.listing() {
                    self.notifications.push_listing(&listing, epoch_ms());
                    effects.push(Effect::Notify(SessionUpdate::Notifications));
                }
            }
        }
        effects
    }

    /// Lapse remote typing flags whose stop event never came.
    pub fn expire_typing(&mut self, now: Instant) -> Vec<Effect> {
        if self.typing.expire(now) {
            vec![Effect::Notify(SessionUpdate::Typing)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
