// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory campus backend: users, conversations, messages, notifications,
//! and the live channel connections that fan events out.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quadchat::model::{
    epoch_ms, AttachmentRef, Conversation, Message, MessagePage, MessagePreview,
    NotificationEntry, NotificationHistory, UserSummary,
};
use quadchat::protocol::{ClientEvent, ServerEvent};

/// Persistent data.
#[derive(Default)]
pub(crate) struct Store {
    pub users: BTreeMap<String, UserSummary>,
    conversations: Vec<Conversation>,
    /// Per conversation, oldest first.
    messages: HashMap<String, Vec<Message>>,
    notifications: HashMap<String, Vec<NotificationEntry>>,
    seq: u64,
    clock: u64,
}

impl Store {
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}-{}", self.seq)
    }

    /// Strictly increasing timestamps so ordering is never ambiguous.
    pub fn now(&mut self) -> u64 {
        self.clock = (self.clock + 1).max(epoch_ms());
        self.clock
    }

    pub fn is_user(&self, id: &str) -> bool {
        self.users.contains_key(id)
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> bool {
        self.conversations.iter().any(|c| c.id == conversation_id && c.includes(user_id))
    }

    fn participants(&self, conversation_id: &str) -> Vec<String> {
        self.conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| c.participants.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    /// The conversation as `me` sees it: unread count and last message filled in.
    fn view(&self, conversation: &Conversation, me: &str) -> Conversation {
        let messages = self.messages.get(&conversation.id);
        let last = messages.and_then(|m| m.last());
        let unread = messages
            .map(|m| m.iter().filter(|msg| msg.sender.id != me && !msg.read).count())
            .unwrap_or(0);
        Conversation {
            last_message: last.map(MessagePreview::of),
            unread_count: unread as u32,
            updated_at: last.map(|m| m.created_at).unwrap_or(conversation.created_at),
            ..conversation.clone()
        }
    }

    pub fn list_conversations(&self, me: &str) -> Vec<Conversation> {
        self.conversations.iter().filter(|c| c.includes(me)).map(|c| self.view(c, me)).collect()
    }

    /// Existing conversation for the pair, or a new one. `None` if `other` is unknown.
    pub fn get_or_create(&mut self, me: &str, other: &str) -> Option<Conversation> {
        if let Some(existing) =
            self.conversations.iter().find(|c| c.includes(me) && c.includes(other))
        {
            return Some(self.view(existing, me));
        }
        let a = self.users.get(me)?.clone();
        let b = self.users.get(other)?.clone();
        let now = self.now();
        let conversation = Conversation {
            id: self.next_id("conv"),
            participants: [a, b],
            last_message: None,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.conversations.push(conversation.clone());
        Some(conversation)
    }

    /// Page 1 is the newest `limit` messages; each page is oldest first.
    pub fn page(&self, conversation_id: &str, page: u32, limit: u32) -> MessagePage {
        let all = self.messages.get(conversation_id).map(Vec::as_slice).unwrap_or_default();
        let limit = limit.max(1) as usize;
        let skip = (page.max(1) as usize - 1) * limit;
        let end = all.len().saturating_sub(skip);
        let start = end.saturating_sub(limit);
        MessagePage {
            messages: all[start..end].to_vec(),
            page,
            has_more: start > 0,
            total: all.len() as u64,
        }
    }

    pub fn append_message(
        &mut self,
        conversation_id: &str,
        sender: &str,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> Option<Message> {
        let sender = self.users.get(sender)?.clone();
        let message = Message {
            id: self.next_id("msg"),
            conversation_id: conversation_id.to_owned(),
            sender,
            content,
            attachment,
            created_at: self.now(),
            read: false,
        };
        self.messages.entry(conversation_id.to_owned()).or_default().push(message.clone());
        Some(message)
    }

    pub fn mark_read(&mut self, conversation_id: &str, me: &str) -> usize {
        let Some(messages) = self.messages.get_mut(conversation_id) else {
            return 0;
        };
        let mut updated = 0;
        for message in messages.iter_mut().filter(|m| m.sender.id != me && !m.read) {
            message.read = true;
            updated += 1;
        }
        updated
    }

    pub fn unread_for(&self, conversation_id: &str, me: &str) -> u32 {
        self.conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| self.view(c, me).unread_count)
            .unwrap_or(0)
    }

    pub fn has_message(&self, conversation_id: &str, message_id: &str) -> bool {
        self.messages.get(conversation_id).is_some_and(|m| m.iter().any(|msg| msg.id == message_id))
    }

    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.messages.get(conversation_id).map_or(0, Vec::len)
    }

    pub fn add_notification(&mut self, user_id: &str, entry: NotificationEntry) {
        self.notifications.entry(user_id.to_owned()).or_default().push(entry);
    }

    pub fn notification_history(&self, user_id: &str) -> NotificationHistory {
        let mut notifications = self.notifications.get(user_id).cloned().unwrap_or_default();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let unread_count = notifications.iter().filter(|n| !n.read).count() as u32;
        NotificationHistory { notifications, unread_count }
    }

    /// Returns false if the entry does not exist.
    pub fn mark_notification_read(&mut self, user_id: &str, id: &str) -> bool {
        let entry =
            self.notifications.get_mut(user_id).and_then(|n| n.iter_mut().find(|e| e.id == id));
        match entry {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_notifications_read(&mut self, user_id: &str) {
        for entry in self.notifications.get_mut(user_id).into_iter().flatten() {
            entry.read = true;
        }
    }

    pub fn delete_notification(&mut self, user_id: &str, id: &str) -> bool {
        let Some(entries) = self.notifications.get_mut(user_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    pub fn notification(&self, user_id: &str, id: &str) -> Option<NotificationEntry> {
        self.notifications.get(user_id)?.iter().find(|e| e.id == id).cloned()
    }
}

/// One live channel connection.
struct Conn {
    /// Authenticated by the handshake token.
    user_id: String,
    /// Set once the client sent `join`.
    joined: bool,
    room: Option<String>,
    tx: mpsc::UnboundedSender<ServerEvent>,
    kill: CancellationToken,
}

/// Shared backend state behind the router.
#[derive(Default)]
pub(crate) struct Backend {
    pub store: Mutex<Store>,
    conns: Mutex<HashMap<u64, Conn>>,
    next_conn: AtomicU64,
    pub rest_calls: AtomicUsize,
    /// While set, channel upgrades are refused.
    pub refuse_channel: AtomicBool,
    /// Every client frame received, tagged with the sender's user id.
    pub frames: Mutex<Vec<(String, ClientEvent)>>,
}

impl Backend {
    pub fn register(
        &self,
        user_id: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
        kill: CancellationToken,
    ) -> u64 {
        let id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let conn = Conn { user_id: user_id.to_owned(), joined: false, room: None, tx, kill };
        self.conns.lock().insert(id, conn);
        id
    }

    pub fn unregister(&self, conn_id: u64) {
        let mut conns = self.conns.lock();
        let Some(conn) = conns.remove(&conn_id) else {
            return;
        };
        let still_online = conns.values().any(|c| c.joined && c.user_id == conn.user_id);
        if conn.joined && !still_online {
            let event = ServerEvent::UserOffline { user_id: conn.user_id.clone() };
            for other in conns.values().filter(|c| c.joined) {
                let _ = other.tx.send(event.clone());
            }
        }
    }

    pub fn online_users(&self) -> Vec<String> {
        let conns = self.conns.lock();
        let online: BTreeSet<&str> =
            conns.values().filter(|c| c.joined).map(|c| c.user_id.as_str()).collect();
        online.into_iter().map(String::from).collect()
    }

    /// Close every connection of `user_id`. Returns how many were open.
    pub fn drop_connections(&self, user_id: &str) -> usize {
        let conns = self.conns.lock();
        let mut dropped = 0;
        for conn in conns.values().filter(|c| c.user_id == user_id) {
            conn.kill.cancel();
            dropped += 1;
        }
        dropped
    }

    pub fn drop_all(&self) {
        for conn in self.conns.lock().values() {
            conn.kill.cancel();
        }
    }

    /// Send to every joined connection.
    pub fn broadcast(&self, event: &ServerEvent) {
        for conn in self.conns.lock().values().filter(|c| c.joined) {
            let _ = conn.tx.send(event.clone());
        }
    }

    /// Fan a stored message out to the room and to the participants'
    /// user-scoped connections, each connection at most once.
    pub fn deliver(&self, message: &Message) {
        let participants = self.store.lock().participants(&message.conversation_id);
        let event = ServerEvent::MessageDelivered {
            conversation_id: message.conversation_id.clone(),
            message: message.clone(),
        };
        for conn in self.conns.lock().values() {
            let in_room = conn.room.as_deref() == Some(message.conversation_id.as_str());
            let recipient = conn.joined && participants.contains(&conn.user_id);
            if in_room || recipient {
                let _ = conn.tx.send(event.clone());
            }
        }
    }

    pub fn on_client_event(&self, conn_id: u64, event: ClientEvent) {
        let Some(user_id) = self.conns.lock().get(&conn_id).map(|c| c.user_id.clone()) else {
            return;
        };
        self.frames.lock().push((user_id.clone(), event.clone()));

        match event {
            ClientEvent::Join { .. } => self.join(conn_id, &user_id),
            ClientEvent::PresenceRequest => {
                let snapshot = ServerEvent::PresenceSnapshot { user_ids: self.online_users() };
                if let Some(conn) = self.conns.lock().get(&conn_id) {
                    let _ = conn.tx.send(snapshot);
                }
            }
            ClientEvent::JoinConversation { conversation_id } => {
                if !self.store.lock().is_participant(&conversation_id, &user_id) {
                    tracing::debug!(%conversation_id, %user_id, "join refused: not a participant");
                    return;
                }
                if let Some(conn) = self.conns.lock().get_mut(&conn_id) {
                    conn.room = Some(conversation_id);
                }
            }
            ClientEvent::LeaveConversation { conversation_id } => {
                if let Some(conn) = self.conns.lock().get_mut(&conn_id) {
                    if conn.room.as_deref() == Some(conversation_id.as_str()) {
                        conn.room = None;
                    }
                }
            }
            ClientEvent::SendMessage { message, .. } => {
                // Only relay messages the store actually holds.
                let stored = self.store.lock().has_message(&message.conversation_id, &message.id);
                if stored && message.sender.id == user_id {
                    self.deliver(&message);
                }
            }
            ClientEvent::TypingStart { conversation_id, .. } => {
                let event =
                    ServerEvent::UserTyping { conversation_id: conversation_id.clone(), user_id };
                self.to_room(&conversation_id, conn_id, &event);
            }
            ClientEvent::TypingStop { conversation_id, .. } => {
                let event = ServerEvent::UserStopTyping {
                    conversation_id: conversation_id.clone(),
                    user_id,
                };
                self.to_room(&conversation_id, conn_id, &event);
            }
        }
    }

    fn join(&self, conn_id: u64, user_id: &str) {
        let mut conns = self.conns.lock();
        let was_online = conns.values().any(|c| c.joined && c.user_id == user_id);
        if let Some(conn) = conns.get_mut(&conn_id) {
            conn.joined = true;
        }
        if was_online {
            return;
        }
        let event = ServerEvent::UserOnline { user_id: user_id.to_owned() };
        for (id, other) in conns.iter() {
            if *id != conn_id && other.joined {
                let _ = other.tx.send(event.clone());
            }
        }
    }

    fn to_room(&self, conversation_id: &str, except: u64, event: &ServerEvent) {
        for (id, conn) in self.conns.lock().iter() {
            if *id != except && conn.room.as_deref() == Some(conversation_id) {
                let _ = conn.tx.send(event.clone());
            }
        }
    }
}
