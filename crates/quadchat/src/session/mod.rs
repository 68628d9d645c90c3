// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The chat session: one authenticated user's REST client, push channel,
//! typing task, and state, owned together.
//!
//! Channel events flow through a single dispatcher task into
//! [`SessionState::apply`].  REST-driven operations mutate the same state
//! under a short lock that is never held across an await.  Every change is
//! announced on a [`SessionUpdate`] broadcast.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, Attachment};
use crate::channel::{spawn_channel, ChannelHandle};
use crate::composer::{OutgoingMessage, PreviewRegistry};
use crate::config::ClientConfig;
use crate::error::{ChatError, ErrorCode, Result};
use crate::model::{
    Conversation, Identity, Message, NavTarget, NotificationEntry, UserSummary,
};
use crate::notifications::is_local_id;
use crate::protocol::{ChannelEvent, ClientEvent};
use crate::typing::{spawn_typing, TypingHandle};

pub use state::{ConnectionStatus, Effect, SessionState, SessionUpdate};

/// How often remote typing flags are checked for expiry.
const TYPING_EXPIRY_TICK: Duration = Duration::from_millis(250);

/// Pieces shared between the session handle and its dispatcher task.
struct Shared {
    api: ApiClient,
    state: Mutex<SessionState>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl Shared {
    fn notify(&self, update: SessionUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }

    /// Announce a failed call: auth failures redirect, the rest are returned.
    fn surface(&self, err: &ChatError) {
        if err.code == ErrorCode::Unauthorized {
            self.notify(SessionUpdate::AuthRequired);
        }
    }

    async fn refresh_conversations(&self) -> Result<()> {
        let ticket = self.state.lock().directory.begin_refresh();
        self.notify(SessionUpdate::Conversations);

        let result = self.api.list_conversations().await;
        let outcome = {
            let mut state = self.state.lock();
            match result {
                Ok(list) => {
                    if !state.directory.apply_refresh(ticket, list) {
                        tracing::debug!("discarding stale conversation list");
                    }
                    Ok(())
                }
                Err(e) => {
                    state.directory.fail_refresh(ticket);
                    Err(e)
                }
            }
        };
        self.notify(SessionUpdate::Conversations);
        if let Err(ref e) = outcome {
            self.surface(e);
        }
        outcome
    }

    fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(update) => self.notify(update),
                Effect::RefreshConversations => {
                    let shared = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = shared.refresh_conversations().await {
                            tracing::warn!(err = %e, "conversation refresh failed");
                            if e.code != ErrorCode::Unauthorized {
                                shared.notify(SessionUpdate::Notice(e));
                            }
                        }
                    });
                }
            }
        }
    }
}

/// A running messaging session for one user.
///
/// Dropping the session (or calling [`ChatSession::shutdown`]) closes the
/// channel and stops the background tasks.
pub struct ChatSession {
    config: ClientConfig,
    identity: Identity,
    shared: Arc<Shared>,
    channel: ChannelHandle,
    typing: TypingHandle,
    previews: PreviewRegistry,
    cancel: CancellationToken,
}

impl ChatSession {
    /// Connect the channel and spawn the session's tasks.
    ///
    /// Must be called from within a tokio runtime.  The conversation list is
    /// not fetched until [`load_conversations`](Self::load_conversations) or
    /// the first channel connect.
    pub fn start(config: ClientConfig, identity: Identity) -> Result<Self> {
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = spawn_channel(&config, &identity, event_tx, cancel.child_token())?;
        let typing = spawn_typing(
            identity.user_id.clone(),
            config.typing_idle(),
            config.typing_refresh(),
            channel.clone(),
            cancel.child_token(),
        );

        let previews = PreviewRegistry::default();
        let (updates, _) = broadcast::channel(256);
        let shared = Arc::new(Shared {
            api: ApiClient::new(&config, identity.token.clone()),
            state: Mutex::new(SessionState::new(&identity.user_id, &config, previews.clone())),
            updates,
        });

        tokio::spawn(dispatch(Arc::clone(&shared), event_rx, cancel.child_token()));
        tracing::info!(user_id = %identity.user_id, "chat session started");

        Ok(Self { config, identity, shared, channel, typing, previews, cancel })
    }

    /// Subscribe to re-render signals.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.updates.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- Conversation directory ----------------------------------------------

    /// Fetch the conversation list, replacing the directory.
    pub async fn load_conversations(&self) -> Result<()> {
        self.shared.refresh_conversations().await
    }

    /// Open (or create) the direct conversation with `other_user_id`.
    /// Calling it twice yields the same conversation.
    pub async fn get_or_create(&self, other_user_id: &str) -> Result<Conversation> {
        let other = other_user_id.trim();
        if other.is_empty() || other == self.identity.user_id {
            return Err(ChatError::validation("pick another user to message"));
        }
        let conversation = self
            .shared
            .api
            .get_or_create_conversation(other)
            .await
            .inspect_err(|e| self.shared.surface(e))?;
        self.shared.state.lock().directory.upsert(conversation.clone());
        self.shared.notify(SessionUpdate::Conversations);
        Ok(conversation)
    }

    /// Make `conversation_id` active: load its newest page, join its room,
    /// and mark it read.
    pub async fn select(&self, conversation_id: &str) -> Result<()> {
        self.typing.stop();
        let ticket = {
            let mut state = self.shared.state.lock();
            state.directory.set_active(Some(conversation_id));
            state.timeline.begin_load(conversation_id)
        };
        self.shared.notify(SessionUpdate::Conversations);
        self.shared.notify(SessionUpdate::Timeline);
        self.channel.join_room(conversation_id);

        let result =
            self.shared.api.list_messages(conversation_id, 1, self.config.page_size).await;
        let applied = {
            let mut state = self.shared.state.lock();
            match result {
                Ok(page) => Ok(state.timeline.apply_page(&ticket, page)),
                Err(e) => {
                    state.timeline.fail_load(&ticket);
                    Err(e)
                }
            }
        };
        self.shared.notify(SessionUpdate::Timeline);
        let applied = applied.inspect_err(|e| {
            tracing::warn!(%conversation_id, err = %e, "message page load failed");
            self.shared.surface(e);
        })?;
        if !applied {
            // The user moved on while the page was in flight.
            return Ok(());
        }

        self.shared
            .api
            .mark_conversation_read(conversation_id)
            .await
            .inspect_err(|e| self.shared.surface(e))?;
        {
            let mut state = self.shared.state.lock();
            if state.timeline.is_current(&ticket) {
                state.timeline.mark_read();
            }
            state.directory.clear_unread(conversation_id);
        }
        self.shared.notify(SessionUpdate::Conversations);
        self.shared.notify(SessionUpdate::Timeline);
        Ok(())
    }

    /// Fetch the next older page of the open conversation.
    /// Returns false when there is nothing more to load.
    pub async fn load_older(&self) -> Result<bool> {
        let Some(ticket) = self.shared.state.lock().timeline.begin_older() else {
            return Ok(false);
        };
        self.shared.notify(SessionUpdate::Timeline);

        let result = self
            .shared
            .api
            .list_messages(ticket.conversation_id(), ticket.page(), self.config.page_size)
            .await;
        let applied = {
            let mut state = self.shared.state.lock();
            match result {
                Ok(page) => Ok(state.timeline.apply_page(&ticket, page)),
                Err(e) => {
                    state.timeline.fail_load(&ticket);
                    Err(e)
                }
            }
        };
        self.shared.notify(SessionUpdate::Timeline);
        applied.inspect_err(|e| self.shared.surface(e))
    }

    /// Close the open conversation and leave its room.
    pub fn close(&self) {
        self.typing.stop();
        {
            let mut state = self.shared.state.lock();
            state.directory.set_active(None);
            state.timeline.clear();
            state.composer.reset();
        }
        self.channel.leave_room();
        self.shared.notify(SessionUpdate::Conversations);
        self.shared.notify(SessionUpdate::Timeline);
        self.shared.notify(SessionUpdate::Composer);
    }

    // -- Composer --------------------------------------------------------------

    /// Send a message. Rejected without a network call when it has neither
    /// text nor attachment.
    pub async fn send(
        &self,
        conversation_id: &str,
        content: Option<&str>,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let outgoing = OutgoingMessage::new(
            conversation_id,
            content,
            attachment,
            self.config.max_attachment_bytes,
        )?;
        self.deliver(outgoing, false).await
    }

    /// Send the composer's draft; on success the draft is cleared.
    pub async fn send_draft(&self, conversation_id: &str) -> Result<Message> {
        let outgoing = self.shared.state.lock().composer.draft_message(conversation_id)?;
        self.deliver(outgoing, true).await
    }

    async fn deliver(&self, outgoing: OutgoingMessage, from_draft: bool) -> Result<Message> {
        self.shared.state.lock().composer.begin_send()?;
        self.shared.notify(SessionUpdate::Composer);

        let result = self
            .shared
            .api
            .send_message(
                &outgoing.conversation_id,
                outgoing.content.as_deref(),
                outgoing.attachment.as_ref(),
            )
            .await;

        let message = {
            let mut state = self.shared.state.lock();
            let sent = (from_draft && result.is_ok()).then_some(&outgoing);
            state.composer.finish_send(sent);
            match result {
                Ok(message) => {
                    state.timeline.append(message.clone());
                    state.directory.record_message(&message);
                    Ok(message)
                }
                Err(e) => Err(e),
            }
        };
        self.shared.notify(SessionUpdate::Composer);

        let message = message.inspect_err(|e| {
            tracing::warn!(conversation_id = %outgoing.conversation_id, err = %e, "send failed");
            self.shared.surface(e);
        })?;
        self.typing.stop();
        self.channel.send(ClientEvent::SendMessage {
            conversation_id: outgoing.conversation_id,
            message: message.clone(),
        });
        self.shared.notify(SessionUpdate::Timeline);
        self.shared.notify(SessionUpdate::Conversations);
        Ok(message)
    }

    /// Update the draft text and register a keystroke for typing indicators.
    pub fn compose(&self, conversation_id: &str, content: &str) {
        self.shared.state.lock().composer.set_content(content);
        self.typing.keystroke(conversation_id);
        self.shared.notify(SessionUpdate::Composer);
    }

    /// Register a keystroke without touching the draft.
    pub fn keystroke(&self, conversation_id: &str) {
        self.typing.keystroke(conversation_id);
    }

    pub fn attach(&self, attachment: Attachment) -> Result<()> {
        self.shared.state.lock().composer.attach(attachment)?;
        self.shared.notify(SessionUpdate::Composer);
        Ok(())
    }

    pub fn remove_attachment(&self) {
        if self.shared.state.lock().composer.remove_attachment() {
            self.shared.notify(SessionUpdate::Composer);
        }
    }

    /// Data URL of the picked attachment, for rendering before send.
    pub fn attachment_preview(&self) -> Option<String> {
        self.with_state(|s| s.composer.preview().map(|p| p.data_url().to_owned()))
    }

    /// Number of attachment previews currently held.
    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }

    // -- Users -----------------------------------------------------------------

    /// Search users to start a conversation with. The caller is excluded.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut users =
            self.shared.api.search_users(query).await.inspect_err(|e| self.shared.surface(e))?;
        users.retain(|u| u.id != self.identity.user_id);
        Ok(users)
    }

    // -- Notifications ---------------------------------------------------------

    /// Fetch notification history and the authoritative unread count.
    pub async fn load_notifications(&self) -> Result<()> {
        let history =
            self.shared.api.list_notifications().await.inspect_err(|e| self.shared.surface(e))?;
        self.shared.state.lock().notifications.load(history);
        self.shared.notify(SessionUpdate::Notifications);
        Ok(())
    }

    /// Mark one entry read. Local state changes first and is not rolled back
    /// if the server call fails.
    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let changed = self.shared.state.lock().notifications.mark_read(id);
        if !changed {
            return Ok(());
        }
        self.shared.notify(SessionUpdate::Notifications);
        self.sync_read(id).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        if self.shared.state.lock().notifications.mark_all_read() {
            self.shared.notify(SessionUpdate::Notifications);
        }
        self.shared
            .api
            .mark_all_notifications_read()
            .await
            .inspect_err(|e| self.report_notification_failure(e))
    }

    pub async fn delete_notification(&self, id: &str) -> Result<()> {
        if self.shared.state.lock().notifications.delete(id).is_none() {
            return Ok(());
        }
        self.shared.notify(SessionUpdate::Notifications);
        if is_local_id(id) {
            return Ok(());
        }
        self.shared
            .api
            .delete_notification(id)
            .await
            .inspect_err(|e| self.report_notification_failure(e))
    }

    /// Mark an entry read and resolve where it navigates to.
    pub async fn open_notification(&self, id: &str) -> Result<Option<NavTarget>> {
        let (was_unread, target) = {
            let mut state = self.shared.state.lock();
            let was_unread = state.notifications.entry(id).is_some_and(|e| !e.read);
            (was_unread, state.notifications.open(id))
        };
        if was_unread {
            self.shared.notify(SessionUpdate::Notifications);
            self.sync_read(id).await?;
        }
        Ok(target)
    }

    async fn sync_read(&self, id: &str) -> Result<()> {
        if is_local_id(id) {
            return Ok(());
        }
        self.shared
            .api
            .mark_notification_read(id)
            .await
            .inspect_err(|e| self.report_notification_failure(e))
    }

    fn report_notification_failure(&self, err: &ChatError) {
        tracing::warn!(err = %err, "notification sync failed");
        self.shared.surface(err);
        if err.code != ErrorCode::Unauthorized {
            self.shared.notify(SessionUpdate::Notice(err.clone()));
        }
    }

    // -- Read access -------------------------------------------------------------

    /// Run `f` against the current state. Keep it short; the dispatcher
    /// waits on the same lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&*self.shared.state.lock())
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.with_state(|s| s.connection)
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.with_state(|s| s.directory.conversations().to_vec())
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.with_state(|s| s.directory.active_id().map(String::from))
    }

    pub fn messages(&self) -> Vec<Message> {
        self.with_state(|s| s.timeline.messages().to_vec())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.with_state(|s| s.presence.is_online(user_id))
    }

    pub fn presence_known(&self) -> bool {
        self.with_state(|s| s.presence.is_known())
    }

    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.with_state(|s| s.typing.typing_users(conversation_id))
    }

    pub fn notifications(&self) -> Vec<NotificationEntry> {
        self.with_state(|s| s.notifications.entries().to_vec())
    }

    pub fn unread_notifications(&self) -> u32 {
        self.with_state(|s| s.notifications.unread_count())
    }

    pub fn is_loading_conversations(&self) -> bool {
        self.with_state(|s| s.directory.is_loading())
    }

    pub fn is_loading_messages(&self) -> bool {
        self.with_state(|s| s.timeline.is_loading())
    }

    pub fn is_sending(&self) -> bool {
        self.with_state(|s| s.composer.is_sending())
    }

    // -- Lifecycle ---------------------------------------------------------------

    /// Stop typing, release the draft, close the channel and stop all tasks.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.typing.stop();
        self.shared.state.lock().composer.reset();
        self.cancel.cancel();
        tracing::info!(user_id = %self.identity.user_id, "chat session stopped");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Single consumer of channel events.
async fn dispatch(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(TYPING_EXPIRY_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, ChannelEvent::Connected | ChannelEvent::Disconnected) {
                    tracing::debug!(?event, "channel lifecycle");
                }
                let effects = shared.state.lock().apply(event, Instant::now());
                shared.run_effects(effects);
            }
            _ = tick.tick() => {
                let effects = shared.state.lock().expire_typing(Instant::now());
                shared.run_effects(effects);
            }
        }
    }
}
