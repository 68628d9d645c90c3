// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel manager: the one persistent WebSocket per session.
//!
//! A background task owns the socket, reconnects with exponential backoff,
//! and reports lifecycle plus inbound events to the session dispatcher.  The
//! rest of the crate talks to it through a cloneable [`ChannelHandle`].

pub mod room;

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::model::Identity;
use crate::protocol::{build_ws_url, parse_server_event, ChannelEvent, ClientEvent};
use room::RoomTracker;

/// Requests from the session to the channel task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    Send(ClientEvent),
    JoinRoom(String),
    LeaveRoom,
}

/// Cloneable sender side of the channel task.
///
/// Sends never fail from the caller's point of view: a stopped channel only
/// means live features are degraded.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    pub fn send(&self, event: ClientEvent) {
        self.command(ChannelCommand::Send(event));
    }

    /// Enter a conversation room, leaving the current one first.
    pub fn join_room(&self, conversation_id: &str) {
        self.command(ChannelCommand::JoinRoom(conversation_id.to_owned()));
    }

    pub fn leave_room(&self) {
        self.command(ChannelCommand::LeaveRoom);
    }

    fn command(&self, cmd: ChannelCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::debug!("channel task stopped, command dropped");
        }
    }

    /// A handle wired to a bare receiver instead of a socket.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<ChannelCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Resolve a command against the room tracker into wire events.
///
/// While disconnected, room changes are only recorded (the resync after
/// reconnect re-enters the current room) and everything else is dropped.
pub fn apply_command(
    rooms: &mut RoomTracker,
    cmd: ChannelCommand,
    connected: bool,
) -> Vec<ClientEvent> {
    let events = match cmd {
        ChannelCommand::Send(event) => vec![event],
        ChannelCommand::JoinRoom(id) => rooms.join(&id),
        ChannelCommand::LeaveRoom => rooms.leave().into_iter().collect(),
    };
    if connected {
        return events;
    }
    for event in events.iter().filter(|e| !e.is_room_membership()) {
        tracing::debug!(?event, "channel offline, dropping event");
    }
    Vec::new()
}

/// Connect the channel for `identity` and spawn its background task.
///
/// Lifecycle and inbound events go to `events`; the task exits when `cancel`
/// fires or every [`ChannelHandle`] is dropped.
pub fn spawn_channel(
    config: &ClientConfig,
    identity: &Identity,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
) -> Result<ChannelHandle, ChatError> {
    let url = build_ws_url(&config.channel_url, &identity.token)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let task = ChannelTask {
        url,
        user_id: identity.user_id.clone(),
        initial_backoff: config.reconnect_initial(),
        max_backoff: config.reconnect_max(),
        commands: rx,
        events,
        cancel,
        rooms: RoomTracker::default(),
    };
    tokio::spawn(task.run());
    Ok(ChannelHandle { tx })
}

struct ChannelTask {
    url: String,
    user_id: String,
    initial_backoff: Duration,
    max_backoff: Duration,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
    rooms: RoomTracker,
}

/// Why one connection ended.
enum Exit {
    /// Socket dropped; reconnect after backoff.
    Lost,
    /// Cancelled or all handles gone; stop for good.
    Stop,
}

impl ChannelTask {
    async fn run(mut self) {
        let mut backoff = self.initial_backoff;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    backoff = self.initial_backoff; // reset on successful connect
                    tracing::debug!(user_id = %self.user_id, "channel connected");
                    let _ = self.events.send(ChannelEvent::Connected);

                    let exit = self.serve(ws_stream).await;
                    let _ = self.events.send(ChannelEvent::Disconnected);
                    if matches!(exit, Exit::Stop) {
                        break;
                    }
                    tracing::debug!(user_id = %self.user_id, "channel lost, reconnecting");
                }
                Err(e) => {
                    tracing::debug!(
                        user_id = %self.user_id,
                        err = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "channel connect failed, retrying"
                    );
                }
            }

            if !self.wait_backoff(backoff).await {
                break;
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }

        tracing::debug!(user_id = %self.user_id, "channel task stopped");
    }

    /// Pump one live connection until it drops or the task is stopped.
    async fn serve<S>(&mut self, ws_stream: S) -> Exit
    where
        S: Sink<Message, Error = tungstenite::Error>
            + futures_util::Stream<Item = Result<Message, tungstenite::Error>>
            + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        for event in self.rooms.resync(&self.user_id) {
            if send_frame(&mut write, &event).await.is_err() {
                return Exit::Lost;
            }
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Flush what was queued before shutdown (e.g. a final typing-stop).
                    while let Ok(cmd) = self.commands.try_recv() {
                        for event in apply_command(&mut self.rooms, cmd, true) {
                            let _ = send_frame(&mut write, &event).await;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return Exit::Stop;
                }
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        let _ = write.send(Message::Close(None)).await;
                        return Exit::Stop;
                    };
                    for event in apply_command(&mut self.rooms, cmd, true) {
                        if let Err(e) = send_frame(&mut write, &event).await {
                            tracing::debug!(err = %e, "channel write failed");
                            return Exit::Lost;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_server_event(text.as_str()) {
                                let _ = self.events.send(ChannelEvent::Server(event));
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!(user_id = %self.user_id, "channel closed by server");
                            return Exit::Lost;
                        }
                        Some(Err(e)) => {
                            tracing::debug!(
                                user_id = %self.user_id,
                                err = %e,
                                "channel read error"
                            );
                            return Exit::Lost;
                        }
                        _ => {} // ping/pong/binary ignored
                    }
                }
            }
        }
    }

    /// Sleep before the next connect attempt, still tracking room changes.
    /// Returns false when the task should stop instead of reconnecting.
    async fn wait_backoff(&mut self, backoff: Duration) -> bool {
        let sleep = tokio::time::sleep(backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { return false };
                    apply_command(&mut self.rooms, cmd, false);
                }
            }
        }
    }
}

async fn send_frame<W>(write: &mut W, event: &ClientEvent) -> Result<(), ChatError>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(event)
        .map_err(|e| ChatError::channel(format!("encode {event:?}: {e}")))?;
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| ChatError::channel(e.to_string()))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
