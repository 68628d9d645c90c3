// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typing indicators: debounced local emission and remote typing state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelHandle;
use crate::protocol::ClientEvent;

/// A typing transition to announce for a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSignal {
    Start(String),
    Stop(String),
}

impl TypingSignal {
    pub fn into_event(self, user_id: &str) -> ClientEvent {
        let user_id = user_id.to_owned();
        match self {
            Self::Start(conversation_id) => ClientEvent::TypingStart { conversation_id, user_id },
            Self::Stop(conversation_id) => ClientEvent::TypingStop { conversation_id, user_id },
        }
    }
}

/// Local typing debouncer.
///
/// The first keystroke emits `Start` and every keystroke pushes one shared
/// inactivity deadline forward. `Stop` is emitted once when it passes.
/// While keystrokes keep coming, `Start` is repeated every `refresh` so the
/// remote flag does not lapse mid-burst.
#[derive(Debug)]
pub struct TypingEmitter {
    idle: Duration,
    refresh: Duration,
    active: Option<String>,
    last_start: Option<Instant>,
    deadline: Option<Instant>,
}

impl TypingEmitter {
    pub fn new(idle: Duration, refresh: Duration) -> Self {
        Self { idle, refresh, active: None, last_start: None, deadline: None }
    }

    pub fn keystroke(&mut self, conversation_id: &str, now: Instant) -> Vec<TypingSignal> {
        let mut out = Vec::new();
        if self.active.as_deref() != Some(conversation_id) {
            if let Some(prev) = self.active.take() {
                out.push(TypingSignal::Stop(prev));
            }
            self.active = Some(conversation_id.to_owned());
            self.last_start = Some(now);
            out.push(TypingSignal::Start(conversation_id.to_owned()));
        } else if self.last_start.is_some_and(|at| now.duration_since(at) >= self.refresh) {
            self.last_start = Some(now);
            out.push(TypingSignal::Start(conversation_id.to_owned()));
        }
        self.deadline = Some(now + self.idle);
        out
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Emit `Stop` if the inactivity deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.stop(),
            _ => None,
        }
    }

    /// Stop immediately (send, conversation switch, shutdown).
    pub fn stop(&mut self) -> Option<TypingSignal> {
        self.deadline = None;
        self.last_start = None;
        self.active.take().map(TypingSignal::Stop)
    }

    pub fn is_typing(&self) -> bool {
        self.active.is_some()
    }
}

/// Who is typing where, as reported by other users.
///
/// Flags are set on typing-start and cleared on typing-stop, and also lapse
/// after `expiry` without a refresh in case the stop event was lost.
#[derive(Debug)]
pub struct RemoteTyping {
    expiry: Duration,
    by_conversation: HashMap<String, HashMap<String, Instant>>,
}

impl RemoteTyping {
    pub fn new(expiry: Duration) -> Self {
        Self { expiry, by_conversation: HashMap::new() }
    }

    /// Returns whether the user was not already shown as typing.
    pub fn start(&mut self, conversation_id: &str, user_id: &str, now: Instant) -> bool {
        self.by_conversation
            .entry(conversation_id.to_owned())
            .or_default()
            .insert(user_id.to_owned(), now + self.expiry)
            .is_none()
    }

    pub fn stop(&mut self, conversation_id: &str, user_id: &str) -> bool {
        let Some(users) = self.by_conversation.get_mut(conversation_id) else {
            return false;
        };
        let removed = users.remove(user_id).is_some();
        if users.is_empty() {
            self.by_conversation.remove(conversation_id);
        }
        removed
    }

    /// Drop flags whose expiry has passed. Returns whether anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let mut changed = false;
        self.by_conversation.retain(|_, users| {
            let before = users.len();
            users.retain(|_, expires_at| *expires_at > now);
            changed |= users.len() != before;
            !users.is_empty()
        });
        changed
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.by_conversation.is_empty();
        self.by_conversation.clear();
        changed
    }

    pub fn is_typing(&self, conversation_id: &str, user_id: &str) -> bool {
        self.by_conversation.get(conversation_id).is_some_and(|u| u.contains_key(user_id))
    }

    /// Users typing in a conversation, sorted for stable display.
    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .by_conversation
            .get(conversation_id)
            .map(|u| u.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }
}

#[derive(Debug)]
enum TypingCommand {
    Keystroke(String),
    Stop,
}

/// Cloneable handle to the local typing task.
#[derive(Debug, Clone)]
pub struct TypingHandle {
    tx: mpsc::UnboundedSender<TypingCommand>,
}

impl TypingHandle {
    /// Record a local keystroke in `conversation_id`.
    pub fn keystroke(&self, conversation_id: &str) {
        let _ = self.tx.send(TypingCommand::Keystroke(conversation_id.to_owned()));
    }

    /// Emit typing-stop now if currently typing.
    pub fn stop(&self) {
        let _ = self.tx.send(TypingCommand::Stop);
    }
}

/// Spawn the task that turns keystrokes into typing-start/stop channel events.
///
/// One deadline is kept and re-armed per keystroke, so a burst of input
/// produces one stop, with a start at its beginning and every `refresh`.
pub fn spawn_typing(
    user_id: String,
    idle: Duration,
    refresh: Duration,
    channel: ChannelHandle,
    cancel: CancellationToken,
) -> TypingHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut emitter = TypingEmitter::new(idle, refresh);
        let emit = |signal: TypingSignal| channel.send(signal.into_event(&user_id));

        loop {
            let deadline = emitter.deadline();
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(signal) = emitter.stop() {
                        emit(signal);
                    }
                    break;
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(TypingCommand::Keystroke(conversation_id)) => {
                            for signal in emitter.keystroke(&conversation_id, Instant::now()) {
                                emit(signal);
                            }
                        }
                        Some(TypingCommand::Stop) => {
                            if let Some(signal) = emitter.stop() {
                                emit(signal);
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    if let Some(signal) = emitter.poll(Instant::now()) {
                        emit(signal);
                    }
                }
            }
        }
    });

    TypingHandle { tx }
}

#[cfg(test)]
#[path = "typing_tests.rs"]
mod tests;
