// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message composition: draft state, attachment previews, and send validation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::Engine;

use crate::api::Attachment;
use crate::error::{ChatError, Result};

/// Tracks how many attachment previews are alive.
///
/// Previews are scoped resources: each [`PreviewHandle`] holds one and
/// gives it back when dropped, so the live count returns to zero on every
/// exit path (replace, remove, send, composer drop).
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn acquire(&self, attachment: &Attachment) -> PreviewHandle {
        self.live.fetch_add(1, Ordering::Relaxed);
        let data = base64::engine::general_purpose::STANDARD.encode(&attachment.bytes);
        PreviewHandle {
            data_url: format!("data:{};base64,{data}", attachment.content_type),
            live: Arc::clone(&self.live),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

/// A displayable preview of a picked image. Released on drop.
pub struct PreviewHandle {
    data_url: String,
    live: Arc<AtomicUsize>,
}

impl PreviewHandle {
    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("len", &self.data_url.len()).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Reject attachments that are not images or exceed `max_bytes`.
pub fn validate_attachment(attachment: &Attachment, max_bytes: usize) -> Result<()> {
    if !attachment.is_image() {
        return Err(ChatError::validation(format!(
            "attachment must be an image, got {}",
            attachment.content_type
        )));
    }
    if attachment.bytes.len() > max_bytes {
        return Err(ChatError::validation(format!(
            "attachment is {} bytes, limit is {max_bytes}",
            attachment.bytes.len()
        )));
    }
    Ok(())
}

/// A validated message ready for the REST send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    /// Validate before any network call. Whitespace-only content is empty.
    pub fn new(
        conversation_id: &str,
        content: Option<&str>,
        attachment: Option<Attachment>,
        max_attachment_bytes: usize,
    ) -> Result<Self> {
        let content = content.map(str::trim).filter(|c| !c.is_empty()).map(String::from);
        if content.is_none() && attachment.is_none() {
            return Err(ChatError::validation("message needs text or an attachment"));
        }
        if let Some(ref a) = attachment {
            validate_attachment(a, max_attachment_bytes)?;
        }
        Ok(Self { conversation_id: conversation_id.to_owned(), content, attachment })
    }
}

/// Draft state for the message being written.
#[derive(Debug)]
pub struct Composer {
    max_attachment_bytes: usize,
    previews: PreviewRegistry,
    content: String,
    attachment: Option<(Attachment, PreviewHandle)>,
    sending: bool,
}

impl Composer {
    pub fn new(max_attachment_bytes: usize, previews: PreviewRegistry) -> Self {
        Self {
            max_attachment_bytes,
            previews,
            content: String::new(),
            attachment: None,
            sending: false,
        }
    }

    pub fn set_content(&mut self, content: &str) {
        content.clone_into(&mut self.content);
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Pick an attachment, releasing the preview of any previous one.
    pub fn attach(&mut self, attachment: Attachment) -> Result<()> {
        validate_attachment(&attachment, self.max_attachment_bytes)?;
        let preview = self.previews.acquire(&attachment);
        self.attachment = Some((attachment, preview));
        Ok(())
    }

    pub fn remove_attachment(&mut self) -> bool {
        self.attachment.take().is_some()
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref().map(|(a, _)| a)
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.attachment.as_ref().map(|(_, p)| p)
    }

    /// Build an outgoing message from the current draft.
    pub fn draft_message(&self, conversation_id: &str) -> Result<OutgoingMessage> {
        OutgoingMessage::new(
            conversation_id,
            Some(&self.content),
            self.attachment().cloned(),
            self.max_attachment_bytes,
        )
    }

    /// Claim the single in-flight send slot.
    pub fn begin_send(&mut self) -> Result<()> {
        if self.sending {
            return Err(ChatError::validation("a message is already being sent"));
        }
        self.sending = true;
        Ok(())
    }

    /// Release the send slot. `sent` is the draft message that went out, if
    /// any; the parts of the draft still equal to it are cleared, and edits
    /// made while the send was in flight are kept.
    pub fn finish_send(&mut self, sent: Option<&OutgoingMessage>) {
        self.sending = false;
        let Some(sent) = sent else { return };
        if self.content.trim() == sent.content.as_deref().unwrap_or_default() {
            self.content.clear();
        }
        if self.attachment() == sent.attachment.as_ref() {
            self.attachment = None;
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Drop the draft and release its preview (composer unmount).
    pub fn reset(&mut self) {
        self.content.clear();
        self.attachment = None;
    }
}

#[cfg(test)]
#[path = "composer_tests.rs"]
mod tests;
