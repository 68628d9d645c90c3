// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the campus REST API.

use std::sync::Once;

use base64::Engine;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{ErrorCode, Result};
use crate::model::{
    Conversation, Message, MessagePage, NotificationHistory, UserSummary,
};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// An image picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self { file_name: file_name.into(), content_type: content_type.into(), bytes }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

#[derive(Serialize)]
struct AttachmentUpload<'a> {
    file_name: &'a str,
    content_type: &'a str,
    /// Standard base64.
    data: String,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<AttachmentUpload<'a>>,
}

/// HTTP client wrapper for the REST API, authenticated as one user.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, token: impl Into<String>) -> Self {
        ensure_crypto();
        let client = match Client::builder().timeout(config.request_timeout()).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(err = %e, "http client build failed, request timeout not applied");
                Client::default()
            }
        };
        Self {
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn url_with_query(&self, path: &str, pairs: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| ErrorCode::Network.to_error(format!("invalid api url: {e}")))?;
        url.query_pairs_mut().extend_pairs(pairs);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let resp = resp.error_for_status()?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn ack(resp: reqwest::Response) -> Result<()> {
        resp.error_for_status()?;
        Ok(())
    }

    /// List the current user's conversations.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let resp = self
            .client
            .get(self.url("/api/conversations"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Fetch the conversation with `other_user_id`, creating it if absent.
    pub async fn get_or_create_conversation(&self, other_user_id: &str) -> Result<Conversation> {
        let body = serde_json::json!({ "other_user_id": other_user_id });
        let resp = self
            .client
            .post(self.url("/api/conversations"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Fetch one page of history. Page 1 holds the newest messages.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage> {
        let path = format!("/api/conversations/{conversation_id}/messages");
        let page = page.to_string();
        let limit = limit.to_string();
        let url = self.url_with_query(&path, &[("page", &page), ("limit", &limit)])?;
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        Self::read_json(resp).await
    }

    /// Persist a message and return the server's copy.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: Option<&str>,
        attachment: Option<&Attachment>,
    ) -> Result<Message> {
        let body = SendMessageBody {
            content,
            attachment: attachment.map(|a| AttachmentUpload {
                file_name: &a.file_name,
                content_type: &a.content_type,
                data: base64::engine::general_purpose::STANDARD.encode(&a.bytes),
            }),
        };
        let resp = self
            .client
            .post(self.url(&format!("/api/conversations/{conversation_id}/messages")))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Mark every message in the conversation as read for the current user.
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/api/conversations/{conversation_id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ack(resp).await
    }

    pub async fn list_notifications(&self) -> Result<NotificationHistory> {
        let resp = self
            .client
            .get(self.url("/api/notifications"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/api/notifications/{id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ack(resp).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        let resp = self
            .client
            .put(self.url("/api/notifications/read-all"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ack(resp).await
    }

    pub async fn delete_notification(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/notifications/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ack(resp).await
    }

    /// Find users to start a conversation with.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>> {
        let url = self.url_with_query("/api/users/search", &[("q", query)])?;
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        Self::read_json(resp).await
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
