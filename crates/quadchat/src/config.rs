// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Configuration for a messaging client session.
///
/// Derives `clap::Args` so a host binary can flatten it into its own CLI;
/// [`ClientConfig::from_env`] resolves it from `QUADCHAT_*` variables alone.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the REST API (e.g. `https://campus.example/`).
    #[arg(long, default_value = "http://127.0.0.1:5000", env = "QUADCHAT_API_URL")]
    pub api_url: String,

    /// Push channel endpoint. `http(s)` URLs are rewritten to `ws(s)`.
    #[arg(long, default_value = "ws://127.0.0.1:5000/ws", env = "QUADCHAT_CHANNEL_URL")]
    pub channel_url: String,

    /// Messages fetched per timeline page.
    #[arg(long, default_value_t = 50, env = "QUADCHAT_PAGE_SIZE")]
    pub page_size: u32,

    /// Local inactivity before typing-stop is emitted, in milliseconds.
    #[arg(long, default_value_t = 3000, env = "QUADCHAT_TYPING_IDLE_MS")]
    pub typing_idle_ms: u64,

    /// Remote typing flags expire after this long without a refresh, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "QUADCHAT_REMOTE_TYPING_EXPIRY_MS")]
    pub remote_typing_expiry_ms: u64,

    /// While typing continues, typing-start is re-sent this often, in
    /// milliseconds. Keep it below `remote_typing_expiry_ms`.
    #[arg(long, default_value_t = 2000, env = "QUADCHAT_TYPING_REFRESH_MS")]
    pub typing_refresh_ms: u64,

    /// REST request timeout in milliseconds.
    #[arg(long, default_value_t = 10000, env = "QUADCHAT_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// First reconnect delay in milliseconds; doubles up to `reconnect_max_ms`.
    #[arg(long, default_value_t = 100, env = "QUADCHAT_RECONNECT_INITIAL_MS")]
    pub reconnect_initial_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds.
    #[arg(long, default_value_t = 5000, env = "QUADCHAT_RECONNECT_MAX_MS")]
    pub reconnect_max_ms: u64,

    /// Largest image attachment accepted by the composer, in bytes.
    #[arg(long, default_value_t = 5 * 1024 * 1024, env = "QUADCHAT_MAX_ATTACHMENT_BYTES")]
    pub max_attachment_bytes: usize,
}

#[derive(Parser)]
#[command(name = "quadchat", no_binary_name = true)]
struct EnvOnly {
    #[command(flatten)]
    config: ClientConfig,
}

impl ClientConfig {
    /// Resolve the configuration from environment variables and defaults.
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvOnly::try_parse_from(std::iter::empty::<String>()).map(|e| e.config)
    }

    /// Configuration pointing at the given endpoints with every other field defaulted.
    pub fn with_endpoints(api_url: impl Into<String>, channel_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            channel_url: channel_url.into(),
            page_size: 50,
            typing_idle_ms: 3000,
            remote_typing_expiry_ms: 5000,
            typing_refresh_ms: 2000,
            request_timeout_ms: 10000,
            reconnect_initial_ms: 100,
            reconnect_max_ms: 5000,
            max_attachment_bytes: 5 * 1024 * 1024,
        }
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn remote_typing_expiry(&self) -> Duration {
        Duration::from_millis(self.remote_typing_expiry_ms)
    }

    pub fn typing_refresh(&self) -> Duration {
        Duration::from_millis(self.typing_refresh_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// At least 1 ms; a zero delay would never grow under doubling.
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        self.reconnect_initial().max(Duration::from_millis(self.reconnect_max_ms))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
