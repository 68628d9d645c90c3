// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quadchat: realtime direct messaging for the campus platform.
//!
//! A [`ChatSession`] owns one user's REST client, push channel, typing
//! task, and conversation state.  Channel events and REST results are
//! reconciled in one place and announced as [`SessionUpdate`]s.

pub mod api;
pub mod channel;
pub mod composer;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod model;
pub mod notifications;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod timeline;
pub mod typing;

pub use api::Attachment;
pub use config::ClientConfig;
pub use error::{ChatError, ErrorCode};
pub use model::Identity;
pub use session::{ChatSession, ConnectionStatus, SessionUpdate};
