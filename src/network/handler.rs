// src/network/handler.rs

use crate::events::model::LogLevel;
use crate::network::events::emit_session_event;
use crate::network::session::Session;
use async_trait::async_trait;

/// Application-side hooks for a role server. The connection manager frames
/// and delivers lines; what a line means is up to the implementation.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_open(&self, _session: &Session) {}

    /// Handle one inbound line. A returned line is queued back to the sender.
    async fn on_message(&self, session: &Session, message: String) -> Option<String>;

    async fn on_close(&self, _session: &Session) {}
}

/// Records every inbound line as a debug session event and never replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn on_message(&self, session: &Session, message: String) -> Option<String> {
        emit_session_event(
            LogLevel::Debug,
            "message_received",
            session,
            Some(format!("bytes={}", message.len())),
        );
        None
    }
}
