// src/error.rs

use crate::network::session::SessionId;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures surfaced by node startup and lifecycle control.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid node state: cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: crate::server::NodeState,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn config(msg: impl Into<String>) -> Self {
        ServerError::Configuration(msg.into())
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, ServerError::Bind { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ServerError::Configuration(_))
    }
}

/// Registry mutation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session id {0} already registered")]
    DuplicateId(SessionId),

    #[error("registry sealed for shutdown")]
    Sealed,
}

/// Per-session failures. These never leave the session's own task.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error("session {0} outbound queue is full")]
    Backpressure(SessionId),
}
