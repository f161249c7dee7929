use crate::network::role::{PeerClass, RoleMask};
use crate::network::session::SessionId;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub ts: SystemTime,
    pub level: LogLevel,
    pub corr_id: Option<String>,
    /// Identifies this process run; distinct from connection sessions.
    pub run_id: String,
    pub component: &'static str,
    pub suppress_console: bool,
}

/// Listener-level activity (bind, accept, handshake, stop).
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub meta: EventMeta,
    pub action: String,
    pub addr: Option<String>,
    pub detail: Option<String>,
}

/// Lifecycle of one tracked connection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub meta: EventMeta,
    pub action: String,
    pub session_id: SessionId,
    pub listener_port: u16,
    pub roles: RoleMask,
    pub class: PeerClass,
    pub peer_addr: String,
    pub detail: Option<String>,
}

/// Summary of one idle sweep run.
#[derive(Debug, Clone, Serialize)]
pub struct SweepEvent {
    pub meta: EventMeta,
    pub inspected: usize,
    pub expired: usize,
    pub already_closed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Network(NetworkEvent),
    Session(SessionEvent),
    Sweep(SweepEvent),
    System(SystemEvent),
}

impl LogEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            LogEvent::Network(e) => &e.meta,
            LogEvent::Session(e) => &e.meta,
            LogEvent::Sweep(e) => &e.meta,
            LogEvent::System(e) => &e.meta,
        }
    }

    /// Action name for events that carry one.
    pub fn action(&self) -> Option<&str> {
        match self {
            LogEvent::Network(e) => Some(&e.action),
            LogEvent::Session(e) => Some(&e.action),
            LogEvent::System(e) => Some(&e.action),
            LogEvent::Sweep(_) => None,
        }
    }
}
