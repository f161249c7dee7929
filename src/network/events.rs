use crate::events::{
    dispatcher,
    model::{LogEvent, LogLevel, NetworkEvent, SessionEvent, SweepEvent},
};
use crate::network::session::Session;

/// Emit a structured network event with optional console output suppression.
pub(crate) fn emit_network_event(
    component: &'static str,
    level: LogLevel,
    action: &str,
    addr: Option<String>,
    detail: Option<String>,
    allow_console: bool,
) {
    let mut meta = dispatcher::meta(component, level);
    meta.corr_id = Some(dispatcher::correlation_id());
    if !allow_console {
        meta.suppress_console = true;
    }
    dispatcher::emit(LogEvent::Network(NetworkEvent {
        meta,
        action: action.to_string(),
        addr,
        detail,
    }));
}

pub(crate) fn emit_session_event(
    level: LogLevel,
    action: &str,
    session: &Session,
    detail: Option<String>,
) {
    let meta = dispatcher::meta("session", level);
    dispatcher::emit(LogEvent::Session(SessionEvent {
        meta,
        action: action.to_string(),
        session_id: session.id(),
        listener_port: session.listener_port(),
        roles: session.roles(),
        class: session.class(),
        peer_addr: session.peer_addr().to_string(),
        detail,
    }));
}

pub(crate) fn emit_sweep_event(inspected: usize, expired: usize, already_closed: usize) {
    let level = if expired > 0 {
        LogLevel::Info
    } else {
        LogLevel::Debug
    };
    dispatcher::emit(LogEvent::Sweep(SweepEvent {
        meta: dispatcher::meta("sweeper", level),
        inspected,
        expired,
        already_closed,
    }));
}
