// src/network/session.rs

use crate::constants::SESSION_OUTBOUND_CAPACITY;
use crate::error::SessionError;
use crate::network::role::{IdleBudget, PeerClass, RoleMask};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-scoped session identifier. Never reused for the lifetime of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(v: u64) -> Self {
        SessionId(v)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// This call initiated the close.
    Closed,
    /// Someone else closed it first. Benign.
    AlreadyClosed,
}

/// One accepted connection and its idle state.
pub struct Session {
    id: SessionId,
    listener_port: u16,
    roles: RoleMask,
    class: PeerClass,
    peer_addr: SocketAddr,
    idle_interval: Duration,
    created: Instant,
    // ms offset from `created`; written only by the session's own I/O loop
    deadline_ms: AtomicU64,
    messages_in: AtomicU64,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        listener_port: u16,
        roles: RoleMask,
        peer_addr: SocketAddr,
        budget: &IdleBudget,
    ) -> Self {
        let class = roles.peer_class();
        let idle_interval = budget.for_class(class);
        let (close_tx, _) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(SESSION_OUTBOUND_CAPACITY);
        Self {
            id,
            listener_port,
            roles,
            class,
            peer_addr,
            idle_interval,
            created: Instant::now(),
            deadline_ms: AtomicU64::new(idle_interval.as_millis() as u64),
            messages_in: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            close_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Port of the listener that accepted this session.
    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    pub fn roles(&self) -> RoleMask {
        self.roles
    }

    pub fn class(&self) -> PeerClass {
        self.class
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    /// Record inbound traffic: the deadline moves to `now + idle_interval`.
    pub fn touch(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.created) + self.idle_interval;
        self.deadline_ms
            .fetch_max(offset.as_millis() as u64, Ordering::Release);
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deadline(&self) -> Instant {
        self.created + Duration::from_millis(self.deadline_ms.load(Ordering::Acquire))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline()
    }

    pub fn messages_in(&self) -> u64 {
        self.messages_in.load(Ordering::Relaxed)
    }

    /// Request the session to close. Idempotent; only the first caller sees
    /// `CloseStatus::Closed`. The I/O loop observes the signal and deregisters.
    pub fn close(&self) -> CloseStatus {
        if self.closed.swap(true, Ordering::AcqRel) {
            return CloseStatus::AlreadyClosed;
        }
        self.close_tx.send_replace(true);
        CloseStatus::Closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receiver that flips to `true` once `close()` has been called.
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    /// Queue a line for the session's writer task.
    pub fn send(&self, line: impl Into<String>) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        self.outbound_tx.try_send(line.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::Backpressure(self.id),
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed(self.id),
        })
    }

    /// Hand the outbound queue to the writer task. Only the first call gets it.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<String>> {
        self.outbound_rx.lock().take()
    }

    pub fn info(&self) -> SessionInfo {
        let now = Instant::now();
        SessionInfo {
            id: self.id,
            listener_port: self.listener_port,
            roles: self.roles,
            class: self.class,
            peer_addr: self.peer_addr,
            idle_remaining_ms: self
                .deadline()
                .saturating_duration_since(now)
                .as_millis() as u64,
            messages_in: self.messages_in(),
            closed: self.is_closed(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("listener_port", &self.listener_port)
            .field("roles", &self.roles)
            .field("class", &self.class)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Point-in-time copy of a session for status callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub listener_port: u16,
    pub roles: RoleMask,
    pub class: PeerClass,
    pub peer_addr: SocketAddr,
    pub idle_remaining_ms: u64,
    pub messages_in: u64,
    pub closed: bool,
}
