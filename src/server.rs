// src/server.rs

use crate::config::Config;
use crate::error::ServerError;
use crate::events::dispatcher::emit_system_event;
use crate::events::model::LogLevel;
use crate::identity::NodeIdentifier;
use crate::network::handler::MessageHandler;
use crate::network::listener::{ListenerContext, ListenerInfo, RoleListener};
use crate::network::registry::SessionRegistry;
use crate::network::relay::RelayList;
use crate::network::session::{CloseStatus, SessionInfo};
use crate::network::sweeper::IdleSweeper;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a node server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl NodeState {
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Initializing => "initializing",
            NodeState::Running => "running",
            NodeState::ShuttingDown => "shutting_down",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

fn log_system(level: LogLevel, action: &str, detail: Option<String>) {
    emit_system_event("server", level, action, detail);
}

/// Owns the listeners, the shared session registry, the sweeper and the
/// node identifier, and orders startup and shutdown across them.
pub struct NodeServer {
    config: Config,
    handler: Arc<dyn MessageHandler>,
    // used when no public key is configured; fixed for this server's lifetime
    ephemeral_key: [u8; 16],
    state: RwLock<NodeState>,
    control: tokio::sync::Mutex<()>,
    node_id: RwLock<Option<NodeIdentifier>>,
    registry: RwLock<SessionRegistry>,
    listeners: RwLock<BTreeMap<u16, Arc<RoleListener>>>,
    relays: RwLock<Option<Arc<RelayList>>>,
    sweeper: Mutex<Option<IdleSweeper>>,
}

impl NodeServer {
    pub fn new(config: Config, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config,
            handler,
            ephemeral_key: *uuid::Uuid::new_v4().as_bytes(),
            state: RwLock::new(NodeState::Created),
            control: tokio::sync::Mutex::new(()),
            node_id: RwLock::new(None),
            registry: RwLock::new(SessionRegistry::new()),
            listeners: RwLock::new(BTreeMap::new()),
            relays: RwLock::new(None),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    fn set_state(&self, next: NodeState) {
        let prev = std::mem::replace(&mut *self.state.write(), next);
        log_system(
            LogLevel::Debug,
            "state_changed",
            Some(format!("{} -> {}", prev, next)),
        );
    }

    /// Identifier computed by the last successful `start()`.
    pub fn node_id(&self) -> Option<NodeIdentifier> {
        *self.node_id.read()
    }

    /// Shared registry of the current (or last) run.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.read().clone()
    }

    pub fn relays(&self) -> Option<Arc<RelayList>> {
        self.relays.read().clone()
    }

    pub fn listeners(&self) -> Vec<ListenerInfo> {
        self.listeners.read().values().map(|l| l.info()).collect()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry().snapshot().iter().map(|s| s.info()).collect()
    }

    /// Bind every configured listener and schedule the idle sweep.
    ///
    /// Any failure stops the listeners already started and closes the
    /// sessions they accepted before the error is returned.
    pub async fn start(&self) -> Result<(), ServerError> {
        let _control = self.control.lock().await;
        let current = self.state();
        if !current.can_start() {
            return Err(ServerError::InvalidState {
                action: "start",
                state: current,
            });
        }
        self.set_state(NodeState::Initializing);
        match self.start_inner().await {
            Ok(()) => {
                self.set_state(NodeState::Running);
                log_system(
                    LogLevel::Info,
                    "node_started",
                    Some(format!(
                        "listeners={} node_id={}",
                        self.listeners.read().len(),
                        self.node_id().map(|id| id.short()).unwrap_or_default()
                    )),
                );
                Ok(())
            }
            Err(e) => {
                self.set_state(NodeState::Stopped);
                log_system(LogLevel::Error, "node_start_failed", Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<(), ServerError> {
        self.listeners.write().clear();
        let node_id = self.resolve_node_id()?;
        *self.node_id.write() = Some(node_id);
        log_system(
            LogLevel::Info,
            "node_identifier",
            Some(node_id.to_hex()),
        );

        let relays = Arc::new(RelayList::open());
        *self.relays.write() = Some(relays.clone());
        let registry = SessionRegistry::new();
        *self.registry.write() = registry.clone();

        let built = match self.build_listeners(&registry) {
            Ok(built) => built,
            Err(e) => {
                relays.dispose();
                return Err(e);
            }
        };

        let mut started: BTreeMap<u16, Arc<RoleListener>> = BTreeMap::new();
        for listener in built {
            match listener.start().await {
                Ok(addr) => {
                    started.insert(addr.port(), listener);
                }
                Err(e) => {
                    log_system(
                        LogLevel::Error,
                        "listener_start_failed",
                        Some(format!("{}: {}", listener.bind_addr(), e)),
                    );
                    roll_back(
                        &started,
                        &registry,
                        &relays,
                        self.config.timeouts.shutdown_drain(),
                    )
                    .await;
                    return Err(e);
                }
            }
        }
        *self.listeners.write() = started;

        let timeouts = &self.config.timeouts;
        let sweeper = IdleSweeper::spawn(
            registry,
            timeouts.sweep_interval(),
            timeouts.sweep_initial_delay(),
        );
        *self.sweeper.lock() = Some(sweeper);
        Ok(())
    }

    fn resolve_node_id(&self) -> Result<NodeIdentifier, ServerError> {
        match self.config.node.public_key.as_deref() {
            Some(hex) => NodeIdentifier::from_public_key_hex(hex),
            None => {
                log_system(
                    LogLevel::Warn,
                    "ephemeral_identity",
                    Some("node.public_key not set; identifier is not stable across processes".into()),
                );
                Ok(NodeIdentifier::from_public_key(&self.ephemeral_key))
            }
        }
    }

    /// Construct every listener without binding. Configuration problems and
    /// explicit port collisions surface here, before any socket exists.
    fn build_listeners(
        &self,
        registry: &SessionRegistry,
    ) -> Result<Vec<Arc<RoleListener>>, ServerError> {
        if self.config.listeners.is_empty() {
            log_system(LogLevel::Warn, "no_listeners_configured", None);
        }
        let ctx = ListenerContext {
            registry: registry.clone(),
            handler: self.handler.clone(),
            idle_budget: self.config.idle_budget(),
            allow_console: true,
        };
        let mut built = Vec::with_capacity(self.config.listeners.len());
        for lc in &self.config.listeners {
            built.push(Arc::new(RoleListener::new(
                lc.clone(),
                self.config.tls.as_ref(),
                ctx.clone(),
            )?));
        }

        let mut ports = HashSet::new();
        for listener in &built {
            let addr = listener.bind_addr();
            if addr.port() != 0 && !ports.insert(addr.port()) {
                return Err(ServerError::Bind {
                    addr,
                    source: io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("port {} is assigned to more than one role group", addr.port()),
                    ),
                });
            }
        }
        Ok(built)
    }

    /// Close every session, stop every listener and the sweeper, then
    /// dispose the relay list. Safe from any state and idempotent.
    pub async fn shutdown(&self) {
        let _control = self.control.lock().await;
        let current = self.state();
        if matches!(current, NodeState::Created | NodeState::Stopped) {
            return;
        }
        self.set_state(NodeState::ShuttingDown);

        let registry = self.registry();
        registry.seal();

        let (closed, already_closed) = close_all(&registry);
        log_system(
            LogLevel::Info,
            "sessions_closed",
            Some(format!("closed={} already_closed={}", closed, already_closed)),
        );

        let listeners: Vec<Arc<RoleListener>> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener.stop().await;
        }

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        close_all_and_drain(&registry, self.config.timeouts.shutdown_drain()).await;

        let relays = self.relays.read().clone();
        if let Some(relays) = relays {
            relays.dispose();
        }

        self.set_state(NodeState::Stopped);
        log_system(LogLevel::Info, "node_stopped", None);
    }
}

/// Force-close every registered session. Returns (closed, already_closed).
fn close_all(registry: &SessionRegistry) -> (usize, usize) {
    let mut closed = 0usize;
    let mut already_closed = 0usize;
    for session in registry.snapshot() {
        match session.close() {
            CloseStatus::Closed => closed += 1,
            CloseStatus::AlreadyClosed => already_closed += 1,
        }
    }
    (closed, already_closed)
}

/// Seal the registry, close whatever is still in it and wait for the I/O
/// loops to deregister. Entries left after `drain` are dropped with a warning.
/// Returns how many entries had to be dropped.
async fn close_all_and_drain(registry: &SessionRegistry, drain: Duration) -> usize {
    registry.seal();
    close_all(registry);
    if registry.wait_until_empty(drain).await {
        return 0;
    }
    let remaining = registry.clear();
    log_system(
        LogLevel::Warn,
        "drain_timeout",
        Some(format!("cleared={} after {}ms", remaining, drain.as_millis())),
    );
    remaining
}

/// Undo a partial start: stop the listeners already bound, close the
/// sessions they accepted, dispose the relay list.
async fn roll_back(
    started: &BTreeMap<u16, Arc<RoleListener>>,
    registry: &SessionRegistry,
    relays: &RelayList,
    drain: Duration,
) {
    for l in started.values() {
        l.stop().await;
    }
    registry.seal();
    let (closed, _) = close_all(registry);
    if closed > 0 {
        log_system(
            LogLevel::Warn,
            "rollback_closed_sessions",
            Some(format!("count={}", closed)),
        );
    }
    close_all_and_drain(registry, drain).await;
    relays.dispose();
}
