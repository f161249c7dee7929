// src/network/listener.rs

use crate::config::{ListenerConfig, TlsConfig, TransportKind};
use crate::constants::{
    ACCEPT_ERROR_BACKOFF_MS, MAX_LINE_BYTES, TLS_HANDSHAKE_TIMEOUT_MS, WRITER_FLUSH_TIMEOUT_MS,
};
use crate::error::{RegistryError, ServerError};
use crate::events::model::LogLevel;
use crate::network::events::{emit_network_event, emit_session_event};
use crate::network::handler::MessageHandler;
use crate::network::registry::SessionRegistry;
use crate::network::role::{IdleBudget, RoleMask};
use crate::network::session::{Session, SessionId};
use crate::security::{make_secure_channel, Channel, SecureChannel};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn log_network_event(
    level: LogLevel,
    action: &str,
    addr: Option<String>,
    detail: Option<String>,
    allow_console: bool,
) {
    emit_network_event("listener", level, action, addr, detail, allow_console);
}

/// Collaborators every listener of a node shares.
#[derive(Clone)]
pub struct ListenerContext {
    pub registry: SessionRegistry,
    pub handler: Arc<dyn MessageHandler>,
    pub idle_budget: IdleBudget,
    pub allow_console: bool,
}

struct ListenerShared {
    roles: RoleMask,
    channel: Arc<dyn SecureChannel>,
    ctx: ListenerContext,
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One bound TCP endpoint serving a set of roles.
pub struct RoleListener {
    config: ListenerConfig,
    bind_addr: SocketAddr,
    shared: Arc<ListenerShared>,
    running: Mutex<Option<Running>>,
    // serializes start()/stop() so only one caller ever binds
    transition: tokio::sync::Mutex<()>,
}

/// Read-only status copy of a listener.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub address: SocketAddr,
    pub port: u16,
    pub roles: RoleMask,
    pub secure: bool,
    pub running: bool,
    pub sessions: usize,
}

impl RoleListener {
    /// Validate the role group and prepare its transport-security layer.
    /// Nothing is bound until `start()`.
    pub fn new(
        config: ListenerConfig,
        tls: Option<&TlsConfig>,
        ctx: ListenerContext,
    ) -> Result<Self, ServerError> {
        if config.transport != TransportKind::Tcp {
            return Err(ServerError::config(format!(
                "listener {}:{} requests {:?} transport; only tcp is supported",
                config.address, config.port, config.transport
            )));
        }
        let roles = config.role_mask();
        if roles.is_empty() {
            return Err(ServerError::config(format!(
                "listener {}:{} has no roles",
                config.address, config.port
            )));
        }
        let ip: IpAddr = config.address.parse().map_err(|e| {
            ServerError::config(format!("invalid bind address '{}': {}", config.address, e))
        })?;
        let bind_addr = SocketAddr::new(ip, config.port);
        let channel = make_secure_channel(config.secure, tls)?;
        Ok(Self {
            config,
            bind_addr,
            shared: Arc::new(ListenerShared {
                roles,
                channel,
                ctx,
            }),
            running: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        })
    }

    pub fn roles(&self) -> RoleMask {
        self.shared.roles
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bound address while running (resolves port 0), configured address otherwise.
    pub fn local_addr(&self) -> SocketAddr {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.local_addr)
            .unwrap_or(self.bind_addr)
    }

    pub fn port(&self) -> u16 {
        self.local_addr().port()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn info(&self) -> ListenerInfo {
        let address = self.local_addr();
        ListenerInfo {
            address,
            port: address.port(),
            roles: self.shared.roles,
            secure: self.config.secure,
            running: self.is_running(),
            sessions: self.shared.ctx.registry.count_for_port(address.port()),
        }
    }

    /// Bind and spawn the accept loop. Returns the bound address; a call on
    /// a running listener returns the existing address without rebinding.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let _transition = self.transition.lock().await;
        let bound = self.running.lock().as_ref().map(|r| r.local_addr);
        if let Some(addr) = bound {
            return Ok(addr);
        }
        let allow_console = self.shared.ctx.allow_console;
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        log_network_event(
            LogLevel::Info,
            "listener_bind",
            Some(local_addr.to_string()),
            Some(format!(
                "roles={} backend={:?}",
                self.shared.roles,
                self.shared.channel.backend()
            )),
            allow_console,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            local_addr.port(),
            shutdown_rx,
        ));
        *self.running.lock() = Some(Running {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting and close the listening socket. Sessions already handed
    /// to the registry are left alone. Idempotent.
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        running.shutdown_tx.send_replace(true);
        if let Err(e) = running.task.await {
            if e.is_panic() {
                log_network_event(
                    LogLevel::Error,
                    "accept_loop_panicked",
                    Some(running.local_addr.to_string()),
                    Some(e.to_string()),
                    self.shared.ctx.allow_console,
                );
            }
        }
        log_network_event(
            LogLevel::Info,
            "listener_stopped",
            Some(running.local_addr.to_string()),
            None,
            self.shared.ctx.allow_console,
        );
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ListenerShared>,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let allow_console = shared.ctx.allow_console;
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    log_network_event(
                        LogLevel::Debug,
                        "incoming_connection",
                        Some(peer_addr.to_string()),
                        Some(format!("port={}", port)),
                        allow_console,
                    );
                    tokio::spawn(handle_connection(
                        stream,
                        peer_addr,
                        shared.clone(),
                        port,
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => {
                    log_network_event(
                        LogLevel::Error,
                        "accept_failed",
                        None,
                        Some(e.to_string()),
                        allow_console,
                    );
                    tokio::time::sleep(Duration::from_millis(ACCEPT_ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<ListenerShared>,
    port: u16,
    shutdown_rx: watch::Receiver<bool>,
) {
    let allow_console = shared.ctx.allow_console;
    let handshake = tokio::time::timeout(
        Duration::from_millis(TLS_HANDSHAKE_TIMEOUT_MS),
        shared.channel.accept(stream, peer_addr),
    )
    .await;
    let channel = match handshake {
        Ok(Ok(channel)) => channel,
        Ok(Err(e)) => {
            log_network_event(
                LogLevel::Warn,
                "handshake_failed",
                Some(peer_addr.to_string()),
                Some(e.to_string()),
                allow_console,
            );
            return;
        }
        Err(_) => {
            log_network_event(
                LogLevel::Warn,
                "handshake_timeout",
                Some(peer_addr.to_string()),
                None,
                allow_console,
            );
            return;
        }
    };
    if *shutdown_rx.borrow() {
        log_network_event(
            LogLevel::Debug,
            "connection_dropped_listener_stopped",
            Some(peer_addr.to_string()),
            None,
            allow_console,
        );
        return;
    }

    let session = Arc::new(Session::new(
        SessionId::next(),
        port,
        shared.roles,
        peer_addr,
        &shared.ctx.idle_budget,
    ));
    match shared.ctx.registry.insert(session.clone()) {
        Ok(()) => {}
        Err(RegistryError::DuplicateId(id)) => {
            log_network_event(
                LogLevel::Error,
                "session_duplicate_id",
                Some(peer_addr.to_string()),
                Some(format!("id={}", id)),
                allow_console,
            );
            return;
        }
        Err(RegistryError::Sealed) => {
            log_network_event(
                LogLevel::Debug,
                "connection_dropped_shutting_down",
                Some(peer_addr.to_string()),
                None,
                allow_console,
            );
            return;
        }
    }
    emit_session_event(
        LogLevel::Info,
        "session_opened",
        &session,
        Some(format!(
            "backend={:?} idle_ms={}",
            channel.backend,
            session.idle_interval().as_millis()
        )),
    );
    run_session_io(
        session,
        channel,
        shared.ctx.registry.clone(),
        shared.ctx.handler.clone(),
    )
    .await;
}

#[derive(Debug)]
enum CloseReason {
    Local,
    RemoteEof,
    ReadError(String),
}

/// Read lines until EOF, error, or a close request; then deregister exactly once.
pub(crate) async fn run_session_io(
    session: Arc<Session>,
    channel: Channel,
    registry: SessionRegistry,
    handler: Arc<dyn MessageHandler>,
) {
    let Channel {
        mut reader, writer, ..
    } = channel;
    let mut close_rx = session.close_signal();
    let writer_task = session.take_outbound().map(|rx| {
        tokio::spawn(write_loop(
            writer,
            rx,
            session.close_signal(),
            session.clone(),
        ))
    });

    handler.on_open(&session).await;

    let mut line = String::new();
    let reason = loop {
        if *close_rx.borrow_and_update() {
            break CloseReason::Local;
        }
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES + 1);
        tokio::select! {
            biased;
            _ = close_rx.changed() => break CloseReason::Local,
            read = limited.read_line(&mut line) => match read {
                Ok(0) => break CloseReason::RemoteEof,
                Ok(n) if n as u64 > MAX_LINE_BYTES && !line.ends_with('\n') => {
                    break CloseReason::ReadError(format!("line exceeds {} bytes", MAX_LINE_BYTES));
                }
                Ok(_) => {
                    session.touch(Instant::now());
                    let message = line.trim_end_matches(['\r', '\n']).to_string();
                    if let Some(reply) = handler.on_message(&session, message).await {
                        if let Err(e) = session.send(reply) {
                            emit_session_event(
                                LogLevel::Warn,
                                "reply_dropped",
                                &session,
                                Some(e.to_string()),
                            );
                        }
                    }
                }
                Err(e) => break CloseReason::ReadError(e.to_string()),
            }
        }
    };

    // racing close() callers now see AlreadyClosed; the writer drains and exits
    session.close();
    if let Some(mut task) = writer_task {
        if tokio::time::timeout(Duration::from_millis(WRITER_FLUSH_TIMEOUT_MS), &mut task)
            .await
            .is_err()
        {
            task.abort();
        }
    }
    drop(reader);

    handler.on_close(&session).await;
    if registry.remove(session.id()).is_some() {
        let (level, detail) = match &reason {
            CloseReason::Local => (LogLevel::Info, "reason=local".to_string()),
            CloseReason::RemoteEof => (LogLevel::Info, "reason=eof".to_string()),
            CloseReason::ReadError(e) => (LogLevel::Warn, format!("reason=read_error error={}", e)),
        };
        emit_session_event(level, "session_closed", &session, Some(detail));
    }
}

async fn write_loop(
    mut writer: Box<dyn AsyncWrite + Send + Unpin>,
    mut rx: mpsc::Receiver<String>,
    mut close_rx: watch::Receiver<bool>,
    session: Arc<Session>,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write_line(&mut writer, &msg).await {
                        emit_session_event(LogLevel::Warn, "write_failed", &session, Some(e.to_string()));
                        // a dead writer means a dead session
                        session.close();
                        break;
                    }
                }
                None => break,
            },
            _ = close_rx.changed() => {
                while let Ok(msg) = rx.try_recv() {
                    if write_line(&mut writer, &msg).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_line(
    writer: &mut Box<dyn AsyncWrite + Send + Unpin>,
    msg: &str,
) -> std::io::Result<()> {
    writer.write_all(msg.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handler::LoggingHandler;
    use crate::network::role::Role;
    use tokio::io::AsyncReadExt;

    fn ctx(registry: &SessionRegistry) -> ListenerContext {
        ListenerContext {
            registry: registry.clone(),
            handler: Arc::new(LoggingHandler),
            idle_budget: IdleBudget::default(),
            allow_console: false,
        }
    }

    #[test]
    fn construction_rejects_bad_groups() {
        let reg = SessionRegistry::new();
        let udp = ListenerConfig::new("127.0.0.1", 0, [Role::Primary]).transport(TransportKind::Udp);
        assert!(RoleListener::new(udp, None, ctx(&reg)).err().unwrap().is_configuration());

        let empty = ListenerConfig::new("127.0.0.1", 0, []);
        assert!(RoleListener::new(empty, None, ctx(&reg)).err().unwrap().is_configuration());

        let bad_addr = ListenerConfig::new("not-an-ip", 0, [Role::Primary]);
        assert!(RoleListener::new(bad_addr, None, ctx(&reg)).err().unwrap().is_configuration());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_leaves_sessions_registered() {
        let reg = SessionRegistry::new();
        let cfg = ListenerConfig::new("127.0.0.1", 0, [Role::ClientCustomer]);
        let listener = RoleListener::new(cfg, None, ctx(&reg)).unwrap();
        assert!(!listener.is_running());
        listener.stop().await;

        let addr = listener.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.start().await.unwrap(), addr);
        assert!(listener.info().running);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while reg.is_empty() {
            assert!(Instant::now() < deadline, "session never registered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        listener.stop().await;
        listener.stop().await;
        assert!(!listener.is_running());
        assert!(TcpStream::connect(addr).await.is_err());
        assert_eq!(reg.len(), 1);

        // closing the session is the caller's job
        let session = reg.snapshot().remove(0);
        session.close();
        let mut buf = [0u8; 4];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert!(reg.wait_until_empty(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn overlong_line_closes_the_session() {
        let reg = SessionRegistry::new();
        let cfg = ListenerConfig::new("127.0.0.1", 0, [Role::ClientAppService]);
        let listener = RoleListener::new(cfg, None, ctx(&reg)).unwrap();
        let addr = listener.start().await.unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut r, mut w) = stream.into_split();
        let deadline = Instant::now() + Duration::from_secs(5);
        while reg.is_empty() {
            assert!(Instant::now() < deadline, "session never registered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::spawn(async move {
            let flood = vec![b'a'; MAX_LINE_BYTES as usize + 16];
            let _ = w.write_all(&flood).await;
        });
        assert!(reg.wait_until_empty(Duration::from_secs(5)).await);
        let mut buf = [0u8; 4];
        let read = tokio::time::timeout(Duration::from_secs(2), r.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
        listener.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_starts_bind_once() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let reg = SessionRegistry::new();
        let cfg = ListenerConfig::new("127.0.0.1", port, [Role::Primary]);
        let listener = Arc::new(RoleListener::new(cfg, None, ctx(&reg)).unwrap());

        let a = tokio::spawn({
            let l = listener.clone();
            async move { l.start().await }
        });
        let b = tokio::spawn({
            let l = listener.clone();
            async move { l.start().await }
        });
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.port(), port);
        assert!(listener.is_running());
        listener.stop().await;
        assert!(!listener.is_running());
    }
}
