// tests/node_lifecycle.rs
// Start/shutdown ordering of NodeServer over real loopback sockets.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use rolenode::config::{Config, ListenerConfig, TransportKind};
use rolenode::error::ServerError;
use rolenode::network::{LoggingHandler, MessageHandler, Role, Session};
use rolenode::server::{NodeServer, NodeState};

const PUBLIC_KEY: &str = "04a3f1c29d7e5b6a8c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c";

struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn on_message(&self, _session: &Session, message: String) -> Option<String> {
        Some(format!("echo:{}", message))
    }
}

fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

fn config(listeners: Vec<ListenerConfig>) -> Config {
    let mut cfg = Config {
        listeners,
        ..Config::default()
    };
    cfg.node.public_key = Some(PUBLIC_KEY.to_string());
    cfg.timeouts.shutdown_drain_ms = 2_000;
    cfg
}

fn listener_addr(server: &NodeServer, role: Role) -> SocketAddr {
    server
        .listeners()
        .into_iter()
        .find(|l| l.roles.contains(role))
        .map(|l| SocketAddr::from(([127, 0, 0, 1], l.port)))
        .expect("listener for role")
}

async fn wait_for_sessions(server: &NodeServer, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.sessions().len() != n {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {} sessions, have {}",
            n,
            server.sessions().len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn assert_closed_by_server(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("unexpected {} bytes from closed session", n),
        Err(_) => panic!("session was not closed by the server"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_then_shutdown_binds_and_releases_ports() {
    let server = NodeServer::new(
        config(vec![
            ListenerConfig::new("127.0.0.1", 0, [Role::Primary, Role::PeerNeighbor]),
            ListenerConfig::new("127.0.0.1", 0, [Role::ClientCustomer, Role::ClientAppService]),
        ]),
        Arc::new(LoggingHandler),
    );
    assert_eq!(server.state(), NodeState::Created);
    server.start().await.unwrap();
    assert_eq!(server.state(), NodeState::Running);

    let listeners = server.listeners();
    assert_eq!(listeners.len(), 2);
    assert!(listeners.iter().all(|l| l.running && l.port != 0));

    let peer_addr = listener_addr(&server, Role::PeerNeighbor);
    TcpStream::connect(peer_addr).await.unwrap();

    server.shutdown().await;
    assert_eq!(server.state(), NodeState::Stopped);
    assert!(server.listeners().iter().all(|l| !l.running));
    assert!(TcpStream::connect(peer_addr).await.is_err());

    // idempotent
    server.shutdown().await;
    assert_eq!(server.state(), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_port_twice_is_a_bind_error_and_nothing_stays_bound() {
    let port = free_port();
    let server = NodeServer::new(
        config(vec![
            ListenerConfig::new("127.0.0.1", port, [Role::Primary]),
            ListenerConfig::new("127.0.0.1", port, [Role::ClientCustomer]),
        ]),
        Arc::new(LoggingHandler),
    );
    let err = server.start().await.unwrap_err();
    match &err {
        ServerError::Bind { addr, source } => {
            assert_eq!(addr.port(), port);
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
        }
        other => panic!("expected bind error, got {:?}", other),
    }
    assert_eq!(server.state(), NodeState::Stopped);
    assert!(server.listeners().is_empty());
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("port must be free after failed start");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_port_rolls_back_started_listeners() {
    let first_port = free_port();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let occupied_port = occupied.local_addr().unwrap().port();

    let server = NodeServer::new(
        config(vec![
            ListenerConfig::new("127.0.0.1", first_port, [Role::Primary]),
            ListenerConfig::new("127.0.0.1", occupied_port, [Role::ClientNonCustomer]),
        ]),
        Arc::new(LoggingHandler),
    );
    let err = server.start().await.unwrap_err();
    assert!(err.is_bind(), "unexpected error: {}", err);
    assert!(server.registry().is_empty());
    std::net::TcpListener::bind(("127.0.0.1", first_port))
        .expect("first listener must be stopped by rollback");

    // shutdown after a failed start is harmless
    server.shutdown().await;
    assert_eq!(server.state(), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_group_fails_before_any_bind() {
    let port = free_port();
    let server = NodeServer::new(
        config(vec![
            ListenerConfig::new("127.0.0.1", port, [Role::Primary]),
            ListenerConfig::new("127.0.0.1", 0, [Role::ClientCustomer]).transport(TransportKind::Udp),
        ]),
        Arc::new(LoggingHandler),
    );
    let err = server.start().await.unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {}", err);
    assert!(server.listeners().is_empty());
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("no listener may have been bound");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn secure_group_without_tls_material_is_a_configuration_error() {
    let server = NodeServer::new(
        config(vec![ListenerConfig::new("127.0.0.1", 0, [Role::ClientCustomer]).secure(true)]),
        Arc::new(LoggingHandler),
    );
    assert!(server.start().await.unwrap_err().is_configuration());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn node_identifier_is_stable_across_restarts() {
    let server = NodeServer::new(
        config(vec![ListenerConfig::new("127.0.0.1", 0, [Role::Primary])]),
        Arc::new(LoggingHandler),
    );
    server.start().await.unwrap();
    let first = server.node_id().unwrap();
    server.shutdown().await;

    server.start().await.unwrap();
    let second = server.node_id().unwrap();
    server.shutdown().await;

    assert_eq!(first.as_bytes(), second.as_bytes());

    let other = NodeServer::new(
        config(vec![ListenerConfig::new("127.0.0.1", 0, [Role::Primary])]),
        Arc::new(LoggingHandler),
    );
    other.start().await.unwrap();
    assert_eq!(other.node_id(), Some(first));
    other.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_closes_every_session_even_if_one_is_already_closed() {
    let server = NodeServer::new(
        config(vec![
            ListenerConfig::new("127.0.0.1", 0, [Role::ClientCustomer]),
            ListenerConfig::new("127.0.0.1", 0, [Role::PeerNeighbor]),
        ]),
        Arc::new(LoggingHandler),
    );
    server.start().await.unwrap();
    let client_addr = listener_addr(&server, Role::ClientCustomer);
    let peer_addr = listener_addr(&server, Role::PeerNeighbor);

    let mut streams = Vec::new();
    for i in 0..4 {
        let addr = if i % 2 == 0 { client_addr } else { peer_addr };
        streams.push(TcpStream::connect(addr).await.unwrap());
    }
    wait_for_sessions(&server, 4).await;

    // one session closes on its own just before shutdown
    let victim = server.registry().snapshot()[1].clone();
    victim.close();

    server.shutdown().await;
    assert_eq!(server.state(), NodeState::Stopped);
    assert!(server.sessions().is_empty());
    assert!(server.listeners().iter().all(|l| !l.running));
    for stream in streams.iter_mut() {
        assert_closed_by_server(stream).await;
    }
    assert!(TcpStream::connect(client_addr).await.is_err());
    assert!(TcpStream::connect(peer_addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_replies_are_written_back_as_lines() {
    let server = NodeServer::new(
        config(vec![ListenerConfig::new("127.0.0.1", 0, [Role::ClientAppService])]),
        Arc::new(EchoHandler),
    );
    server.start().await.unwrap();
    let addr = listener_addr(&server, Role::ClientAppService);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (r, mut w) = stream.into_split();
    let mut lines = BufReader::new(r).lines();
    w.write_all(b"hello\nworld\r\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("echo:hello"));
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("echo:world"));

    let sessions = server.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].messages_in, 2);
    assert_eq!(sessions[0].listener_port, addr.port());

    // client hang-up deregisters the session
    drop(w);
    drop(lines);
    wait_for_sessions(&server, 0).await;
    server.shutdown().await;
}
