// tests/node_identity.rs

use std::sync::Arc;

use rolenode::config::{Config, ListenerConfig};
use rolenode::identity::NodeIdentifier;
use rolenode::network::{LoggingHandler, Role};
use rolenode::server::NodeServer;

fn server(public_key: Option<&str>) -> NodeServer {
    let mut cfg = Config {
        listeners: vec![ListenerConfig::new("127.0.0.1", 0, [Role::Primary])],
        ..Config::default()
    };
    cfg.node.public_key = public_key.map(str::to_string);
    NodeServer::new(cfg, Arc::new(LoggingHandler))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_key_determines_identifier() {
    let key = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
    let s = server(Some(key));
    assert!(s.node_id().is_none());
    s.start().await.unwrap();
    let id = s.node_id().unwrap();
    s.shutdown().await;

    assert_eq!(id, NodeIdentifier::from_public_key_hex(key).unwrap());
    // mixed-case hex names the same key
    assert_eq!(id, NodeIdentifier::from_public_key_hex(&key.to_uppercase()).unwrap());
    assert_eq!(id.to_hex().len(), NodeIdentifier::LEN * 2);

    let other = server(Some("03aa"));
    other.start().await.unwrap();
    assert_ne!(other.node_id(), Some(id));
    other.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_key_gives_per_server_identifier() {
    let a = server(None);
    a.start().await.unwrap();
    let first = a.node_id().unwrap();
    a.shutdown().await;
    a.start().await.unwrap();
    assert_eq!(a.node_id(), Some(first));
    a.shutdown().await;

    let b = server(None);
    b.start().await.unwrap();
    assert_ne!(b.node_id(), Some(first));
    b.shutdown().await;
}
