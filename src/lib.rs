//! # rolenode
//!
//! Multi-role TCP connection manager for a peer-to-peer network node.
//!
//! A node binds one listener per configured role group, tracks every accepted
//! connection in a shared session registry, enforces per-class idle budgets
//! through a periodic sweep, and orders startup and shutdown so that no
//! listener or session outlives the node.
//!
//! ## Key Modules
//! * `server` – `NodeServer` lifecycle (start, shutdown, status accessors).
//! * `network` – roles, sessions, registry, listeners, idle sweeper, relay list.
//! * `security` – plaintext / TLS channel setup for accepted sockets.
//! * `identity` – node identifier derived from the node public key.
//! * `config` – TOML configuration.
//! * `events` – structured logging/events dispatcher (console + JSON lines).
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use rolenode::prelude::*;
//!
//! # async fn run() -> Result<(), ServerError> {
//! let config = Config {
//!     listeners: vec![ListenerConfig::new("127.0.0.1", 7100, [Role::Primary, Role::PeerNeighbor])],
//!     ..Config::default()
//! };
//! let server = NodeServer::new(config, Arc::new(LoggingHandler));
//! server.start().await?;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod identity;
pub mod network;
pub mod prelude; // curated re-exports
pub mod security;
pub mod server;
