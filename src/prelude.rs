//! Common imports for embedding a node: `use rolenode::prelude::*;`

pub use crate::config::{Config, ListenerConfig, TimeoutConfig, TlsConfig, TransportKind};
pub use crate::error::{RegistryError, ServerError, SessionError};
pub use crate::identity::NodeIdentifier;
pub use crate::network::{
    CloseStatus, IdleBudget, ListenerInfo, LoggingHandler, MessageHandler, PeerClass, Role,
    RoleMask, Session, SessionId, SessionInfo, SessionRegistry,
};
pub use crate::server::{NodeServer, NodeState};
