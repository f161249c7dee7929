// src/network/relay.rs

use crate::events::dispatcher::emit_system_event;
use crate::events::model::LogLevel;
use crate::identity::NodeIdentifier;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Relay candidates known to this node (node id -> reachable address).
///
/// The connection manager only drives its lifecycle: opened on start,
/// disposed on shutdown. Selection policy lives with the protocol layer.
#[derive(Debug, Default)]
pub struct RelayList {
    entries: RwLock<HashMap<NodeIdentifier, SocketAddr>>,
    disposed: AtomicBool,
}

impl RelayList {
    pub fn open() -> Self {
        emit_system_event("relay", LogLevel::Debug, "relay_list_opened", None);
        Self::default()
    }

    /// Record or refresh a candidate. Ignored once disposed.
    pub fn insert(&self, node_id: NodeIdentifier, addr: SocketAddr) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut map = self.entries.write();
        // dispose() takes the write lock too, so re-check here
        if self.is_disposed() {
            return false;
        }
        map.insert(node_id, addr);
        true
    }

    pub fn remove(&self, node_id: &NodeIdentifier) -> Option<SocketAddr> {
        self.entries.write().remove(node_id)
    }

    pub fn get(&self, node_id: &NodeIdentifier) -> Option<SocketAddr> {
        self.entries.read().get(node_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drop all candidates. Returns false if already disposed.
    pub fn dispose(&self) -> bool {
        let dropped = {
            let mut map = self.entries.write();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return false;
            }
            let n = map.len();
            map.clear();
            n
        };
        emit_system_event(
            "relay",
            LogLevel::Debug,
            "relay_list_disposed",
            Some(format!("dropped={}", dropped)),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_clears_and_blocks_inserts() {
        let relays = RelayList::open();
        let a = NodeIdentifier::from_public_key(b"a");
        let addr: SocketAddr = "10.0.0.1:7000".parse().unwrap();
        assert!(relays.insert(a, addr));
        assert_eq!(relays.get(&a), Some(addr));

        assert!(relays.dispose());
        assert!(!relays.dispose());
        assert!(relays.is_empty());
        assert!(!relays.insert(a, addr));
        assert!(relays.get(&a).is_none());
    }
}
