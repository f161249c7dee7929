// src/network/registry.rs

use crate::error::RegistryError;
use crate::network::session::{Session, SessionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// All live sessions across every listener of one node.
///
/// Cheap to clone; clones share the same map. The lock is never held across
/// an `.await` or a per-session close, so unrelated sessions do not serialize
/// on each other's I/O.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    sealed: AtomicBool,
    removed: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        if self.inner.sealed.load(Ordering::Acquire) {
            return Err(RegistryError::Sealed);
        }
        let mut map = self.inner.sessions.write();
        // re-check under the lock so a concurrent seal() cannot slip an insert past a snapshot
        if self.inner.sealed.load(Ordering::Acquire) {
            return Err(RegistryError::Sealed);
        }
        let id = session.id();
        if map.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        map.insert(id, session);
        Ok(())
    }

    /// Remove by id. Absent ids are not an error; exactly one of several
    /// racing removers gets `Some`.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.inner.sessions.write().remove(&id);
        if removed.is_some() {
            self.inner.removed.notify_waiters();
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.sessions.read().get(&id).cloned()
    }

    /// Point-in-time copy. Later mutations are not reflected.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for_port(&self, port: u16) -> usize {
        self.inner
            .sessions
            .read()
            .values()
            .filter(|s| s.listener_port() == port)
            .count()
    }

    /// Refuse further inserts. Used once shutdown begins.
    pub fn seal(&self) {
        let _guard = self.inner.sessions.write();
        self.inner.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::Acquire)
    }

    /// Drop every entry; returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained = {
            let mut map = self.inner.sessions.write();
            let n = map.len();
            map.clear();
            n
        };
        if drained > 0 {
            self.inner.removed.notify_waiters();
        }
        drained
    }

    /// Wait until every session has deregistered or `timeout` elapses.
    /// Returns true if the registry drained.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.removed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty();
            }
        }
    }
}
