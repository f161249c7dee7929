// src/network/sweeper.rs

use crate::events::model::LogLevel;
use crate::network::events::{emit_session_event, emit_sweep_event};
use crate::network::registry::SessionRegistry;
use crate::network::session::CloseStatus;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub inspected: usize,
    pub expired: usize,
    pub already_closed: usize,
}

/// Close every session whose idle deadline is before `now`.
///
/// Works on a snapshot so the registry is never locked during a close. The
/// sweep only requests closes; the session's own I/O loop deregisters it.
pub fn sweep_once(registry: &SessionRegistry, now: Instant) -> SweepReport {
    let mut report = SweepReport::default();
    for session in registry.snapshot() {
        report.inspected += 1;
        if !session.is_expired(now) {
            continue;
        }
        match session.close() {
            CloseStatus::Closed => {
                report.expired += 1;
                emit_session_event(
                    LogLevel::Info,
                    "session_expired",
                    &session,
                    Some(format!("idle_ms={}", session.idle_interval().as_millis())),
                );
            }
            CloseStatus::AlreadyClosed => {
                report.already_closed += 1;
                emit_session_event(LogLevel::Debug, "session_already_closed", &session, None);
            }
        }
    }
    emit_sweep_event(report.inspected, report.expired, report.already_closed);
    report
}

/// Recurring idle sweep owned by the node server.
pub struct IdleSweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdleSweeper {
    pub fn spawn(registry: SessionRegistry, interval: Duration, initial_delay: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        sweep_once(&registry, Instant::now());
                    }
                }
            }
        });
        Self {
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Cancel future runs and wait for an in-progress run to finish. Idempotent.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::role::{IdleBudget, Role};
    use crate::network::session::{Session, SessionId};
    use std::sync::Arc;

    fn insert(reg: &SessionRegistry, role: Role) -> Arc<Session> {
        let s = Arc::new(Session::new(
            SessionId::next(),
            9000,
            role.into(),
            "127.0.0.1:2".parse().unwrap(),
            &IdleBudget::default(),
        ));
        reg.insert(s.clone()).unwrap();
        s
    }

    #[tokio::test]
    async fn client_expires_before_peer() {
        let reg = SessionRegistry::new();
        let client = insert(&reg, Role::ClientNonCustomer);
        let peer = insert(&reg, Role::Primary);

        let report = sweep_once(&reg, Instant::now() + Duration::from_millis(61_000));
        assert_eq!(report.inspected, 2);
        assert_eq!(report.expired, 1);
        assert!(client.is_closed());
        assert!(!peer.is_closed());
        // the sweep never removes entries itself
        assert_eq!(reg.len(), 2);

        let report = sweep_once(&reg, Instant::now() + Duration::from_millis(301_000));
        assert_eq!(report.expired, 1);
        assert_eq!(report.already_closed, 1);
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn fresh_sessions_survive() {
        let reg = SessionRegistry::new();
        insert(&reg, Role::ClientCustomer);
        let report = sweep_once(&reg, Instant::now());
        assert_eq!(report.expired, 0);
        assert_eq!(report.already_closed, 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let sweeper = IdleSweeper::spawn(
            SessionRegistry::new(),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        assert!(sweeper.is_running());
        sweeper.stop().await;
        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }
}
