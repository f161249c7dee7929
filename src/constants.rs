//! Central place for application-wide constants and default values.

use std::time::Duration;

/// Default application name shown in lifecycle logs
pub const DEFAULT_APP_NAME: &str = "rolenode";

/// Left padding used to align log lines with those that include emoji prefixes.
pub const ICON_PLACEHOLDER: &str = "   ";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Idle budget for sessions accepted on client-facing listeners.
pub const DEFAULT_CLIENT_IDLE_MS: u64 = 60_000;

/// Idle budget for sessions accepted on peer-node listeners.
pub const DEFAULT_PEER_IDLE_MS: u64 = 300_000;

/// Period between two idle sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 120;

/// Delay before the first idle sweep after startup.
pub const DEFAULT_SWEEP_INITIAL_DELAY_SECS: u64 = 120;

/// How long shutdown waits for session I/O loops to deregister themselves.
pub const DEFAULT_SHUTDOWN_DRAIN_MS: u64 = 5_000;

/// Outbound line queue depth per session (same as the peer writer channel).
pub const SESSION_OUTBOUND_CAPACITY: usize = 32;

/// Capacity of the event dispatcher channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default bind address for listeners that do not name one.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Port of the built-in peer-node role group.
pub const DEFAULT_PEER_PORT: u16 = 7100;

/// Port of the built-in client role group.
pub const DEFAULT_CLIENT_PORT: u16 = 7200;

/// Longest inbound line accepted before the session is closed.
pub const MAX_LINE_BYTES: u64 = 1024 * 1024;

/// Upper bound on a TLS handshake before the socket is dropped.
pub const TLS_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Pause after a failed accept (e.g. fd exhaustion) before retrying.
pub const ACCEPT_ERROR_BACKOFF_MS: u64 = 100;

/// How long a closing session's writer may spend flushing queued lines.
pub const WRITER_FLUSH_TIMEOUT_MS: u64 = 1_000;

pub fn default_sweep_interval() -> Duration {
    Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
}

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!("v{}", APP_VERSION)
}
