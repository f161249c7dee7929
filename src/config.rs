use crate::constants::*;
use crate::events::model::LogLevel;
use crate::network::role::{IdleBudget, Role, RoleMask};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub app_name: Option<String>,
    pub node: NodeConfig,
    /// One entry per role group; each binds its own listener.
    pub listeners: Vec<ListenerConfig>,
    /// Certificate material used by listeners with `secure = true`
    pub tls: Option<TlsConfig>,
    pub timeouts: TimeoutConfig,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Load a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config '{}': {}", path.display(), e))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Built-in role groups used when the node runs without a config file:
    /// peer nodes on one port, every client role on another.
    pub fn default_listeners() -> Vec<ListenerConfig> {
        vec![
            ListenerConfig::new(
                DEFAULT_BIND_ADDRESS,
                DEFAULT_PEER_PORT,
                [Role::Primary, Role::PeerNeighbor],
            ),
            ListenerConfig::new(
                DEFAULT_BIND_ADDRESS,
                DEFAULT_CLIENT_PORT,
                [
                    Role::ClientCustomer,
                    Role::ClientNonCustomer,
                    Role::ClientAppService,
                ],
            ),
        ]
    }

    pub fn idle_budget(&self) -> IdleBudget {
        IdleBudget {
            client: Duration::from_millis(self.timeouts.client_idle_ms),
            peer_node: Duration::from_millis(self.timeouts.peer_idle_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Hex-encoded node public key. The node identifier is its SHA-256 digest.
    pub public_key: Option<String>,
}

/// Transport requested for a role group. Only TCP is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_bind_address")]
    pub address: String,
    pub port: u16,
    pub roles: Vec<Role>,
    /// Wrap accepted sockets in TLS before tracking them
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub transport: TransportKind,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

impl ListenerConfig {
    pub fn new(address: impl Into<String>, port: u16, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            address: address.into(),
            port,
            roles: roles.into_iter().collect(),
            secure: false,
            transport: TransportKind::Tcp,
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn role_mask(&self) -> RoleMask {
        RoleMask::from_roles(self.roles.iter().copied())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain presented by secure listeners
    pub cert_path: String,
    /// PEM private key (PKCS#8, PKCS#1 or SEC1)
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub client_idle_ms: u64,
    pub peer_idle_ms: u64,
    pub sweep_interval_secs: u64,
    pub sweep_initial_delay_secs: u64,
    /// Upper bound on how long shutdown waits for sessions to deregister
    pub shutdown_drain_ms: u64,
    /// Sub-second sweep cadence, overrides `sweep_interval_secs` when set
    pub sweep_interval_ms: Option<u64>,
    pub sweep_initial_delay_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_idle_ms: DEFAULT_CLIENT_IDLE_MS,
            peer_idle_ms: DEFAULT_PEER_IDLE_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_initial_delay_secs: DEFAULT_SWEEP_INITIAL_DELAY_SECS,
            shutdown_drain_ms: DEFAULT_SHUTDOWN_DRAIN_MS,
            sweep_interval_ms: None,
            sweep_initial_delay_ms: None,
        }
    }
}

impl TimeoutConfig {
    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None if self.sweep_interval_secs == 0 => default_sweep_interval(),
            None => Duration::from_secs(self.sweep_interval_secs),
        }
    }

    pub fn sweep_initial_delay(&self) -> Duration {
        match self.sweep_initial_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.sweep_initial_delay_secs),
        }
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Path to JSON line event log (rotated). If unset, defaults to logs/rolenode.jsonl
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
    /// Minimum level printed on the console
    pub console_level: Option<LogLevel>,
}
