// src/network/role.rs

use crate::constants::{DEFAULT_CLIENT_IDLE_MS, DEFAULT_PEER_IDLE_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Capability tag for what kind of remote a listener serves.
///
/// The discriminants are the configuration-stable bit values; gaps are
/// reserved for future roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Role {
    Primary = 1,
    PeerNeighbor = 4,
    ClientCustomer = 16,
    ClientNonCustomer = 32,
    ClientAppService = 128,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Primary,
        Role::PeerNeighbor,
        Role::ClientCustomer,
        Role::ClientNonCustomer,
        Role::ClientAppService,
    ];

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::PeerNeighbor => "peer_neighbor",
            Role::ClientCustomer => "client_customer",
            Role::ClientNonCustomer => "client_non_customer",
            Role::ClientAppService => "client_app_service",
        }
    }

    pub fn is_client(self) -> bool {
        matches!(
            self,
            Role::ClientCustomer | Role::ClientNonCustomer | Role::ClientAppService
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Union of roles served by one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u8")]
pub struct RoleMask(u8);

impl RoleMask {
    pub const EMPTY: RoleMask = RoleMask(0);

    const CLIENT_BITS: u8 = Role::ClientCustomer as u8
        | Role::ClientNonCustomer as u8
        | Role::ClientAppService as u8;
    const KNOWN_BITS: u8 = Self::CLIENT_BITS | Role::Primary as u8 | Role::PeerNeighbor as u8;

    /// Build from raw bits; `None` if any reserved bit is set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::KNOWN_BITS != 0 {
            return None;
        }
        Some(Self(bits))
    }

    pub fn from_roles<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        roles
            .into_iter()
            .fold(Self::EMPTY, |acc, r| Self(acc.0 | r.bits()))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & role.bits() != 0
    }

    pub fn intersects(self, other: RoleMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }

    /// Classification of sessions accepted under this mask. Any client role
    /// makes the listener client-facing.
    pub fn peer_class(self) -> PeerClass {
        if self.intersects(RoleMask(Self::CLIENT_BITS)) {
            PeerClass::Client
        } else {
            PeerClass::PeerNode
        }
    }
}

impl From<Role> for RoleMask {
    fn from(role: Role) -> Self {
        RoleMask(role.bits())
    }
}

impl From<RoleMask> for u8 {
    fn from(mask: RoleMask) -> Self {
        mask.0
    }
}

impl fmt::Display for RoleMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Role::name).collect();
        f.write_str(&names.join("|"))
    }
}

/// Whether the remote end of a session is an end-user client or another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerClass {
    Client,
    PeerNode,
}

impl fmt::Display for PeerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerClass::Client => f.write_str("client"),
            PeerClass::PeerNode => f.write_str("peer_node"),
        }
    }
}

/// Idle intervals per session class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBudget {
    pub client: Duration,
    pub peer_node: Duration,
}

impl Default for IdleBudget {
    fn default() -> Self {
        Self {
            client: Duration::from_millis(DEFAULT_CLIENT_IDLE_MS),
            peer_node: Duration::from_millis(DEFAULT_PEER_IDLE_MS),
        }
    }
}

impl IdleBudget {
    pub fn for_class(&self, class: PeerClass) -> Duration {
        match class {
            PeerClass::Client => self.client,
            PeerClass::PeerNode => self.peer_node,
        }
    }
}
