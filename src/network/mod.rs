pub(crate) mod events;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod relay;
pub mod role;
pub mod session;
pub mod sweeper;

pub use handler::{LoggingHandler, MessageHandler};
pub use listener::{ListenerContext, ListenerInfo, RoleListener};
pub use registry::SessionRegistry;
pub use relay::RelayList;
pub use role::{IdleBudget, PeerClass, Role, RoleMask};
pub use session::{CloseStatus, Session, SessionId, SessionInfo};
pub use sweeper::{sweep_once, IdleSweeper, SweepReport};
