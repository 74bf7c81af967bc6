//! Relay actor.
//!
//! ```text
//! RelayActor (singleton per relay instance)
//! ├── owns RoomRegistry
//! └── holds one outbox per WebSocket connection
//!     └── connection writer task (drains outbox into the socket)
//! ```
//!
//! Connection reader tasks decode frames and forward them through
//! [`RelayActorHandle`]; they never touch the registry directly.

pub mod messages;
pub mod metrics;
pub mod relay;

pub use messages::{Outbox, RelayMessage, RelayStatus};
pub use metrics::{MailboxLevel, MailboxMonitor};
pub use relay::{RelayActor, RelayActorHandle};
