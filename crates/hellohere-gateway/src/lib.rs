//! Chat-room lifecycle and real-time fan-out engine.
//!
//! Inbound events arrive as `{action, data}` frames tagged with a connection
//! id. The [`dispatcher::Dispatcher`] resolves the caller through the
//! [`registry::ConnectionRegistry`], the [`chat::ChatService`] validates the
//! action against the room state machine and mutates the store, and the
//! [`delivery::Broadcaster`] pushes the resulting events to every live
//! connection of the affected users.

pub mod auth;
pub mod chat;
pub mod clock;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod machine;
pub mod messages;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod safety;
pub mod scheduler;
pub mod transport;

pub use chat::{Actor, ChatService};
pub use config::{GatewayConfig, LeavePolicy};
pub use dispatcher::Dispatcher;
pub use error::ChatError;
