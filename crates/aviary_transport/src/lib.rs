#![forbid(unsafe_code)]
//! The Driver/Adapter pipeline: drivers own transport (a WebSocket server,
//! stdin), adapters own protocol translation between raw platform payloads
//! and the framework's typed event model. Bound many-to-many by a protocol
//! tag string (see `DESIGN.md`).

mod bot;
mod bridge;
mod driver;
mod error;

pub mod adapter;
pub mod adapter_manager;
pub mod adapters;
pub mod driver_manager;
pub mod drivers;

pub use adapter::{Adapter, AdapterCore};
pub use adapter_manager::{AdapterManager, AdapterManagerConfig};
pub use bot::BotHandle;
pub use bridge::{CHAT_COMMAND_PERMISSION, CHAT_COMMAND_PERMISSION_BASE, ChatCommandBridge};
pub use driver::{Driver, DriverEvent};
pub use driver_manager::DriverManager;
pub use error::{AdapterError, DriverError};
