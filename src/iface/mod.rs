//! Network interface abstraction layer
//!
//! This module provides abstractions for network interfaces and packet processing:
//! - Link devices (TAP, in-memory queue)
//! - Protocol dispatch
//! - The interface that owns all stack state and runs the poll loop

pub mod device;
pub mod dispatch;
pub mod interface;
pub mod tap;

// Re-export commonly used items
pub use device::{LinkDevice, QueueDevice};
pub use dispatch::{Handler, ProtocolTable};
pub use interface::Interface;
pub use tap::TapDevice;
