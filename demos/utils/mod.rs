//! Utility functions for the demos
//!
//! Host-side setup of the TAP device the stack is attached to.

pub mod network;

pub use network::*;
