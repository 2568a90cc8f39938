//! Error types
//!
//! `NetError` is returned by operations that report failure to their caller
//! (opening ports, sending, transmitting). `ParseError` describes why an
//! inbound packet was dropped; receive paths log it and carry on.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::iface::dispatch::Handler;

/// Failures surfaced to callers of the stack
#[derive(Error, Debug)]
pub enum NetError {
    #[error("not enough room in packet buffer")]
    NoBufferSpace,

    #[error("buffer window holds {available} bytes, {requested} requested")]
    BufferUnderflow { requested: usize, available: usize },

    #[error("invalid UDP port {0}")]
    InvalidPort(u16),

    #[error("UDP port table is full ({0} ports open)")]
    PortTableFull(usize),

    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),

    #[error("fragment offset {0} is not a multiple of 8")]
    MisalignedFragment(usize),

    #[error("{0:?} handler cannot be registered on this layer")]
    MisplacedHandler(Handler),

    #[error("no link address for {0}")]
    Unresolved(Ipv4Addr),

    #[error("link device error: {0}")]
    Link(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;

/// Reasons an inbound packet is considered malformed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid IP version {0}")]
    BadVersion(u8),

    #[error("unsupported IP header length {0} (options are not supported)")]
    UnsupportedHeaderLength(u8),

    #[error("declared length {declared} does not fit buffer of {actual} bytes")]
    BadLength { declared: usize, actual: usize },

    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    BadChecksum { stored: u16, computed: u16 },

    #[error("unsupported ARP hardware/protocol type")]
    UnsupportedArp,
}
