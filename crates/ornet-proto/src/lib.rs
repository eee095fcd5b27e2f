//! Core onion-routing protocol implementation: channels, circuits, and
//! the relay dispatcher.
//!
//! # Overview
//!
//! A *channel* is the authenticated TLS link between two adjacent
//! relays; a *circuit* is a multi-hop path built over channels by
//! nested handshakes.  This crate implements both state machines and
//! the dispatcher that routes cells between them, in a deliberately
//! I/O-free style: the host's event loop feeds decrypted TLS bytes in
//! with [`RelayCore::receive_bytes`](relay::RelayCore::receive_bytes),
//! and takes queued outbound bytes and [`relay::Event`]s back out.
//! Nothing here blocks, sleeps, or touches a socket.
//!
//! The only concurrency in the design is the onion-skin worker pool:
//! public-key circuit handshakes are expensive, so requests for them
//! are exported as messages ([`onionskin`]) and their replies are fed
//! back in whenever they are ready -- even if the circuit that wanted
//! them is gone by then.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod channel;
pub mod circuit;
pub mod crypto;
pub mod onionskin;
pub mod relay;
pub mod transport;
pub(crate) mod util;

use std::fmt;
use thiserror::Error;

/// An error from the onion-routing protocol core.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The peer violated the channel protocol.
    #[error("channel protocol violation: {0}")]
    ChanProto(String),
    /// The peer violated the circuit protocol.
    #[error("circuit protocol violation: {0}")]
    CircProto(String),
    /// Something went wrong during channel negotiation.
    #[error("handshake error: {0}")]
    HandshakeProto(String),
    /// A cell could not be encoded or decoded.
    #[error("cell coding error")]
    CellErr(#[from] ornet_cell::Error),
    /// A circuit-creation handshake failed.
    #[error("bad circuit handshake")]
    BadHandshake,
    /// A relay cell was not recognized by any hop.
    #[error("relay cell was not recognized")]
    BadCellAuth,
    /// Tried to use a hop that doesn't exist on this circuit.
    #[error("no such hop on circuit")]
    NoSuchHop,
    /// No circuit ID was available on this channel.
    #[error("no unused circuit IDs on this channel")]
    IdRangeFull,
    /// A flow-control window was empty, so nothing may be sent yet.
    #[error("flow-control window empty")]
    WindowEmpty,
    /// The channel or circuit is already closed.
    #[error("object already closed")]
    Closed,
    /// An internal invariant did not hold.  This is always a bug.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// A Result whose error type is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A process-unique handle for a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chan {}", self.0)
    }
}

/// A process-unique handle for a circuit.
///
/// Wire-level circuit IDs are only unique per channel; this handle
/// names the circuit object itself, so that (for example) an
/// onion-skin reply can find its circuit without holding a pointer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircuitId(pub u64);

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circ {}", self.0)
    }
}
