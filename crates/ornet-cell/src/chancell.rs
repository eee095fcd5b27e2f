//! Messages sent over onion-routing channels.
//!
//! A "channel" is the authenticated TLS connection between two relays
//! (or between a client and its first relay).  This module implements
//! the [`ChanCell`] frame sent over a channel, and the [`msg`] module
//! the messages those frames carry.

pub mod codec;
pub mod msg;

use caret::caret_int;
use std::num::NonZeroU16;

/// The amount of data sent in a fixed-length cell.
///
/// Fixed-length cells are 512 bytes: a two-byte circuit ID, a one-byte
/// command, and this much payload.
pub const CELL_DATA_LEN: usize = 509;

/// Number of bytes in a fixed-length cell, header included.
pub const CELL_LEN: usize = CELL_DATA_LEN + 3;

/// A cell body considered as a raw array of bytes.
pub type RawCellBody = [u8; CELL_DATA_LEN];

/// A [`RawCellBody`] stored on the heap.
///
/// We pass these around boxed to avoid copying 509-byte arrays through
/// every layer of the relay pipeline.
pub type BoxedCellBody = Box<RawCellBody>;

/// Channel-local identifier for a circuit.
///
/// Circuit IDs are 16 bits on the wire and cannot be zero: a cell with a
/// zero circuit ID applies to the channel as a whole, which we represent
/// as `Option<CircId>::None`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct CircId(NonZeroU16);

impl From<NonZeroU16> for CircId {
    fn from(item: NonZeroU16) -> Self {
        Self(item)
    }
}
impl From<CircId> for u16 {
    fn from(id: CircId) -> u16 {
        id.0.get()
    }
}
impl std::fmt::Display for CircId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        self.0.fmt(f)
    }
}
impl CircId {
    /// Create a `CircId` for a nonzero `val`; return None when `val` is 0.
    pub fn new(val: u16) -> Option<Self> {
        NonZeroU16::new(val).map(Self)
    }
    /// Convenience: convert to u16, mapping `None` to 0.
    pub fn get_or_zero(circ_id: Option<Self>) -> u16 {
        match circ_id {
            Some(circ_id) => circ_id.0.get(),
            None => 0,
        }
    }
    /// Return true if this ID has its high bit set.
    ///
    /// Each side of a channel allocates from one half of the ID space;
    /// which half is decided by comparing identity digests during the
    /// handshake.
    pub fn is_high(&self) -> bool {
        self.0.get() & 0x8000 != 0
    }
}

caret_int! {
    /// A ChanCmd is the command field of a channel cell.  It tells the
    /// recipient what the cell means, and whether it is fixed-length.
    pub struct ChanCmd(u8) {
        /// A fixed-length cell that will be dropped.
        PADDING = 0,
        /// Create a new circuit, carrying a public-key onion-skin.
        CREATE = 1,
        /// Finish a circuit-creation handshake.
        CREATED = 2,
        /// Relay cell, transmitted over a circuit.
        RELAY = 3,
        /// Tear down a circuit.
        DESTROY = 4,
        /// Create a new circuit with no public-key crypto.
        CREATE_FAST = 5,
        /// Finish a no-public-key circuit-creation handshake.
        CREATED_FAST = 6,
        /// Variable-length cell, despite its number: negotiate the link
        /// protocol version.
        VERSIONS = 7,
        /// Finish a channel handshake with time and address information.
        NETINFO = 8,
        /// Relay cell that may carry a CREATE request; each hop forwards
        /// only a small number of these.
        RELAY_EARLY = 9,
    }
}

impl ChanCmd {
    /// Return true if this command uses the variable-length cell format.
    ///
    /// On the link protocol versions we implement, only VERSIONS is
    /// variable-length; but VERSIONS is variable-length even on links
    /// whose other cells are all fixed.
    pub fn is_var_cell(self) -> bool {
        self == ChanCmd::VERSIONS
    }
    /// Return true if this command is one we recognize at all.
    pub fn is_known(self) -> bool {
        matches!(
            self,
            ChanCmd::PADDING
                | ChanCmd::CREATE
                | ChanCmd::CREATED
                | ChanCmd::RELAY
                | ChanCmd::DESTROY
                | ChanCmd::CREATE_FAST
                | ChanCmd::CREATED_FAST
                | ChanCmd::VERSIONS
                | ChanCmd::NETINFO
                | ChanCmd::RELAY_EARLY
        )
    }
    /// Return true if this command accepts the given circuit-ID value.
    pub fn accepts_circid_val(self, id: Option<CircId>) -> bool {
        match self {
            ChanCmd::PADDING | ChanCmd::NETINFO | ChanCmd::VERSIONS => id.is_none(),
            ChanCmd::CREATE
            | ChanCmd::CREATED
            | ChanCmd::RELAY
            | ChanCmd::DESTROY
            | ChanCmd::CREATE_FAST
            | ChanCmd::CREATED_FAST
            | ChanCmd::RELAY_EARLY => id.is_some(),
            _ => true,
        }
    }
}

/// Trait implemented by anything that can serve as a channel message.
pub trait ChanMsg {
    /// Return the [`ChanCmd`] for this message.
    fn cmd(&self) -> ChanCmd;
    /// Write the body of this message (not including length or command).
    fn encode_onto<W: ornet_bytes::Writer + ?Sized>(
        self,
        w: &mut W,
    ) -> ornet_bytes::EncodeResult<()>;
    /// Decode this message from a reader, according to a specified command
    /// value.  The reader must be truncated to the exact body length.
    fn decode_from_reader(
        cmd: ChanCmd,
        r: &mut ornet_bytes::Reader<'_>,
    ) -> ornet_bytes::Result<Self>
    where
        Self: Sized;
}

/// A decoded channel cell, to be sent or received on a channel.
#[derive(Debug, Clone)]
pub struct ChanCell<M> {
    /// Circuit ID associated with this cell, if any.
    circid: Option<CircId>,
    /// Underlying message in this cell.
    msg: M,
}

/// A decoded channel cell of unrestricted message type.
pub type AnyChanCell = ChanCell<msg::AnyChanMsg>;

impl<M: ChanMsg> ChanCell<M> {
    /// Construct a new channel cell.
    pub fn new(circid: Option<CircId>, msg: M) -> Self {
        ChanCell { circid, msg }
    }
    /// Return the circuit ID for this cell.
    pub fn circid(&self) -> Option<CircId> {
        self.circid
    }
    /// Return a reference to the underlying message.
    pub fn msg(&self) -> &M {
        &self.msg
    }
    /// Consume this cell and return its components.
    pub fn into_circid_and_msg(self) -> (Option<CircId>, M) {
        (self.circid, self.msg)
    }
}
