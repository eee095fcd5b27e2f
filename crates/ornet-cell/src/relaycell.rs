//! Implementation for the payloads of RELAY cells.
//!
//! A RELAY cell's body, once a layer of encryption has been removed at
//! the recipient, is an inner frame:
//!
//! ```ignore
//!     u8  relay_command;
//!     u16 recognized;    // zero for a cell addressed to this hop
//!     u16 stream_id;     // zero for circuit-level control messages
//!     u8  digest[4];     // running digest prefix
//!     u16 length;
//!     u8  data[498];
//! ```
//!
//! The `recognized` and `digest` fields belong to the relay-crypto
//! layer; this module encodes them as zero and never inspects them.

pub mod msg;

use crate::chancell::{BoxedCellBody, CELL_DATA_LEN};
use caret::caret_int;
use ornet_bytes::{EncodeResult, Error, Reader, Result, Writer};
use std::num::NonZeroU16;

/// Number of bytes of relay-cell header: command, recognized, stream ID,
/// digest, and length.
pub const RELAY_HEADER_LEN: usize = 11;
/// Largest amount of data that fits in a single relay cell.
pub const RELAY_DATA_MAX: usize = CELL_DATA_LEN - RELAY_HEADER_LEN;

/// The range of a relay cell body occupied by the `recognized` field.
pub const RECOGNIZED_RANGE: std::ops::Range<usize> = 1..3;
/// The range of a relay cell body occupied by the running-digest prefix.
pub const DIGEST_RANGE: std::ops::Range<usize> = 5..9;

caret_int! {
    /// A command that identifies the type of a relay message.
    pub struct RelayCmd(u8) {
        /// Start a new stream.
        BEGIN = 1,
        /// Data on a stream.
        DATA = 2,
        /// Close a stream.
        END = 3,
        /// Acknowledge a BEGIN; stream is open.
        CONNECTED = 4,
        /// Used for flow control.
        SENDME = 5,
        /// Extend a circuit to a new hop.
        EXTEND = 6,
        /// Reply to EXTEND: circuit extended.
        EXTENDED = 7,
        /// Tear down the circuit from this hop on, but keep the
        /// near side of the circuit usable.
        TRUNCATE = 8,
        /// Answer to TRUNCATE, or notice that the far side went away.
        TRUNCATED = 9,
        /// A padding message to be dropped.
        DROP = 10,
        /// Look up a hostname at the exit.
        RESOLVE = 11,
        /// Answer to a RESOLVE.
        RESOLVED = 12,
        /// Start a stream to the relay's own directory port.
        BEGIN_DIR = 13,
    }
}

impl RelayCmd {
    /// Check whether this command is allowed to have a stream ID of the
    /// given presence.
    pub fn accepts_streamid_val(self, id: Option<StreamId>) -> bool {
        match self {
            RelayCmd::EXTEND
            | RelayCmd::EXTENDED
            | RelayCmd::TRUNCATE
            | RelayCmd::TRUNCATED
            | RelayCmd::DROP => id.is_none(),
            RelayCmd::BEGIN
            | RelayCmd::DATA
            | RelayCmd::END
            | RelayCmd::CONNECTED
            | RelayCmd::RESOLVE
            | RelayCmd::RESOLVED
            | RelayCmd::BEGIN_DIR => id.is_some(),
            // A SENDME is stream-level with a stream ID, circuit-level
            // without one.
            RelayCmd::SENDME => true,
            _ => true,
        }
    }
}

/// Identifier for a stream within a circuit.
///
/// Zero on the wire means "no stream": a circuit-level control message.
/// Stream IDs are allocated by the origin of the stream.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct StreamId(NonZeroU16);

impl From<NonZeroU16> for StreamId {
    fn from(id: NonZeroU16) -> Self {
        Self(id)
    }
}
impl From<StreamId> for u16 {
    fn from(id: StreamId) -> u16 {
        id.0.get()
    }
}
impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl StreamId {
    /// Create a `StreamId` for a nonzero `val`; None when `val` is zero.
    pub fn new(val: u16) -> Option<Self> {
        NonZeroU16::new(val).map(Self)
    }
    /// Convenience: convert to u16, mapping `None` to 0.
    pub fn get_or_zero(id: Option<Self>) -> u16 {
        match id {
            Some(id) => id.0.get(),
            None => 0,
        }
    }
}

/// Trait implemented by anything that can serve as a relay message.
pub trait RelayMsg {
    /// Return the command for this message.
    fn cmd(&self) -> RelayCmd;
    /// Encode the body of this message, not including its header.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
    /// Extract the body of a message with command `cmd` from reader `r`.
    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> Result<Self>
    where
        Self: Sized;
}

/// A decoded and parsed relay message of unrestricted type, together
/// with its stream ID.
#[derive(Clone, Debug)]
pub struct AnyRelayMsgOuter {
    /// The stream ID for the stream this message is directed at, if any.
    streamid: Option<StreamId>,
    /// The message itself.
    msg: msg::AnyRelayMsg,
}

impl AnyRelayMsgOuter {
    /// Construct a new relay message envelope.
    pub fn new(streamid: Option<StreamId>, msg: msg::AnyRelayMsg) -> Self {
        AnyRelayMsgOuter { streamid, msg }
    }
    /// Return the stream ID for this message, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        self.streamid
    }
    /// Return a reference to the message.
    pub fn msg(&self) -> &msg::AnyRelayMsg {
        &self.msg
    }
    /// Return the relay command for this message.
    pub fn cmd(&self) -> RelayCmd {
        self.msg.cmd()
    }
    /// Consume this envelope and return its parts.
    pub fn into_streamid_and_msg(self) -> (Option<StreamId>, msg::AnyRelayMsg) {
        (self.streamid, self.msg)
    }

    /// Encode this message into a full relay cell body.
    ///
    /// The `recognized` and `digest` fields are written as zero; the
    /// relay-crypto layer fills in the digest before encryption.  Unused
    /// payload is zero-filled.
    pub fn encode(self) -> crate::Result<BoxedCellBody> {
        let mut body = Box::new([0_u8; CELL_DATA_LEN]);
        let mut out = Vec::with_capacity(CELL_DATA_LEN);
        let cmd = self.msg.cmd();
        out.write_u8(cmd.into());
        out.write_u16(0); // recognized
        out.write_u16(StreamId::get_or_zero(self.streamid));
        out.write_u32(0); // digest
        out.write_u16(0); // length; filled in below.
        self.msg.encode_onto(&mut out)?;
        if out.len() > CELL_DATA_LEN {
            return Err(crate::Error::CantEncode("relay message too long"));
        }
        let data_len = (out.len() - RELAY_HEADER_LEN) as u16;
        out[RELAY_HEADER_LEN - 2..RELAY_HEADER_LEN].copy_from_slice(&data_len.to_be_bytes());
        body[..out.len()].copy_from_slice(&out);
        Ok(body)
    }

    /// Try to decode a relay cell body (after its crypto has been
    /// removed and checked) into a message.
    pub fn decode(body: BoxedCellBody) -> crate::Result<Self> {
        /// Wrap a bytes error as a cell-level error.
        fn wrap_err(err: Error) -> crate::Error {
            crate::Error::BytesErr {
                err,
                parsed: "relay cell",
            }
        }
        let mut r = Reader::from_slice(&body[..]);
        let cmd: RelayCmd = r.take_u8().map_err(wrap_err)?.into();
        let _recognized = r.take_u16().map_err(wrap_err)?;
        let streamid = StreamId::new(r.take_u16().map_err(wrap_err)?);
        let _digest = r.take_u32().map_err(wrap_err)?;
        let len = r.take_u16().map_err(wrap_err)? as usize;
        if r.remaining() < len {
            return Err(crate::Error::ChanProto(
                "relay cell length field too large".into(),
            ));
        }
        r.truncate(len);
        let msg = msg::AnyRelayMsg::decode_from_reader(cmd, &mut r).map_err(wrap_err)?;
        if !cmd.accepts_streamid_val(streamid) {
            return Err(crate::Error::ChanProto(format!(
                "invalid stream ID {} for relay command {}",
                StreamId::get_or_zero(streamid),
                cmd
            )));
        }
        Ok(AnyRelayMsgOuter { streamid, msg })
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::relaycell::msg::AnyRelayMsg;

    #[test]
    fn data_envelope_round_trip() {
        let m = msg::Data::new(b"the lights are on").unwrap();
        let env = AnyRelayMsgOuter::new(StreamId::new(7), m.into());
        let body = env.encode().unwrap();

        assert_eq!(body[0], u8::from(RelayCmd::DATA));
        assert_eq!(&body[1..3], &[0, 0]); // recognized
        assert_eq!(&body[3..5], &[0, 7]); // stream id
        assert_eq!(&body[5..9], &[0, 0, 0, 0]); // digest
        assert_eq!(&body[9..11], &[0, 17]); // length
        assert_eq!(&body[11..28], b"the lights are on");
        assert!(body[28..].iter().all(|b| *b == 0));

        let decoded = AnyRelayMsgOuter::decode(body).unwrap();
        assert_eq!(decoded.stream_id(), StreamId::new(7));
        assert_eq!(decoded.cmd(), RelayCmd::DATA);
        match decoded.msg() {
            AnyRelayMsg::Data(d) => assert_eq!(d.as_ref(), b"the lights are on"),
            other => panic!("wrong message: {:?}", other),
        }
    }

    #[test]
    fn control_messages_have_no_stream() {
        let env = AnyRelayMsgOuter::new(None, msg::Truncate::default().into());
        let body = env.encode().unwrap();
        let decoded = AnyRelayMsgOuter::decode(body).unwrap();
        assert_eq!(decoded.stream_id(), None);
        assert_eq!(decoded.cmd(), RelayCmd::TRUNCATE);

        // An EXTEND with a stream ID is a protocol violation.
        let env = AnyRelayMsgOuter::new(StreamId::new(3), msg::Truncate::default().into());
        let body = env.encode().unwrap();
        assert!(AnyRelayMsgOuter::decode(body).is_err());
    }

    #[test]
    fn overlong_length_field_rejected() {
        let env = AnyRelayMsgOuter::new(StreamId::new(1), msg::Data::new(b"hi").unwrap().into());
        let mut body = env.encode().unwrap();
        body[9] = 0xff;
        body[10] = 0xff;
        assert!(AnyRelayMsgOuter::decode(body).is_err());
    }

    #[test]
    fn max_data_fits() {
        let data = vec![0x5a_u8; RELAY_DATA_MAX];
        let m = msg::Data::new(&data[..]).unwrap();
        let env = AnyRelayMsgOuter::new(StreamId::new(1), m.into());
        let body = env.encode().unwrap();
        assert_eq!(&body[9..11], &[0x01, 0xf2]); // 498
        let decoded = AnyRelayMsgOuter::decode(body).unwrap();
        match decoded.msg() {
            AnyRelayMsg::Data(d) => assert_eq!(d.as_ref().len(), RELAY_DATA_MAX),
            other => panic!("wrong message: {:?}", other),
        }

        assert!(msg::Data::new(&vec![0_u8; RELAY_DATA_MAX + 1][..]).is_err());
    }
}
