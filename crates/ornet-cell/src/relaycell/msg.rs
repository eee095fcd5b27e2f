//! Encoding and decoding for relay messages.

use super::{RelayCmd, RelayMsg, RELAY_DATA_MAX};
use crate::chancell::msg::{DestroyReason, TAP_C_HANDSHAKE_LEN, TAP_S_HANDSHAKE_LEN};
use caret::caret_int;
use ornet_bytes::{EncodeError, EncodeResult, Error, Reader, Result, Writer};
use ornet_llcrypto::pk::rsa::RsaIdentity;
use std::fmt;
use std::net::Ipv4Addr;

/// A single parsed relay message, of unrestricted type.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum AnyRelayMsg {
    /// Begin a stream.
    Begin(Begin),
    /// Data on a stream.
    Data(Data),
    /// Close a stream.
    End(End),
    /// Successfully open a stream.
    Connected(Connected),
    /// For flow control.
    Sendme(Sendme),
    /// Extend a circuit to a new hop.
    Extend(Extend),
    /// Reply to an Extend message.
    Extended(Extended),
    /// Tear down the far part of a circuit.
    Truncate(Truncate),
    /// Answer to a Truncate, or notice that the next hop went away.
    Truncated(Truncated),
    /// A padding message to be dropped.
    Drop(Drop),
    /// Look up a hostname.
    Resolve(Resolve),
    /// Answer to a Resolve.
    Resolved(Resolved),
    /// Open a stream to the relay's own directory port.
    BeginDir(BeginDir),
    /// A relay message whose command we don't recognize.
    Unrecognized(Unrecognized),
}

/// Dispatch a method over every variant of AnyRelayMsg.
macro_rules! relaymsg_dispatch {
    ($self:expr, $m:ident => $e:expr) => {
        match $self {
            AnyRelayMsg::Begin($m) => $e,
            AnyRelayMsg::Data($m) => $e,
            AnyRelayMsg::End($m) => $e,
            AnyRelayMsg::Connected($m) => $e,
            AnyRelayMsg::Sendme($m) => $e,
            AnyRelayMsg::Extend($m) => $e,
            AnyRelayMsg::Extended($m) => $e,
            AnyRelayMsg::Truncate($m) => $e,
            AnyRelayMsg::Truncated($m) => $e,
            AnyRelayMsg::Drop($m) => $e,
            AnyRelayMsg::Resolve($m) => $e,
            AnyRelayMsg::Resolved($m) => $e,
            AnyRelayMsg::BeginDir($m) => $e,
            AnyRelayMsg::Unrecognized($m) => $e,
        }
    };
}

impl RelayMsg for AnyRelayMsg {
    fn cmd(&self) -> RelayCmd {
        use AnyRelayMsg::*;
        match self {
            Begin(_) => RelayCmd::BEGIN,
            Data(_) => RelayCmd::DATA,
            End(_) => RelayCmd::END,
            Connected(_) => RelayCmd::CONNECTED,
            Sendme(_) => RelayCmd::SENDME,
            Extend(_) => RelayCmd::EXTEND,
            Extended(_) => RelayCmd::EXTENDED,
            Truncate(_) => RelayCmd::TRUNCATE,
            Truncated(_) => RelayCmd::TRUNCATED,
            Drop(_) => RelayCmd::DROP,
            Resolve(_) => RelayCmd::RESOLVE,
            Resolved(_) => RelayCmd::RESOLVED,
            BeginDir(_) => RelayCmd::BEGIN_DIR,
            Unrecognized(m) => m.cmd(),
        }
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        relaymsg_dispatch!(self, m => m.encode_onto(w))
    }
    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> Result<Self> {
        Ok(match cmd {
            RelayCmd::BEGIN => AnyRelayMsg::Begin(Begin::take_body(r)?),
            RelayCmd::DATA => AnyRelayMsg::Data(Data::take_body(r)?),
            RelayCmd::END => AnyRelayMsg::End(End::take_body(r)?),
            RelayCmd::CONNECTED => AnyRelayMsg::Connected(Connected::take_body(r)?),
            RelayCmd::SENDME => AnyRelayMsg::Sendme(Sendme::take_body(r)?),
            RelayCmd::EXTEND => AnyRelayMsg::Extend(Extend::take_body(r)?),
            RelayCmd::EXTENDED => AnyRelayMsg::Extended(Extended::take_body(r)?),
            RelayCmd::TRUNCATE => AnyRelayMsg::Truncate(Truncate::take_body(r)?),
            RelayCmd::TRUNCATED => AnyRelayMsg::Truncated(Truncated::take_body(r)?),
            RelayCmd::DROP => AnyRelayMsg::Drop(Drop::take_body(r)?),
            RelayCmd::RESOLVE => AnyRelayMsg::Resolve(Resolve::take_body(r)?),
            RelayCmd::RESOLVED => AnyRelayMsg::Resolved(Resolved::take_body(r)?),
            RelayCmd::BEGIN_DIR => AnyRelayMsg::BeginDir(BeginDir::take_body(r)?),
            _ => AnyRelayMsg::Unrecognized(Unrecognized::decode_with_cmd(cmd, r)?),
        })
    }
}

/// Internal: trait for the plain body parsing of each message type.
trait MsgBody: Sized {
    /// Pull this message's body from a reader truncated to its length.
    fn take_body(r: &mut Reader<'_>) -> Result<Self>;
    /// Encode this message's body.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
}

/// Declare From<T> for AnyRelayMsg for each message type.
macro_rules! msg_into_any {
    ($($t:ident),* $(,)?) => {
        $(
            impl From<$t> for AnyRelayMsg {
                fn from(m: $t) -> AnyRelayMsg {
                    AnyRelayMsg::$t(m)
                }
            }
        )*
    };
}
msg_into_any!(
    Begin, Data, End, Connected, Sendme, Extend, Extended, Truncate, Truncated, Drop, Resolve,
    Resolved, BeginDir, Unrecognized,
);

/// A Begin message creates a new stream to a target address and port.
///
/// Only exit relays act on these; anybody else answers with
/// END(EXITPOLICY).
#[derive(Clone, Debug)]
pub struct Begin {
    /// The target address, as it appeared in the message.
    addr: Vec<u8>,
    /// The target port.
    port: u16,
}

impl Begin {
    /// Construct a new Begin message for an address and port.
    ///
    /// The address may be a hostname or a literal; it must be nonempty
    /// and printable ASCII without colons.
    pub fn new(addr: &str, port: u16) -> crate::Result<Self> {
        if addr.is_empty() || !addr.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b':') {
            return Err(crate::Error::CantEncode("bad address in begin message"));
        }
        Ok(Begin {
            addr: addr.to_ascii_lowercase().into_bytes(),
            port,
        })
    }
    /// Return the address requested, as a string.
    pub fn addr(&self) -> &[u8] {
        &self.addr
    }
    /// Return the port requested.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl MsgBody for Begin {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        // "address:port\0", optionally followed by flags we ignore.
        let mut addrport = Vec::new();
        loop {
            let b = r.take_u8()?;
            if b == 0 {
                break;
            }
            addrport.push(b);
        }
        let colon = addrport
            .iter()
            .rposition(|b| *b == b':')
            .ok_or_else(|| Error::InvalidMessage("missing port in begin message".into()))?;
        let (addr, portstr) = addrport.split_at(colon);
        let portstr = std::str::from_utf8(&portstr[1..])
            .map_err(|_| Error::InvalidMessage("port not utf-8 in begin message".into()))?;
        let port: u16 = portstr
            .parse()
            .map_err(|_| Error::InvalidMessage("bad port in begin message".into()))?;
        Ok(Begin {
            addr: addr.into(),
            port,
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.addr[..]);
        w.write_u8(b':');
        w.write_all(self.port.to_string().as_bytes());
        w.write_u8(0);
        Ok(())
    }
}

/// A Data message carries stream data.
#[derive(Clone)]
pub struct Data {
    /// The contents of the cell.
    body: Vec<u8>,
}

impl Data {
    /// Construct a new Data message, if `inp` fits in a cell.
    pub fn new(inp: &[u8]) -> crate::Result<Self> {
        if inp.len() > RELAY_DATA_MAX {
            return Err(crate::Error::CantEncode("Too much data for a cell"));
        }
        Ok(Self::new_unchecked(inp.into()))
    }
    /// Construct a new data cell from a body short enough to fit.
    fn new_unchecked(body: Vec<u8>) -> Self {
        Data { body }
    }
    /// Consume this message and return its body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.body[..]
    }
}
impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data {{ [{} bytes] }}", self.body.len())
    }
}

impl MsgBody for Data {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Data {
            body: r.take_rest().into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.body);
        Ok(())
    }
}

caret_int! {
    /// A declared reason for closing a stream.
    pub struct EndReason(u8) {
        /// Closing for an unlisted reason.
        MISC = 1,
        /// Couldn't look up hostname.
        RESOLVEFAILED = 2,
        /// Remote host refused connection.
        CONNECTREFUSED = 3,
        /// Closing because of the exit policy.
        EXITPOLICY = 4,
        /// Circuit destroyed.
        DESTROY = 5,
        /// Anonymized TCP connection was closed normally.
        DONE = 6,
        /// Connection timed out, or relay gave up on the connection.
        TIMEOUT = 7,
        /// No route to target.
        NOROUTE = 8,
        /// Relay is entering hibernation.
        HIBERNATING = 9,
        /// Internal error at the relay.
        INTERNAL = 10,
        /// Ran out of resources.
        RESOURCELIMIT = 11,
        /// Connection unexpectedly reset.
        CONNRESET = 12,
        /// Protocol violation.
        TORPROTOCOL = 13,
        /// BEGIN_DIR sent to a relay that isn't a directory cache.
        NOTDIRECTORY = 14,
    }
}

/// An End message tells the other end of a stream to close it.
#[derive(Clone, Debug)]
pub struct End {
    /// Why the stream ended.
    reason: EndReason,
    /// The resolved address, if the reason is EXITPOLICY.
    addr: Option<(Ipv4Addr, u32)>,
}

impl End {
    /// Construct a new End message with a provided reason.
    pub fn new_with_reason(reason: EndReason) -> Self {
        End { reason, addr: None }
    }
    /// Construct a new End message reporting a policy rejection of a
    /// particular address.
    pub fn new_exitpolicy(addr: Ipv4Addr, ttl: u32) -> Self {
        End {
            reason: EndReason::EXITPOLICY,
            addr: Some((addr, ttl)),
        }
    }
    /// Return the reason this stream ended.
    pub fn reason(&self) -> EndReason {
        self.reason
    }
}
impl MsgBody for End {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            // Tolerated for backward compatibility.
            return Ok(End {
                reason: EndReason::MISC,
                addr: None,
            });
        }
        let reason: EndReason = r.take_u8()?.into();
        let addr = if reason == EndReason::EXITPOLICY && r.remaining() >= 8 {
            let a: Ipv4Addr = r.extract()?;
            let ttl = r.take_u32()?;
            Some((a, ttl))
        } else {
            None
        };
        Ok(End { reason, addr })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.reason.into());
        if let Some((addr, ttl)) = self.addr {
            w.write(&addr)?;
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// A Connected message is a successful response to a Begin message.
#[derive(Clone, Debug, Default)]
pub struct Connected {
    /// The address that the relay connected to, and a TTL for it.
    addr: Option<(Ipv4Addr, u32)>,
}
impl Connected {
    /// Construct a new empty Connected message.
    pub fn new_empty() -> Self {
        Connected { addr: None }
    }
    /// Construct a new Connected message with an address and TTL.
    pub fn new_with_addr(addr: Ipv4Addr, ttl: u32) -> Self {
        Connected {
            addr: Some((addr, ttl)),
        }
    }
    /// Return the address and TTL, if any.
    pub fn addr(&self) -> Option<(Ipv4Addr, u32)> {
        self.addr
    }
}
impl MsgBody for Connected {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(Connected { addr: None });
        }
        let addr: Ipv4Addr = r.extract()?;
        let ttl = if r.remaining() >= 4 { r.take_u32()? } else { 0 };
        Ok(Connected {
            addr: Some((addr, ttl)),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        if let Some((addr, ttl)) = self.addr {
            w.write(&addr)?;
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// A Sendme message increases a flow-control window.
///
/// With a stream ID it acknowledges stream data; without one, circuit
/// data.  This protocol version carries no authentication in it.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Sendme {}
impl Sendme {
    /// Construct a new Sendme message.
    pub fn new() -> Self {
        Sendme {}
    }
}
impl MsgBody for Sendme {
    fn take_body(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Sendme {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// An Extend message tells the last relay in a circuit to extend it to
/// a new hop.
///
/// These arrive only inside RELAY_EARLY cells.
#[derive(Clone)]
pub struct Extend {
    /// The IPv4 address of the new hop.
    addr: Ipv4Addr,
    /// The OR port of the new hop.
    port: u16,
    /// The onion-skin to deliver in a CREATE cell.
    onion_skin: Vec<u8>,
    /// The identity fingerprint of the new hop; the extending relay must
    /// refuse to hand the circuit to a relay with a different identity.
    rsa_id: RsaIdentity,
}
impl Extend {
    /// Construct a new Extend message.
    pub fn new(addr: Ipv4Addr, port: u16, onion_skin: Vec<u8>, rsa_id: RsaIdentity) -> Self {
        Extend {
            addr,
            port,
            onion_skin,
            rsa_id,
        }
    }
    /// Return the address of the target relay.
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }
    /// Return the OR port of the target relay.
    pub fn port(&self) -> u16 {
        self.port
    }
    /// Return the onion-skin to deliver.
    pub fn onion_skin(&self) -> &[u8] {
        &self.onion_skin
    }
    /// Return the expected identity of the target relay.
    pub fn rsa_id(&self) -> &RsaIdentity {
        &self.rsa_id
    }
}
impl MsgBody for Extend {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        let addr: Ipv4Addr = r.extract()?;
        let port = r.take_u16()?;
        let onion_skin = r.take(TAP_C_HANDSHAKE_LEN)?.into();
        let id: [u8; 20] = r.extract()?;
        Ok(Extend {
            addr,
            port,
            onion_skin,
            rsa_id: id.into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        if self.onion_skin.len() != TAP_C_HANDSHAKE_LEN {
            return Err(EncodeError::BadLengthValue);
        }
        w.write(&self.addr)?;
        w.write_u16(self.port);
        w.write_all(&self.onion_skin[..]);
        w.write_all(self.rsa_id.as_bytes());
        Ok(())
    }
}
impl fmt::Debug for Extend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extend")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .field("rsa_id", &self.rsa_id)
            .finish_non_exhaustive()
    }
}

/// An Extended message brings a CREATED reply back down the circuit.
#[derive(Clone)]
pub struct Extended {
    /// The CREATED handshake reply from the new hop.
    handshake: Vec<u8>,
}
impl Extended {
    /// Construct a new Extended message from a CREATED reply.
    pub fn new(handshake: Vec<u8>) -> Self {
        Extended { handshake }
    }
    /// Consume this message and return the handshake reply.
    pub fn into_body(self) -> Vec<u8> {
        self.handshake
    }
}
impl MsgBody for Extended {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        let handshake = r.take(TAP_S_HANDSHAKE_LEN)?.into();
        Ok(Extended { handshake })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.handshake[..]);
        Ok(())
    }
}
impl fmt::Debug for Extended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extended {{ [{} bytes] }}", self.handshake.len())
    }
}

/// A Truncate message tells the last relay on a circuit to tear down
/// everything past the sender.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Truncate {}
impl MsgBody for Truncate {
    fn take_body(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Truncate {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// A Truncated message tells the origin that the circuit past the
/// sending relay is gone, but the near part remains usable.
#[derive(Clone, Debug)]
pub struct Truncated {
    /// Reason the forward part of the circuit went away.
    reason: DestroyReason,
}
impl Truncated {
    /// Construct a new Truncated message.
    pub fn new(reason: DestroyReason) -> Self {
        Truncated { reason }
    }
    /// Return the reason the circuit was truncated.
    pub fn reason(&self) -> DestroyReason {
        self.reason
    }
}
impl MsgBody for Truncated {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Truncated {
            reason: r.take_u8()?.into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.reason.into());
        Ok(())
    }
}

/// A Drop message is a circuit-level padding message, to be ignored.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Drop {}
impl MsgBody for Drop {
    fn take_body(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Drop {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// A Resolve message asks an exit to look up a hostname.
#[derive(Clone, Debug)]
pub struct Resolve {
    /// The hostname to look up.
    query: Vec<u8>,
}
impl Resolve {
    /// Construct a new Resolve for a hostname.
    pub fn new(query: &str) -> Self {
        Resolve {
            query: query.as_bytes().into(),
        }
    }
    /// Return the hostname queried.
    pub fn query(&self) -> &[u8] {
        &self.query
    }
}
impl MsgBody for Resolve {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        let mut query = Vec::new();
        loop {
            let b = r.take_u8()?;
            if b == 0 {
                break;
            }
            query.push(b);
        }
        Ok(Resolve { query })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.query[..]);
        w.write_u8(0);
        Ok(())
    }
}

/// One answer in a Resolved message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolvedVal {
    /// An IPv4 address.
    Ipv4(Ipv4Addr),
    /// An IPv6 address.
    Ipv6(std::net::Ipv6Addr),
    /// A hostname (from a reverse lookup).
    Hostname(Vec<u8>),
    /// A transient error.
    TransientError,
    /// A nontransient error.
    NontransientError,
    /// An answer of a type we don't recognize.
    Unrecognized(u8, Vec<u8>),
}

/// Indicates a hostname answer.
const RES_HOSTNAME: u8 = 0;
/// Indicates an IPv4 answer.
const RES_IPV4: u8 = 4;
/// Indicates an IPv6 answer.
const RES_IPV6: u8 = 6;
/// Indicates a transient error.
const RES_ERR_TRANSIENT: u8 = 0xf0;
/// Indicates a nontransient error.
const RES_ERR_NONTRANSIENT: u8 = 0xf1;

/// A Resolved message carries the answers to a Resolve.
#[derive(Clone, Debug, Default)]
pub struct Resolved {
    /// List of (answer, ttl) pairs, in the order sent.
    answers: Vec<(ResolvedVal, u32)>,
}
impl Resolved {
    /// Construct an empty Resolved message.
    pub fn new_empty() -> Self {
        Resolved::default()
    }
    /// Construct a Resolved reporting an error.
    pub fn new_err(transient: bool, ttl: u32) -> Self {
        let mut res = Self::new_empty();
        let err = if transient {
            ResolvedVal::TransientError
        } else {
            ResolvedVal::NontransientError
        };
        res.add_answer(err, ttl);
        res
    }
    /// Add a single answer to this message.
    pub fn add_answer(&mut self, answer: ResolvedVal, ttl: u32) {
        self.answers.push((answer, ttl));
    }
    /// Return the answers in this message.
    pub fn answers(&self) -> &[(ResolvedVal, u32)] {
        &self.answers
    }
}
impl MsgBody for Resolved {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        let mut answers = Vec::new();
        while r.remaining() > 0 {
            let atype = r.take_u8()?;
            let alen = r.take_u8()?;
            let abody = r.take(alen as usize)?;
            let ttl = r.take_u32()?;
            let answer = match (atype, alen) {
                (RES_IPV4, 4) => {
                    ResolvedVal::Ipv4([abody[0], abody[1], abody[2], abody[3]].into())
                }
                (RES_IPV6, 16) => {
                    let mut bytes = [0_u8; 16];
                    bytes.copy_from_slice(abody);
                    ResolvedVal::Ipv6(bytes.into())
                }
                (RES_HOSTNAME, _) => ResolvedVal::Hostname(abody.into()),
                (RES_ERR_TRANSIENT, _) => ResolvedVal::TransientError,
                (RES_ERR_NONTRANSIENT, _) => ResolvedVal::NontransientError,
                (other, _) => ResolvedVal::Unrecognized(other, abody.into()),
            };
            answers.push((answer, ttl));
        }
        Ok(Resolved { answers })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        for (answer, ttl) in self.answers {
            match answer {
                ResolvedVal::Ipv4(a) => {
                    w.write_u8(RES_IPV4);
                    w.write_u8(4);
                    w.write(&a)?;
                }
                ResolvedVal::Ipv6(a) => {
                    w.write_u8(RES_IPV6);
                    w.write_u8(16);
                    w.write(&a)?;
                }
                ResolvedVal::Hostname(h) => {
                    w.write_u8(RES_HOSTNAME);
                    w.write_u8(
                        h.len()
                            .try_into()
                            .map_err(|_| EncodeError::BadLengthValue)?,
                    );
                    w.write_all(&h[..]);
                }
                ResolvedVal::TransientError => {
                    w.write_u8(RES_ERR_TRANSIENT);
                    w.write_u8(0);
                }
                ResolvedVal::NontransientError => {
                    w.write_u8(RES_ERR_NONTRANSIENT);
                    w.write_u8(0);
                }
                ResolvedVal::Unrecognized(t, b) => {
                    w.write_u8(t);
                    w.write_u8(
                        b.len()
                            .try_into()
                            .map_err(|_| EncodeError::BadLengthValue)?,
                    );
                    w.write_all(&b[..]);
                }
            }
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// A BeginDir message opens a stream to the relay's own directory port.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BeginDir {}
impl MsgBody for BeginDir {
    fn take_body(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(BeginDir {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// A relay message whose command we do not recognize.
///
/// Unlike unknown channel commands, unknown relay commands are not an
/// error: they are dropped, so that new commands can be deployed.
#[derive(Clone, Debug)]
pub struct Unrecognized {
    /// The relay command we received.
    cmd: RelayCmd,
    /// The body of the message.
    body: Vec<u8>,
}
impl Unrecognized {
    /// Return the command for this message.
    pub fn cmd(&self) -> RelayCmd {
        self.cmd
    }
    /// Decode a message body with a given command.
    fn decode_with_cmd(cmd: RelayCmd, r: &mut Reader<'_>) -> Result<Self> {
        Ok(Unrecognized {
            cmd,
            body: r.take_rest().into(),
        })
    }
}
impl MsgBody for Unrecognized {
    fn take_body(r: &mut Reader<'_>) -> Result<Self> {
        Self::decode_with_cmd(0.into(), r)
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.body[..]);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    /// Decode `body` as `cmd`, re-encode, and require a byte match.
    fn round_trip(cmd: RelayCmd, body: &[u8]) {
        let mut r = Reader::from_slice(body);
        let msg = AnyRelayMsg::decode_from_reader(cmd, &mut r).unwrap();
        assert_eq!(msg.cmd(), cmd);
        let mut out = Vec::new();
        msg.encode_onto(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn begin_parse() {
        let body = b"www.example.com:80\0";
        let mut r = Reader::from_slice(&body[..]);
        let b = Begin::take_body(&mut r).unwrap();
        assert_eq!(b.addr(), b"www.example.com");
        assert_eq!(b.port(), 80);
        round_trip(RelayCmd::BEGIN, body);

        let mut r = Reader::from_slice(&b"no-port-here\0"[..]);
        assert!(Begin::take_body(&mut r).is_err());

        assert!(Begin::new("ok.example.com", 443).is_ok());
        assert!(Begin::new("", 443).is_err());
        assert!(Begin::new("has:colon", 443).is_err());
    }

    #[test]
    fn end_forms() {
        round_trip(RelayCmd::END, &[6]);
        // An EXITPOLICY end carries addr + ttl.
        let mut body = vec![4];
        body.extend_from_slice(&[127, 0, 0, 1]);
        body.extend_from_slice(&[0, 0, 1, 0]);
        round_trip(RelayCmd::END, &body);

        // Empty END tolerated as MISC.
        let mut r = Reader::from_slice(&[]);
        let end = End::take_body(&mut r).unwrap();
        assert_eq!(end.reason(), EndReason::MISC);
    }

    #[test]
    fn extend_round_trip() {
        let skin = vec![3_u8; TAP_C_HANDSHAKE_LEN];
        let id = RsaIdentity::from_bytes(&[7_u8; 20]).unwrap();
        let ext = Extend::new("10.0.0.1".parse().unwrap(), 9001, skin.clone(), id);
        let mut out = Vec::new();
        ext.encode_onto(&mut out).unwrap();
        assert_eq!(out.len(), 4 + 2 + TAP_C_HANDSHAKE_LEN + 20);

        let mut r = Reader::from_slice(&out);
        let back = Extend::take_body(&mut r).unwrap();
        assert_eq!(back.addr(), "10.0.0.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(back.port(), 9001);
        assert_eq!(back.onion_skin(), &skin[..]);
        assert_eq!(back.rsa_id(), &id);

        // Wrong-length onion-skins don't encode.
        let bad = Extend::new("10.0.0.1".parse().unwrap(), 9001, vec![1, 2, 3], id);
        let mut out = Vec::new();
        assert!(bad.encode_onto(&mut out).is_err());
    }

    #[test]
    fn resolved_answers() {
        let mut resolved = Resolved::new_empty();
        resolved.add_answer(ResolvedVal::Ipv4("18.0.0.1".parse().unwrap()), 1800);
        resolved.add_answer(ResolvedVal::Hostname(b"router.example.com".to_vec()), 600);
        let mut out = Vec::new();
        resolved.encode_onto(&mut out).unwrap();
        round_trip(RelayCmd::RESOLVED, &out);

        let err = Resolved::new_err(true, 30);
        assert_eq!(err.answers()[0].0, ResolvedVal::TransientError);
    }

    #[test]
    fn unrecognized_relay_command() {
        let mut r = Reader::from_slice(&b"mystery payload"[..]);
        let m = AnyRelayMsg::decode_from_reader(77.into(), &mut r).unwrap();
        match &m {
            AnyRelayMsg::Unrecognized(u) => assert_eq!(u.cmd(), 77.into()),
            other => panic!("wrong message {:?}", other),
        }
        let mut out = Vec::new();
        m.encode_onto(&mut out).unwrap();
        assert_eq!(out, b"mystery payload");
    }
}
