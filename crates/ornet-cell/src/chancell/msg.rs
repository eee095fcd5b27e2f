//! Different kinds of messages that can be encoded in channel cells.

use super::{BoxedCellBody, ChanCmd, ChanMsg, RawCellBody, CELL_DATA_LEN};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use caret::caret_int;
use ornet_bytes::{EncodeError, EncodeResult, Error, Readable, Reader, Result, Writer};

/// Trait for the 'bodies' of channel messages.
pub trait Body: Readable {
    /// Decode a channel cell body from a provided reader.
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        r.extract()
    }
    /// Consume this message and encode its body onto `w`.
    ///
    /// Does not encode anything _but_ the cell body, and does not pad
    /// to the cell length.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
}

/// Decoded message from a channel.
///
/// An `AnyChanMsg` is an item received on a channel -- a message from
/// another relay or client that we are connected to directly over TLS.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum AnyChanMsg {
    /// A padding message, to be dropped.
    Padding(Padding),
    /// Creates a new circuit, using a public-key onion-skin.
    Create(Create),
    /// Answer to a Create cell.
    Created(Created),
    /// A message sent along a circuit, likely to a more-distant relay.
    Relay(Relay),
    /// Tear down a circuit.
    Destroy(Destroy),
    /// Creates a new circuit with no public-key crypto.
    CreateFast(CreateFast),
    /// Answer to a CreateFast cell.
    CreatedFast(CreatedFast),
    /// Part of channel negotiation: the link protocol versions we support.
    Versions(Versions),
    /// Part of channel negotiation: time and addresses.
    Netinfo(Netinfo),
    /// A relay message with a limited per-circuit budget.
    RelayEarly(RelayEarly),
    /// Any cell whose command we don't recognize.
    Unrecognized(Unrecognized),
}

impl ChanMsg for AnyChanMsg {
    fn cmd(&self) -> ChanCmd {
        use AnyChanMsg::*;
        match self {
            Padding(_) => ChanCmd::PADDING,
            Create(_) => ChanCmd::CREATE,
            Created(_) => ChanCmd::CREATED,
            Relay(_) => ChanCmd::RELAY,
            Destroy(_) => ChanCmd::DESTROY,
            CreateFast(_) => ChanCmd::CREATE_FAST,
            CreatedFast(_) => ChanCmd::CREATED_FAST,
            Versions(_) => ChanCmd::VERSIONS,
            Netinfo(_) => ChanCmd::NETINFO,
            RelayEarly(_) => ChanCmd::RELAY_EARLY,
            Unrecognized(m) => m.cmd(),
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        use AnyChanMsg::*;
        match self {
            Padding(m) => Body::encode_onto(m, w),
            Create(m) => Body::encode_onto(m, w),
            Created(m) => Body::encode_onto(m, w),
            Relay(m) => Body::encode_onto(m, w),
            Destroy(m) => Body::encode_onto(m, w),
            CreateFast(m) => Body::encode_onto(m, w),
            CreatedFast(m) => Body::encode_onto(m, w),
            Versions(m) => Body::encode_onto(m, w),
            Netinfo(m) => Body::encode_onto(m, w),
            RelayEarly(m) => Body::encode_onto(m, w),
            Unrecognized(m) => Body::encode_onto(m, w),
        }
    }

    fn decode_from_reader(cmd: ChanCmd, r: &mut Reader<'_>) -> Result<Self> {
        Ok(match cmd {
            ChanCmd::PADDING => AnyChanMsg::Padding(<Padding as Body>::decode_from_reader(r)?),
            ChanCmd::CREATE => AnyChanMsg::Create(<Create as Body>::decode_from_reader(r)?),
            ChanCmd::CREATED => AnyChanMsg::Created(<Created as Body>::decode_from_reader(r)?),
            ChanCmd::RELAY => AnyChanMsg::Relay(<Relay as Body>::decode_from_reader(r)?),
            ChanCmd::DESTROY => AnyChanMsg::Destroy(<Destroy as Body>::decode_from_reader(r)?),
            ChanCmd::CREATE_FAST => {
                AnyChanMsg::CreateFast(<CreateFast as Body>::decode_from_reader(r)?)
            }
            ChanCmd::CREATED_FAST => {
                AnyChanMsg::CreatedFast(<CreatedFast as Body>::decode_from_reader(r)?)
            }
            ChanCmd::VERSIONS => AnyChanMsg::Versions(<Versions as Body>::decode_from_reader(r)?),
            ChanCmd::NETINFO => AnyChanMsg::Netinfo(<Netinfo as Body>::decode_from_reader(r)?),
            ChanCmd::RELAY_EARLY => {
                AnyChanMsg::RelayEarly(<RelayEarly as Body>::decode_from_reader(r)?)
            }
            _ => AnyChanMsg::Unrecognized(Unrecognized::decode_with_cmd(cmd, r)?),
        })
    }
}

/// A Padding message is a fixed-length message on a channel that is
/// ignored.
///
/// Padding can disguise the true amount of traffic on a channel, or act
/// as a keep-alive.  The correct response is to drop it.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Padding {}
impl Padding {
    /// Create a new fixed-length padding cell.
    pub fn new() -> Self {
        Padding {}
    }
}
impl Body for Padding {
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}
impl Readable for Padding {
    fn take_from(_b: &mut Reader<'_>) -> Result<Self> {
        Ok(Padding {})
    }
}

/// Number of bytes in a CREATE handshake: an onion-skin is a hybrid-
/// encrypted DH half (128 bytes of RSA block, 16 of symmetric key
/// carry-over, 42 of padding overhead).
pub const TAP_C_HANDSHAKE_LEN: usize = 128 + 16 + 42;
/// Number of bytes in a CREATED handshake response: the responder's DH
/// half plus a 20-byte key hash.
pub const TAP_S_HANDSHAKE_LEN: usize = 128 + 20;

/// Number of bytes in a CREATE_FAST handshake: just random material.
pub const FAST_C_HANDSHAKE_LEN: usize = 20;
/// Number of bytes in a CREATED_FAST response: random material plus a
/// 20-byte derived-key hash.
pub const FAST_S_HANDSHAKE_LEN: usize = 20 + 20;

/// Declare a fixed-width handshake cell, in which a fixed number of
/// bytes matter and the rest are padding.
macro_rules! fixed_len_handshake {
    {
        $(#[$meta:meta])*
        $name:ident , $len:ident
    } => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            /// The handshake body itself.
            handshake: Vec<u8>,
        }
        impl $name {
            /// Create a new cell from a provided handshake.
            pub fn new<B>(handshake: B) -> Self
                where B: Into<Vec<u8>>
            {
                let handshake = handshake.into();
                $name { handshake }
            }
            /// Return the content of this handshake.
            pub fn handshake(&self) -> &[u8] {
                &self.handshake
            }
            /// Consume this message and return its handshake body.
            pub fn into_handshake(self) -> Vec<u8> {
                self.handshake
            }
        }
        impl Body for $name {
            fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
                w.write_all(&self.handshake[..]);
                Ok(())
            }
        }
        impl Readable for $name {
            fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                Ok($name {
                    handshake: b.take($len)?.into(),
                })
            }
        }
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Handshake bodies are key material; don't log them.
                write!(f, concat!(stringify!($name), " {{ [{} bytes] }}"),
                       self.handshake.len())
            }
        }
    }
}

fixed_len_handshake! {
    /// A Create message creates a circuit with a public-key handshake.
    ///
    /// The body is an "onion-skin": the client's DH half, hybrid-encrypted
    /// to the target relay's onion key.  Relays answer with Created on
    /// success or Destroy on failure.
    Create, TAP_C_HANDSHAKE_LEN
}
fixed_len_handshake! {
    /// A Created message completes a public-key circuit handshake.
    Created, TAP_S_HANDSHAKE_LEN
}
fixed_len_handshake! {
    /// A CreateFast message creates a circuit using no public-key crypto.
    ///
    /// This is safe only over an already-authenticated TLS connection,
    /// and only for the first hop of a circuit: the first hop sees the
    /// key material in the clear either way, so a client that prefers
    /// speed may skip the onion-key step there.
    CreateFast, FAST_C_HANDSHAKE_LEN
}
fixed_len_handshake! {
    /// A CreatedFast message completes a CreateFast handshake.
    CreatedFast, FAST_S_HANDSHAKE_LEN
}

/// A Relay cell - that is, one transmitted over a circuit.
///
/// Once a circuit is established, relay cells are sent over it.  The
/// body is encrypted in as many AES layers as there are hops between
/// the sender and the recipient; this type carries it opaquely.  The
/// inner protocol is implemented in [`crate::relaycell`].
#[derive(Clone, derive_more::From)]
pub struct Relay {
    /// The contents of the relay cell as encoded for transfer.
    body: BoxedCellBody,
}
impl Relay {
    /// Construct a Relay message from a slice containing its contents.
    ///
    /// Shorter slices are zero-padded on the right.
    pub fn new<P>(body: P) -> Self
    where
        P: AsRef<[u8]>,
    {
        let body = body.as_ref();
        let mut r = [0_u8; CELL_DATA_LEN];
        r[..body.len()].copy_from_slice(body);
        Relay { body: Box::new(r) }
    }
    /// Construct a Relay message from its body.
    pub fn from_raw(body: RawCellBody) -> Self {
        Relay {
            body: Box::new(body),
        }
    }
    /// Consume this message and return its body for encryption or
    /// decryption.
    pub fn into_relay_body(self) -> BoxedCellBody {
        self.body
    }
    /// Wrap this Relay message into an AnyChanMsg as a RELAY_EARLY cell.
    pub fn into_early(self) -> AnyChanMsg {
        AnyChanMsg::RelayEarly(RelayEarly(self))
    }
}
impl Body for Relay {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.body[..]);
        Ok(())
    }
}
impl Readable for Relay {
    fn take_from(b: &mut Reader<'_>) -> Result<Self> {
        let mut body = Box::new([0_u8; CELL_DATA_LEN]);
        body.copy_from_slice(b.take(CELL_DATA_LEN)?);
        Ok(Relay { body })
    }
}
impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Encrypted relay bodies aren't worth 509 bytes of log.
        write!(f, "Relay {{ .. }}")
    }
}

/// A Relay cell that is allowed to contain a CREATE message.
///
/// Only a limited number of these may be forwarded on each circuit, as a
/// defence against building arbitrarily long paths through the network.
#[derive(Clone, Debug, derive_more::Deref, derive_more::From, derive_more::Into)]
pub struct RelayEarly(Relay);
impl Readable for RelayEarly {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        Ok(RelayEarly(Relay::take_from(r)?))
    }
}
impl Body for RelayEarly {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        Body::encode_onto(self.0, w)
    }
}
impl RelayEarly {
    /// Consume this message and return its body.
    pub fn into_relay_body(self) -> BoxedCellBody {
        self.0.body
    }
}

/// The Destroy message tears down a circuit.
///
/// On receiving a Destroy, an implementation tears down the circuit and
/// passes the destroy along to the adjacent hops, if any.
#[derive(Clone, Debug)]
pub struct Destroy {
    /// Reason code given for tearing down this circuit.
    reason: DestroyReason,
}
impl Destroy {
    /// Create a new destroy cell.
    pub fn new(reason: DestroyReason) -> Self {
        Destroy { reason }
    }
    /// Return the provided reason for destroying the circuit.
    pub fn reason(&self) -> DestroyReason {
        self.reason
    }
}
impl Body for Destroy {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.reason.into());
        Ok(())
    }
}
impl Readable for Destroy {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let reason = r.take_u8()?.into();
        Ok(Destroy { reason })
    }
}

caret_int! {
    /// Declared reason for ending a circuit.
    ///
    /// On the wire this is always one of the values below; whether the
    /// teardown originated locally or remotely is tracked out of band,
    /// never transmitted.
    pub struct DestroyReason(u8) {
        /// No reason given.  (The only reason clients send.)
        NONE = 0,
        /// Protocol violation.
        PROTOCOL = 1,
        /// Internal error.
        INTERNAL = 2,
        /// Client sent a TRUNCATE command.
        REQUESTED = 3,
        /// Relay is hibernating and not accepting requests.
        HIBERNATING = 4,
        /// Ran out of memory, sockets, or circuit IDs.
        RESOURCELIMIT = 5,
        /// Couldn't connect to relay.
        CONNECTFAILED = 6,
        /// Connected to a relay, but its identity wasn't as requested.
        OR_IDENTITY = 7,
        /// One of the links carrying this circuit died.
        CHANNEL_CLOSED = 8,
        /// Circuit expired for being too dirty or old.
        FINISHED = 9,
        /// Circuit construction took too long.
        TIMEOUT = 10,
        /// Circuit was destroyed without a client truncate.
        DESTROYED = 11,
        /// Request for an unknown hidden service.
        NOSUCHSERVICE = 12,
    }
}

impl DestroyReason {
    /// Return a human-readable string for this reason.
    pub fn human_str(&self) -> &'static str {
        match *self {
            DestroyReason::NONE => "No reason",
            DestroyReason::PROTOCOL => "Protocol violation",
            DestroyReason::INTERNAL => "Internal error",
            DestroyReason::REQUESTED => "Client sent a TRUNCATE command",
            DestroyReason::HIBERNATING => "Relay is hibernating and not accepting requests",
            DestroyReason::RESOURCELIMIT => "Relay ran out of resources",
            DestroyReason::CONNECTFAILED => "Couldn't connect to relay",
            DestroyReason::OR_IDENTITY => "Connected to relay with different identity",
            DestroyReason::CHANNEL_CLOSED => "The link carrying this circuit died",
            DestroyReason::FINISHED => "Circuit expired for being too dirty or old",
            DestroyReason::TIMEOUT => "Circuit construction took too long",
            DestroyReason::DESTROYED => "Circuit was destroyed without client truncate",
            DestroyReason::NOSUCHSERVICE => "No such hidden service",
            _ => "Unrecognized reason",
        }
    }
}

/// The netinfo message ends channel negotiation.
///
/// It tells the other party our view of the current time, our own list
/// of public addresses, and our view of its address.  Once a netinfo
/// has been exchanged in both directions, circuits can be created.
#[derive(Clone, Debug)]
pub struct Netinfo {
    /// Time when this cell was sent, or 0 if sent by a client.
    timestamp: u32,
    /// Observed address for the party that did not send this cell.
    their_addr: Option<IpAddr>,
    /// Canonical addresses for the party that did send this cell.
    my_addr: Vec<IpAddr>,
}

/// helper: encode a single address in the form netinfo messages expect.
fn enc_one_netinfo_addr<W: Writer + ?Sized>(w: &mut W, addr: &IpAddr) {
    match addr {
        IpAddr::V4(ipv4) => {
            w.write_u8(0x04); // type
            w.write_u8(4); // length
            w.write_all(&ipv4.octets()[..]);
        }
        IpAddr::V6(ipv6) => {
            w.write_u8(0x06); // type
            w.write_u8(16); // length
            w.write_all(&ipv6.octets()[..]);
        }
    }
}
/// helper: take an address as encoded in a netinfo message.
fn take_one_netinfo_addr(r: &mut Reader<'_>) -> Result<Option<IpAddr>> {
    let atype = r.take_u8()?;
    let alen = r.take_u8()?;
    let abody = r.take(alen as usize)?;
    match (atype, alen) {
        (0x04, 4) => {
            let bytes = [abody[0], abody[1], abody[2], abody[3]];
            Ok(Some(IpAddr::V4(bytes.into())))
        }
        (0x06, 16) => {
            let mut bytes = [0_u8; 16];
            bytes.copy_from_slice(abody);
            Ok(Some(IpAddr::V6(bytes.into())))
        }
        (_, _) => Ok(None),
    }
}
impl Netinfo {
    /// Construct a new Netinfo to be sent by a client.
    ///
    /// Clients report neither their time nor their addresses.
    pub fn from_client(their_addr: Option<IpAddr>) -> Self {
        Netinfo {
            timestamp: 0,
            their_addr,
            my_addr: Vec::new(),
        }
    }
    /// Construct a new Netinfo to be sent by a relay.
    pub fn from_relay<V>(timestamp: u32, their_addr: Option<IpAddr>, my_addrs: V) -> Self
    where
        V: Into<Vec<IpAddr>>,
    {
        let my_addr = my_addrs.into();
        Netinfo {
            timestamp,
            their_addr,
            my_addr,
        }
    }
    /// Return the time reported in this cell, if any.
    pub fn timestamp(&self) -> Option<std::time::SystemTime> {
        use std::time::{Duration, SystemTime};
        if self.timestamp == 0 {
            None
        } else {
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(self.timestamp.into()))
        }
    }
    /// Return the address the sender observed for us, if any.
    pub fn their_addr(&self) -> Option<IpAddr> {
        self.their_addr
    }
    /// Return the sender's own declared addresses.
    pub fn my_addrs(&self) -> &[IpAddr] {
        &self.my_addr
    }
}
impl Body for Netinfo {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u32(self.timestamp);
        let their_addr = self
            .their_addr
            .unwrap_or_else(|| Ipv4Addr::UNSPECIFIED.into());
        enc_one_netinfo_addr(w, &their_addr);
        let n_addrs: u8 = self
            .my_addr
            .len()
            .try_into()
            .map_err(|_| EncodeError::BadLengthValue)?;
        w.write_u8(n_addrs);
        for addr in &self.my_addr {
            enc_one_netinfo_addr(w, addr);
        }
        Ok(())
    }
}
impl Readable for Netinfo {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let timestamp = r.take_u32()?;
        let their_addr = take_one_netinfo_addr(r)?.filter(|a| !a.is_unspecified());
        let my_n_addrs = r.take_u8()?;
        let mut my_addr = Vec::with_capacity(my_n_addrs as usize);
        for _ in 0..my_n_addrs {
            if let Some(a) = take_one_netinfo_addr(r)? {
                my_addr.push(a);
            }
        }
        Ok(Netinfo {
            timestamp,
            their_addr,
            my_addr,
        })
    }
}

/// A Versions message begins channel negotiation.
///
/// Every channel begins with both sides sending a Versions message
/// listing the link protocol versions they support; each side then
/// selects the highest version present in both lists.
#[derive(Clone, Debug)]
pub struct Versions {
    /// List of supported link protocol versions.
    versions: Vec<u16>,
}
impl Versions {
    /// Construct a new Versions message from a list of link protocols.
    ///
    /// Returns an error if the list is too long to encode.
    pub fn new<B>(vs: B) -> crate::Result<Self>
    where
        B: Into<Vec<u16>>,
    {
        let versions = vs.into();
        if versions.len() < (u16::MAX / 2) as usize {
            Ok(Self { versions })
        } else {
            Err(crate::Error::CantEncode("Too many versions"))
        }
    }
    /// Encode this VERSIONS cell in the form used for a handshake.
    ///
    /// (This is the same as the standard encoding, but spelled out here
    /// because it must be sent before any version has been negotiated.)
    pub fn encode_for_handshake(self) -> EncodeResult<Vec<u8>> {
        let mut v = Vec::new();
        v.write_u16(0); // zero circuit ID
        v.write_u8(ChanCmd::VERSIONS.into());
        v.write_u16((self.versions.len() * 2) as u16); // message length
        Body::encode_onto(self, &mut v)?;
        Ok(v)
    }
    /// Return the best (numerically highest) link protocol shared by
    /// this cell and `my_protos`.
    pub fn best_shared_link_protocol(&self, my_protos: &[u16]) -> Option<u16> {
        // Quadratic, but both lists are tiny.
        let p = my_protos
            .iter()
            .filter(|p| self.versions.contains(p))
            .fold(0_u16, |a, b| u16::max(a, *b));
        if p == 0 {
            None
        } else {
            Some(p)
        }
    }
}
impl Body for Versions {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        for v in &self.versions {
            w.write_u16(*v);
        }
        Ok(())
    }
}
impl Readable for Versions {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let mut versions = Vec::new();
        while r.remaining() > 0 {
            versions.push(r.take_u16()?);
        }
        Ok(Versions { versions })
    }
}

/// Holds any message whose command we don't recognize.
///
/// A fixed-length cell with an unknown command is logged and dropped by
/// the dispatcher; an unknown *variable-length* command closes the link,
/// but no such command can currently be parsed at all.
#[derive(Clone, Debug)]
pub struct Unrecognized {
    /// The channel command that we got with this cell.
    cmd: ChanCmd,
    /// The contents of the cell.
    content: Vec<u8>,
}
impl Unrecognized {
    /// Construct a new cell of arbitrary or unrecognized type.
    pub fn new<B>(cmd: ChanCmd, content: B) -> Self
    where
        B: Into<Vec<u8>>,
    {
        let content = content.into();
        Unrecognized { cmd, content }
    }
    /// Return the command from this cell.
    pub fn cmd(&self) -> ChanCmd {
        self.cmd
    }
    /// Take an unrecognized cell's body from a reader `r`, and record
    /// the given command with it.
    pub fn decode_with_cmd(cmd: ChanCmd, r: &mut Reader<'_>) -> Result<Unrecognized> {
        let mut u = Unrecognized::take_from(r)?;
        u.cmd = cmd;
        Ok(u)
    }
}
impl Body for Unrecognized {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.content[..]);
        Ok(())
    }
}
impl Readable for Unrecognized {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Unrecognized {
            cmd: 0.into(),
            content: r.take(r.remaining())?.into(),
        })
    }
}

/// Helper: declare an Into<AnyChanCell> implementation for messages that
/// don't take a circid.
macro_rules! msg_into_cell {
    ($body:ident) => {
        impl From<$body> for super::AnyChanCell {
            fn from(body: $body) -> super::AnyChanCell {
                super::AnyChanCell::new(None, body.into())
            }
        }
    };
}

msg_into_cell!(Padding);
msg_into_cell!(Netinfo);
msg_into_cell!(Versions);

/// Helper: declare a ChanMsg implementation for a message type that has
/// a fixed command, plus the From impl for AnyChanMsg.
macro_rules! msg_impl_chanmsg {
    ($($body:ident),* $(,)?) => {
        $(
            impl crate::chancell::ChanMsg for $body {
                fn cmd(&self) -> ChanCmd {
                    AnyChanMsg::from(self.clone()).cmd()
                }
                fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
                    Body::encode_onto(self, w)
                }
                fn decode_from_reader(cmd: ChanCmd, r: &mut Reader<'_>) -> Result<Self> {
                    match AnyChanMsg::decode_from_reader(cmd, r)? {
                        AnyChanMsg::$body(m) => Ok(m),
                        other => Err(Error::InvalidMessage(
                            format!("Expected {}; got {}", stringify!($body), other.cmd()).into(),
                        )),
                    }
                }
            }
            impl From<$body> for AnyChanMsg {
                fn from(m: $body) -> AnyChanMsg {
                    AnyChanMsg::$body(m)
                }
            }
        )*
    };
}

msg_impl_chanmsg!(
    Padding,
    Create,
    Created,
    Relay,
    Destroy,
    CreateFast,
    CreatedFast,
    Versions,
    Netinfo,
    RelayEarly,
    Unrecognized,
);
