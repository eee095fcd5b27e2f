//! Parsing implementation for network-status documents.
//!
//! A network-status document is an authority's signed statement about
//! the state of every relay it knows: addresses, descriptor digests,
//! and per-relay flags.  Version 2 documents are flat listings signed
//! by a single authority; version 3 documents are the votes and
//! consensuses of the modern voting protocol, and a consensus carries
//! one signature per participating authority.

use crate::doc;
use crate::doc::authcert::AuthCert;
use crate::doc::routerdesc::RdDigest;
use crate::parse::keyword::Keyword;
use crate::parse::parser::{Section, SectionRules};
use crate::parse::tokenize::{Item, ItemResult, NetDocReader};
use crate::types::misc::*;
use crate::types::policy::PortRange;
use crate::{Error, NetdocErrorKind as EK, Pos, Result};

use bitflags::bitflags;
use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::warn;

decl_keyword! {
    /// Keywords that can be used in network-status documents.
    NetstatusKwd {
        // headers, both versions
        "network-status-version" => NETWORK_STATUS_VERSION,
        "dir-source" => DIR_SOURCE,
        "fingerprint" => FINGERPRINT,
        "contact" => CONTACT,
        "dir-signing-key" => DIR_SIGNING_KEY,
        "client-versions" => CLIENT_VERSIONS,
        "server-versions" => SERVER_VERSIONS,
        "published" => PUBLISHED,
        "dir-options" => DIR_OPTIONS,
        // v3 header
        "vote-status" => VOTE_STATUS,
        "consensus-methods" => CONSENSUS_METHODS,
        "consensus-method" => CONSENSUS_METHOD,
        "valid-after" => VALID_AFTER,
        "fresh-until" => FRESH_UNTIL,
        "valid-until" => VALID_UNTIL,
        "voting-delay" => VOTING_DELAY,
        "known-flags" => KNOWN_FLAGS,
        "params" => PARAMS,
        // v3 voter section
        "vote-digest" => VOTE_DIGEST,
        "legacy-dir-key" => LEGACY_DIR_KEY,
        // router status entries
        "r" => RS_R,
        "s" => RS_S,
        "v" => RS_V,
        "w" => RS_W,
        "p" => RS_P,
        // footer
        "directory-footer" => DIRECTORY_FOOTER,
        "bandwidth-weights" => BANDWIDTH_WEIGHTS,
        "directory-signature" => DIRECTORY_SIGNATURE,
    }
}

/// Rules for parsing the header of a v2 network-status.
static NS_HEADER_RULES_V2: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(NETWORK_STATUS_VERSION.rule().required().args(1..=1));
    rules.add(DIR_SOURCE.rule().required().args(3..));
    rules.add(FINGERPRINT.rule().required().args(1..));
    rules.add(CONTACT.rule());
    rules.add(DIR_SIGNING_KEY.rule().required().no_args().obj_required());
    rules.add(CLIENT_VERSIONS.rule());
    rules.add(SERVER_VERSIONS.rule());
    rules.add(PUBLISHED.rule().required());
    rules.add(DIR_OPTIONS.rule());
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// Rules for parsing the header of a v3 vote or consensus.
static NS_HEADER_RULES_V3: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(NETWORK_STATUS_VERSION.rule().required().args(1..=2));
    rules.add(VOTE_STATUS.rule().required().args(1..));
    rules.add(CONSENSUS_METHODS.rule().args(1..));
    rules.add(CONSENSUS_METHOD.rule().args(1..=1));
    rules.add(PUBLISHED.rule());
    rules.add(VALID_AFTER.rule().required());
    rules.add(FRESH_UNTIL.rule().required());
    rules.add(VALID_UNTIL.rule().required());
    rules.add(VOTING_DELAY.rule().args(2..));
    rules.add(CLIENT_VERSIONS.rule());
    rules.add(SERVER_VERSIONS.rule());
    rules.add(KNOWN_FLAGS.rule().required());
    rules.add(PARAMS.rule());
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// Rules for parsing a single voter's information in a v3 document.
///
/// In votes, the authority's key certificate follows the dir-source
/// block; its keywords land in the unrecognized bucket here and are
/// checked separately with the authcert parser if the caller wants them.
static NS_VOTERINFO_RULES_V3: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(DIR_SOURCE.rule().required().args(6..));
    rules.add(CONTACT.rule());
    rules.add(VOTE_DIGEST.rule().args(1..));
    rules.add(LEGACY_DIR_KEY.rule().args(1..));
    rules.add(FINGERPRINT.rule().args(1..));
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// Rules for parsing a single routerstatus entry.
static NS_ROUTERSTATUS_RULES: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(RS_R.rule().required().args(8..));
    rules.add(RS_S.rule());
    rules.add(RS_V.rule());
    rules.add(RS_W.rule());
    rules.add(RS_P.rule().args(2..));
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// Rules for parsing a v2 footer: just the one signature.
static NS_FOOTER_RULES_V2: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(DIRECTORY_SIGNATURE.rule().required().args(1..).obj_required());
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// Rules for parsing a v3 footer.
static NS_FOOTER_RULES_V3: LazyLock<SectionRules<NetstatusKwd>> = LazyLock::new(|| {
    use NetstatusKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(DIRECTORY_FOOTER.rule().no_args());
    rules.add(BANDWIDTH_WEIGHTS.rule());
    rules.add(
        DIRECTORY_SIGNATURE
            .rule()
            .required()
            .may_repeat()
            .args(2..)
            .obj_required(),
    );
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

bitflags! {
    /// The flags an authority may assert about a single relay.
    ///
    /// Flags a parser doesn't recognize are dropped; the bit values
    /// here are not stable across releases.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RelayFlags: u16 {
        /// Is this a directory authority?
        const AUTHORITY = 1 << 0;
        /// Is this relay believed to be useless as a directory cache?
        const BAD_DIRECTORY = 1 << 1;
        /// Is this relay believed to be useless as an exit?
        ///
        /// Bad exits can still carry traffic in the middle of a circuit.
        const BAD_EXIT = 1 << 2;
        /// Is this relay suitable for exiting to the network?
        const EXIT = 1 << 3;
        /// Is this relay "fast" above a certain threshold?
        const FAST = 1 << 4;
        /// Is this relay suitable for use as a guard?
        const GUARD = 1 << 5;
        /// Does this relay participate in the hidden-service directory?
        const HSDIR = 1 << 6;
        /// Is this relay's nickname bound by the naming authorities?
        const NAMED = 1 << 7;
        /// Is this relay believed to be up right now?
        const RUNNING = 1 << 8;
        /// Is this relay "stable" enough for long-lived circuits?
        const STABLE = 1 << 9;
        /// Do the naming authorities disagree about this nickname?
        const UNNAMED = 1 << 10;
        /// Does this relay speak a current directory protocol?
        const V2_DIR = 1 << 11;
        /// Is this relay allowed on the network at all?
        const VALID = 1 << 12;
    }
}

impl FromStr for RelayFlags {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Authority" => RelayFlags::AUTHORITY,
            "BadDirectory" => RelayFlags::BAD_DIRECTORY,
            "BadExit" => RelayFlags::BAD_EXIT,
            "Exit" => RelayFlags::EXIT,
            "Fast" => RelayFlags::FAST,
            "Guard" => RelayFlags::GUARD,
            "HSDir" => RelayFlags::HSDIR,
            "Named" => RelayFlags::NAMED,
            "Running" => RelayFlags::RUNNING,
            "Stable" => RelayFlags::STABLE,
            "Unnamed" => RelayFlags::UNNAMED,
            "V2Dir" => RelayFlags::V2_DIR,
            "Valid" => RelayFlags::VALID,
            // Unrecognized flags are simply dropped.
            _ => RelayFlags::empty(),
        })
    }
}

impl RelayFlags {
    /// Parse a relay-flags entry from an `s` line.
    fn from_item(item: &Item<'_, NetstatusKwd>) -> Result<RelayFlags> {
        if item.kwd() != NetstatusKwd::RS_S {
            return Err(EK::Internal
                .with_msg("wrong keyword for an s line")
                .at_pos(item.pos()));
        }
        let mut flags: RelayFlags = RelayFlags::default();
        for s in item.args() {
            // This can't fail; unknown flags parse to empty.
            let fl: RelayFlags = s.parse().expect("infallible parse failed");
            flags |= fl;
        }
        Ok(flags)
    }
}

/// The lifetime of a v3 network-status document.
#[derive(Clone, Debug)]
pub struct Lifetime {
    /// Time at which the document becomes valid.
    valid_after: SystemTime,
    /// Time after which a newer document is expected.
    fresh_until: SystemTime,
    /// Time after which this document is expired.
    valid_until: SystemTime,
}

impl Lifetime {
    /// Construct a new Lifetime, requiring its bounds to be in order.
    pub fn new(
        valid_after: SystemTime,
        fresh_until: SystemTime,
        valid_until: SystemTime,
    ) -> Result<Self> {
        if valid_after < fresh_until && fresh_until < valid_until {
            Ok(Lifetime {
                valid_after,
                fresh_until,
                valid_until,
            })
        } else {
            Err(EK::BadTimeBound
                .err()
                .with_msg("lifetime boundaries out of order"))
        }
    }
    /// Return the time at which this document becomes valid.
    pub fn valid_after(&self) -> SystemTime {
        self.valid_after
    }
    /// Return the time at which a newer document is expected.
    pub fn fresh_until(&self) -> SystemTime {
        self.fresh_until
    }
    /// Return the time after which this document is expired.
    pub fn valid_until(&self) -> SystemTime {
        self.valid_until
    }
    /// Return true if this document is valid (but possibly stale) at
    /// the given time.
    pub fn usable_at(&self, when: SystemTime) -> bool {
        self.valid_after <= when && when <= self.valid_until
    }
}

/// The weight information for a single relay, from a `w` line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayWeight {
    /// Declared bandwidth, in kilobytes per second.
    bandwidth: Option<u32>,
    /// Measured bandwidth, in kilobytes per second.
    measured: Option<u32>,
}

impl RelayWeight {
    /// Return the best available estimate of this relay's weight.
    pub fn as_kb(&self) -> Option<u32> {
        self.measured.or(self.bandwidth)
    }
    /// Return true if this weight was measured by the bandwidth
    /// authorities, rather than self-declared.
    pub fn is_measured(&self) -> bool {
        self.measured.is_some()
    }

    /// Parse a `w` line's arguments.
    fn from_item(item: &Item<'_, NetstatusKwd>) -> Result<RelayWeight> {
        let mut w = RelayWeight::default();
        for arg in item.args() {
            let (k, v) = match arg.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            let v: u32 = match v.parse() {
                Ok(v) => v,
                Err(_) => {
                    return Err(EK::BadArgument
                        .at_pos(item.pos())
                        .with_msg("bad value in w line"))
                }
            };
            match k {
                "Bandwidth" => w.bandwidth = Some(v),
                "Measured" => w.measured = Some(v),
                _ => (),
            }
        }
        Ok(w)
    }
}

/// A summary of a relay's exit policy, from a `p` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSummary {
    /// True if the listed ports are accepted; false if they are the
    /// only ports rejected.
    accept: bool,
    /// The ports listed.
    ports: Vec<PortRange>,
}

impl PortSummary {
    /// Return true if this summary says the relay allows exiting to
    /// `port`.
    pub fn allows_port(&self, port: u16) -> bool {
        let listed = self.ports.iter().any(|r| r.contains(port));
        listed == self.accept
    }
}

impl FromStr for PortSummary {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let (kind, ports_s) = s
            .split_once(' ')
            .ok_or_else(|| EK::BadPolicy.at_pos(Pos::at(s)).with_msg("missing port list"))?;
        let accept = match kind {
            "accept" => true,
            "reject" => false,
            _ => {
                return Err(EK::BadPolicy
                    .at_pos(Pos::at(s))
                    .with_msg("policy summary is neither accept nor reject"))
            }
        };
        let ports = ports_s
            .split(',')
            .map(|p| p.parse::<PortRange>())
            .collect::<Result<Vec<_>>>()?;
        Ok(PortSummary { accept, ports })
    }
}

/// A single relay's status, as represented in a network-status document.
#[derive(Clone, Debug)]
pub struct RouterStatus {
    /// The relay's nickname.
    nickname: Nickname,
    /// The relay's identity digest.
    identity: RsaIdentity,
    /// Digest of the router descriptor this status refers to.
    doc_digest: RdDigest,
    /// When the listed descriptor was published.
    published: SystemTime,
    /// The relay's IPv4 address.
    addr: Ipv4Addr,
    /// The relay's OR port.
    or_port: u16,
    /// The relay's directory port.
    dir_port: u16,
    /// The flags the authority asserts for this relay.
    flags: RelayFlags,
    /// The relay's self-declared version, if listed.
    version: Option<String>,
    /// The relay's weight information, if listed.
    weight: Option<RelayWeight>,
    /// A summary of the relay's exit policy, if listed.
    port_summary: Option<PortSummary>,
}

impl RouterStatus {
    /// Return this relay's nickname.
    pub fn nickname(&self) -> &str {
        self.nickname.as_str()
    }
    /// Return this relay's identity digest.
    pub fn identity(&self) -> &RsaIdentity {
        &self.identity
    }
    /// Return the digest of the descriptor this status refers to.
    pub fn doc_digest(&self) -> &RdDigest {
        &self.doc_digest
    }
    /// Return when the listed descriptor was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return this relay's address.
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }
    /// Return this relay's OR port.
    pub fn or_port(&self) -> u16 {
        self.or_port
    }
    /// Return this relay's directory port.
    pub fn dir_port(&self) -> u16 {
        self.dir_port
    }
    /// Return the flags asserted for this relay.
    pub fn flags(&self) -> RelayFlags {
        self.flags
    }
    /// Return the version advertised for this relay, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
    /// Return the weight listed for this relay, if any.
    pub fn weight(&self) -> Option<&RelayWeight> {
        self.weight.as_ref()
    }
    /// Return the exit-port summary for this relay, if any.
    pub fn port_summary(&self) -> Option<&PortSummary> {
        self.port_summary.as_ref()
    }

    /// Extract a routerstatus from a parsed section.
    fn from_section(sec: &Section<'_, NetstatusKwd>) -> Result<RouterStatus> {
        use NetstatusKwd::*;
        let r = sec.required(RS_R)?;
        let nickname = r.parse_arg::<Nickname>(0)?;
        let identity: RsaIdentity = r.parse_arg::<B64>(1)?.into_array::<20>()?.into();
        let doc_digest: RdDigest = r.parse_arg::<B64>(2)?.into_array::<20>()?;
        let published: SystemTime = {
            let date = r.required_arg(3)?;
            let time = r.required_arg(4)?;
            format!("{} {}", date, time)
                .parse::<Iso8601TimeSp>()
                .map_err(|e| e.or_at_pos(r.pos()))?
                .into()
        };
        let addr: Ipv4Addr = r.parse_arg(5)?;
        let or_port: u16 = r.parse_arg(6)?;
        let dir_port: u16 = r.parse_arg(7)?;

        let flags = match sec.get(RS_S) {
            Some(s_item) => RelayFlags::from_item(s_item)?,
            None => RelayFlags::default(),
        };
        let version = sec.maybe(RS_V).args_as_str().map(str::to_string);
        let weight = match sec.get(RS_W) {
            Some(w_item) => Some(RelayWeight::from_item(w_item)?),
            None => None,
        };
        let port_summary = sec.maybe(RS_P).parse_args_as_str::<PortSummary>()?;

        Ok(RouterStatus {
            nickname,
            identity,
            doc_digest,
            published,
            addr,
            or_port,
            dir_port,
            flags,
            version,
            weight,
            port_summary,
        })
    }
}

/// Is a v3 document a vote or a consensus?
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum VoteStatus {
    /// A single authority's input to the voting process.
    Vote,
    /// The computed result of voting.
    Consensus,
}

/// A single authority's entry in a v3 document.
#[derive(Clone, Debug)]
pub struct DirSource {
    /// The authority's nickname.
    nickname: Nickname,
    /// The authority's v3 identity fingerprint.
    identity: RsaIdentity,
    /// The authority's declared hostname.
    hostname: String,
    /// The authority's address.
    address: Ipv4Addr,
    /// The authority's directory port.
    dir_port: u16,
    /// The authority's OR port.
    or_port: u16,
    /// Contact information, if given.
    contact: Option<String>,
    /// In a consensus, the digest of this authority's vote.
    vote_digest: Vec<u8>,
}

impl DirSource {
    /// Return this authority's nickname.
    pub fn nickname(&self) -> &str {
        self.nickname.as_str()
    }
    /// Return this authority's identity fingerprint.
    pub fn identity(&self) -> &RsaIdentity {
        &self.identity
    }
    /// Return this authority's declared address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }
    /// Return this authority's directory port.
    pub fn dir_port(&self) -> u16 {
        self.dir_port
    }
    /// Return this authority's OR port.
    pub fn or_port(&self) -> u16 {
        self.or_port
    }

    /// Extract a DirSource from a voter-info section.
    fn from_section(sec: &Section<'_, NetstatusKwd>) -> Result<DirSource> {
        use NetstatusKwd::*;
        let src = sec.required(DIR_SOURCE)?;
        let nickname = src.parse_arg::<Nickname>(0)?;
        let identity: RsaIdentity = src.parse_arg::<Fingerprint>(1)?.into();
        let hostname = src.required_arg(2)?.to_string();
        let address: Ipv4Addr = src.parse_arg(3)?;
        let dir_port: u16 = src.parse_arg(4)?;
        let or_port: u16 = src.parse_arg(5)?;
        let contact = sec.maybe(CONTACT).args_as_str().map(str::to_string);
        let vote_digest = match sec.get(VOTE_DIGEST) {
            Some(item) => hex::decode(item.required_arg(0)?)
                .map_err(|_| EK::BadArgument.at_pos(item.pos()).with_msg("bad hex"))?,
            None => Vec::new(),
        };
        Ok(DirSource {
            nickname,
            identity,
            hostname,
            address,
            dir_port,
            or_port,
            contact,
            vote_digest,
        })
    }
}

/// A signature on a v3 network-status document.
#[derive(Clone, Debug)]
pub struct DocSignature {
    /// The digest algorithm named in the signature line.
    algorithm: String,
    /// The identity fingerprint of the signing authority.
    id_fingerprint: RsaIdentity,
    /// The digest of the signing key used.
    sk_fingerprint: RsaIdentity,
    /// The signature itself.
    signature: Vec<u8>,
}

impl DocSignature {
    /// Return the identity of the authority that made this signature.
    pub fn id_fingerprint(&self) -> &RsaIdentity {
        &self.id_fingerprint
    }
    /// Return the digest of the signing key used for this signature.
    pub fn sk_fingerprint(&self) -> &RsaIdentity {
        &self.sk_fingerprint
    }

    /// Construct a DocSignature from its parts.
    ///
    /// Used by the detached-signature parser, whose items carry a
    /// different keyword type.
    pub(crate) fn from_parts(
        id_fingerprint: RsaIdentity,
        sk_fingerprint: RsaIdentity,
        signature: Vec<u8>,
    ) -> Self {
        DocSignature {
            algorithm: "sha1".to_string(),
            id_fingerprint,
            sk_fingerprint,
            signature,
        }
    }

    /// Extract a DocSignature from a directory-signature item.
    fn from_item(item: &Item<'_, NetstatusKwd>) -> Result<DocSignature> {
        let (algorithm, id_idx) = if item.n_args() >= 3 {
            (item.required_arg(0)?.to_string(), 1)
        } else {
            ("sha1".to_string(), 0)
        };
        let id_fingerprint = item.parse_arg::<Fingerprint>(id_idx)?.into();
        let sk_fingerprint = item.parse_arg::<Fingerprint>(id_idx + 1)?.into();
        let signature = item.obj("SIGNATURE")?;
        Ok(DocSignature {
            algorithm,
            id_fingerprint,
            sk_fingerprint,
            signature,
        })
    }
}

/// A version 3 network-status document: a vote or a consensus.
#[derive(Clone, Debug)]
pub struct NetStatusV3 {
    /// Is this a vote or a consensus?
    vote_status: VoteStatus,
    /// The consensus method of a consensus document.
    consensus_method: Option<u32>,
    /// The methods a vote says its authority supports.
    consensus_methods: Vec<u32>,
    /// The document's validity interval.
    lifetime: Lifetime,
    /// Vote and distribution delays from the header.
    voting_delay: Option<(u32, u32)>,
    /// The flags this document may assign to relays.
    known_flags: Vec<String>,
    /// Declared network parameters.
    params: Vec<(String, i32)>,
    /// Recommended client versions, verbatim.
    client_versions: Option<String>,
    /// Recommended relay versions, verbatim.
    server_versions: Option<String>,
    /// The authorities that produced this document.
    voters: Vec<DirSource>,
    /// The relay listing itself.
    relays: Vec<RouterStatus>,
    /// The bandwidth-weights line of a consensus footer, as k=v pairs.
    bandwidth_weights: Vec<(String, i32)>,
    /// The SHA-1 digest of the signed portion of the document.
    digest: [u8; 20],
    /// The signatures on this document.
    signatures: Vec<DocSignature>,
}

/// Parse one "k=v" pair with an i32 value.
fn parse_i32_pair(s: &str) -> Result<(String, i32)> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| EK::BadArgument.at_pos(Pos::at(s)).with_msg("missing = sign"))?;
    let v: i32 = v
        .parse()
        .map_err(|_| EK::BadArgument.at_pos(Pos::at(s)).with_msg("bad integer"))?;
    Ok((k.to_string(), v))
}

impl NetStatusV3 {
    /// Return whether this is a vote or a consensus.
    pub fn vote_status(&self) -> VoteStatus {
        self.vote_status
    }
    /// Return this document's validity interval.
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }
    /// Return the consensus method, for a consensus.
    pub fn consensus_method(&self) -> Option<u32> {
        self.consensus_method
    }
    /// Return the flags this document knows about.
    pub fn known_flags(&self) -> &[String] {
        &self.known_flags
    }
    /// Return the declared network parameters.
    pub fn params(&self) -> &[(String, i32)] {
        &self.params
    }
    /// Return the recommended client versions, if any.
    pub fn client_versions(&self) -> Option<&str> {
        self.client_versions.as_deref()
    }
    /// Return the recommended relay versions, if any.
    pub fn server_versions(&self) -> Option<&str> {
        self.server_versions.as_deref()
    }
    /// Return the voters that produced this document.
    pub fn voters(&self) -> &[DirSource] {
        &self.voters
    }
    /// Return the relay listing.
    pub fn relays(&self) -> &[RouterStatus] {
        &self.relays
    }
    /// Return the bandwidth-weights pairs from the footer.
    pub fn bandwidth_weights(&self) -> &[(String, i32)] {
        &self.bandwidth_weights
    }
    /// Return the digest of the signed portion of this document.
    pub fn digest(&self) -> &[u8; 20] {
        &self.digest
    }
    /// Return the signatures found on this document.
    pub fn signatures(&self) -> &[DocSignature] {
        &self.signatures
    }

    /// Count how many distinct authorities from `certs` have correctly
    /// signed this document.
    ///
    /// Only SHA-1 signatures are counted; a signature by a key we have
    /// no certificate for is ignored, not an error.
    pub fn n_valid_signatures(&self, certs: &[AuthCert]) -> usize {
        let mut seen: Vec<RsaIdentity> = Vec::new();
        for sig in &self.signatures {
            if sig.algorithm != "sha1" {
                continue;
            }
            if seen.contains(&sig.id_fingerprint) {
                continue;
            }
            let cert = certs.iter().find(|c| {
                c.id_fingerprint() == &sig.id_fingerprint
                    && c.sk_fingerprint() == &sig.sk_fingerprint
            });
            if let Some(cert) = cert {
                if doc::check_signature(cert.signing_key(), &self.digest, &sig.signature).is_ok() {
                    seen.push(sig.id_fingerprint);
                }
            }
        }
        seen.len()
    }

    /// Parse a v3 vote or consensus from a string.
    pub fn parse(s: &str) -> Result<NetStatusV3> {
        Self::parse_internal(s).map_err(|e| e.within(s))
    }

    /// Helper: parse; errors use byte positions.
    fn parse_internal(s: &str) -> Result<NetStatusV3> {
        use NetstatusKwd::*;
        let mut reader: NetDocReader<'_, NetstatusKwd> = NetDocReader::new(s);

        // Header.
        let header = NS_HEADER_RULES_V3.parse(
            reader.pause_at(|i| i.is_ok_with_kwd_in(&[DIR_SOURCE, RS_R, DIRECTORY_FOOTER, DIRECTORY_SIGNATURE])),
        )?;

        let start_offset = {
            // This unwrap is safe: the version token is required.
            #[allow(clippy::unwrap_used)]
            let first = header.first_item().unwrap();
            if first.kwd() != NETWORK_STATUS_VERSION {
                return Err(EK::UnexpectedToken
                    .with_msg(first.kwd().to_str())
                    .at_pos(first.pos()));
            }
            let version: u32 = first.parse_arg(0)?;
            if version != 3 {
                return Err(EK::BadDocumentVersion.with_msg(version.to_string()));
            }
            if let Some(flavor) = first.arg(1) {
                if flavor != "ns" {
                    return Err(EK::BadDocumentType
                        .at_pos(first.pos())
                        .with_msg(format!("unsupported flavor {}", flavor)));
                }
            }
            first
                .offset_in(s)
                .ok_or_else(|| EK::Internal.with_msg("version line not within document"))?
        };

        let vote_status = match header.required(VOTE_STATUS)?.arg(0) {
            Some("vote") => VoteStatus::Vote,
            Some("consensus") => VoteStatus::Consensus,
            _ => {
                return Err(EK::BadArgument
                    .at_pos(header.required(VOTE_STATUS)?.pos())
                    .with_msg("unrecognized vote status"))
            }
        };

        let consensus_method = header.maybe(CONSENSUS_METHOD).parse_arg::<u32>(0)?;
        let consensus_methods = match header.get(CONSENSUS_METHODS) {
            None => Vec::new(),
            Some(item) => item
                .args()
                .map(|m| {
                    m.parse::<u32>()
                        .map_err(|_| EK::BadArgument.at_pos(item.pos()).with_msg("bad method"))
                })
                .collect::<Result<Vec<_>>>()?,
        };
        match vote_status {
            VoteStatus::Consensus if consensus_method.is_none() => {
                return Err(EK::MissingToken.with_msg("consensus-method"));
            }
            VoteStatus::Vote if consensus_methods.is_empty() => {
                return Err(EK::MissingToken.with_msg("consensus-methods"));
            }
            _ => (),
        }

        let valid_after = header
            .required(VALID_AFTER)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let fresh_until = header
            .required(FRESH_UNTIL)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let valid_until = header
            .required(VALID_UNTIL)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let lifetime = Lifetime::new(valid_after, fresh_until, valid_until)?;

        let voting_delay = match header.get(VOTING_DELAY) {
            None => None,
            Some(item) => {
                let vote: u32 = item.parse_arg(0)?;
                let dist: u32 = item.parse_arg(1)?;
                Some((vote, dist))
            }
        };

        let known_flags = header
            .required(KNOWN_FLAGS)?
            .args()
            .map(str::to_string)
            .collect();
        let params = match header.get(PARAMS) {
            None => Vec::new(),
            Some(item) => item
                .args()
                .map(parse_i32_pair)
                .collect::<Result<Vec<_>>>()?,
        };
        let client_versions = header.maybe(CLIENT_VERSIONS).args_as_str().map(str::to_string);
        let server_versions = header.maybe(SERVER_VERSIONS).args_as_str().map(str::to_string);

        // Voter sections.
        let mut voters = Vec::new();
        while reader.peek().map(|i| i.is_ok_with_kwd(DIR_SOURCE)) == Some(true) {
            let mut first = true;
            let items = reader.pause_at(move |i| {
                if i.is_ok_with_kwd_in(&[RS_R, DIRECTORY_FOOTER, DIRECTORY_SIGNATURE]) {
                    return true;
                }
                if !first && i.is_ok_with_kwd(DIR_SOURCE) {
                    return true;
                }
                first = false;
                false
            });
            let sec = NS_VOTERINFO_RULES_V3.parse(items)?;
            voters.push(DirSource::from_section(&sec)?);
        }
        match vote_status {
            VoteStatus::Vote if voters.len() != 1 => {
                return Err(EK::BadDocumentType.with_msg("a vote must have one voter"));
            }
            VoteStatus::Consensus if voters.is_empty() => {
                return Err(EK::MissingToken.with_msg("dir-source"));
            }
            _ => (),
        }

        // Relay listing; entries must be sorted by identity.
        let mut relays: Vec<RouterStatus> = Vec::new();
        while reader.peek().map(|i| i.is_ok_with_kwd(RS_R)) == Some(true) {
            let mut first = true;
            let items = reader.pause_at(move |i| {
                if i.is_ok_with_kwd_in(&[DIRECTORY_FOOTER, DIRECTORY_SIGNATURE]) {
                    return true;
                }
                if !first && i.is_ok_with_kwd(RS_R) {
                    return true;
                }
                first = false;
                false
            });
            let sec = NS_ROUTERSTATUS_RULES.parse(items)?;
            let rs = RouterStatus::from_section(&sec)?;
            if let Some(prev) = relays.last() {
                if prev.identity() >= rs.identity() {
                    return Err(EK::UnexpectedToken
                        .with_msg("relay entries not sorted by identity"));
                }
            }
            relays.push(rs);
        }

        // Footer.
        let footer = NS_FOOTER_RULES_V3.parse(&mut reader)?;
        reader.should_be_exhausted_but_for_empty_lines()?;

        let bandwidth_weights = match footer.get(BANDWIDTH_WEIGHTS) {
            None => Vec::new(),
            Some(item) => item
                .args()
                .map(parse_i32_pair)
                .collect::<Result<Vec<_>>>()?,
        };

        // The signed portion runs from the version keyword through
        // "directory-signature " (including the space).
        let sig_items = footer.slice(DIRECTORY_SIGNATURE);
        // This unwrap is safe: the signature token is required.
        #[allow(clippy::unwrap_used)]
        let first_sig = sig_items.first().unwrap();
        let sig_offset = first_sig
            .offset_in(s)
            .ok_or_else(|| EK::Internal.with_msg("signature not within document"))?;
        let digest = doc::digest_from_kwds(s, start_offset, sig_offset, "directory-signature ");

        let mut signatures = Vec::new();
        for item in sig_items {
            signatures.push(DocSignature::from_item(item)?);
        }

        Ok(NetStatusV3 {
            vote_status,
            consensus_method,
            consensus_methods,
            lifetime,
            voting_delay,
            known_flags,
            params,
            client_versions,
            server_versions,
            voters,
            relays,
            bandwidth_weights,
            digest,
            signatures,
        })
    }
}

/// The source information in a v2 network-status header.
#[derive(Clone, Debug)]
pub struct DirSourceV2 {
    /// The authority's declared hostname.
    pub hostname: String,
    /// The authority's address.
    pub address: Ipv4Addr,
    /// The authority's directory port.
    pub dir_port: u16,
}

/// A version 2 network-status document: one authority's flat listing.
#[derive(Clone, Debug)]
pub struct NetStatusV2 {
    /// When this document was published.
    published: SystemTime,
    /// Who published it.
    source: DirSourceV2,
    /// The identity of the signing authority.
    fingerprint: RsaIdentity,
    /// Contact information, if given.
    contact: Option<String>,
    /// The key the document is signed with.
    signing_key: PublicKey,
    /// Recommended client versions, verbatim.
    client_versions: Option<String>,
    /// Recommended relay versions, verbatim.
    server_versions: Option<String>,
    /// Options declared in the header (e.g. "Names", "Versions").
    dir_options: Vec<String>,
    /// The relay listing.
    relays: Vec<RouterStatus>,
    /// The digest of the signed portion of this document.
    digest: [u8; 20],
}

impl NetStatusV2 {
    /// Return when this document was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return the identity of the authority that signed this document.
    pub fn fingerprint(&self) -> &RsaIdentity {
        &self.fingerprint
    }
    /// Return the source information from the header.
    pub fn source(&self) -> &DirSourceV2 {
        &self.source
    }
    /// Return the relay listing.
    pub fn relays(&self) -> &[RouterStatus] {
        &self.relays
    }
    /// Return the options listed in the header.
    pub fn dir_options(&self) -> &[String] {
        &self.dir_options
    }
    /// Return true if this document's authority asserts Named status.
    pub fn binds_names(&self) -> bool {
        self.dir_options.iter().any(|o| o == "Names")
    }
    /// Return the recommended relay versions, if any.
    pub fn server_versions(&self) -> Option<&str> {
        self.server_versions.as_deref()
    }
    /// Return the recommended client versions, if any.
    pub fn client_versions(&self) -> Option<&str> {
        self.client_versions.as_deref()
    }
    /// Return the digest of the signed portion of this document.
    pub fn digest(&self) -> &[u8; 20] {
        &self.digest
    }

    /// Parse a v2 network-status document, verifying its signature
    /// against its own embedded signing key.
    pub fn parse(s: &str) -> Result<NetStatusV2> {
        Self::parse_internal(s).map_err(|e| e.within(s))
    }

    /// Helper: parse; errors use byte positions.
    fn parse_internal(s: &str) -> Result<NetStatusV2> {
        use NetstatusKwd::*;
        let mut reader: NetDocReader<'_, NetstatusKwd> = NetDocReader::new(s);

        let header = NS_HEADER_RULES_V2
            .parse(reader.pause_at(|i| i.is_ok_with_kwd_in(&[RS_R, DIRECTORY_SIGNATURE])))?;

        let start_offset = {
            // This unwrap is safe: the version token is required.
            #[allow(clippy::unwrap_used)]
            let first = header.first_item().unwrap();
            if first.kwd() != NETWORK_STATUS_VERSION {
                return Err(EK::UnexpectedToken
                    .with_msg(first.kwd().to_str())
                    .at_pos(first.pos()));
            }
            let version: u32 = first.parse_arg(0)?;
            if version != 2 {
                return Err(EK::BadDocumentVersion.with_msg(version.to_string()));
            }
            first
                .offset_in(s)
                .ok_or_else(|| EK::Internal.with_msg("version line not within document"))?
        };

        let source = {
            let item = header.required(DIR_SOURCE)?;
            DirSourceV2 {
                hostname: item.required_arg(0)?.to_string(),
                address: item.parse_arg(1)?,
                dir_port: item.parse_arg(2)?,
            }
        };
        let fingerprint: RsaIdentity = header
            .required(FINGERPRINT)?
            .args_as_str()
            .parse::<SpFingerprint>()?
            .into();
        let contact = header.maybe(CONTACT).args_as_str().map(str::to_string);
        let signing_key: PublicKey = header
            .required(DIR_SIGNING_KEY)?
            .parse_obj::<RsaPublic>("RSA PUBLIC KEY")?
            .check_len_eq(1024)?
            .into();
        if signing_key.to_rsa_identity() != fingerprint {
            return Err(EK::BadArgument
                .at_pos(header.required(FINGERPRINT)?.pos())
                .with_msg("fingerprint does not match signing key"));
        }
        let published = header
            .required(PUBLISHED)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let client_versions = header.maybe(CLIENT_VERSIONS).args_as_str().map(str::to_string);
        let server_versions = header.maybe(SERVER_VERSIONS).args_as_str().map(str::to_string);
        let dir_options = match header.get(DIR_OPTIONS) {
            None => Vec::new(),
            Some(item) => item.args().map(str::to_string).collect(),
        };

        // Relay listing.  A v2 listing is also sorted, but by the
        // base64 encoding of the identity; tolerate disorder.
        let mut relays: Vec<RouterStatus> = Vec::new();
        while reader.peek().map(|i| i.is_ok_with_kwd(RS_R)) == Some(true) {
            let mut first = true;
            let items = reader.pause_at(move |i| {
                if i.is_ok_with_kwd(DIRECTORY_SIGNATURE) {
                    return true;
                }
                if !first && i.is_ok_with_kwd(RS_R) {
                    return true;
                }
                first = false;
                false
            });
            let sec = NS_ROUTERSTATUS_RULES.parse(items)?;
            let rs = RouterStatus::from_section(&sec)?;
            if let Some(prev) = relays.last() {
                if prev.identity() >= rs.identity() {
                    warn!("v2 network-status entries out of order");
                }
            }
            relays.push(rs);
        }

        // Footer: one signature, covering the document through the end
        // of the directory-signature line.
        let footer = NS_FOOTER_RULES_V2.parse(&mut reader)?;
        reader.should_be_exhausted_but_for_empty_lines()?;

        let sig_item = footer.required(DIRECTORY_SIGNATURE)?;
        let sig_offset = sig_item
            .offset_in(s)
            .ok_or_else(|| EK::Internal.with_msg("signature not within document"))?;
        let line_end = s[sig_offset..]
            .find('\n')
            .ok_or_else(|| EK::TruncatedLine.err())?;
        let digest = ornet_llcrypto::d::sha1(&s.as_bytes()[start_offset..sig_offset + line_end + 1]);

        let signature = sig_item.obj("SIGNATURE")?;
        doc::check_signature(&signing_key, &digest, &signature)
            .map_err(|e| e.at_pos(sig_item.pos()))?;

        Ok(NetStatusV2 {
            published,
            source,
            fingerprint,
            contact,
            signing_key,
            client_versions,
            server_versions,
            dir_options,
            relays,
            digest,
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::doc::authcert::test::{build_authcert, test_authority};
    use crate::doc::routerdesc::test::pem_object;
    use base64ct::{Base64Unpadded, Encoding};

    /// Helper: a 20-byte identity with a fixed prefix byte.
    fn fake_id(first: u8) -> [u8; 20] {
        let mut id = [0x20_u8; 20];
        id[0] = first;
        id
    }

    /// Helper: one "r" line plus its friends, for a fake relay.
    fn relay_lines(nickname: &str, id: [u8; 20], flags: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "r {} {} {} 2026-07-01 08:00:00 10.1.2.3 9001 0\n",
            nickname,
            Base64Unpadded::encode_string(&id),
            Base64Unpadded::encode_string(&fake_id(0x99)),
        ));
        out.push_str(&format!("s {}\n", flags));
        out.push_str("v Tor 0.2.1.5-alpha\n");
        out.push_str("w Bandwidth=2048\n");
        out.push_str("p accept 80,443\n");
        out
    }

    /// Build a signed v3 consensus with the given relay lines.
    pub(crate) fn build_consensus(relay_block: &str) -> String {
        let auth = test_authority();
        let id_pub = auth.identity.to_public_key();
        let sk_pub = auth.signing.to_public_key();

        let mut c = String::new();
        c.push_str("network-status-version 3\n");
        c.push_str("vote-status consensus\n");
        c.push_str("consensus-method 9\n");
        c.push_str("valid-after 2026-07-01 12:00:00\n");
        c.push_str("fresh-until 2026-07-01 13:00:00\n");
        c.push_str("valid-until 2026-07-01 15:00:00\n");
        c.push_str("voting-delay 300 300\n");
        c.push_str("client-versions 0.2.0.35,0.2.1.5-alpha\n");
        c.push_str("server-versions 0.2.0.35,0.2.1.5-alpha\n");
        c.push_str("known-flags Authority BadExit Exit Fast Guard Named Running Stable Valid\n");
        c.push_str("params circwindow=1000\n");
        c.push_str(&format!(
            "dir-source testauth {} dir.example.com 192.0.2.7 8080 8443\n",
            hex::encode(id_pub.to_rsa_identity().as_bytes()),
        ));
        c.push_str("contact nobody@example.com\n");
        c.push_str(&format!("vote-digest {}\n", hex::encode(fake_id(0x11))));
        c.push_str(relay_block);
        c.push_str("directory-footer\n");
        c.push_str("bandwidth-weights Wbd=285 Wbe=0\n");
        c.push_str(&format!(
            "directory-signature {} {}\n",
            hex::encode(id_pub.to_rsa_identity().as_bytes()),
            hex::encode(ornet_llcrypto::d::sha1(&sk_pub.to_der())),
        ));
        // The signed digest ends just after "directory-signature ".
        let sig_kwd_at = c.rfind("directory-signature ").unwrap();
        let digest =
            ornet_llcrypto::d::sha1(&c.as_bytes()[..sig_kwd_at + "directory-signature ".len()]);
        let sig = auth.signing.sign(&digest).unwrap();
        c.push_str(&pem_object("SIGNATURE", &sig));
        c
    }

    #[test]
    fn parse_consensus() {
        let relays = format!(
            "{}{}",
            relay_lines("Alpha", fake_id(0x01), "Exit Fast Guard Running Stable Valid"),
            relay_lines("Beta", fake_id(0x02), "Fast Named Running Valid"),
        );
        let text = build_consensus(&relays);
        let ns = NetStatusV3::parse(&text).unwrap();

        assert_eq!(ns.vote_status(), VoteStatus::Consensus);
        assert_eq!(ns.consensus_method(), Some(9));
        assert_eq!(ns.voters().len(), 1);
        assert_eq!(ns.voters()[0].nickname(), "testauth");
        assert_eq!(ns.relays().len(), 2);
        assert_eq!(ns.params(), &[("circwindow".to_string(), 1000)]);
        assert!(ns
            .lifetime()
            .usable_at(humantime::parse_rfc3339("2026-07-01T13:30:00Z").unwrap()));

        let alpha = &ns.relays()[0];
        assert_eq!(alpha.nickname(), "Alpha");
        assert!(alpha.flags().contains(RelayFlags::EXIT | RelayFlags::GUARD));
        assert!(!alpha.flags().contains(RelayFlags::NAMED));
        assert_eq!(alpha.version(), Some("Tor 0.2.1.5-alpha"));
        assert_eq!(alpha.weight().unwrap().as_kb(), Some(2048));
        assert!(!alpha.weight().unwrap().is_measured());
        assert!(alpha.port_summary().unwrap().allows_port(443));
        assert!(!alpha.port_summary().unwrap().allows_port(22));

        // Signature verification against the test authority's cert.
        let cert = AuthCert::parse(&build_authcert()).unwrap();
        assert_eq!(ns.n_valid_signatures(&[cert]), 1);
        // With no certs at all, nothing can be verified.
        assert_eq!(ns.n_valid_signatures(&[]), 0);
    }

    #[test]
    fn empty_relay_listing_is_fine() {
        let text = build_consensus("");
        let ns = NetStatusV3::parse(&text).unwrap();
        assert_eq!(ns.relays().len(), 0);
    }

    #[test]
    fn unsorted_consensus_rejected() {
        let relays = format!(
            "{}{}",
            relay_lines("Beta", fake_id(0x02), "Running Valid"),
            relay_lines("Alpha", fake_id(0x01), "Running Valid"),
        );
        let text = build_consensus(&relays);
        assert!(NetStatusV3::parse(&text).is_err());
    }

    #[test]
    fn tampered_consensus_has_no_valid_signatures() {
        let relays = relay_lines("Alpha", fake_id(0x01), "Running Valid");
        let text = build_consensus(&relays).replace("9001", "9002");
        let ns = NetStatusV3::parse(&text).unwrap();
        let cert = AuthCert::parse(&build_authcert()).unwrap();
        assert_eq!(ns.n_valid_signatures(&[cert]), 0);
    }

    #[test]
    fn vote_needs_exactly_one_voter() {
        let relays = relay_lines("Alpha", fake_id(0x01), "Running Valid");
        let text = build_consensus(&relays)
            .replace("vote-status consensus", "vote-status vote")
            .replace("consensus-method 9", "consensus-methods 7 8 9");
        // Our synthetic "vote" still has one voter, so only the missing
        // published line distinguishes it; it should parse.
        let ns = NetStatusV3::parse(&text).unwrap();
        assert_eq!(ns.vote_status(), VoteStatus::Vote);

        // Two voter sections make it invalid as a vote.
        let double = {
            let auth = test_authority();
            let id_pub = auth.identity.to_public_key();
            let extra = format!(
                "dir-source othername {} dir2.example.com 192.0.2.8 8080 8443\n",
                hex::encode(id_pub.to_rsa_identity().as_bytes()),
            );
            let idx = text.find("r Alpha").unwrap();
            let mut t = text.clone();
            t.insert_str(idx, &extra);
            t
        };
        assert!(NetStatusV3::parse(&double).is_err());
    }

    /// Build a signed v2 network-status with the given relay lines.
    pub(crate) fn build_v2_status(relay_block: &str) -> String {
        let auth = test_authority();
        let key_pub = auth.identity.to_public_key();

        let mut d = String::new();
        d.push_str("network-status-version 2\n");
        d.push_str("dir-source dir.example.com 192.0.2.7 8080\n");
        d.push_str(&format!(
            "fingerprint {}\n",
            hex::encode(key_pub.to_rsa_identity().as_bytes()).to_uppercase()
        ));
        d.push_str("contact nobody@example.com\n");
        d.push_str("dir-signing-key\n");
        d.push_str(&pem_object("RSA PUBLIC KEY", &key_pub.to_der()));
        d.push_str("published 2026-07-01 11:00:00\n");
        d.push_str("dir-options Names Versions\n");
        d.push_str("server-versions 0.2.0.35\n");
        d.push_str(relay_block);
        d.push_str("directory-signature dirname\n");
        let digest = ornet_llcrypto::d::sha1(d.as_bytes());
        let sig = auth.identity.sign(&digest).unwrap();
        d.push_str(&pem_object("SIGNATURE", &sig));
        d
    }

    #[test]
    fn parse_v2_status() {
        let relays = relay_lines("Gamma", fake_id(0x03), "Exit Named Running Valid");
        let text = build_v2_status(&relays);
        let ns = NetStatusV2::parse(&text).unwrap();

        assert_eq!(ns.source().hostname, "dir.example.com");
        assert_eq!(ns.source().dir_port, 8080);
        assert!(ns.binds_names());
        assert_eq!(ns.relays().len(), 1);
        assert_eq!(ns.relays()[0].nickname(), "Gamma");
        assert_eq!(ns.server_versions(), Some("0.2.0.35"));
        assert_eq!(
            ns.fingerprint(),
            &test_authority().identity.to_public_key().to_rsa_identity()
        );
    }

    #[test]
    fn v2_signature_is_checked() {
        let text = build_v2_status("").replace("8080", "8081");
        let e = NetStatusV2::parse(&text).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::BadSignature);
    }
}
