//! Parsing for router descriptors.
//!
//! A "router descriptor" is a signed statement that a relay makes
//! about itself: its keys, its addresses, its capabilities, and its
//! exit policy.  Relays upload their descriptors to the directory
//! authorities, which use them as input to the voting process and
//! serve them to caches and clients.
//!
//! The SHA-1 digest of the identity key is the relay's stable 20-byte
//! identifier; the SHA-1 digest of the signed body (from the `router`
//! keyword through the `router-signature` line) names this particular
//! descriptor in network-status documents.

use crate::doc;
use crate::parse::keyword::Keyword;
use crate::parse::parser::{Section, SectionRules};
use crate::parse::tokenize::{ItemResult, NetDocReader};
use crate::types::family::RelayFamily;
use crate::types::misc::*;
use crate::types::policy::{AddrPolicy, RuleKind};
use crate::types::version::Version;
use crate::{AllowAnnotations, Error, NetdocErrorKind as EK, Result};

use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::SystemTime;

/// The digest of a router descriptor's signed body, as referenced from
/// a network-status document.
pub type RdDigest = [u8; 20];

/// A router descriptor, with possible annotations.
#[derive(Debug)]
pub struct AnnotatedRouterDesc {
    /// Annotation for this router descriptor; possibly empty.
    ann: RouterAnnotation,
    /// Underlying router descriptor.
    router: RouterDesc,
}

impl AnnotatedRouterDesc {
    /// Return the annotation on this descriptor.
    pub fn annotation(&self) -> &RouterAnnotation {
        &self.ann
    }
    /// Return the descriptor itself.
    pub fn router(&self) -> &RouterDesc {
        &self.router
    }
    /// Discard the annotation and return the descriptor.
    pub fn into_router(self) -> RouterDesc {
        self.router
    }
}

/// Annotations about a router descriptor, as stored on disk.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct RouterAnnotation {
    /// Description of where we got this router descriptor.
    pub source: Option<String>,
    /// When this descriptor was first downloaded.
    pub downloaded: Option<SystemTime>,
    /// Description of what we're willing to use this descriptor for.
    pub purpose: Option<String>,
}

/// Description of the software a relay says it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayPlatform {
    /// Software advertised to be some version of the reference
    /// implementation, on some platform.
    Tor(Version, String),
    /// Software not advertised to be the reference implementation.
    Other(String),
}

impl std::str::FromStr for RelayPlatform {
    type Err = Error;
    fn from_str(args: &str) -> Result<Self> {
        if args.starts_with("Tor ") {
            let v: Vec<_> = args.splitn(4, ' ').collect();
            match &v[..] {
                ["Tor", ver, "on", p] => Ok(RelayPlatform::Tor(ver.parse()?, (*p).to_string())),
                ["Tor", ver, ..] => Ok(RelayPlatform::Tor(ver.parse()?, "".to_string())),
                _ => unreachable!(),
            }
        } else {
            Ok(RelayPlatform::Other(args.to_string()))
        }
    }
}

/// Information about a relay, parsed from a router descriptor.
#[derive(Clone, Debug)]
pub struct RouterDesc {
    /// Human-readable nickname for this relay.  Not unique, not secure.
    nickname: Nickname,
    /// IPv4 address for this relay.
    ipv4addr: Ipv4Addr,
    /// IPv4 ORPort for this relay.
    orport: u16,
    /// Directory port for direct HTTP directory requests.
    dirport: u16,
    /// Declared uptime for this relay, in seconds.
    uptime: Option<u64>,
    /// Time when this router descriptor was published.
    published: SystemTime,
    /// Identity key for this relay.
    identity_key: PublicKey,
    /// The SHA-1 digest of the identity key: the relay's stable name.
    rsa_identity: RsaIdentity,
    /// Key for handshakes extending a circuit to this relay.
    onion_key: PublicKey,
    /// Declared bandwidth: (rate, burst, observed), in bytes/sec.
    bandwidth: (u32, u32, u32),
    /// Software and version that this relay says it's running.
    platform: Option<RelayPlatform>,
    /// Declared family members for this relay.
    family: RelayFamily,
    /// The relay's declared IPv4 exit policy, in source order.
    ipv4_policy: AddrPolicy,
    /// True if this relay says it is currently hibernating.
    is_hibernating: bool,
    /// True if this relay says it caches extra-info documents.
    is_extrainfo_cache: bool,
    /// Digest of this relay's corresponding extra-info document, if any.
    extra_info_digest: Option<[u8; 20]>,
    /// Contact information for the operator, if any.
    contact: Option<String>,
    /// SHA-1 digest of the signed portion of this descriptor.
    desc_digest: RdDigest,
}

decl_keyword! {
    /// RouterKwd is the set of Items recognized in a router descriptor.
    RouterKwd {
        "@source" => ANN_SOURCE,
        "@downloaded-at" => ANN_DOWNLOADED_AT,
        "@purpose" => ANN_PURPOSE,
        "accept" | "reject" => POLICY,
        "bandwidth" => BANDWIDTH,
        "caches-extra-info" => CACHES_EXTRA_INFO,
        "contact" => CONTACT,
        "eventdns" => EVENTDNS,
        "extra-info-digest" => EXTRA_INFO_DIGEST,
        "family" => FAMILY,
        "fingerprint" => FINGERPRINT,
        "hibernating" => HIBERNATING,
        "hidden-service-dir" => HIDDEN_SERVICE_DIR,
        "onion-key" => ONION_KEY,
        "platform" => PLATFORM,
        "protocols" => PROTOCOLS,
        "published" => PUBLISHED,
        "read-history" => READ_HISTORY,
        "router" => ROUTER,
        "router-signature" => ROUTER_SIGNATURE,
        "signing-key" => SIGNING_KEY,
        "uptime" => UPTIME,
        "write-history" => WRITE_HISTORY,
    }
}

/// Rules for parsing a set of router descriptor annotations.
static ROUTER_ANNOTATIONS: LazyLock<SectionRules<RouterKwd>> = LazyLock::new(|| {
    use RouterKwd::*;

    let mut rules = SectionRules::builder();
    rules.add(ANN_SOURCE.rule());
    rules.add(ANN_DOWNLOADED_AT.rule().args(1..));
    rules.add(ANN_PURPOSE.rule().args(1..));
    rules.add(ANN_UNRECOGNIZED.rule().may_repeat().obj_optional());
    // Unrecognized annotations are fine; anything else is an error in
    // this context.
    rules.reject_unrecognized();
    rules.build()
});

/// Rules for the body of a router descriptor.
static ROUTER_BODY_RULES: LazyLock<SectionRules<RouterKwd>> = LazyLock::new(|| {
    use RouterKwd::*;

    let mut rules = SectionRules::builder();
    rules.add(ROUTER.rule().required().args(5..));
    rules.add(BANDWIDTH.rule().required().args(3..));
    rules.add(PLATFORM.rule());
    rules.add(PUBLISHED.rule().required());
    rules.add(FINGERPRINT.rule());
    rules.add(HIBERNATING.rule().args(1..));
    rules.add(UPTIME.rule().args(1..));
    rules.add(ONION_KEY.rule().no_args().required().obj_required());
    rules.add(SIGNING_KEY.rule().no_args().required().obj_required());
    rules.add(POLICY.rule().may_repeat().args(1..));
    rules.add(ROUTER_SIGNATURE.rule().required().no_args().obj_required());
    rules.add(CONTACT.rule());
    rules.add(FAMILY.rule().args(1..));
    rules.add(EXTRA_INFO_DIGEST.rule().args(1..));
    rules.add(CACHES_EXTRA_INFO.rule().no_args());
    rules.add(HIDDEN_SERVICE_DIR.rule());
    // These once meant something, but nothing reads them now.
    rules.add(READ_HISTORY.rule().args(1..));
    rules.add(WRITE_HISTORY.rule().args(1..));
    rules.add(EVENTDNS.rule().args(1..));
    rules.add(PROTOCOLS.rule().args(1..));
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

impl RouterAnnotation {
    /// Extract a single RouterAnnotation (possibly empty) from a reader.
    fn take_from_reader(reader: &mut NetDocReader<'_, RouterKwd>) -> Result<RouterAnnotation> {
        use RouterKwd::*;
        let mut items = reader.pause_at(|item| item.is_ok_with_non_annotation());
        let body = ROUTER_ANNOTATIONS.parse(&mut items)?;

        let source = body.maybe(ANN_SOURCE).args_as_str().map(String::from);
        let purpose = body.maybe(ANN_PURPOSE).args_as_str().map(String::from);
        let downloaded = body
            .maybe(ANN_DOWNLOADED_AT)
            .parse_args_as_str::<Iso8601TimeSp>()?
            .map(|t| t.into());
        Ok(RouterAnnotation {
            source,
            downloaded,
            purpose,
        })
    }
}

impl RouterDesc {
    /// Return this relay's nickname.
    pub fn nickname(&self) -> &str {
        self.nickname.as_str()
    }
    /// Return this relay's identity digest.
    pub fn rsa_identity(&self) -> &RsaIdentity {
        &self.rsa_identity
    }
    /// Return this relay's identity key.
    pub fn identity_key(&self) -> &PublicKey {
        &self.identity_key
    }
    /// Return this relay's onion key.
    pub fn onion_key(&self) -> &PublicKey {
        &self.onion_key
    }
    /// Return the digest of this descriptor's signed body.
    pub fn digest(&self) -> &RdDigest {
        &self.desc_digest
    }
    /// Return this relay's IPv4 address.
    pub fn ipv4addr(&self) -> Ipv4Addr {
        self.ipv4addr
    }
    /// Return this relay's OR port.
    pub fn orport(&self) -> u16 {
        self.orport
    }
    /// Return this relay's directory port; zero means none.
    pub fn dirport(&self) -> u16 {
        self.dirport
    }
    /// Return when this descriptor was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return this relay's declared uptime in seconds, if any.
    pub fn uptime(&self) -> Option<u64> {
        self.uptime
    }
    /// Return the declared (rate, burst, observed) bandwidth triple.
    pub fn bandwidth(&self) -> (u32, u32, u32) {
        self.bandwidth
    }
    /// Return the relay's declared platform, if it gave one.
    pub fn platform(&self) -> Option<&RelayPlatform> {
        self.platform.as_ref()
    }
    /// Return this relay's declared family.
    pub fn family(&self) -> &RelayFamily {
        &self.family
    }
    /// Return this relay's IPv4 exit policy.
    ///
    /// A descriptor with no policy lines behaves as `reject *:*`; that
    /// is already this type's behavior for an empty policy.
    pub fn ipv4_policy(&self) -> &AddrPolicy {
        &self.ipv4_policy
    }
    /// Return true if this relay said it was hibernating.
    pub fn is_hibernating(&self) -> bool {
        self.is_hibernating
    }
    /// Return true if this relay claims to cache extra-info documents.
    pub fn is_extrainfo_cache(&self) -> bool {
        self.is_extrainfo_cache
    }
    /// Return the digest of this relay's extra-info document, if any.
    pub fn extra_info_digest(&self) -> Option<&[u8; 20]> {
        self.extra_info_digest.as_ref()
    }
    /// Return the relay's contact line, if any.
    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    /// Try to parse `s` as a router descriptor, and verify its
    /// self-signature.
    pub fn parse(s: &str) -> Result<RouterDesc> {
        let mut reader = NetDocReader::new(s);
        let result = Self::parse_internal(&mut reader).map_err(|e| e.within(s))?;
        // Some implementations emit trailing empty lines; don't let
        // that kill an otherwise-good descriptor.
        reader
            .should_be_exhausted_but_for_empty_lines()
            .map_err(|e| e.within(s))?;
        Ok(result)
    }

    /// Helper: parse a router descriptor from the reader.
    ///
    /// Returns errors with byte-based positions; parse() maps them to
    /// line-and-byte positions.
    fn parse_internal(r: &mut NetDocReader<'_, RouterKwd>) -> Result<RouterDesc> {
        use RouterKwd::*;

        let s = r.str();

        // One descriptor runs from its `router` item through its
        // `router-signature` item; pause after the signature so a
        // stream of concatenated descriptors can be read one by one.
        let body: Section<'_, RouterKwd> = {
            let mut first = true;
            let mut seen_sig = false;
            let items = r.pause_at(move |item| {
                if seen_sig {
                    return true;
                }
                if item.is_ok_with_annotation() {
                    return true;
                }
                if !first && item.is_ok_with_kwd(ROUTER) {
                    return true;
                }
                first = false;
                if item.is_ok_with_kwd(ROUTER_SIGNATURE) {
                    seen_sig = true;
                }
                false
            });
            ROUTER_BODY_RULES.parse(items)?
        };

        // The `router` line must come first, and the signature last.
        let rtrline = body.required(ROUTER)?;
        let start_offset = rtrline
            .offset_in(s)
            .ok_or_else(|| EK::Internal.with_msg("router line not within document"))?;
        {
            // This unwrap is safe: parse succeeded, so the section is
            // nonempty.
            #[allow(clippy::unwrap_used)]
            let first = body.first_item().unwrap();
            if first.kwd() != ROUTER {
                return Err(EK::MisplacedToken.with_msg("router").at_pos(first.pos()));
            }
            #[allow(clippy::unwrap_used)]
            let last = body.last_item().unwrap();
            if last.kwd() != ROUTER_SIGNATURE {
                return Err(EK::MisplacedToken
                    .with_msg("router-signature")
                    .at_pos(last.pos()));
            }
        }

        // Identity (signing) key, and the identity digest derived from it.
        let identity_key: PublicKey = body
            .required(SIGNING_KEY)?
            .parse_obj::<RsaPublic>("RSA PUBLIC KEY")?
            .check_len_eq(1024)?
            .check_exponent(65537)?
            .into();
        let rsa_identity = identity_key.to_rsa_identity();

        // Onion key.
        let onion_key: PublicKey = body
            .required(ONION_KEY)?
            .parse_obj::<RsaPublic>("RSA PUBLIC KEY")?
            .check_len_eq(1024)?
            .check_exponent(65537)?
            .into();

        // Compute the signed digest and check the signature.
        let sig_tok = body.required(ROUTER_SIGNATURE)?;
        let desc_digest: RdDigest = {
            let sig_offset = sig_tok
                .offset_in(s)
                .ok_or_else(|| EK::Internal.with_msg("signature not within document"))?;
            doc::digest_from_kwds(s, start_offset, sig_offset, "router-signature\n")
        };
        let signature = sig_tok.obj("SIGNATURE")?;
        doc::check_signature(&identity_key, &desc_digest, &signature)
            .map_err(|e| e.at_pos(sig_tok.pos()))?;

        // router nickname address ORPort SOCKSPort DirPort
        let (nickname, ipv4addr, orport, dirport) = (
            rtrline.parse_arg::<Nickname>(0)?,
            rtrline.parse_arg::<Ipv4Addr>(1)?,
            rtrline.parse_arg::<u16>(2)?,
            // Skipping the long-dead SOCKSPort argument.
            rtrline.parse_arg::<u16>(4)?,
        );

        // bandwidth rate burst observed
        let bw_tok = body.required(BANDWIDTH)?;
        let bandwidth = (
            bw_tok.parse_arg::<u32>(0)?,
            bw_tok.parse_arg::<u32>(1)?,
            bw_tok.parse_arg::<u32>(2)?,
        );

        // published
        let published = body
            .required(PUBLISHED)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();

        // uptime
        let uptime = body.maybe(UPTIME).parse_arg(0)?;

        // fingerprint, when present, must match the identity digest.
        if let Some(fp_tok) = body.get(FINGERPRINT) {
            let fp: RsaIdentity = fp_tok.args_as_str().parse::<SpFingerprint>()?.into();
            if fp != rsa_identity {
                return Err(EK::BadArgument
                    .at_pos(fp_tok.pos())
                    .with_msg("fingerprint does not match identity key"));
            }
        }

        // platform
        let platform = body.maybe(PLATFORM).parse_args_as_str::<RelayPlatform>()?;

        // family
        let family = body
            .maybe(FAMILY)
            .parse_args_as_str::<RelayFamily>()?
            .unwrap_or_default();

        // exit policy, in source order.
        let ipv4_policy = {
            let mut pol = AddrPolicy::new();
            for ruletok in body.slice(POLICY).iter() {
                let kind = match ruletok.kwd_str() {
                    "accept" => RuleKind::Accept,
                    "reject" => RuleKind::Reject,
                    _ => {
                        return Err(EK::Internal
                            .with_msg("policy keyword is not accept or reject")
                            .at_pos(ruletok.pos()))
                    }
                };
                pol.push_policy_line(kind, ruletok.args_as_str())
                    .map_err(|e| e.or_at_pos(ruletok.pos()))?;
            }
            pol
        };

        // hibernating
        let is_hibernating = match body.maybe(HIBERNATING).parse_arg::<u8>(0)? {
            None => false,
            Some(v) => v != 0,
        };

        // extra-info-digest
        let extra_info_digest = match body.get(EXTRA_INFO_DIGEST) {
            None => None,
            Some(tok) => {
                let fp: RsaIdentity = tok.parse_arg::<Fingerprint>(0)?.into();
                Some(*fp.as_bytes())
            }
        };
        let is_extrainfo_cache = body.get(CACHES_EXTRA_INFO).is_some();

        // contact
        let contact = body.maybe(CONTACT).args_as_str().map(String::from);

        Ok(RouterDesc {
            nickname,
            ipv4addr,
            orport,
            dirport,
            uptime,
            published,
            identity_key,
            rsa_identity,
            onion_key,
            bandwidth,
            platform,
            family,
            ipv4_policy,
            is_hibernating,
            is_extrainfo_cache,
            extra_info_digest,
            contact,
            desc_digest,
        })
    }
}

/// An iterator that parses one or more (possibly annotated) router
/// descriptors from a string.
pub struct RouterReader<'a> {
    /// True iff we accept annotations.
    annotated: bool,
    /// Reader that we're extracting items from.
    reader: NetDocReader<'a, RouterKwd>,
}

/// Skip this reader forward until the next thing it reads looks like
/// the start of a router descriptor.
///
/// Used to recover from errors.
fn advance_to_next_routerdesc(reader: &mut NetDocReader<'_, RouterKwd>, annotated: bool) {
    use RouterKwd::*;
    loop {
        let item = reader.peek();
        match item {
            Some(Ok(t)) => {
                let kwd = t.kwd();
                if (annotated && kwd.is_annotation()) || kwd == ROUTER {
                    return;
                }
            }
            Some(Err(_)) => {
                // Skip over broken tokens.
            }
            None => {
                return;
            }
        }
        let _ = reader.next();
    }
}

impl<'a> RouterReader<'a> {
    /// Construct a RouterReader to take router descriptors from a string.
    pub fn new(s: &'a str, allow: &AllowAnnotations) -> Self {
        let reader = NetDocReader::new(s);
        let annotated = allow == &AllowAnnotations::AnnotationsAllowed;
        RouterReader { annotated, reader }
    }

    /// Extract an annotation from this reader.
    fn take_annotation(&mut self) -> Result<RouterAnnotation> {
        if self.annotated {
            RouterAnnotation::take_from_reader(&mut self.reader)
        } else {
            Ok(RouterAnnotation::default())
        }
    }

    /// Extract an annotated router descriptor from this reader.
    ///
    /// (Internal helper; does not clean up on failure.)
    fn take_annotated_routerdesc_raw(&mut self) -> Result<AnnotatedRouterDesc> {
        let ann = self.take_annotation()?;
        let router = RouterDesc::parse_internal(&mut self.reader)?;
        Ok(AnnotatedRouterDesc { ann, router })
    }

    /// Extract an annotated router descriptor, resynchronizing on error.
    fn take_annotated_routerdesc(&mut self) -> Result<AnnotatedRouterDesc> {
        let pos_orig = self.reader.pos();
        let result = self.take_annotated_routerdesc_raw();
        if result.is_err() {
            if self.reader.pos() == pos_orig {
                // No tokens were consumed; drop one to avoid a loop.
                let _ = self.reader.next();
            }
            advance_to_next_routerdesc(&mut self.reader, self.annotated);
        }
        result
    }
}

impl<'a> Iterator for RouterReader<'a> {
    type Item = Result<AnnotatedRouterDesc>;
    fn next(&mut self) -> Option<Self::Item> {
        // Is there a next token? If not, we're done.
        self.reader.peek()?;

        Some(
            self.take_annotated_routerdesc()
                .map_err(|e| e.within(self.reader.str())),
        )
    }
}

/// Extract the router descriptors embedded in a legacy v1 aggregate
/// directory.
///
/// Nothing generates these documents any more, but an old cache
/// directory may still hold one.  The v1 header and the trailing
/// directory signature are skipped without checking: the descriptors
/// themselves are still individually self-signed.
pub fn parse_v1_directory(s: &str) -> Vec<Result<RouterDesc>> {
    use RouterKwd::*;
    let mut reader: NetDocReader<'_, RouterKwd> = NetDocReader::new(s);
    advance_to_next_routerdesc(&mut reader, false);
    let mut out = Vec::new();
    while reader.peek().map(|t| t.is_ok_with_kwd(ROUTER)) == Some(true) {
        let result = RouterDesc::parse_internal(&mut reader).map_err(|e| e.within(s));
        if result.is_err() {
            advance_to_next_routerdesc(&mut reader, false);
        }
        out.push(result);
    }
    out
}

#[cfg(test)]
pub(crate) mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use base64ct::{Base64, Encoding};
    use ornet_llcrypto::pk::rsa::PrivateKey;
    use std::sync::OnceLock;

    /// A pair of test keys, generated once per test run.
    pub(crate) struct TestKeys {
        pub(crate) identity: PrivateKey,
        pub(crate) onion: PrivateKey,
    }

    /// Return the (static) test keys for this process.
    pub(crate) fn test_keys() -> &'static TestKeys {
        static KEYS: OnceLock<TestKeys> = OnceLock::new();
        KEYS.get_or_init(|| {
            use rand::SeedableRng as _;
            let mut rng = rand::rngs::StdRng::seed_from_u64(0x726f757465726b);
            TestKeys {
                identity: PrivateKey::generate(&mut rng).expect("keygen failed"),
                onion: PrivateKey::generate(&mut rng).expect("keygen failed"),
            }
        })
    }

    /// Helper: wrap DER bytes in a BEGIN/END object.
    pub(crate) fn pem_object(tag: &str, der: &[u8]) -> String {
        let mut out = format!("-----BEGIN {}-----\n", tag);
        let b64 = Base64::encode_string(der);
        for chunk in b64.as_bytes().chunks(64) {
            out.push_str(std::str::from_utf8(chunk).unwrap());
            out.push('\n');
        }
        out.push_str(&format!("-----END {}-----\n", tag));
        out
    }

    /// Build a correctly-signed router descriptor for the test keys.
    pub(crate) fn build_desc(nickname: &str, policy: &[&str]) -> String {
        let keys = test_keys();
        let identity_pub = keys.identity.to_public_key();
        let onion_pub = keys.onion.to_public_key();

        let mut d = String::new();
        d.push_str(&format!("router {} 10.0.0.1 9001 0 9030\n", nickname));
        d.push_str("platform Tor 0.2.1.5-alpha on a test harness\n");
        d.push_str("published 2026-07-01 12:00:00\n");
        d.push_str("uptime 1036923\n");
        d.push_str("bandwidth 153600 256000 104590\n");
        d.push_str("onion-key\n");
        d.push_str(&pem_object("RSA PUBLIC KEY", &onion_pub.to_der()));
        d.push_str("signing-key\n");
        d.push_str(&pem_object("RSA PUBLIC KEY", &identity_pub.to_der()));
        for line in policy {
            d.push_str(line);
            d.push('\n');
        }
        d.push_str("router-signature\n");

        let digest = ornet_llcrypto::d::sha1(d.as_bytes());
        let sig = keys.identity.sign(&digest).unwrap();
        d.push_str(&pem_object("SIGNATURE", &sig));
        d
    }

    #[test]
    fn parse_built_desc() {
        let text = build_desc("Akka", &["accept *:80", "reject *:*"]);
        let rd = RouterDesc::parse(&text).unwrap();

        assert_eq!(rd.nickname(), "Akka");
        assert_eq!(rd.ipv4addr(), "10.0.0.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(rd.orport(), 9001);
        assert_eq!(rd.dirport(), 9030);
        assert_eq!(rd.uptime(), Some(1036923));
        assert_eq!(rd.bandwidth(), (153600, 256000, 104590));
        assert_eq!(
            rd.published(),
            humantime::parse_rfc3339("2026-07-01T12:00:00Z").unwrap()
        );
        assert_eq!(
            rd.rsa_identity(),
            &test_keys().identity.to_public_key().to_rsa_identity()
        );
        match rd.platform().unwrap() {
            RelayPlatform::Tor(v, p) => {
                assert_eq!(v, &"0.2.1.5-alpha".parse::<Version>().unwrap());
                assert_eq!(p, "a test harness");
            }
            other => panic!("unexpected platform {:?}", other),
        }
        assert!(rd.ipv4_policy().allows_or_default("1.2.3.4".parse().unwrap(), 80));
        assert!(!rd.ipv4_policy().allows_or_default("1.2.3.4".parse().unwrap(), 22));

        // The digest names the signed body: recomputing it from the
        // text gives the same value.
        let sig_start = text.find("router-signature\n").unwrap();
        let expected = ornet_llcrypto::d::sha1(
            &text.as_bytes()[..sig_start + "router-signature\n".len()],
        );
        assert_eq!(rd.digest(), &expected);
    }

    #[test]
    fn empty_policy_rejects_everything() {
        let text = build_desc("NoExit", &[]);
        let rd = RouterDesc::parse(&text).unwrap();
        assert!(rd.ipv4_policy().is_empty());
        assert!(!rd.ipv4_policy().allows_or_default("1.2.3.4".parse().unwrap(), 80));
    }

    #[test]
    fn tampering_breaks_signature() {
        let text = build_desc("Akka", &["reject *:*"]);
        let tampered = text.replace("9001", "9002");
        let e = RouterDesc::parse(&tampered).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::BadSignature);
    }

    #[test]
    fn missing_required_tokens() {
        let text = build_desc("Akka", &["reject *:*"]);
        let no_bw = text.replace("bandwidth 153600 256000 104590\n", "");
        let e = RouterDesc::parse(&no_bw).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::MissingToken);
    }

    #[test]
    fn multiple_descriptors_with_recovery() {
        let good = build_desc("GoodOne", &["reject *:*"]);
        let bad = build_desc("BadOne", &["reject *:*"]).replace("9001", "9999");
        let also_good = build_desc("AlsoGood", &["accept *:443"]);
        let all = format!("{}{}{}", good, bad, also_good);

        let reader = RouterReader::new(&all, &AllowAnnotations::AnnotationsNotAllowed);
        let parsed: Vec<_> = reader.collect();
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert!(parsed[2].is_ok());
        assert_eq!(parsed[2].as_ref().unwrap().router().nickname(), "AlsoGood");
    }

    #[test]
    fn v1_directory_extraction() {
        let mut dir = String::from(
            "signed-directory\n\
             published 2026-07-01 09:00:00\n\
             recommended-software 0.2.0.35,0.2.1.5-alpha\n\
             running-routers One Two\n",
        );
        dir.push_str(&build_desc("One", &["reject *:*"]));
        dir.push_str(&build_desc("Two", &["accept *:443"]));
        dir.push_str("directory-signature dirname\n");
        dir.push_str(&pem_object("SIGNATURE", b"not checked for v1"));

        let parsed = parse_v1_directory(&dir);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].as_ref().unwrap().nickname(), "One");
        assert_eq!(parsed[1].as_ref().unwrap().nickname(), "Two");

        // A directory with no descriptors yields nothing.
        assert!(parse_v1_directory("signed-directory\n").is_empty());
    }

    #[test]
    fn annotations() {
        let mut text = String::from(
            "@source \"127.0.0.1\"\n@downloaded-at 2026-07-02 08:01:30\n",
        );
        text.push_str(&build_desc("Akka", &["reject *:*"]));
        let reader = RouterReader::new(&text, &AllowAnnotations::AnnotationsAllowed);
        let parsed: Vec<_> = reader.collect();
        assert_eq!(parsed.len(), 1);
        let ann = parsed[0].as_ref().unwrap().annotation();
        assert_eq!(ann.source.as_deref(), Some("\"127.0.0.1\""));
        assert_eq!(
            ann.downloaded,
            Some(humantime::parse_rfc3339("2026-07-02T08:01:30Z").unwrap())
        );
    }
}
