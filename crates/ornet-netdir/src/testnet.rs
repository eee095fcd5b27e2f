//! Helpers to build a tiny fake network for the tests in this crate.
//!
//! Real keys and real signed documents are used throughout, so the
//! fixtures go through exactly the same parsing and validation paths
//! as production input.  Key generation is slow, so every key is made
//! once per process and shared.

#![allow(clippy::unwrap_used)]

use crate::authority::{Authority, AuthorityFlags, AuthoritySet};
use crate::{DirConfig, NetDirectory};
use base64ct::{Base64, Base64Unpadded, Encoding};
use ornet_llcrypto::pk::rsa::{PrivateKey, RsaIdentity};
use ornet_netdoc::doc::netstatus::NetStatusV2;
use ornet_netdoc::doc::routerdesc::RouterDesc;
use std::sync::OnceLock;

/// A fake relay with a real identity key.
pub(crate) struct TestRelay {
    /// This relay's identity key.
    identity: PrivateKey,
    /// This relay's nickname.
    nickname: String,
}

impl TestRelay {
    /// Return this relay's identity digest.
    pub(crate) fn identity(&self) -> RsaIdentity {
        self.identity.to_public_key().to_rsa_identity()
    }

    /// Build, sign, and parse a descriptor published at `when`
    /// (a "YYYY-MM-DD HH:MM:SS" string).
    pub(crate) fn desc_published(&self, when: &str) -> RouterDesc {
        self.desc_with_bandwidth(when, 153600)
    }

    /// As `desc_published`, with a chosen observed bandwidth.
    pub(crate) fn desc_with_bandwidth(&self, when: &str, bw: u32) -> RouterDesc {
        let identity_pub = self.identity.to_public_key();
        let onion_pub = shared_onion_key().to_public_key();

        let mut d = String::new();
        d.push_str(&format!("router {} 10.0.0.1 9001 0 0\n", self.nickname));
        d.push_str(&format!("published {}\n", when));
        d.push_str(&format!("bandwidth {} {} {}\n", bw, bw * 2, bw));
        d.push_str("onion-key\n");
        d.push_str(&pem_object("RSA PUBLIC KEY", &onion_pub.to_der()));
        d.push_str("signing-key\n");
        d.push_str(&pem_object("RSA PUBLIC KEY", &identity_pub.to_der()));
        d.push_str("reject *:*\n");
        d.push_str("router-signature\n");
        let digest = ornet_llcrypto::d::sha1(d.as_bytes());
        let sig = self.identity.sign(&digest).unwrap();
        d.push_str(&pem_object("SIGNATURE", &sig));

        RouterDesc::parse(&d).expect("test descriptor did not parse")
    }
}

/// The authority's key, made once.
pub(crate) fn authority_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| generate_key(0x617574683161))
}

/// Additional authority keys, for tests that need several voters.
pub(crate) fn extra_authority(i: usize) -> &'static PrivateKey {
    static KEYS: OnceLock<Vec<PrivateKey>> = OnceLock::new();
    &KEYS.get_or_init(|| (0..2).map(|n| generate_key(0x6175746832 + n as u64)).collect::<Vec<_>>())[i]
}

/// The onion key shared by every test relay.
fn shared_onion_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| generate_key(0x6f6e696f6e))
}

/// The test relays, made once.
fn test_relays() -> &'static Vec<TestRelay> {
    static RELAYS: OnceLock<Vec<TestRelay>> = OnceLock::new();
    RELAYS.get_or_init(|| {
        (0..3)
            .map(|i| TestRelay {
                identity: generate_key(0x72656c6179 + i),
                nickname: format!("relay{}", i),
            })
            .collect()
    })
}

/// Generate one RSA key from a seed.
fn generate_key(seed: u64) -> PrivateKey {
    use rand::SeedableRng as _;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    PrivateKey::generate(&mut rng).expect("keygen failed")
}

/// Helper: wrap DER bytes in a BEGIN/END object.
fn pem_object(tag: &str, der: &[u8]) -> String {
    let mut out = format!("-----BEGIN {}-----\n", tag);
    let b64 = Base64::encode_string(der);
    for chunk in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", tag));
    out
}

/// One relay's entry in a custom-built status document.
pub(crate) struct StatusEntry {
    /// The nickname the authority lists for the relay.
    pub(crate) nickname: String,
    /// The relay's identity digest.
    pub(crate) identity: RsaIdentity,
    /// The descriptor digest the authority references.
    pub(crate) digest: [u8; 20],
    /// The flags asserted, as they appear on the `s` line.
    pub(crate) flags: String,
}

/// Build a signed v2 network-status from an arbitrary authority key.
pub(crate) fn status_doc_custom(
    auth: &PrivateKey,
    published: &str,
    entries: &[StatusEntry],
) -> NetStatusV2 {
    let key_pub = auth.to_public_key();

    let mut d = String::new();
    d.push_str("network-status-version 2\n");
    d.push_str("dir-source dir.example.com 192.0.2.7 8080\n");
    d.push_str(&format!(
        "fingerprint {}\n",
        hex::encode(key_pub.to_rsa_identity().as_bytes())
    ));
    d.push_str("dir-signing-key\n");
    d.push_str(&pem_object("RSA PUBLIC KEY", &key_pub.to_der()));
    d.push_str(&format!("published {}\n", published));
    d.push_str("dir-options Names\n");
    for ent in entries {
        d.push_str(&format!(
            "r {} {} {} 2026-07-01 10:00:00 10.0.0.1 9001 0\n",
            ent.nickname,
            Base64Unpadded::encode_string(ent.identity.as_bytes()),
            Base64Unpadded::encode_string(&ent.digest),
        ));
        d.push_str(&format!("s {}\n", ent.flags));
    }
    d.push_str("directory-signature testdir\n");
    let digest = ornet_llcrypto::d::sha1(d.as_bytes());
    let sig = auth.sign(&digest).unwrap();
    d.push_str(&pem_object("SIGNATURE", &sig));

    NetStatusV2::parse(&d).expect("test status did not parse")
}

/// Build a signed v2 network-status from the test authority listing
/// the given relays with the given flag strings.
pub(crate) fn status_doc(listed: &[(&TestRelay, &str)]) -> NetStatusV2 {
    let entries: Vec<StatusEntry> = listed
        .iter()
        .map(|(relay, flags)| StatusEntry {
            nickname: relay.nickname.clone(),
            identity: relay.identity(),
            digest: [0x42_u8; 20],
            flags: (*flags).to_string(),
        })
        .collect();
    status_doc_custom(authority_key(), "2026-07-01 12:00:00", &entries)
}

/// A tiny test network: a directory with one configured authority, and
/// three relays with real keys.
pub(crate) struct TestNet {
    /// The directory under test.
    pub(crate) dir: NetDirectory,
    /// The relays whose descriptors can be fed to it.
    pub(crate) relays: &'static [TestRelay],
}

/// Build a fresh [`TestNet`].
pub(crate) fn test_net() -> TestNet {
    let authority = Authority::builder()
        .name("testdir")
        .address("192.0.2.7".parse().unwrap())
        .dir_port(8080)
        .or_port(8443)
        .identity(authority_key().to_public_key().to_rsa_identity())
        .flags(AuthorityFlags::V2 | AuthorityFlags::V3)
        .build()
        .unwrap();
    let dir = NetDirectory::new(
        AuthoritySet::from_authorities(vec![authority]),
        DirConfig::default(),
    );
    TestNet {
        dir,
        relays: test_relays(),
    }
}
