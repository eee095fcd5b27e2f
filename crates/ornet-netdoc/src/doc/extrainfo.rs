//! Parsing for extra-info documents.
//!
//! An extra-info document is a relay's companion to its router
//! descriptor: statistics and other bulky data that most clients never
//! need.  The descriptor refers to it by digest, and caches that opt in
//! store them alongside descriptors.

use crate::doc;
use crate::parse::keyword::Keyword;
use crate::parse::parser::SectionRules;
use crate::parse::tokenize::NetDocReader;
use crate::types::misc::*;
use crate::{NetdocErrorKind as EK, Result};

use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};
use std::sync::LazyLock;
use std::time::SystemTime;

decl_keyword! {
    /// Keywords recognized in an extra-info document.
    ///
    /// The statistics lines themselves are deliberately not enumerated:
    /// they all land in the unrecognized bucket and are preserved only
    /// as part of the signed body.
    ExtraInfoKwd {
        "extra-info" => EXTRA_INFO,
        "published" => PUBLISHED,
        "router-signature" => ROUTER_SIGNATURE,
    }
}

/// Rules for parsing an extra-info document.
static EXTRAINFO_RULES: LazyLock<SectionRules<ExtraInfoKwd>> = LazyLock::new(|| {
    use ExtraInfoKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(EXTRA_INFO.rule().required().args(2..));
    rules.add(PUBLISHED.rule().required());
    rules.add(ROUTER_SIGNATURE.rule().required().no_args().obj_required());
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// A parsed extra-info document.
///
/// The interesting payload (all those statistics lines) stays as
/// uninterpreted signed text; what this type gives you is the identity
/// binding, the digest, and the signature check.
#[derive(Clone, Debug)]
pub struct ExtraInfo {
    /// The nickname of the relay this document belongs to.
    nickname: Nickname,
    /// The identity of the relay this document belongs to.
    identity: RsaIdentity,
    /// When this document was published.
    published: SystemTime,
    /// SHA-1 digest of the signed body, as referenced from the relay's
    /// router descriptor.
    digest: [u8; 20],
}

impl ExtraInfo {
    /// Return the nickname on this document.
    pub fn nickname(&self) -> &str {
        self.nickname.as_str()
    }
    /// Return the identity of the relay that wrote this document.
    pub fn identity(&self) -> &RsaIdentity {
        &self.identity
    }
    /// Return when this document was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return the digest of this document's signed body.
    pub fn digest(&self) -> &[u8; 20] {
        &self.digest
    }

    /// Parse an extra-info document, checking its signature against
    /// `identity_key` (the key from the corresponding descriptor).
    pub fn parse(s: &str, identity_key: &PublicKey) -> Result<ExtraInfo> {
        Self::parse_internal(s, identity_key).map_err(|e| e.within(s))
    }

    /// Helper: parse; errors use byte positions.
    fn parse_internal(s: &str, identity_key: &PublicKey) -> Result<ExtraInfo> {
        use ExtraInfoKwd::*;
        let mut reader: NetDocReader<'_, ExtraInfoKwd> = NetDocReader::new(s);
        let body = EXTRAINFO_RULES.parse(&mut reader)?;
        reader.should_be_exhausted_but_for_empty_lines()?;

        let ei_tok = body.required(EXTRA_INFO)?;
        {
            // This unwrap is safe: parse succeeded, so the section is
            // nonempty.
            #[allow(clippy::unwrap_used)]
            let first = body.first_item().unwrap();
            if first.kwd() != EXTRA_INFO {
                return Err(EK::MisplacedToken
                    .with_msg("extra-info")
                    .at_pos(first.pos()));
            }
        }
        let nickname = ei_tok.parse_arg::<Nickname>(0)?;
        let identity: RsaIdentity = ei_tok.parse_arg::<Fingerprint>(1)?.into();
        if identity != identity_key.to_rsa_identity() {
            return Err(EK::BadArgument
                .at_pos(ei_tok.pos())
                .with_msg("extra-info identity does not match descriptor key"));
        }

        let published = body
            .required(PUBLISHED)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();

        let sig_tok = body.required(ROUTER_SIGNATURE)?;
        let start = ei_tok
            .offset_in(s)
            .ok_or_else(|| EK::Internal.with_msg("extra-info line not within document"))?;
        let sig_offset = sig_tok
            .offset_in(s)
            .ok_or_else(|| EK::Internal.with_msg("signature not within document"))?;
        let digest = doc::digest_from_kwds(s, start, sig_offset, "router-signature\n");
        let signature = sig_tok.obj("SIGNATURE")?;
        doc::check_signature(identity_key, &digest, &signature)
            .map_err(|e| e.at_pos(sig_tok.pos()))?;

        Ok(ExtraInfo {
            nickname,
            identity,
            published,
            digest,
        })
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::doc::routerdesc::test::{pem_object, test_keys};

    /// Build a signed extra-info document for the router test keys.
    fn build_extrainfo() -> String {
        let keys = test_keys();
        let id_pub = keys.identity.to_public_key();

        let mut d = String::new();
        d.push_str(&format!(
            "extra-info Akka {}\n",
            hex::encode(id_pub.to_rsa_identity().as_bytes()).to_uppercase()
        ));
        d.push_str("published 2026-07-01 12:00:00\n");
        d.push_str("write-history 2026-07-01 11:50:00 (900 s) 12416,9984,14464\n");
        d.push_str("read-history 2026-07-01 11:50:00 (900 s) 16305,18207,11766\n");
        d.push_str("router-signature\n");
        let digest = ornet_llcrypto::d::sha1(d.as_bytes());
        let sig = keys.identity.sign(&digest).unwrap();
        d.push_str(&pem_object("SIGNATURE", &sig));
        d
    }

    #[test]
    fn parse_extrainfo() {
        let text = build_extrainfo();
        let keys = test_keys();
        let ei = ExtraInfo::parse(&text, &keys.identity.to_public_key()).unwrap();
        assert_eq!(ei.nickname(), "Akka");
        assert_eq!(
            ei.identity(),
            &keys.identity.to_public_key().to_rsa_identity()
        );

        // The digest is over the whole signed body, statistics included.
        let sig_start = text.find("router-signature\n").unwrap();
        let expected = ornet_llcrypto::d::sha1(
            &text.as_bytes()[..sig_start + "router-signature\n".len()],
        );
        assert_eq!(ei.digest(), &expected);
    }

    #[test]
    fn wrong_key_rejected() {
        let text = build_extrainfo();
        let keys = test_keys();
        // Checking against the onion key (wrong key) must fail.
        let e = ExtraInfo::parse(&text, &keys.onion.to_public_key()).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::BadArgument);
    }
}
