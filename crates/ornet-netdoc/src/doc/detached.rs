//! Parsing for detached-signature documents.
//!
//! While authorities are computing a consensus, they exchange their
//! signatures on it in a small separate document, so that each of them
//! can publish the consensus with everybody's signatures attached.

use crate::doc::netstatus::DocSignature;
use crate::parse::keyword::Keyword;
use crate::parse::parser::SectionRules;
use crate::parse::tokenize::NetDocReader;
use crate::types::misc::*;
use crate::{NetdocErrorKind as EK, Result};

use std::sync::LazyLock;
use std::time::SystemTime;

decl_keyword! {
    /// Keywords of a detached-signature document.
    DetachedSigKwd {
        "consensus-digest" => CONSENSUS_DIGEST,
        "valid-after" => VALID_AFTER,
        "fresh-until" => FRESH_UNTIL,
        "valid-until" => VALID_UNTIL,
        "directory-signature" => DIRECTORY_SIGNATURE,
    }
}

/// Rules for parsing a detached-signature document.
static DETACHED_SIG_RULES: LazyLock<SectionRules<DetachedSigKwd>> = LazyLock::new(|| {
    use DetachedSigKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(CONSENSUS_DIGEST.rule().required().args(1..));
    rules.add(VALID_AFTER.rule().required());
    rules.add(FRESH_UNTIL.rule().required());
    rules.add(VALID_UNTIL.rule().required());
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

/// A set of signatures on a consensus, sent around separately from the
/// consensus itself.
#[derive(Clone, Debug)]
pub struct DetachedSignatures {
    /// The SHA-1 digest of the consensus being signed.
    consensus_digest: [u8; 20],
    /// Time at which the consensus becomes valid.
    valid_after: SystemTime,
    /// Time after which a newer consensus is expected.
    fresh_until: SystemTime,
    /// Time after which the consensus is expired.
    valid_until: SystemTime,
    /// The signatures themselves.
    signatures: Vec<crate::doc::netstatus::DocSignature>,
}

impl DetachedSignatures {
    /// Return the digest of the consensus these signatures apply to.
    pub fn consensus_digest(&self) -> &[u8; 20] {
        &self.consensus_digest
    }
    /// Return the time at which the consensus becomes valid.
    pub fn valid_after(&self) -> SystemTime {
        self.valid_after
    }
    /// Return the time after which a fresher consensus is expected.
    pub fn fresh_until(&self) -> SystemTime {
        self.fresh_until
    }
    /// Return the time after which the consensus is expired.
    pub fn valid_until(&self) -> SystemTime {
        self.valid_until
    }
    /// Return the signatures in this document.
    pub fn signatures(&self) -> &[DocSignature] {
        &self.signatures
    }

    /// Parse a detached-signature document.
    pub fn parse(s: &str) -> Result<DetachedSignatures> {
        Self::parse_internal(s).map_err(|e| e.within(s))
    }

    /// Helper: parse; errors use byte positions.
    fn parse_internal(s: &str) -> Result<DetachedSignatures> {
        use DetachedSigKwd::*;
        let mut reader: NetDocReader<'_, DetachedSigKwd> = NetDocReader::new(s);
        let body = DETACHED_SIG_RULES.parse(&mut reader)?;
        reader.should_be_exhausted_but_for_empty_lines()?;

        let digest_item = body.required(CONSENSUS_DIGEST)?;
        let consensus_digest: [u8; 20] = hex::decode(digest_item.required_arg(0)?)
            .ok()
            .and_then(|d| d.try_into().ok())
            .ok_or_else(|| {
                EK::BadArgument
                    .at_pos(digest_item.pos())
                    .with_msg("bad consensus digest")
            })?;

        let valid_after = body
            .required(VALID_AFTER)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let fresh_until = body
            .required(FRESH_UNTIL)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let valid_until = body
            .required(VALID_UNTIL)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();

        let mut signatures = Vec::new();
        for item in body.slice(DIRECTORY_SIGNATURE) {
            signatures.push(DocSignature::from_parts(
                item.parse_arg::<Fingerprint>(0)?.into(),
                item.parse_arg::<Fingerprint>(1)?.into(),
                item.obj("SIGNATURE")?,
            ));
        }

        Ok(DetachedSignatures {
            consensus_digest,
            valid_after,
            fresh_until,
            valid_until,
            signatures,
        })
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::doc::routerdesc::test::pem_object;

    #[test]
    fn parse_detached() {
        let mut d = String::new();
        d.push_str(&format!("consensus-digest {}\n", hex::encode([7_u8; 20])));
        d.push_str("valid-after 2026-07-01 12:00:00\n");
        d.push_str("fresh-until 2026-07-01 13:00:00\n");
        d.push_str("valid-until 2026-07-01 15:00:00\n");
        d.push_str(&format!(
            "directory-signature {} {}\n",
            hex::encode([1_u8; 20]),
            hex::encode([2_u8; 20])
        ));
        d.push_str(&pem_object("SIGNATURE", b"not a real signature"));

        let ds = DetachedSignatures::parse(&d).unwrap();
        assert_eq!(ds.consensus_digest(), &[7_u8; 20]);
        assert_eq!(ds.signatures().len(), 1);
        assert!(ds.valid_after() < ds.valid_until());
    }

    #[test]
    fn missing_digest_fails() {
        let d = "valid-after 2026-07-01 12:00:00\n\
                 fresh-until 2026-07-01 13:00:00\n\
                 valid-until 2026-07-01 15:00:00\n";
        assert!(DetachedSignatures::parse(d).is_err());
    }
}
