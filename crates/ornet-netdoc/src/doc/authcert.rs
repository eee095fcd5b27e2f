//! Parsing implementation for directory authority key certificates.
//!
//! An authority has a long-term identity key that it keeps offline,
//! and a medium-term signing key that it uses to sign votes and
//! consensuses.  A key certificate is the identity key's statement
//! binding a signing key to the authority.

use crate::doc;
use crate::parse::keyword::Keyword;
use crate::parse::parser::{Section, SectionRules};
use crate::parse::tokenize::NetDocReader;
use crate::types::misc::*;
use crate::{NetdocErrorKind as EK, Result};

use ornet_llcrypto::d;
use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};
use std::sync::LazyLock;
use std::time::SystemTime;

decl_keyword! {
    /// Keywords that can appear in a key certificate.
    AuthCertKwd {
        "dir-key-certificate-version" => DIR_KEY_CERTIFICATE_VERSION,
        "dir-address" => DIR_ADDRESS,
        "fingerprint" => FINGERPRINT,
        "dir-identity-key" => DIR_IDENTITY_KEY,
        "dir-key-published" => DIR_KEY_PUBLISHED,
        "dir-key-expires" => DIR_KEY_EXPIRES,
        "dir-signing-key" => DIR_SIGNING_KEY,
        "dir-key-crosscert" => DIR_KEY_CROSSCERT,
        "dir-key-certification" => DIR_KEY_CERTIFICATION,
    }
}

/// Rules about entries in a key certificate.
static AUTHCERT_RULES: LazyLock<SectionRules<AuthCertKwd>> = LazyLock::new(|| {
    use AuthCertKwd::*;
    let mut rules = SectionRules::builder();
    rules.add(DIR_KEY_CERTIFICATE_VERSION.rule().required().args(1..));
    rules.add(DIR_ADDRESS.rule().args(1..));
    rules.add(FINGERPRINT.rule().required().args(1..));
    rules.add(DIR_IDENTITY_KEY.rule().required().no_args().obj_required());
    rules.add(DIR_KEY_PUBLISHED.rule().required());
    rules.add(DIR_KEY_EXPIRES.rule().required());
    rules.add(DIR_SIGNING_KEY.rule().required().no_args().obj_required());
    rules.add(DIR_KEY_CROSSCERT.rule().required().no_args().obj_required());
    rules.add(
        DIR_KEY_CERTIFICATION
            .rule()
            .required()
            .no_args()
            .obj_required(),
    );
    rules.add(UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules.build()
});

/// A self-signed certificate binding an authority's signing key to its
/// identity key.
#[derive(Clone, Debug)]
pub struct AuthCert {
    /// The authority's long-term identity key.
    identity_key: PublicKey,
    /// Identity digest of the identity key.
    id_fingerprint: RsaIdentity,
    /// The medium-term signing key this certificate vouches for.
    signing_key: PublicKey,
    /// SHA-1 digest of the signing key's DER encoding, as used to match
    /// signatures in consensus documents.
    sk_fingerprint: RsaIdentity,
    /// When was this certificate published?
    published: SystemTime,
    /// When does this certificate expire?
    expires: SystemTime,
}

impl AuthCert {
    /// Return the identity digest of the authority that issued this
    /// certificate.
    pub fn id_fingerprint(&self) -> &RsaIdentity {
        &self.id_fingerprint
    }
    /// Return the digest of the signing key this certificate endorses.
    pub fn sk_fingerprint(&self) -> &RsaIdentity {
        &self.sk_fingerprint
    }
    /// Return the identity key in this certificate.
    pub fn identity_key(&self) -> &PublicKey {
        &self.identity_key
    }
    /// Return the signing key endorsed by this certificate.
    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }
    /// Return when this certificate was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return when this certificate expires.
    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    /// Parse a single authority certificate from a string, checking its
    /// own signatures.
    pub fn parse(s: &str) -> Result<AuthCert> {
        let mut reader = NetDocReader::new(s);
        let result = AuthCert::take_from_reader(&mut reader).map_err(|e| e.within(s))?;
        reader.should_be_exhausted().map_err(|e| e.within(s))?;
        Ok(result)
    }

    /// Return an iterator yielding authority certificates from a string
    /// containing several concatenated certificates.
    pub fn parse_multiple(s: &str) -> impl Iterator<Item = Result<AuthCert>> + '_ {
        AuthCertIterator(NetDocReader::new(s))
    }

    /// Extract an authority certificate from a reader.
    fn take_from_reader(reader: &mut NetDocReader<'_, AuthCertKwd>) -> Result<AuthCert> {
        use AuthCertKwd::*;
        let s = reader.str();

        // A certificate runs from `dir-key-certificate-version` through
        // `dir-key-certification` (with its object).
        let body: Section<'_, AuthCertKwd> = {
            let mut seen_certification = false;
            let items = reader.pause_at(move |item| {
                if seen_certification {
                    return true;
                }
                if let Ok(item) = item {
                    if item.kwd() == DIR_KEY_CERTIFICATION {
                        seen_certification = true;
                    }
                }
                false
            });
            AUTHCERT_RULES.parse(items)?
        };

        // Check the version and positions.
        let version_tok = body.required(DIR_KEY_CERTIFICATE_VERSION)?;
        {
            let version: u32 = version_tok.parse_arg(0)?;
            if version != 3 {
                return Err(EK::BadDocumentVersion
                    .at_pos(version_tok.pos())
                    .with_msg(format!("unexpected version {}", version)));
            }
            // This unwrap is safe: parse succeeded, so the section is
            // nonempty.
            #[allow(clippy::unwrap_used)]
            let first = body.first_item().unwrap();
            if first.kwd() != DIR_KEY_CERTIFICATE_VERSION {
                return Err(EK::MisplacedToken
                    .with_msg("dir-key-certificate-version")
                    .at_pos(first.pos()));
            }
            #[allow(clippy::unwrap_used)]
            let last = body.last_item().unwrap();
            if last.kwd() != DIR_KEY_CERTIFICATION {
                return Err(EK::MisplacedToken
                    .with_msg("dir-key-certification")
                    .at_pos(last.pos()));
            }
        }

        let identity_key: PublicKey = body
            .required(DIR_IDENTITY_KEY)?
            .parse_obj::<RsaPublic>("RSA PUBLIC KEY")?
            .into();
        let id_fingerprint = identity_key.to_rsa_identity();

        let signing_key: PublicKey = body
            .required(DIR_SIGNING_KEY)?
            .parse_obj::<RsaPublic>("RSA PUBLIC KEY")?
            .check_len_eq(1024)?
            .into();
        let sk_fingerprint: RsaIdentity = d::sha1(&signing_key.to_der()).into();

        // The fingerprint line must match the identity key.
        {
            let fp_tok = body.required(FINGERPRINT)?;
            let fingerprint: RsaIdentity = fp_tok.args_as_str().parse::<SpFingerprint>()?.into();
            if fingerprint != id_fingerprint {
                return Err(EK::BadArgument
                    .at_pos(fp_tok.pos())
                    .with_msg("fingerprint does not match identity key"));
            }
        }

        let published = body
            .required(DIR_KEY_PUBLISHED)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();
        let expires = body
            .required(DIR_KEY_EXPIRES)?
            .args_as_str()
            .parse::<Iso8601TimeSp>()?
            .into();

        // Check the main certification: the identity key signs the
        // certificate body through "dir-key-certification\n".
        {
            let certification = body.required(DIR_KEY_CERTIFICATION)?;
            let start = body
                .required(DIR_KEY_CERTIFICATE_VERSION)?
                .offset_in(s)
                .ok_or_else(|| EK::Internal.with_msg("certificate not within document"))?;
            let end = certification
                .offset_in(s)
                .ok_or_else(|| EK::Internal.with_msg("certification not within document"))?;
            let digest = doc::digest_from_kwds(s, start, end, "dir-key-certification\n");
            let sig = certification.obj("SIGNATURE")?;
            doc::check_signature(&identity_key, &digest, &sig)
                .map_err(|e| e.at_pos(certification.pos()))?;
        }

        // Check the crosscert: the signing key signs the identity
        // digest, proving possession.
        {
            let crosscert = body.required(DIR_KEY_CROSSCERT)?;
            let sig = crosscert.obj("ID SIGNATURE")?;
            doc::check_signature(&signing_key, id_fingerprint.as_bytes(), &sig)
                .map_err(|e| e.at_pos(crosscert.pos()))?;
        }

        Ok(AuthCert {
            identity_key,
            id_fingerprint,
            signing_key,
            sk_fingerprint,
            published,
            expires,
        })
    }

    /// Skip tokens from the reader until the next token (if any) is the
    /// start of a certificate.
    fn advance_reader_to_next(reader: &mut NetDocReader<'_, AuthCertKwd>) {
        use AuthCertKwd::*;
        while let Some(item) = reader.peek() {
            if let Ok(item) = item {
                if item.kwd() == DIR_KEY_CERTIFICATE_VERSION {
                    return;
                }
            }
            let _ = reader.next();
        }
    }
}

/// Iterator over a list of concatenated authority certificates.
struct AuthCertIterator<'a>(NetDocReader<'a, AuthCertKwd>);

impl<'a> Iterator for AuthCertIterator<'a> {
    type Item = Result<AuthCert>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.peek()?;

        let pos_orig = self.0.pos();
        let result = AuthCert::take_from_reader(&mut self.0);
        if result.is_err() {
            if self.0.pos() == pos_orig {
                // No tokens were consumed; drop one to avoid a loop.
                let _ = self.0.next();
            }
            AuthCert::advance_reader_to_next(&mut self.0);
        }
        Some(result.map_err(|e| e.within(self.0.str())))
    }
}

#[cfg(test)]
pub(crate) mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::doc::routerdesc::test::pem_object;
    use ornet_llcrypto::pk::rsa::PrivateKey;
    use std::sync::OnceLock;

    /// Key material for a fake directory authority.
    pub(crate) struct TestAuthority {
        pub(crate) identity: PrivateKey,
        pub(crate) signing: PrivateKey,
    }

    /// Return this process's fake authority.
    pub(crate) fn test_authority() -> &'static TestAuthority {
        static AUTH: OnceLock<TestAuthority> = OnceLock::new();
        AUTH.get_or_init(|| {
            use rand::SeedableRng as _;
            let mut rng = rand::rngs::StdRng::seed_from_u64(0x64697261757468);
            TestAuthority {
                identity: PrivateKey::generate(&mut rng).expect("keygen failed"),
                signing: PrivateKey::generate(&mut rng).expect("keygen failed"),
            }
        })
    }

    /// Build a correctly-signed certificate for the fake authority.
    pub(crate) fn build_authcert() -> String {
        let auth = test_authority();
        let id_pub = auth.identity.to_public_key();
        let sk_pub = auth.signing.to_public_key();
        let id_digest = id_pub.to_rsa_identity();

        let mut c = String::new();
        c.push_str("dir-key-certificate-version 3\n");
        c.push_str(&format!(
            "fingerprint {}\n",
            hex::encode(id_digest.as_bytes()).to_uppercase()
        ));
        c.push_str("dir-key-published 2026-06-01 00:00:00\n");
        c.push_str("dir-key-expires 2027-06-01 00:00:00\n");
        c.push_str("dir-identity-key\n");
        c.push_str(&pem_object("RSA PUBLIC KEY", &id_pub.to_der()));
        c.push_str("dir-signing-key\n");
        c.push_str(&pem_object("RSA PUBLIC KEY", &sk_pub.to_der()));
        c.push_str("dir-key-crosscert\n");
        let crosscert = auth.signing.sign(id_digest.as_bytes()).unwrap();
        c.push_str(&pem_object("ID SIGNATURE", &crosscert));
        c.push_str("dir-key-certification\n");
        let digest = d::sha1(c.as_bytes());
        let sig = auth.identity.sign(&digest).unwrap();
        c.push_str(&pem_object("SIGNATURE", &sig));
        c
    }

    #[test]
    fn parse_good_cert() {
        let text = build_authcert();
        let cert = AuthCert::parse(&text).unwrap();
        let auth = test_authority();
        assert_eq!(
            cert.id_fingerprint(),
            &auth.identity.to_public_key().to_rsa_identity()
        );
        assert_eq!(
            cert.sk_fingerprint().as_bytes(),
            &d::sha1(&auth.signing.to_public_key().to_der())
        );
        assert!(cert.published() < cert.expires());
    }

    #[test]
    fn reject_modified_cert() {
        let text = build_authcert();
        let tampered = text.replace("2026-06-01", "2026-06-02");
        let e = AuthCert::parse(&tampered).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::BadSignature);
    }

    #[test]
    fn reject_wrong_version() {
        let text = build_authcert().replace(
            "dir-key-certificate-version 3",
            "dir-key-certificate-version 4",
        );
        let e = AuthCert::parse(&text).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::BadDocumentVersion);
    }

    #[test]
    fn parse_multiple_with_recovery() {
        let good = build_authcert();
        let bad = build_authcert().replace("2026-06-01", "2025-01-01");
        let both = format!("{}{}", bad, good);
        let certs: Vec<_> = AuthCert::parse_multiple(&both).collect();
        assert_eq!(certs.len(), 2);
        assert!(certs[0].is_err());
        assert!(certs[1].is_ok());
    }
}
