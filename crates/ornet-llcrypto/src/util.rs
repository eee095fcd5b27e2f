//! Odds and ends that don't fit anywhere else.

use crate::pk::rsa::PublicKey;
use der_parser::ber::{BerObject, BerObjectContent};

/// The object identifier for an RSA public key: `rsaEncryption`.
const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// Try to extract the RSA subject public key from a DER-encoded X.509
/// certificate.
///
/// The TLS wrapper hands the link layer raw certificate bytes; what the
/// link layer needs from the identity certificate is only the RSA key it
/// carries, so that it can compute the peer's identity digest.  Rather
/// than validate the whole certificate structure, we walk the DER until
/// we find a SubjectPublicKeyInfo with an `rsaEncryption` algorithm and
/// return the key inside it.
///
/// Returns None if no plausible RSA subject key is present.
pub fn x509_extract_rsa_subject(cert_der: &[u8]) -> Option<PublicKey> {
    let (_, obj) = der_parser::parse_der(cert_der).ok()?;
    find_rsa_spki(&obj)
}

/// Recursive helper for [`x509_extract_rsa_subject`]: search `obj` for a
/// SubjectPublicKeyInfo-shaped sequence.
fn find_rsa_spki(obj: &BerObject<'_>) -> Option<PublicKey> {
    let seq = match &obj.content {
        BerObjectContent::Sequence(items) => items,
        _ => return None,
    };

    // SubjectPublicKeyInfo ::= SEQUENCE {
    //      algorithm        SEQUENCE { OID rsaEncryption, NULL },
    //      subjectPublicKey BIT STRING  -- PKCS#1 RSAPublicKey
    // }
    if let [alg, key] = &seq[..] {
        if let (BerObjectContent::Sequence(alg_items), BerObjectContent::BitString(_, data)) =
            (&alg.content, &key.content)
        {
            let is_rsa = alg_items
                .first()
                .and_then(|o| o.as_oid().ok())
                .map(|oid| oid.to_id_string() == RSA_ENCRYPTION_OID)
                .unwrap_or(false);
            if is_rsa {
                if let Ok(k) = PublicKey::from_der(data.data) {
                    return Some(k);
                }
            }
        }
    }

    // Otherwise keep looking below.
    seq.iter().find_map(find_rsa_spki)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn junk_is_not_a_certificate() {
        assert!(x509_extract_rsa_subject(b"not DER").is_none());
        assert!(x509_extract_rsa_subject(&[]).is_none());
        // A DER NULL parses, but contains no key.
        assert!(x509_extract_rsa_subject(&[0x05, 0x00]).is_none());
    }

    #[test]
    fn finds_embedded_spki() {
        use rand::SeedableRng as _;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let sk = crate::pk::rsa::PrivateKey::generate(&mut rng).expect("keygen");
        let pk = sk.to_public_key();
        let pkcs1 = pk.to_der();

        // Hand-assemble a SubjectPublicKeyInfo wrapping the key, inside an
        // outer sequence, the way a certificate would nest it.
        let spki = {
            let alg: &[u8] = &[
                0x30, 0x0d, // SEQUENCE, len 13
                0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, // OID
                0x05, 0x00, // NULL
            ];
            let mut bitstring = vec![0x03];
            // BIT STRING payload: one unused-bits octet plus the key.
            let payload_len = pkcs1.len() + 1;
            bitstring.extend_from_slice(&der_len(payload_len));
            bitstring.push(0x00);
            bitstring.extend_from_slice(&pkcs1);

            let mut inner = alg.to_vec();
            inner.extend_from_slice(&bitstring);
            let mut spki = vec![0x30];
            spki.extend_from_slice(&der_len(inner.len()));
            spki.extend_from_slice(&inner);
            spki
        };
        let mut outer = vec![0x30];
        outer.extend_from_slice(&der_len(spki.len()));
        outer.extend_from_slice(&spki);

        let found = x509_extract_rsa_subject(&outer).expect("key not found");
        assert_eq!(found.to_rsa_identity(), pk.to_rsa_identity());
    }

    /// Minimal DER length encoding for tests.
    fn der_len(n: usize) -> Vec<u8> {
        if n < 128 {
            vec![n as u8]
        } else if n < 256 {
            vec![0x81, n as u8]
        } else {
            vec![0x82, (n >> 8) as u8, (n & 0xff) as u8]
        }
    }
}
