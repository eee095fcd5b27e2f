//! Implements the relay 'family' type.
//!
//! Families are opt-in lists of relays with the same operator: two
//! members of the same family should never appear in one circuit.

use crate::{Error, Result};
use ornet_llcrypto::pk::rsa::RsaIdentity;
use std::str::FromStr;

/// Information about a relay family.
///
/// Some entries in a family line are nicknames rather than keys; only
/// the identity-key entries are binding, so nicknames are dropped at
/// parse time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayFamily(Vec<RsaIdentity>);

impl RelayFamily {
    /// Return a new empty RelayFamily.
    pub fn new() -> Self {
        RelayFamily::default()
    }

    /// Add `rsa_id` to this family.
    pub fn push(&mut self, rsa_id: RsaIdentity) {
        if !self.0.contains(&rsa_id) {
            self.0.push(rsa_id);
        }
    }

    /// Does this family include the given relay identity?
    pub fn contains(&self, rsa_id: &RsaIdentity) -> bool {
        self.0.contains(rsa_id)
    }

    /// Return an iterator over the identities in this family.
    pub fn members(&self) -> impl Iterator<Item = &RsaIdentity> {
        self.0.iter()
    }

    /// Return true if this family has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for RelayFamily {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let mut family = RelayFamily::new();
        for ent in s.split_ascii_whitespace() {
            if let Some(id) = RsaIdentity::from_hex(ent) {
                family.push(id);
            }
            // Nickname entries are ignored: without a key they can't be
            // verified, and the consensus no longer binds nicknames.
        }
        Ok(family)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn family() {
        let f: RelayFamily = "$303509ab910ef207b7438c27435c4a2fd579f1b1 SomeNickname \
                              $56927e61b51e6f363fb55498150a6ddfcf7077f2"
            .parse()
            .unwrap();
        let id1 = RsaIdentity::from_hex("303509ab910ef207b7438c27435c4a2fd579f1b1").unwrap();
        let id2 = RsaIdentity::from_hex("56927e61b51e6f363fb55498150a6ddfcf7077f2").unwrap();
        let id3 = RsaIdentity::from_hex("00112233445566778899aabbccddeeff00112233").unwrap();
        assert!(f.contains(&id1));
        assert!(f.contains(&id2));
        assert!(!f.contains(&id3));
        assert_eq!(f.members().count(), 2);

        let empty: RelayFamily = "".parse().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn dedup() {
        let f: RelayFamily = "$303509ab910ef207b7438c27435c4a2fd579f1b1 \
                              $303509ab910ef207b7438c27435c4a2fd579f1b1"
            .parse()
            .unwrap();
        assert_eq!(f.members().count(), 1);
    }
}
