//! Information about directory authorities.
//!
//! Authorities are configured at startup; at runtime we track a
//! running-hint and a consecutive-failure count per authority, to
//! drive download scheduling.

use bitflags::bitflags;
use derive_builder::Builder;
use ornet_llcrypto::pk::rsa::RsaIdentity;
use std::net::Ipv4Addr;
use tracing::info;

bitflags! {
    /// The roles a configured directory server can fill.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AuthorityFlags: u8 {
        /// Speaks the v1 directory protocol (legacy aggregate files).
        const V1 = 1 << 0;
        /// Serves v2 network-status documents.
        const V2 = 1 << 1;
        /// Participates in v3 voting.
        const V3 = 1 << 2;
        /// Serves hidden-service descriptors.
        const HIDSERV = 1 << 3;
        /// Is a bridge authority.
        const BRIDGE = 1 << 4;
        /// Caches extra-info documents.
        const EXTRAINFO_CACHE = 1 << 5;
    }
}

/// A single trusted directory server.
#[derive(Debug, Clone, Builder, Eq, PartialEq)]
pub struct Authority {
    /// A memorable nickname for this authority.
    #[builder(setter(into))]
    name: String,
    /// Its IPv4 address.
    address: Ipv4Addr,
    /// Its directory port.
    dir_port: u16,
    /// Its OR port.
    or_port: u16,
    /// A SHA-1 digest of its long-term identity key.
    identity: RsaIdentity,
    /// The roles this authority fills.
    #[builder(default)]
    flags: AuthorityFlags,
}

impl Authority {
    /// Return a new builder for constructing an Authority.
    pub fn builder() -> AuthorityBuilder {
        AuthorityBuilder::default()
    }
    /// Return this authority's nickname.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Return this authority's address.
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
    /// Return this authority's identity digest.
    pub fn identity(&self) -> &RsaIdentity {
        &self.identity
    }
    /// Return the roles this authority fills.
    pub fn flags(&self) -> AuthorityFlags {
        self.flags
    }
}

/// Runtime state for one configured authority.
#[derive(Debug, Clone)]
struct AuthorityState {
    /// The authority itself.
    auth: Authority,
    /// Do we believe this authority is reachable right now?
    ///
    /// This is a hint, not a verdict: it only reorders download
    /// attempts.
    is_running: bool,
    /// Consecutive download failures since the last success.
    n_failures: u32,
}

/// The set of configured directory authorities, with their runtime
/// status.
#[derive(Debug, Clone, Default)]
pub struct AuthoritySet {
    /// Status for each configured authority.
    members: Vec<AuthorityState>,
}

impl AuthoritySet {
    /// Construct a set from configured authorities.
    pub fn from_authorities<I: IntoIterator<Item = Authority>>(authorities: I) -> Self {
        let members = authorities
            .into_iter()
            .map(|auth| AuthorityState {
                auth,
                is_running: true,
                n_failures: 0,
            })
            .collect();
        AuthoritySet { members }
    }

    /// Return an iterator over the configured authorities.
    pub fn authorities(&self) -> impl Iterator<Item = &Authority> {
        self.members.iter().map(|m| &m.auth)
    }

    /// Return the number of authorities with all of the given flags.
    pub fn n_with_flags(&self, flags: AuthorityFlags) -> usize {
        self.members
            .iter()
            .filter(|m| m.auth.flags.contains(flags))
            .count()
    }

    /// Return the authority with a given identity, if it is configured.
    pub fn by_identity(&self, id: &RsaIdentity) -> Option<&Authority> {
        self.members
            .iter()
            .find(|m| &m.auth.identity == id)
            .map(|m| &m.auth)
    }

    /// Return true if `id` names a configured authority.
    pub fn is_trusted(&self, id: &RsaIdentity) -> bool {
        self.by_identity(id).is_some()
    }

    /// Return the authorities we currently believe to be reachable,
    /// most-recently-working first order is not guaranteed.
    pub fn believed_running(&self) -> impl Iterator<Item = &Authority> {
        self.members
            .iter()
            .filter(|m| m.is_running)
            .map(|m| &m.auth)
    }

    /// Record that a download from `id` succeeded.
    pub fn note_success(&mut self, id: &RsaIdentity) {
        if let Some(m) = self.members.iter_mut().find(|m| &m.auth.identity == id) {
            m.is_running = true;
            m.n_failures = 0;
        }
    }

    /// Record that a download from `id` failed.
    ///
    /// When every authority appears down, the failure state is reset
    /// wholesale: a state where we refuse to ask anybody is worse than
    /// a few wasted requests.
    pub fn note_failure(&mut self, id: &RsaIdentity) {
        if let Some(m) = self.members.iter_mut().find(|m| &m.auth.identity == id) {
            m.n_failures = m.n_failures.saturating_add(1);
            m.is_running = false;
        }
        if !self.members.is_empty() && self.members.iter().all(|m| !m.is_running) {
            info!("no directory authority seems reachable; resetting failure state");
            for m in &mut self.members {
                m.is_running = true;
                m.n_failures = 0;
            }
        }
    }

    /// Return the consecutive-failure count for `id`, if configured.
    pub fn n_failures(&self, id: &RsaIdentity) -> Option<u32> {
        self.members
            .iter()
            .find(|m| &m.auth.identity == id)
            .map(|m| m.n_failures)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn auth(name: &str, first_byte: u8, flags: AuthorityFlags) -> Authority {
        Authority::builder()
            .name(name)
            .address("192.0.2.1".parse().unwrap())
            .dir_port(8080)
            .or_port(8443)
            .identity([first_byte; 20].into())
            .flags(flags)
            .build()
            .unwrap()
    }

    #[test]
    fn flags_and_lookup() {
        let set = AuthoritySet::from_authorities(vec![
            auth("one", 1, AuthorityFlags::V2 | AuthorityFlags::V3),
            auth("two", 2, AuthorityFlags::V2),
            auth("three", 3, AuthorityFlags::V3 | AuthorityFlags::BRIDGE),
        ]);
        assert_eq!(set.n_with_flags(AuthorityFlags::V2), 2);
        assert_eq!(set.n_with_flags(AuthorityFlags::V3), 2);
        assert_eq!(set.n_with_flags(AuthorityFlags::BRIDGE), 1);
        assert!(set.is_trusted(&[2_u8; 20].into()));
        assert!(!set.is_trusted(&[9_u8; 20].into()));
        assert_eq!(set.by_identity(&[3_u8; 20].into()).unwrap().name(), "three");
    }

    #[test]
    fn failure_tracking_resets_en_masse() {
        let mut set = AuthoritySet::from_authorities(vec![
            auth("one", 1, AuthorityFlags::V2),
            auth("two", 2, AuthorityFlags::V2),
        ]);
        let id1: RsaIdentity = [1_u8; 20].into();
        let id2: RsaIdentity = [2_u8; 20].into();

        set.note_failure(&id1);
        assert_eq!(set.n_failures(&id1), Some(1));
        assert_eq!(set.believed_running().count(), 1);

        set.note_failure(&id1);
        assert_eq!(set.n_failures(&id1), Some(2));

        set.note_success(&id1);
        assert_eq!(set.n_failures(&id1), Some(0));
        assert_eq!(set.believed_running().count(), 2);

        // Once everybody is down, state resets wholesale.
        set.note_failure(&id1);
        set.note_failure(&id2);
        assert_eq!(set.believed_running().count(), 2);
        assert_eq!(set.n_failures(&id1), Some(0));
    }
}
