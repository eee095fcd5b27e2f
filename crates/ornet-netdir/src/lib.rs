//! Represents a client's or relay's view of the onion-routing network
//! and the relays in it.
//!
//! # Overview
//!
//! The heart of this crate is the [`Routerlist`]: the in-memory map of
//! every relay we have a descriptor for, indexed by identity digest,
//! by descriptor digest, and (when present) by extra-info digest.  On
//! top of it, [`NetDirectory`] combines the routerlist with the
//! network-status documents from the directory authorities
//! ([`status`]), the configured authorities themselves ([`authority`]),
//! and weighted relay selection ([`pick`]).
//!
//! Persistence is not handled here: the descriptor store lives in its
//! own crate, and the host wires the two together.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod authority;
pub mod pick;
pub mod retry;
pub mod status;

use authority::{AuthorityFlags, AuthoritySet};
use ornet_llcrypto::pk::rsa::RsaIdentity;
use ornet_netdoc::doc::routerdesc::{RdDigest, RouterDesc};
use status::StatusSet;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// How long a superseded descriptor may stay in `old_routers` before
/// it is dropped (unless a network-status still references it).
pub const OLD_ROUTER_DESC_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 5);

/// The outcome of offering a descriptor to the routerlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddOutcome {
    /// The descriptor became the current one for its relay.
    Added,
    /// We already had this descriptor, or a newer one; nothing changed.
    NotNew,
    /// The descriptor was kept only for mirroring or for reference; it
    /// did not become current.
    StoredAsOld,
}

/// A descriptor we hold, together with the runtime state that survives
/// descriptor replacement.
#[derive(Clone, Debug)]
pub struct RelayEntry {
    /// The descriptor itself.
    desc: RouterDesc,
    /// When we last extended a circuit to (or through) this relay.
    last_reachable: Option<SystemTime>,
    /// When we started testing reachability, if a test is under way.
    testing_since: Option<SystemTime>,
    /// How many times we have found this relay unreachable since it
    /// last worked.
    n_unreachable: u32,
}

impl RelayEntry {
    /// Wrap a newly-accepted descriptor.
    fn new(desc: RouterDesc) -> Self {
        RelayEntry {
            desc,
            last_reachable: None,
            testing_since: None,
            n_unreachable: 0,
        }
    }
    /// Return the descriptor.
    pub fn desc(&self) -> &RouterDesc {
        &self.desc
    }
    /// Return when this relay last appeared reachable, if ever.
    pub fn last_reachable(&self) -> Option<SystemTime> {
        self.last_reachable
    }
    /// Record a successful connection to this relay.
    pub fn note_reachable(&mut self, when: SystemTime) {
        self.last_reachable = Some(when);
        self.testing_since = None;
        self.n_unreachable = 0;
    }
    /// Record a failed connection attempt.
    pub fn note_unreachable(&mut self) {
        self.n_unreachable = self.n_unreachable.saturating_add(1);
    }
}

/// The authoritative in-memory set of known relays.
///
/// Every descriptor we hold is either the *current* descriptor for its
/// relay, or a superseded one kept around (by caches) for mirroring;
/// never both.
#[derive(Debug, Default)]
pub struct Routerlist {
    /// Every descriptor we hold, by descriptor digest.
    entries: HashMap<RdDigest, RelayEntry>,
    /// The current descriptor for each relay, by identity digest.
    current: HashMap<RsaIdentity, RdDigest>,
    /// Digests of the superseded descriptors.
    old: HashSet<RdDigest>,
    /// Extra-info digest to current descriptor digest.
    by_eid: HashMap<[u8; 20], RdDigest>,
}

impl Routerlist {
    /// Construct a new empty Routerlist.
    pub fn new() -> Self {
        Routerlist::default()
    }

    /// Return the number of relays with a current descriptor.
    pub fn n_relays(&self) -> usize {
        self.current.len()
    }
    /// Return the number of superseded descriptors held.
    pub fn n_old(&self) -> usize {
        self.old.len()
    }
    /// Return the current entry for a relay identity, if any.
    pub fn by_identity(&self, id: &RsaIdentity) -> Option<&RelayEntry> {
        self.entries.get(self.current.get(id)?)
    }
    /// Return a mutable reference to the current entry for a relay.
    pub fn by_identity_mut(&mut self, id: &RsaIdentity) -> Option<&mut RelayEntry> {
        let digest = *self.current.get(id)?;
        self.entries.get_mut(&digest)
    }
    /// Return the entry (current or old) with a given descriptor
    /// digest, if we hold it.
    pub fn by_desc_digest(&self, digest: &RdDigest) -> Option<&RelayEntry> {
        self.entries.get(digest)
    }
    /// Return the current entry whose descriptor declares a given
    /// extra-info digest, if any.
    pub fn by_extrainfo_digest(&self, eid: &[u8; 20]) -> Option<&RelayEntry> {
        self.entries.get(self.by_eid.get(eid)?)
    }
    /// Return an iterator over the current entries.
    pub fn relays(&self) -> impl Iterator<Item = &RelayEntry> {
        self.current.values().filter_map(move |d| self.entries.get(d))
    }

    /// Offer a descriptor to the routerlist.
    ///
    /// `from_fetch` should be true for descriptors we downloaded
    /// ourselves (as opposed to loading from the cache or receiving an
    /// upload); `we_are_cache` is true when we mirror descriptors for
    /// others and must keep superseded ones around.  `is_referenced`
    /// reports whether any current network-status lists a digest.
    pub fn add(
        &mut self,
        desc: RouterDesc,
        from_fetch: bool,
        we_are_cache: bool,
        is_referenced: &dyn Fn(&RdDigest) -> bool,
    ) -> AddOutcome {
        let digest = *desc.digest();
        let identity = *desc.rsa_identity();

        // (1) An exact duplicate is never new.
        if self.entries.contains_key(&digest) {
            return AddOutcome::NotNew;
        }

        // (2) If our current descriptor for this identity is at least
        // as recent, the new one can at most be mirrored.
        if let Some(cur_digest) = self.current.get(&identity).copied() {
            let cur_published = self
                .entries
                .get(&cur_digest)
                .expect("current map points at a missing entry")
                .desc
                .published();
            if cur_published >= desc.published() {
                return if we_are_cache {
                    self.store_as_old(desc);
                    AddOutcome::StoredAsOld
                } else {
                    AddOutcome::NotNew
                };
            }
        }

        // (3) A fetched descriptor that no status references is kept
        // out of the current set: somebody fed us something the
        // authorities don't know about.
        if from_fetch && !is_referenced(&digest) {
            self.store_as_old(desc);
            return AddOutcome::StoredAsOld;
        }

        // (4) Accept, replacing any older current descriptor.
        let mut entry = RelayEntry::new(desc);
        if let Some(old_digest) = self.current.remove(&identity) {
            // This expect is safe: `current` always points into `entries`.
            let old_entry = self
                .entries
                .get(&old_digest)
                .expect("current map points at a missing entry");
            // Keep reachability state when the address didn't change.
            if old_entry.desc.ipv4addr() == entry.desc.ipv4addr()
                && old_entry.desc.orport() == entry.desc.orport()
            {
                entry.last_reachable = old_entry.last_reachable;
                entry.testing_since = old_entry.testing_since;
                entry.n_unreachable = old_entry.n_unreachable;
            }
            if let Some(eid) = old_entry.desc.extra_info_digest() {
                self.by_eid.remove(eid);
            }
            if we_are_cache {
                self.old.insert(old_digest);
            } else {
                self.entries.remove(&old_digest);
            }
        }
        if let Some(eid) = entry.desc.extra_info_digest() {
            self.by_eid.insert(*eid, digest);
        }
        self.current.insert(identity, digest);
        self.entries.insert(digest, entry);
        debug!("accepted descriptor {} for {}", hex_prefix(&digest), identity);
        AddOutcome::Added
    }

    /// Helper: store a descriptor in `old` without making it current.
    fn store_as_old(&mut self, desc: RouterDesc) {
        let digest = *desc.digest();
        self.old.insert(digest);
        self.entries.insert(digest, RelayEntry::new(desc));
    }

    /// Drop superseded descriptors that have outlived their use.
    ///
    /// A superseded descriptor is kept while it is younger than
    /// `max_age`, or while some network-status still references it;
    /// and at most `max_per_identity` superseded descriptors are kept
    /// per relay, preferring to drop the oldest and then the
    /// shortest-lived.
    pub fn prune(
        &mut self,
        now: SystemTime,
        max_age: Duration,
        max_per_identity: usize,
        is_referenced: &dyn Fn(&RdDigest) -> bool,
    ) {
        // Age-based removal.
        let expired: Vec<RdDigest> = self
            .old
            .iter()
            .filter(|d| {
                let entry = match self.entries.get(*d) {
                    Some(e) => e,
                    None => return true,
                };
                let too_old = now
                    .duration_since(entry.desc.published())
                    .map(|age| age > max_age)
                    .unwrap_or(false);
                too_old && !is_referenced(d)
            })
            .copied()
            .collect();
        for d in expired {
            self.old.remove(&d);
            self.entries.remove(&d);
        }

        // Per-identity cap on superseded copies.
        let mut per_identity: HashMap<RsaIdentity, Vec<RdDigest>> = HashMap::new();
        for d in &self.old {
            if let Some(e) = self.entries.get(d) {
                per_identity
                    .entry(*e.desc.rsa_identity())
                    .or_default()
                    .push(*d);
            }
        }
        for (_, mut digests) in per_identity {
            if digests.len() <= max_per_identity {
                continue;
            }
            // Sort newest-first by published time; the victims beyond
            // the cap are then the oldest (and hence shortest-lived in
            // the common case of regular republication).
            digests.sort_by_key(|d| {
                std::cmp::Reverse(
                    self.entries
                        .get(d)
                        .map(|e| e.desc.published())
                        .unwrap_or(SystemTime::UNIX_EPOCH),
                )
            });
            for d in digests.drain(max_per_identity..) {
                self.old.remove(&d);
                self.entries.remove(&d);
            }
        }
    }

    /// Re-check the structural invariants of this routerlist.
    ///
    /// Violations are logged and flagged with a debug assertion, but
    /// never panic a release build: a broken map is better than an
    /// aborted relay.  Returns true when everything holds.
    pub fn validate_structure(&self) -> bool {
        let mut ok = true;

        for (identity, digest) in &self.current {
            match self.entries.get(digest) {
                None => {
                    warn!("current descriptor for {} is missing from entries", identity);
                    ok = false;
                }
                Some(e) => {
                    if e.desc.rsa_identity() != identity {
                        warn!("identity map mismatch for {}", identity);
                        ok = false;
                    }
                    if self.old.contains(digest) {
                        warn!("descriptor {} is both current and old", hex_prefix(digest));
                        ok = false;
                    }
                }
            }
        }
        for digest in &self.old {
            if !self.entries.contains_key(digest) {
                warn!("old descriptor {} is missing from entries", hex_prefix(digest));
                ok = false;
            }
        }
        if self.entries.len() != self.current.len() + self.old.len() {
            warn!(
                "entry count {} disagrees with current {} + old {}",
                self.entries.len(),
                self.current.len(),
                self.old.len()
            );
            ok = false;
        }
        for (eid, digest) in &self.by_eid {
            let valid = self
                .entries
                .get(digest)
                .and_then(|e| e.desc.extra_info_digest())
                .map(|e| e == eid)
                .unwrap_or(false);
            if !valid {
                warn!("extra-info index entry {} is stale", hex_prefix(eid));
                ok = false;
            }
        }

        debug_assert!(ok, "routerlist structure validation failed");
        ok
    }
}

/// Helper: a short hex prefix of a digest, for logging.
fn hex_prefix(d: &[u8; 20]) -> String {
    let mut s = String::with_capacity(8);
    for b in &d[..4] {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Configuration for a [`NetDirectory`].
#[derive(Clone, Debug)]
pub struct DirConfig {
    /// Are we a directory cache?  Caches keep superseded descriptors
    /// for mirroring.
    pub we_are_cache: bool,
    /// Maximum age for superseded descriptors.
    pub old_router_desc_max_age: Duration,
}

impl Default for DirConfig {
    fn default() -> Self {
        DirConfig {
            we_are_cache: false,
            old_router_desc_max_age: OLD_ROUTER_DESC_MAX_AGE,
        }
    }
}

/// A complete view of the network: the routerlist, the authorities'
/// statuses, and the configured authorities.
///
/// There is one of these per host process in production, but tests
/// make many; nothing here is global.
#[derive(Debug, Default)]
pub struct NetDirectory {
    /// The known relays.
    routerlist: Routerlist,
    /// The network-status documents we hold.
    statuses: StatusSet,
    /// The configured directory authorities.
    authorities: AuthoritySet,
    /// Configuration.
    config: DirConfig,
}

impl NetDirectory {
    /// Construct a new NetDirectory with the given authorities and
    /// configuration.
    pub fn new(authorities: AuthoritySet, config: DirConfig) -> Self {
        NetDirectory {
            routerlist: Routerlist::new(),
            statuses: StatusSet::new(),
            authorities,
            config,
        }
    }

    /// Return the routerlist.
    pub fn routerlist(&self) -> &Routerlist {
        &self.routerlist
    }
    /// Return the routerlist, mutably.
    pub fn routerlist_mut(&mut self) -> &mut Routerlist {
        &mut self.routerlist
    }
    /// Return the held statuses.
    pub fn statuses(&self) -> &StatusSet {
        &self.statuses
    }
    /// Return the configured authorities.
    pub fn authorities(&self) -> &AuthoritySet {
        &self.authorities
    }
    /// Return the configured authorities, mutably.
    pub fn authorities_mut(&mut self) -> &mut AuthoritySet {
        &mut self.authorities
    }

    /// Add a network-status document received at `now`.
    ///
    /// Statuses that must come from an authority are rejected when
    /// their signer is not one; add with `mirror_only` to accept a
    /// document we merely cache for others.
    pub fn add_status(
        &mut self,
        doc: ornet_netdoc::doc::netstatus::NetStatusV2,
        now: SystemTime,
        mirror_only: bool,
    ) -> bool {
        if !mirror_only && !self.authorities.is_trusted(doc.fingerprint()) {
            warn!(
                "rejecting network-status from untrusted signer {}",
                doc.fingerprint()
            );
            return false;
        }
        self.statuses.add(doc, now);
        true
    }

    /// Offer a descriptor to the routerlist.  See [`Routerlist::add`].
    pub fn add_descriptor(&mut self, desc: RouterDesc, from_fetch: bool) -> AddOutcome {
        let statuses = &self.statuses;
        self.routerlist.add(
            desc,
            from_fetch,
            self.config.we_are_cache,
            &|d| statuses.references_descriptor(d),
        )
    }

    /// Return the per-identity cap on superseded descriptors:
    /// `max(5, number of v2 authorities)`.
    pub fn max_descriptors_per_router(&self) -> usize {
        std::cmp::max(5, self.authorities.n_with_flags(AuthorityFlags::V2))
    }

    /// Drop relays and descriptors that have outlived their use.
    pub fn prune(&mut self, now: SystemTime) {
        let statuses = &self.statuses;
        let max_age = self.config.old_router_desc_max_age;
        let cap = std::cmp::max(5, self.authorities.n_with_flags(AuthorityFlags::V2));
        self.routerlist
            .prune(now, max_age, cap, &|d| statuses.references_descriptor(d));
    }

    /// Compute the effective status of a relay at `now`.
    pub fn combined_status(
        &self,
        id: &RsaIdentity,
        now: SystemTime,
    ) -> Option<status::CombinedStatus> {
        self.statuses.combined_status(id, now)
    }

    /// Choose a relay at random, weighted by bandwidth, subject to
    /// `constraints`.  See [`pick`].
    pub fn pick_relay<'a, R: rand::Rng>(
        &'a self,
        rng: &mut R,
        now: SystemTime,
        constraints: &pick::PickConstraints,
    ) -> Option<&'a RelayEntry> {
        pick::pick_relay(self, rng, now, constraints)
    }
}

#[cfg(test)]
mod testnet;
