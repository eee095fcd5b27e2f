//! Tracking of network-status documents, and the per-relay status
//! computed from them.
//!
//! Each authority publishes its own view of the network; the effective
//! status of a relay is a majority vote over the *recent* views.  A
//! view is recent if it was published within the last hour, except that
//! the three newest views always count, so a relay with a flaky clock
//! can't shrink the electorate to nothing.

use ornet_llcrypto::pk::rsa::RsaIdentity;
use ornet_netdoc::doc::netstatus::{NetStatusV2, RelayFlags, RouterStatus};
use ornet_netdoc::doc::routerdesc::RdDigest;
use std::collections::HashSet;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// How old may a status be and still count as "recent"?
const STATUS_RECENT_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Number of statuses that are considered regardless of age.
const MIN_STATUSES_CONSIDERED: usize = 3;

/// One authority's network-status document, as we hold it.
#[derive(Debug)]
struct TrackedStatus {
    /// The identity of the authority that signed it.
    authority: RsaIdentity,
    /// When we received it.
    #[allow(dead_code)] // download scheduling reads this eventually.
    received: SystemTime,
    /// The parsed document itself.
    doc: NetStatusV2,
}

/// The set of network-status documents we currently hold, one per
/// authority.
#[derive(Debug, Default)]
pub struct StatusSet {
    /// The held statuses.
    statuses: Vec<TrackedStatus>,
    /// Identities we have already warned about because the naming
    /// authorities disagree on their nickname.
    naming_conflicts_warned: HashSet<RsaIdentity>,
}

/// The effective status of a single relay, combined over the recent
/// statuses.
#[derive(Clone, Debug, Default)]
pub struct CombinedStatus {
    /// Flags held by a majority of the recent statuses listing the
    /// relay.
    flags: RelayFlags,
    /// The nickname all naming authorities agree on, if any do bind it.
    name: Option<String>,
    /// How many recent statuses listed the relay at all.
    n_listing: usize,
}

impl CombinedStatus {
    /// Return how many recent statuses listed this relay.
    pub fn n_listing(&self) -> usize {
        self.n_listing
    }
    /// Return true if a majority believes the relay is running.
    pub fn is_running(&self) -> bool {
        self.flags.contains(RelayFlags::RUNNING)
    }
    /// Return true if a majority believes the relay is valid.
    pub fn is_valid(&self) -> bool {
        self.flags.contains(RelayFlags::VALID)
    }
    /// Return true if a majority believes the relay is fast.
    pub fn is_fast(&self) -> bool {
        self.flags.contains(RelayFlags::FAST)
    }
    /// Return true if a majority believes the relay is stable.
    pub fn is_stable(&self) -> bool {
        self.flags.contains(RelayFlags::STABLE)
    }
    /// Return true if a majority flags the relay as an exit.
    pub fn is_exit(&self) -> bool {
        self.flags.contains(RelayFlags::EXIT)
    }
    /// Return true if a majority flags the relay as a guard.
    pub fn is_guard(&self) -> bool {
        self.flags.contains(RelayFlags::GUARD)
    }
    /// Return true if a majority flags the relay as an hsdir.
    pub fn is_hsdir(&self) -> bool {
        self.flags.contains(RelayFlags::HSDIR)
    }
    /// Return true if a majority flags the relay as a directory server.
    pub fn is_v2_dir(&self) -> bool {
        self.flags.contains(RelayFlags::V2_DIR)
    }
    /// Return true if a majority flags the relay as a bad exit.
    pub fn is_bad_exit(&self) -> bool {
        self.flags.contains(RelayFlags::BAD_EXIT)
    }
    /// Return true if a majority flags the relay as a bad directory.
    pub fn is_bad_directory(&self) -> bool {
        self.flags.contains(RelayFlags::BAD_DIRECTORY)
    }
    /// Return true if the naming authorities bind this relay's name.
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
    /// Return the bound nickname, if the relay is Named.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl StatusSet {
    /// Construct a new empty StatusSet.
    pub fn new() -> Self {
        StatusSet::default()
    }

    /// Add a status document signed by `authority`, replacing any
    /// older document from the same authority.
    pub fn add(&mut self, doc: NetStatusV2, received: SystemTime) {
        let authority = *doc.fingerprint();
        self.statuses.retain(|t| t.authority != authority);
        self.check_naming_conflicts(&doc);
        self.statuses.push(TrackedStatus {
            authority,
            received,
            doc,
        });
    }

    /// Return the number of statuses held.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Return true if no statuses are held.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Return an iterator over the held documents.
    pub fn statuses(&self) -> impl Iterator<Item = &NetStatusV2> {
        self.statuses.iter().map(|t| &t.doc)
    }

    /// Return true if any held status references the descriptor with
    /// the given digest.
    pub fn references_descriptor(&self, digest: &RdDigest) -> bool {
        self.statuses
            .iter()
            .any(|t| t.doc.relays().iter().any(|rs| rs.doc_digest() == digest))
    }

    /// Return the best weight estimate any status gives for a relay,
    /// in kilobytes per second.
    pub fn weight_for(&self, id: &RsaIdentity) -> Option<u32> {
        self.statuses
            .iter()
            .flat_map(|t| t.doc.relays().iter())
            .filter(|rs| rs.identity() == id)
            .filter_map(|rs| rs.weight().and_then(|w| w.as_kb()))
            .max()
    }

    /// Return every identity listed in any recent status.
    pub fn listed_identities(&self, now: SystemTime) -> HashSet<RsaIdentity> {
        self.recent(now)
            .iter()
            .flat_map(|t| t.doc.relays().iter())
            .map(|rs| *rs.identity())
            .collect()
    }

    /// Helper: the statuses that take part in the vote at time `now`.
    fn recent(&self, now: SystemTime) -> Vec<&TrackedStatus> {
        let mut by_age: Vec<&TrackedStatus> = self.statuses.iter().collect();
        by_age.sort_by_key(|t| std::cmp::Reverse(t.doc.published()));
        by_age
            .into_iter()
            .enumerate()
            .filter(|(i, t)| {
                *i < MIN_STATUSES_CONSIDERED
                    || now
                        .duration_since(t.doc.published())
                        .map(|age| age <= STATUS_RECENT_INTERVAL)
                        .unwrap_or(true)
            })
            .map(|(_, t)| t)
            .collect()
    }

    /// Compute the effective status of one relay at time `now`.
    ///
    /// Returns None if no recent status lists the relay.
    pub fn combined_status(&self, id: &RsaIdentity, now: SystemTime) -> Option<CombinedStatus> {
        let recent = self.recent(now);
        let listings: Vec<(&TrackedStatus, &RouterStatus)> = recent
            .iter()
            .filter_map(|t| {
                t.doc
                    .relays()
                    .iter()
                    .find(|rs| rs.identity() == id)
                    .map(|rs| (*t, rs))
            })
            .collect();
        if listings.is_empty() {
            return None;
        }
        let n_listing = listings.len();

        // Majority vote, flag by flag.
        let mut flags = RelayFlags::empty();
        for flag in RelayFlags::all().iter() {
            let n = listings
                .iter()
                .filter(|(_, rs)| rs.flags().contains(flag))
                .count();
            if n * 2 > n_listing {
                flags |= flag;
            }
        }

        // Naming is per-authority: every naming authority that lists
        // the relay must agree on its nickname.
        let names: Vec<&str> = listings
            .iter()
            .filter(|(t, _)| t.doc.binds_names())
            .map(|(_, rs)| rs.nickname())
            .collect();
        let name = match names.split_first() {
            Some((first, rest)) if rest.iter().all(|n| n == first) => Some(first.to_string()),
            _ => None,
        };

        Some(CombinedStatus {
            flags,
            name,
            n_listing,
        })
    }

    /// On adding a new naming authority's document, warn (once per
    /// relay) if the naming authorities now disagree about a nickname.
    fn check_naming_conflicts(&mut self, new_doc: &NetStatusV2) {
        if !new_doc.binds_names() {
            return;
        }
        for rs in new_doc.relays() {
            if self.naming_conflicts_warned.contains(rs.identity()) {
                continue;
            }
            let conflict = self
                .statuses
                .iter()
                .filter(|t| t.doc.binds_names())
                .flat_map(|t| t.doc.relays().iter())
                .any(|other| other.identity() == rs.identity() && other.nickname() != rs.nickname());
            if conflict {
                warn!(
                    "naming authorities disagree about the nickname for {}; \
                     treating it as unnamed",
                    rs.identity()
                );
                self.naming_conflicts_warned.insert(*rs.identity());
            }
        }
    }
}
