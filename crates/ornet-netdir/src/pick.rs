//! Weighted random relay selection.
//!
//! Candidates are weighted by their advertised bandwidth (capped, since
//! self-reported values are only believable up to a point), and relays
//! with the Exit flag are down-weighted for non-exit positions when
//! exit bandwidth is scarce.

use crate::status::CombinedStatus;
use crate::{NetDirectory, RelayEntry};
use ornet_llcrypto::pk::rsa::RsaIdentity;
use rand::Rng;
use std::time::SystemTime;

/// No declared bandwidth above this value (bytes/sec) is believed.
pub const MAX_BELIEVABLE_BANDWIDTH: u32 = 10_000_000;

/// Constraints on which relay may be picked, and how to weight the
/// candidates.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct PickConstraints {
    /// Require the Stable flag.
    pub need_uptime: bool,
    /// Require the Fast flag.
    pub need_capacity: bool,
    /// Require the Guard flag.
    pub need_guard: bool,
    /// Permit relays without the Valid flag.
    pub allow_invalid: bool,
    /// Require the Running flag.
    pub must_be_running: bool,
    /// Weight for an exit position (no exit penalty).
    pub weight_for_exit: bool,
    /// If any of these are eligible, pick among them only.
    pub preferred: Vec<RsaIdentity>,
    /// Never pick any of these.
    pub excluded: Vec<RsaIdentity>,
    /// Never pick a relay belonging to the same declared family as any
    /// of these.
    pub excluded_families: Vec<RsaIdentity>,
}

/// Return true if `entry` passes the boolean filters in `constraints`.
fn eligible(
    entry: &RelayEntry,
    status: Option<&CombinedStatus>,
    constraints: &PickConstraints,
) -> bool {
    let id = entry.desc().rsa_identity();
    if constraints.excluded.contains(id) {
        return false;
    }
    if constraints
        .excluded_families
        .iter()
        .any(|other| entry.desc().family().contains(other))
    {
        return false;
    }
    if entry.desc().is_hibernating() {
        return false;
    }
    let status = match status {
        Some(s) => s,
        None => {
            // A relay no authority lists can only be used when the
            // caller is being deliberately permissive.
            return constraints.allow_invalid
                && !constraints.must_be_running
                && !constraints.need_guard
                && !constraints.need_uptime
                && !constraints.need_capacity;
        }
    };
    if constraints.must_be_running && !status.is_running() {
        return false;
    }
    if !constraints.allow_invalid && !status.is_valid() {
        return false;
    }
    if constraints.need_uptime && !status.is_stable() {
        return false;
    }
    if constraints.need_capacity && !status.is_fast() {
        return false;
    }
    if constraints.need_guard && !status.is_guard() {
        return false;
    }
    if status.is_bad_exit() && constraints.weight_for_exit {
        return false;
    }
    true
}

/// Return the believable bandwidth for an entry, in bytes per second.
fn bandwidth_for(entry: &RelayEntry) -> u64 {
    let (rate, _burst, observed) = entry.desc().bandwidth();
    let bw = std::cmp::min(rate, observed);
    u64::from(std::cmp::min(bw, MAX_BELIEVABLE_BANDWIDTH))
}

/// Choose a relay at random from `dir`, weighted by bandwidth, subject
/// to `constraints`.
pub fn pick_relay<'a, R: Rng>(
    dir: &'a NetDirectory,
    rng: &mut R,
    now: SystemTime,
    constraints: &PickConstraints,
) -> Option<&'a RelayEntry> {
    // Collect the eligible candidates with their statuses.
    let mut candidates: Vec<(&RelayEntry, bool)> = dir
        .routerlist()
        .relays()
        .filter_map(|entry| {
            let status = dir.combined_status(entry.desc().rsa_identity(), now);
            if eligible(entry, status.as_ref(), constraints) {
                let is_exit = status.map(|s| s.is_exit()).unwrap_or(false);
                Some((entry, is_exit))
            } else {
                None
            }
        })
        .collect();

    // Preferred nodes win outright when any are eligible.
    if !constraints.preferred.is_empty() {
        let preferred: Vec<(&RelayEntry, bool)> = candidates
            .iter()
            .filter(|(e, _)| constraints.preferred.contains(e.desc().rsa_identity()))
            .copied()
            .collect();
        if !preferred.is_empty() {
            candidates = preferred;
        }
    }
    if candidates.is_empty() {
        return None;
    }

    // Compute the exit-scarcity factor: when exit bandwidth is a small
    // share of the total, exits are kept out of non-exit positions;
    // otherwise they are down-weighted proportionally.
    let total_bw: u64 = candidates.iter().map(|(e, _)| bandwidth_for(e)).sum();
    let exit_bw: u64 = candidates
        .iter()
        .filter(|(_, is_exit)| *is_exit)
        .map(|(e, _)| bandwidth_for(e))
        .sum();
    let exit_weight_permille: u64 = if constraints.weight_for_exit {
        1000
    } else if exit_bw * 3 < total_bw {
        0
    } else if exit_bw == 0 {
        1000
    } else {
        // 1 - total/(3*exit), in permille.
        1000_u64.saturating_sub(total_bw * 1000 / (3 * exit_bw))
    };

    let weight_of = |entry: &RelayEntry, is_exit: bool| -> u64 {
        let bw = std::cmp::max(bandwidth_for(entry), 1);
        if is_exit {
            bw * exit_weight_permille / 1000
        } else {
            bw
        }
    };

    let total_weight: u64 = candidates
        .iter()
        .map(|(e, is_exit)| weight_of(e, *is_exit))
        .sum();
    if total_weight == 0 {
        // Everything was zero-weighted (e.g. all exits, all excluded by
        // scarcity); fall back to a uniform choice.
        let i = rng.random_range(0..candidates.len());
        return Some(candidates[i].0);
    }

    let mut target = rng.random_range(0..total_weight);
    for &(entry, is_exit) in &candidates {
        let w = weight_of(entry, is_exit);
        if target < w {
            return Some(entry);
        }
        target -= w;
    }
    // Rounding can't actually leave us here, but don't panic if it does.
    candidates.last().map(|(e, _)| *e)
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::testnet::{test_net, TestNet};
    use rand::SeedableRng as _;

    fn now() -> SystemTime {
        humantime::parse_rfc3339("2026-07-01T12:30:00Z").unwrap()
    }

    #[test]
    fn pick_respects_flags() {
        let TestNet { mut dir, relays } = test_net();
        for r in relays {
            dir.add_descriptor(r.desc_published("2026-07-01 10:00:00"), false);
        }
        // Status: relay 0 fast+running+valid+stable, relay 1 running+valid,
        // relay 2 not running.
        dir.add_status(
            crate::testnet::status_doc(&[
                (&relays[0], "Fast Guard Running Stable Valid"),
                (&relays[1], "Running Valid"),
                (&relays[2], "Valid"),
            ]),
            now(),
            false,
        );

        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let c = PickConstraints {
            must_be_running: true,
            need_guard: true,
            ..PickConstraints::default()
        };
        for _ in 0..8 {
            let picked = dir.pick_relay(&mut rng, now(), &c).unwrap();
            assert_eq!(picked.desc().rsa_identity(), &relays[0].identity());
        }

        // Nobody matches an impossible ask.
        let c = PickConstraints {
            must_be_running: true,
            need_guard: true,
            excluded: vec![relays[0].identity()],
            ..PickConstraints::default()
        };
        assert!(dir.pick_relay(&mut rng, now(), &c).is_none());
    }

    #[test]
    fn preferred_beats_weights() {
        let TestNet { mut dir, relays } = test_net();
        for r in relays {
            dir.add_descriptor(r.desc_published("2026-07-01 10:00:00"), false);
        }
        dir.add_status(
            crate::testnet::status_doc(&[
                (&relays[0], "Fast Running Valid"),
                (&relays[1], "Fast Running Valid"),
                (&relays[2], "Fast Running Valid"),
            ]),
            now(),
            false,
        );
        let mut rng = rand::rngs::StdRng::seed_from_u64(6);
        let c = PickConstraints {
            must_be_running: true,
            preferred: vec![relays[2].identity()],
            ..PickConstraints::default()
        };
        for _ in 0..8 {
            let picked = dir.pick_relay(&mut rng, now(), &c).unwrap();
            assert_eq!(picked.desc().rsa_identity(), &relays[2].identity());
        }
    }

    #[test]
    fn weighting_prefers_bigger_relays() {
        let TestNet { mut dir, relays } = test_net();
        // Give relay 1 most of the network's bandwidth.
        dir.add_descriptor(relays[0].desc_with_bandwidth("2026-07-01 10:00:00", 1000), false);
        dir.add_descriptor(relays[1].desc_with_bandwidth("2026-07-01 10:00:00", 900_000), false);
        dir.add_descriptor(relays[2].desc_with_bandwidth("2026-07-01 10:00:00", 1000), false);
        dir.add_status(
            crate::testnet::status_doc(&[
                (&relays[0], "Running Valid"),
                (&relays[1], "Running Valid"),
                (&relays[2], "Running Valid"),
            ]),
            now(),
            false,
        );
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let c = PickConstraints {
            must_be_running: true,
            ..PickConstraints::default()
        };
        let mut hits = 0;
        for _ in 0..64 {
            let picked = dir.pick_relay(&mut rng, now(), &c).unwrap();
            if picked.desc().rsa_identity() == &relays[1].identity() {
                hits += 1;
            }
        }
        // ~99.8% of the weight is on relay 1.
        assert!(hits > 48, "relay 1 picked only {}/64 times", hits);
    }
}
