//! Measure how skewed our clock is from a peer's, based on a
//! handshake.

use std::time::{Duration, SystemTime};

/// How much clock skew do we tolerate from a relay before complaining?
pub(crate) const SKEW_COMPLAINT_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// An estimate of how fast or slow our clock is running relative to a
/// peer's.
///
/// The estimate comes from the timestamp in a NETINFO cell, so it can
/// never be more accurate than the round-trip time to the peer, and
/// the peer may simply be lying.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[allow(clippy::exhaustive_enums)]
pub enum ClockSkew {
    /// Our clock is running fast by this amount.
    Fast(Duration),
    /// No discernible skew.
    #[default]
    None,
    /// Our clock is running slow by this amount.
    Slow(Duration),
}

/// Minimum skew we bother to represent: anything less is noise.
const MIN: Duration = Duration::from_secs(2);

impl ClockSkew {
    /// Compute our clock skew, given the time we sent our handshake,
    /// the timestamp the peer reported, and the delay between sending
    /// and receiving.
    pub(crate) fn from_handshake_timestamps(
        ours_at_send: SystemTime,
        theirs: SystemTime,
        delay: Duration,
    ) -> Self {
        // The peer formed its timestamp some time between our send and
        // our receipt; assume the midpoint.
        let ours = ours_at_send + delay / 2;
        match ours.duration_since(theirs) {
            Ok(skew) if skew >= MIN => ClockSkew::Fast(skew),
            Ok(_) => ClockSkew::None,
            Err(e) => {
                let skew = e.duration();
                if skew >= MIN {
                    ClockSkew::Slow(skew)
                } else {
                    ClockSkew::None
                }
            }
        }
    }

    /// Return the magnitude of this skew.
    pub(crate) fn magnitude(&self) -> Duration {
        match self {
            ClockSkew::Fast(d) | ClockSkew::Slow(d) => *d,
            ClockSkew::None => Duration::ZERO,
        }
    }

    /// Return true if this skew is large enough to be worth a
    /// diagnostic.
    pub(crate) fn is_severe(&self) -> bool {
        self.magnitude() > SKEW_COMPLAINT_THRESHOLD
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skew_directions() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let rtt = Duration::from_secs(2);

        let none = ClockSkew::from_handshake_timestamps(base, base + Duration::from_secs(1), rtt);
        assert_eq!(none, ClockSkew::None);

        let slow =
            ClockSkew::from_handshake_timestamps(base, base + Duration::from_secs(100), rtt);
        assert_eq!(slow, ClockSkew::Slow(Duration::from_secs(99)));
        assert!(!slow.is_severe());

        let fast = ClockSkew::from_handshake_timestamps(
            base + Duration::from_secs(7000),
            base,
            Duration::ZERO,
        );
        assert_eq!(fast, ClockSkew::Fast(Duration::from_secs(7000)));
        assert!(fast.is_severe());
    }
}
