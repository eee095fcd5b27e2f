//! Types and code to map wire-level circuit IDs to circuits, within
//! one channel.

use crate::circuit::halfcirc::HalfCirc;
use crate::{CircuitId, Error, Result};
use ornet_cell::chancell::CircId;
use rand::Rng;
use std::collections::{hash_map::Entry, HashMap};

/// Which group of circuit IDs are we allowed to allocate on this
/// channel?
///
/// After the handshake, the side whose identity digest is greater owns
/// the IDs with the high bit set; the other side owns the rest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CircIdRange {
    /// Only use circuit IDs with the high bit cleared.
    Low,
    /// Only use circuit IDs with the high bit set.
    High,
}

impl CircIdRange {
    /// Return a random unused-looking circuit ID in this range.
    fn sample<R: Rng>(&self, rng: &mut R) -> CircId {
        let v = match self {
            // 0 is not a valid circuit ID.
            CircIdRange::Low => rng.random_range(1..0x8000_u16),
            CircIdRange::High => rng.random_range(0x8000_u16..=u16::MAX),
        };
        CircId::new(v).expect("zero from a nonzero range")
    }
    /// Return true if `id` lies in this range.
    pub(crate) fn contains(&self, id: CircId) -> bool {
        match self {
            CircIdRange::Low => !id.is_high(),
            CircIdRange::High => id.is_high(),
        }
    }
}

/// An entry in the circuit map.
#[derive(Debug)]
pub(crate) enum CircEnt {
    /// We allocated this ID and sent a CREATE (or forwarded one); no
    /// CREATED has come back yet.
    Opening(CircuitId),
    /// A circuit that can be given relay cells.
    Open(CircuitId),
    /// We have sent a DESTROY, but the other side might still have
    /// cells in flight.
    DestroySent(HalfCirc),
}

/// A map from wire-level circuit ID to circuit.  Each channel has one.
#[derive(Debug)]
pub(crate) struct CircMap {
    /// Map from circuit IDs to entries.
    m: HashMap<CircId, CircEnt>,
    /// Rule for allocating new circuit IDs.
    range: CircIdRange,
}

/// How many times to probe for a random circuit ID before deciding the
/// range is full.
const N_ATTEMPTS: usize = 16;

impl CircMap {
    /// Make a new empty CircMap.
    pub(crate) fn new(idrange: CircIdRange) -> Self {
        CircMap {
            m: HashMap::new(),
            range: idrange,
        }
    }

    /// Return true if this channel's side owns IDs like `id`.
    pub(crate) fn owns(&self, id: CircId) -> bool {
        self.range.contains(id)
    }

    /// Allocate an unused circuit ID in our range for a circuit we are
    /// opening, and record it as Opening.
    pub(crate) fn add_ent<R: Rng>(&mut self, rng: &mut R, circuit: CircuitId) -> Result<CircId> {
        for _ in 0..N_ATTEMPTS {
            let id = self.range.sample(rng);
            if let Entry::Vacant(v) = self.m.entry(id) {
                v.insert(CircEnt::Opening(circuit));
                return Ok(id);
            }
        }
        Err(Error::IdRangeFull)
    }

    /// Record a peer-chosen circuit ID as an open circuit.
    ///
    /// Fails if the ID is already in use; the caller decides whether
    /// that is a protocol violation or a cell to ignore.
    pub(crate) fn add_open_remote(&mut self, id: CircId, circuit: CircuitId) -> Result<()> {
        match self.m.entry(id) {
            Entry::Vacant(v) => {
                v.insert(CircEnt::Open(circuit));
                Ok(())
            }
            Entry::Occupied(_) => Err(Error::ChanProto("circuit ID in use".into())),
        }
    }

    /// Return the entry for `id`, if any.
    pub(crate) fn get(&self, id: CircId) -> Option<&CircEnt> {
        self.m.get(&id)
    }

    /// Return the entry for `id`, mutably, if any.
    pub(crate) fn get_mut(&mut self, id: CircId) -> Option<&mut CircEnt> {
        self.m.get_mut(&id)
    }

    /// See whether `id` is an opening circuit.  If so, mark it open and
    /// return its circuit handle.
    pub(crate) fn advance_from_opening(&mut self, id: CircId) -> Result<CircuitId> {
        match self.m.get_mut(&id) {
            Some(ent @ CircEnt::Opening(_)) => {
                let circuit = match ent {
                    CircEnt::Opening(c) => *c,
                    _ => unreachable!(),
                };
                *ent = CircEnt::Open(circuit);
                Ok(circuit)
            }
            _ => Err(Error::ChanProto(
                "unexpected CREATED cell not on opening circuit".into(),
            )),
        }
    }

    /// Called when we have sent a DESTROY on a circuit: keep absorbing
    /// a bounded number of in-flight cells for its ID.
    pub(crate) fn destroy_sent(&mut self, id: CircId, hs: HalfCirc) {
        self.m.insert(id, CircEnt::DestroySent(hs));
    }

    /// Remove and return the entry for `id`, if any.
    pub(crate) fn remove(&mut self, id: CircId) -> Option<CircEnt> {
        self.m.remove(&id)
    }

    /// Return every (id, circuit) pair in this map, for teardown.
    pub(crate) fn open_circuits(&self) -> Vec<(CircId, CircuitId)> {
        self.m
            .iter()
            .filter_map(|(id, ent)| match ent {
                CircEnt::Opening(c) | CircEnt::Open(c) => Some((*id, *c)),
                CircEnt::DestroySent(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::SeedableRng as _;

    #[test]
    fn ranges() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let low = CircIdRange::Low.sample(&mut rng);
            let high = CircIdRange::High.sample(&mut rng);
            assert!(!low.is_high());
            assert!(high.is_high());
            assert!(CircIdRange::Low.contains(low));
            assert!(!CircIdRange::Low.contains(high));
        }
    }

    #[test]
    fn map_basics() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        let mut map = CircMap::new(CircIdRange::High);

        let id = map.add_ent(&mut rng, CircuitId(7)).unwrap();
        assert!(id.is_high());
        assert!(matches!(map.get(id), Some(CircEnt::Opening(CircuitId(7)))));

        // Advancing marks it open; twice is an error.
        assert_eq!(map.advance_from_opening(id).unwrap(), CircuitId(7));
        assert!(matches!(map.get(id), Some(CircEnt::Open(CircuitId(7)))));
        assert!(map.advance_from_opening(id).is_err());

        // A remote ID may be added while vacant, once.
        let remote = CircId::new(5).unwrap();
        map.add_open_remote(remote, CircuitId(8)).unwrap();
        assert!(map.add_open_remote(remote, CircuitId(9)).is_err());

        assert_eq!(map.open_circuits().len(), 2);

        // Destroy-sent entries absorb without listing as open.
        map.destroy_sent(remote, HalfCirc::new(10));
        assert_eq!(map.open_circuits().len(), 1);
        assert!(map.remove(id).is_some());
        assert!(map.remove(id).is_none());
    }
}
