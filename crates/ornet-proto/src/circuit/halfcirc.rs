//! Type and code for tracking a circuit that we have torn down, but
//! whose other side may not have noticed yet.

use crate::{Error, Result};

/// Number of cells we are willing to accept on a circuit after sending
/// our DESTROY, before deciding the peer is misbehaving.
const HALF_CIRC_CELL_BUDGET: u16 = 1000;

/// A "half-closed" circuit: we sent a DESTROY, but cells from the
/// other side may legitimately still be in flight.
#[derive(Debug)]
pub(crate) struct HalfCirc {
    /// How many more cells we will silently absorb.
    allow_cells: u16,
}

impl HalfCirc {
    /// Create a new HalfCirc that will tolerate the default number of
    /// in-flight cells.
    pub(crate) fn new_default() -> Self {
        HalfCirc {
            allow_cells: HALF_CIRC_CELL_BUDGET,
        }
    }

    /// Create a new HalfCirc with an explicit budget.
    #[cfg(test)]
    pub(crate) fn new(allow_cells: u16) -> Self {
        HalfCirc { allow_cells }
    }

    /// Note a cell received on this half-closed circuit.
    ///
    /// An error means the peer has sent more cells than could have
    /// been in flight: a protocol violation.
    pub(crate) fn receive_cell(&mut self) -> Result<()> {
        match self.allow_cells.checked_sub(1) {
            Some(n) => {
                self.allow_cells = n;
                Ok(())
            }
            None => Err(Error::ChanProto(
                "too many cells received on half-closed circuit".into(),
            )),
        }
    }
}
