//! Flow-control windows for circuits and streams.
//!
//! Each edge of a circuit keeps a *send window* (how many DATA cells
//! it may still send before it must wait for a SENDME) and a *receive
//! window* (how many the other side may still send it).  Circuit-level
//! windows start at 1000 and are topped up 100 at a time; stream-level
//! windows start at 500 and are topped up 50 at a time.

use crate::{Error, Result};

/// Initial size of a circuit-level window.
pub(crate) const CIRCWINDOW_START: u16 = 1000;
/// Amount a circuit-level SENDME adds to the window.
pub(crate) const CIRCWINDOW_INCREMENT: u16 = 100;
/// Initial size of a stream-level window.
pub(crate) const STREAMWINDOW_START: u16 = 500;
/// Amount a stream-level SENDME adds to the window.
pub(crate) const STREAMWINDOW_INCREMENT: u16 = 50;

/// Tracks how many cells we may send before the next SENDME.
#[derive(Debug)]
pub(crate) struct SendWindow {
    /// Cells we may still send.
    window: u16,
    /// The window's initial (and maximum) size.
    start: u16,
    /// How much each SENDME adds.
    increment: u16,
}

impl SendWindow {
    /// Make a circuit-level send window.
    pub(crate) fn new_circ() -> Self {
        SendWindow {
            window: CIRCWINDOW_START,
            start: CIRCWINDOW_START,
            increment: CIRCWINDOW_INCREMENT,
        }
    }
    /// Make a stream-level send window.
    pub(crate) fn new_stream() -> Self {
        SendWindow {
            window: STREAMWINDOW_START,
            start: STREAMWINDOW_START,
            increment: STREAMWINDOW_INCREMENT,
        }
    }
    /// Return the current window value.
    pub(crate) fn window(&self) -> u16 {
        self.window
    }
    /// Take one send credit, or report that the sender must wait.
    pub(crate) fn take(&mut self) -> Result<()> {
        match self.window.checked_sub(1) {
            Some(n) => {
                self.window = n;
                Ok(())
            }
            None => Err(Error::WindowEmpty),
        }
    }
    /// Apply a received SENDME.
    ///
    /// A SENDME that would push the window above its starting value
    /// means the other side is acknowledging cells that were never
    /// sent: a protocol violation.
    pub(crate) fn put(&mut self) -> Result<()> {
        let new_window = self
            .window
            .checked_add(self.increment)
            .filter(|w| *w <= self.start)
            .ok_or_else(|| Error::CircProto("SENDME pushed window above its start".into()))?;
        self.window = new_window;
        Ok(())
    }
}

/// Tracks how many cells the other side may still send us, and when to
/// acknowledge them.
#[derive(Debug)]
pub(crate) struct RecvWindow {
    /// Cells the peer may still send.
    window: u16,
    /// The window's initial size.
    start: u16,
    /// How many received cells each SENDME acknowledges.
    increment: u16,
}

impl RecvWindow {
    /// Make a circuit-level receive window.
    pub(crate) fn new_circ() -> Self {
        RecvWindow {
            window: CIRCWINDOW_START,
            start: CIRCWINDOW_START,
            increment: CIRCWINDOW_INCREMENT,
        }
    }
    /// Make a stream-level receive window.
    pub(crate) fn new_stream() -> Self {
        RecvWindow {
            window: STREAMWINDOW_START,
            start: STREAMWINDOW_START,
            increment: STREAMWINDOW_INCREMENT,
        }
    }
    /// Return the current window value.
    pub(crate) fn window(&self) -> u16 {
        self.window
    }
    /// Note one received data cell.
    ///
    /// Returns `Ok(true)` when enough cells have arrived that a SENDME
    /// should go out; the caller acknowledges actually sending it with
    /// [`note_sendme_sent`](Self::note_sendme_sent).  An error means
    /// the sender overran the window: the circuit must be torn down.
    pub(crate) fn note_received(&mut self) -> Result<bool> {
        let new_window = self.window.checked_sub(1).ok_or_else(|| {
            Error::CircProto("received a data cell past the flow-control window".into())
        })?;
        self.window = new_window;
        Ok(self.start - self.window >= self.increment)
    }

    /// Record that a SENDME was sent, re-extending the window.
    pub(crate) fn note_sendme_sent(&mut self) {
        self.window = self.window.saturating_add(self.increment).min(self.start);
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn send_window_exhausts() {
        let mut w = SendWindow::new_stream();
        for _ in 0..STREAMWINDOW_START {
            w.take().unwrap();
        }
        assert!(matches!(w.take(), Err(Error::WindowEmpty)));
        w.put().unwrap();
        assert_eq!(w.window(), STREAMWINDOW_INCREMENT);
        w.take().unwrap();
    }

    #[test]
    fn sendme_above_start_is_violation() {
        let mut w = SendWindow::new_circ();
        assert!(w.put().is_err());
        for _ in 0..CIRCWINDOW_INCREMENT {
            w.take().unwrap();
        }
        w.put().unwrap();
        assert_eq!(w.window(), CIRCWINDOW_START);
        assert!(w.put().is_err());
    }

    #[test]
    fn recv_window_asks_for_sendme() {
        let mut w = RecvWindow::new_circ();
        // The hundredth received cell triggers a SENDME.
        for _ in 0..CIRCWINDOW_INCREMENT - 1 {
            assert!(!w.note_received().unwrap());
        }
        assert!(w.note_received().unwrap());
        w.note_sendme_sent();
        assert_eq!(w.window(), CIRCWINDOW_START);
    }

    #[test]
    fn recv_overrun_detected() {
        // If we never send SENDMEs, an overrunning sender hits the
        // bottom of the window and that is a protocol violation.
        let mut w = RecvWindow::new_stream();
        for _ in 0..STREAMWINDOW_START {
            w.note_received().unwrap();
        }
        assert!(w.note_received().is_err());
    }
}
