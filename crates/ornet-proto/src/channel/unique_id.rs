//! Process-unique identifiers for channels, used only for logging.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counter for allocating unique channel log identifiers.
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A process-unique identifier for a channel, for use in log messages.
///
/// These are never reused within a process, unlike
/// [`ChannelId`](crate::ChannelId)s (which the host may recycle) and
/// wire-level circuit IDs (which are only unique per channel).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniqId(usize);

impl UniqId {
    /// Construct a new UniqId.
    pub(crate) fn new() -> Self {
        UniqId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for UniqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chan {}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unique() {
        let a = UniqId::new();
        let b = UniqId::new();
        assert_ne!(a, b);
        assert!(format!("{}", a).starts_with("Chan "));
    }
}
