//! Implementation-version strings, and the recommended-version check.
//!
//! Directory authorities publish a comma-separated list of recommended
//! software versions; a relay or client compares its own version string
//! against that list to decide whether to nag its operator.

use crate::{Error, NetdocErrorKind as EK, Pos, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The status field of a version, from the ancient three-number format
/// (`0.0.9pre1`, `0.0.9rc2`, `0.0.9`).  Versions in the modern format
/// always count as Release here; their `-alpha`-style tags are compared
/// separately.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[allow(clippy::exhaustive_enums)]
pub enum VerStatus {
    /// An "unofficial" pre-release.
    Pre,
    /// A release candidate.
    Rc,
    /// A stable release.
    Release,
}

/// A parsed implementation version.
///
/// Format: `MAJOR.MINOR.MICRO[.PATCHLEVEL][-STATUS_TAG][ (EXTRA)]`,
/// plus the obsolete `MAJOR.MINOR.MICRO{pre,rc}N` form.  Ordering is
/// lexicographic over (major, minor, micro, status, patchlevel,
/// status_tag); anything after a space is ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
    /// Micro version number.
    pub micro: u32,
    /// Pre-release status, for the obsolete format.
    pub status: VerStatus,
    /// Patch level.
    pub patchlevel: u32,
    /// The `-alpha`/`-rc`/`-alpha-dev` style tag, or "" for none.
    pub status_tag: String,
}

impl Version {
    /// Return true if `other` is in the same release series as this
    /// version (same major, minor, and micro).
    pub fn same_series(&self, other: &Version) -> bool {
        (self.major, self.minor, self.micro) == (other.major, other.minor, other.micro)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, self.status, self.patchlevel)
            .cmp(&(
                other.major,
                other.minor,
                other.micro,
                other.status,
                other.patchlevel,
            ))
            .then_with(|| self.status_tag.cmp(&other.status_tag))
    }
}
impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.micro, self.patchlevel
        )?;
        if !self.status_tag.is_empty() {
            write!(f, "-{}", self.status_tag)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        /// Parse one numeric component.
        fn num(s: &str) -> Result<u32> {
            s.parse::<u32>()
                .map_err(|_| EK::BadVersion.at_pos(Pos::at(s)).with_msg("bad number"))
        }

        // Peel off an optional "Tor " product prefix, and anything
        // after the first space (the " (git-xyz)" suffix).
        let s = s.trim();
        let s = s.strip_prefix("Tor ").unwrap_or(s);
        let s = match s.split_once(' ') {
            Some((head, _)) => head,
            None => s,
        };

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(EK::BadVersion
                .at_pos(Pos::at(s))
                .with_msg("wrong number of components"));
        }
        let major = num(parts[0])?;
        let minor = num(parts[1])?;

        // The third component may carry an old-style status suffix.
        let (micro_s, status, mut old_patch) = if let Some(i) = parts[2].find("pre") {
            (&parts[2][..i], VerStatus::Pre, Some(&parts[2][i + 3..]))
        } else if let Some(i) = parts[2].find("rc") {
            (&parts[2][..i], VerStatus::Rc, Some(&parts[2][i + 2..]))
        } else {
            (parts[2], VerStatus::Release, None)
        };
        if parts.len() == 4 && old_patch.is_some() {
            return Err(EK::BadVersion
                .at_pos(Pos::at(s))
                .with_msg("mixed old and new forms"));
        }
        // In the modern format the fourth component carries the
        // patchlevel and the dash tag.
        let (patch_s, status_tag) = match (parts.len(), old_patch.take()) {
            (3, Some(p)) => (p, String::new()),
            (3, None) => ("0", String::new()),
            (4, _) => match parts[3].split_once('-') {
                Some((p, tag)) => (p, tag.to_string()),
                None => (parts[3], String::new()),
            },
            (_, _) => unreachable!(),
        };
        Ok(Version {
            major,
            minor,
            micro: num(micro_s)?,
            status,
            patchlevel: num(patch_s)?,
            status_tag,
        })
    }
}

/// How a version compares to a recommended-versions list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum VersionStatus {
    /// This version is in the recommended list.
    Recommended,
    /// This version is older than every recommended version.
    Old,
    /// This version is newer than every recommended version.
    New,
    /// This version is newer than every recommended version in its own
    /// release series, but not the newest overall.
    NewInSeries,
    /// This version is not recommended, but is between recommended
    /// versions.
    Unrecommended,
    /// The recommended list was empty; nothing can be said.
    Empty,
}

/// Classify `mine` against a comma-separated recommended-versions list.
///
/// Unparseable entries in the list are skipped.
pub fn version_status(mine: &Version, recommended: &str) -> VersionStatus {
    let list: Vec<Version> = recommended
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .filter_map(|v| v.parse().ok())
        .collect();
    if list.is_empty() {
        return VersionStatus::Empty;
    }
    if list.contains(mine) {
        return VersionStatus::Recommended;
    }
    if list.iter().all(|v| v < mine) {
        return VersionStatus::New;
    }
    if list.iter().all(|v| v > mine) {
        return VersionStatus::Old;
    }
    let newer_in_series = list
        .iter()
        .filter(|v| v.same_series(mine))
        .any(|v| v > mine);
    let any_in_series = list.iter().any(|v| v.same_series(mine));
    if any_in_series && !newer_in_series {
        return VersionStatus::NewInSeries;
    }
    VersionStatus::Unrecommended
}
