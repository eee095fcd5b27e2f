//! Exit policies: the address-and-port patterns that a relay is
//! willing (or unwilling) to connect to.
//!
//! A policy is an ordered list of `accept`/`reject` rules; the first
//! rule that matches an address and port decides it.  An address with
//! no matching rule is rejected.

use crate::{Error, NetdocErrorKind as EK, Pos, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// The kind of a single policy rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum RuleKind {
    /// The rule says to allow the matched traffic.
    Accept,
    /// The rule says to block the matched traffic.
    Reject,
}

/// An inclusive range of ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortRange {
    /// The first port in the range.
    pub lo: u16,
    /// The last port in the range.
    pub hi: u16,
}

impl PortRange {
    /// Construct a new PortRange, if its bounds are in order.
    pub fn new(lo: u16, hi: u16) -> Option<Self> {
        if lo != 0 && lo <= hi {
            Some(PortRange { lo, hi })
        } else {
            None
        }
    }
    /// A range covering every port.
    pub fn new_all() -> Self {
        PortRange { lo: 1, hi: 65535 }
    }
    /// Return true iff `port` is in this range.
    pub fn contains(&self, port: u16) -> bool {
        self.lo <= port && port <= self.hi
    }
}

impl FromStr for PortRange {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(PortRange::new_all());
        }
        let (lo, hi) = match s.split_once('-') {
            Some((a, b)) => (a.parse::<u16>()?, b.parse::<u16>()?),
            None => {
                let p = s.parse::<u16>()?;
                (p, p)
            }
        };
        PortRange::new(lo, hi)
            .ok_or_else(|| EK::BadPolicy.at_pos(Pos::at(s)).with_msg("invalid port range"))
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.lo, self.hi) == (1, 65535) {
            write!(f, "*")
        } else if self.lo == self.hi {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "{}-{}", self.lo, self.hi)
        }
    }
}

/// An IPv4 address pattern: an address and a prefix length.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IpPattern {
    /// Any address at all.
    Star,
    /// All addresses matching a masked network address.
    Net {
        /// The network address.
        addr: Ipv4Addr,
        /// Number of leading bits that must match.
        maskbits: u8,
    },
}

impl IpPattern {
    /// Return true iff `addr` matches this pattern.
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        match self {
            IpPattern::Star => true,
            IpPattern::Net { addr: a, maskbits } => {
                let mask = if *maskbits == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(*maskbits))
                };
                (u32::from(*a) & mask) == (u32::from(addr) & mask)
            }
        }
    }
}

impl FromStr for IpPattern {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(IpPattern::Star);
        }
        let (addr_s, mask_s) = match s.split_once('/') {
            Some((a, m)) => (a, Some(m)),
            None => (s, None),
        };
        let addr: Ipv4Addr = addr_s.parse()?;
        let maskbits: u8 = match mask_s {
            None => 32,
            Some(m) => {
                if m.contains('.') {
                    // A dotted-quad netmask; must describe a prefix.
                    let mask: Ipv4Addr = m.parse()?;
                    let mask = u32::from(mask);
                    let bits = mask.leading_ones() as u8;
                    if mask != 0 && mask.trailing_zeros() + mask.leading_ones() != 32 {
                        return Err(EK::BadPolicy
                            .at_pos(Pos::at(m))
                            .with_msg("non-prefix netmask"));
                    }
                    bits
                } else {
                    let bits: u8 = m.parse()?;
                    if bits > 32 {
                        return Err(EK::BadPolicy
                            .at_pos(Pos::at(m))
                            .with_msg("mask out of range"));
                    }
                    bits
                }
            }
        };
        Ok(IpPattern::Net { addr, maskbits })
    }
}

/// An address-and-ports pattern, as it appears in a single policy rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddrPortPattern {
    /// The pattern for the address part.
    pub addr: IpPattern,
    /// The pattern for the port part.
    pub ports: PortRange,
}

impl AddrPortPattern {
    /// Return true iff `addr`:`port` matches this pattern.
    pub fn matches(&self, addr: Ipv4Addr, port: u16) -> bool {
        self.addr.matches(addr) && self.ports.contains(port)
    }
}

impl FromStr for AddrPortPattern {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let (addr_s, port_s) = s
            .rsplit_once(':')
            .ok_or_else(|| EK::BadPolicy.at_pos(Pos::at(s)).with_msg("missing port"))?;
        Ok(AddrPortPattern {
            addr: addr_s.parse()?,
            ports: port_s.parse()?,
        })
    }
}

/// A single rule in an address policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrPolicyRule {
    /// Whether the rule accepts or rejects.
    pub kind: RuleKind,
    /// The pattern this rule applies to.
    pub pattern: AddrPortPattern,
}

/// An ordered list of accept/reject rules, applied first-match-wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddrPolicy {
    /// The rules, in the order they appeared in the source document.
    rules: Vec<AddrPolicyRule>,
}

/// The address blocks covered by the `private` alias in a policy line.
static PRIVATE_NETS: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

impl AddrPolicy {
    /// Construct a new empty AddrPolicy.
    pub fn new() -> Self {
        AddrPolicy::default()
    }

    /// Add a rule at the end of this policy.
    pub fn push(&mut self, kind: RuleKind, pattern: AddrPortPattern) {
        self.rules.push(AddrPolicyRule { kind, pattern });
    }

    /// Parse and add one `accept`/`reject` line's argument, expanding
    /// the `private` alias into its component networks.
    pub fn push_policy_line(&mut self, kind: RuleKind, pattern: &str) -> Result<()> {
        if let Some(ports) = pattern.strip_prefix("private:") {
            let ports: PortRange = ports.parse()?;
            for (addr, maskbits) in PRIVATE_NETS {
                self.push(
                    kind,
                    AddrPortPattern {
                        addr: IpPattern::Net {
                            addr: *addr,
                            maskbits: *maskbits,
                        },
                        ports,
                    },
                );
            }
            Ok(())
        } else {
            self.push(kind, pattern.parse()?);
            Ok(())
        }
    }

    /// Return the kind of the first rule matching `addr`:`port`, if any.
    ///
    /// A `None` means the policy does not say; callers treat that as a
    /// rejection.
    pub fn allows(&self, addr: Ipv4Addr, port: u16) -> Option<RuleKind> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(addr, port))
            .map(|rule| rule.kind)
    }

    /// As [`allows`](Self::allows), but report an unmatched address as
    /// rejected.
    pub fn allows_or_default(&self, addr: Ipv4Addr, port: u16) -> bool {
        self.allows(addr, port) == Some(RuleKind::Accept)
    }

    /// Return the number of rules in this policy.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Return true if this policy has no rules.
    ///
    /// An empty policy rejects every address.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
