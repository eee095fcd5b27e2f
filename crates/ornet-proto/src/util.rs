//! Internal utilities for ornet-proto.

pub(crate) mod skew;
